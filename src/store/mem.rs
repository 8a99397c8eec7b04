//! In-process simulated cluster.
//!
//! Every node keeps its own copy of the keyspace. A write applies to each
//! running node after that node's replication lag and is announced to the
//! node's watchers as it lands. Nodes can be stopped, given stale leader
//! opinions, or made to fail their next calls.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::async_trait;
use tracing::debug;

use super::Connector;
use super::EndpointDescriptor;
use super::KvConnection;
use super::MemberInfo;
use super::NodeStatus;
use super::RawEventKind;
use super::RawWatchEvent;
use super::WatchStream;
use crate::RawMemberId;
use crate::Result;
use crate::TransportError;

const MEM_VERSION: &str = "3.5.0-mem";

type WatchSender = mpsc::UnboundedSender<Result<RawWatchEvent>>;

struct MemNode {
    endpoint: EndpointDescriptor,
    member_id: RawMemberId,
    name: String,
    up: bool,
    /// Leader this node reports, when it disagrees with the cluster
    leader_claim: Option<RawMemberId>,
    lag: Duration,
    failures: usize,
    data: BTreeMap<String, Vec<u8>>,
    watchers: Vec<(String, WatchSender)>,
}

impl MemNode {
    fn apply(
        &mut self,
        key: &str,
        value: Option<&[u8]>,
    ) {
        let event = match value {
            Some(bytes) => {
                self.data.insert(key.to_string(), bytes.to_vec());
                RawWatchEvent {
                    kind: RawEventKind::Put,
                    key: key.to_string(),
                    value: bytes.to_vec(),
                }
            }
            None => {
                if self.data.remove(key).is_none() {
                    return;
                }
                RawWatchEvent {
                    kind: RawEventKind::Delete,
                    key: key.to_string(),
                    value: Vec::new(),
                }
            }
        };

        self.watchers
            .retain(|(prefix, tx)| !key.starts_with(prefix.as_str()) || tx.send(Ok(event.clone())).is_ok());
    }
}

struct ClusterState {
    nodes: Vec<MemNode>,
    leader: Option<usize>,
}

/// Simulated multi-node backend. Cloning shares the same cluster.
#[derive(Clone)]
pub struct MemCluster {
    inner: Arc<Mutex<ClusterState>>,
}

impl MemCluster {
    /// One node per endpoint with member ids 1..=n; the first node leads.
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Self {
        let nodes: Vec<MemNode> = endpoints
            .into_iter()
            .enumerate()
            .map(|(i, endpoint)| MemNode {
                name: format!("node{}", i + 1),
                member_id: RawMemberId::Int(i as u64 + 1),
                endpoint,
                up: true,
                leader_claim: None,
                lag: Duration::ZERO,
                failures: 0,
                data: BTreeMap::new(),
                watchers: Vec::new(),
            })
            .collect();
        let leader = (!nodes.is_empty()).then_some(0);

        Self {
            inner: Arc::new(Mutex::new(ClusterState { nodes, leader })),
        }
    }

    pub fn from_labels(labels: &[&str]) -> Result<Self> {
        let endpoints = labels
            .iter()
            .map(|l| EndpointDescriptor::parse(l))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(endpoints))
    }

    pub fn endpoints(&self) -> Vec<EndpointDescriptor> {
        self.inner.lock().nodes.iter().map(|n| n.endpoint.clone()).collect()
    }

    /// Move cluster leadership; `None` leaves the cluster leaderless
    pub fn set_leader(
        &self,
        label: Option<&str>,
    ) {
        let mut state = self.inner.lock();
        state.leader = label.and_then(|l| index_of(&state.nodes, l));
    }

    /// Stop or restart a node. A stopped node refuses connections and ends
    /// its watch streams; a restarted node catches up from the leader.
    pub fn set_up(
        &self,
        label: &str,
        up: bool,
    ) {
        let mut state = self.inner.lock();
        let Some(index) = index_of(&state.nodes, label) else {
            return;
        };

        if !up {
            let node = &mut state.nodes[index];
            node.up = false;
            node.watchers.clear();
            return;
        }

        let snapshot = state
            .leader
            .filter(|&l| l != index && state.nodes[l].up)
            .map(|l| state.nodes[l].data.clone());
        let node = &mut state.nodes[index];
        node.up = true;
        if let Some(data) = snapshot {
            node.data = data;
        }
    }

    /// Delay before writes land on this node
    pub fn set_lag(
        &self,
        label: &str,
        lag: Duration,
    ) {
        self.with_node(label, |node| node.lag = lag);
    }

    /// Make a node report its own (possibly stale) idea of the leader
    pub fn set_leader_claim(
        &self,
        label: &str,
        claim: Option<RawMemberId>,
    ) {
        self.with_node(label, |node| node.leader_claim = claim);
    }

    pub fn set_member_id(
        &self,
        label: &str,
        id: RawMemberId,
    ) {
        self.with_node(label, |node| node.member_id = id);
    }

    /// The next `count` calls on this node fail as unreachable
    pub fn fail_next(
        &self,
        label: &str,
        count: usize,
    ) {
        self.with_node(label, |node| node.failures = count);
    }

    /// Write raw bytes as if accepted by the leader
    pub fn put_raw(
        &self,
        key: &str,
        value: Vec<u8>,
    ) {
        self.replicate(key, Some(value));
    }

    /// What one node currently holds for `key`
    pub fn value_at(
        &self,
        label: &str,
        key: &str,
    ) -> Option<Vec<u8>> {
        let state = self.inner.lock();
        index_of(&state.nodes, label).and_then(|i| state.nodes[i].data.get(key).cloned())
    }

    fn with_node(
        &self,
        label: &str,
        f: impl FnOnce(&mut MemNode),
    ) {
        let mut state = self.inner.lock();
        if let Some(index) = index_of(&state.nodes, label) {
            f(&mut state.nodes[index]);
        }
    }

    /// Gate every call on the node being up and not scheduled to fail
    fn enter(
        &self,
        index: usize,
    ) -> Result<()> {
        let mut state = self.inner.lock();
        let node = &mut state.nodes[index];
        if !node.up {
            return Err(TransportError::Unreachable(node.endpoint.label()).into());
        }
        if node.failures > 0 {
            node.failures -= 1;
            return Err(TransportError::Unreachable(node.endpoint.label()).into());
        }
        Ok(())
    }

    fn replicate(
        &self,
        key: &str,
        value: Option<Vec<u8>>,
    ) {
        let mut state = self.inner.lock();
        for index in 0..state.nodes.len() {
            let node = &mut state.nodes[index];
            if !node.up {
                continue;
            }
            if node.lag.is_zero() {
                node.apply(key, value.as_deref());
                continue;
            }

            let lag = node.lag;
            let cluster = self.clone();
            let key = key.to_string();
            let value = value.clone();
            tokio::spawn(async move {
                tokio::time::sleep(lag).await;
                let mut state = cluster.inner.lock();
                let node = &mut state.nodes[index];
                if node.up {
                    node.apply(&key, value.as_deref());
                }
            });
        }
    }
}

fn index_of(
    nodes: &[MemNode],
    label: &str,
) -> Option<usize> {
    nodes.iter().position(|n| n.endpoint.label() == label)
}

#[async_trait]
impl Connector for MemCluster {
    async fn connect(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Arc<dyn KvConnection>> {
        let label = endpoint.label();
        let index = {
            let state = self.inner.lock();
            index_of(&state.nodes, &label)
        }
        .ok_or_else(|| TransportError::Unreachable(label.clone()))?;

        self.enter(index)?;
        debug!(endpoint = %label, "mem connection opened");

        Ok(Arc::new(MemConnection {
            cluster: self.clone(),
            index,
        }))
    }
}

/// Connection to one simulated node
pub struct MemConnection {
    cluster: MemCluster,
    index: usize,
}

#[async_trait]
impl KvConnection for MemConnection {
    async fn status(&self) -> Result<NodeStatus> {
        self.cluster.enter(self.index)?;
        let state = self.cluster.inner.lock();
        let node = &state.nodes[self.index];
        let leader = node.leader_claim.clone().unwrap_or_else(|| {
            state
                .leader
                .map(|l| state.nodes[l].member_id.clone())
                .unwrap_or(RawMemberId::Int(0))
        });

        Ok(NodeStatus {
            member_id: node.member_id.clone(),
            leader,
            version: MEM_VERSION.to_string(),
        })
    }

    async fn member_list(&self) -> Result<Vec<MemberInfo>> {
        self.cluster.enter(self.index)?;
        let state = self.cluster.inner.lock();
        Ok(state
            .nodes
            .iter()
            .map(|n| MemberInfo {
                id: n.member_id.clone(),
                name: n.name.clone(),
                client_urls: vec![n.endpoint.uri()],
            })
            .collect())
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.cluster.enter(self.index)?;
        let state = self.cluster.inner.lock();
        Ok(state.nodes[self.index].data.get(key).cloned())
    }

    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        self.cluster.enter(self.index)?;
        let state = self.cluster.inner.lock();
        Ok(state.nodes[self.index]
            .data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        self.cluster.enter(self.index)?;
        self.cluster.replicate(key, Some(value));
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        self.cluster.enter(self.index)?;
        let existed = {
            let state = self.cluster.inner.lock();
            state.nodes[self.index].data.contains_key(key)
        };
        if existed {
            self.cluster.replicate(key, None);
        }
        Ok(existed)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<WatchStream> {
        self.cluster.enter(self.index)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.cluster.inner.lock().nodes[self.index]
            .watchers
            .push((prefix.to_string(), tx));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
