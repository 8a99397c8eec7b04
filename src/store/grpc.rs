//! etcd v3 gRPC adapter.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::async_trait;
use tonic::codec::Streaming;
use tonic::transport::Channel;
use tracing::debug;
use tracing::warn;

use super::Connector;
use super::EndpointDescriptor;
use super::KvConnection;
use super::MemberInfo;
use super::NodeStatus;
use super::RawEventKind;
use super::RawWatchEvent;
use super::WatchStream;
use crate::proto::cluster_client::ClusterClient;
use crate::proto::event::EventType;
use crate::proto::kv_client::KvClient;
use crate::proto::maintenance_client::MaintenanceClient;
use crate::proto::watch_client::WatchClient;
use crate::proto::watch_request::RequestUnion;
use crate::proto::DeleteRangeRequest;
use crate::proto::MemberListRequest;
use crate::proto::PutRequest;
use crate::proto::RangeRequest;
use crate::proto::StatusRequest;
use crate::proto::WatchCreateRequest;
use crate::proto::WatchRequest;
use crate::proto::WatchResponse;
use crate::RawMemberId;
use crate::Result;
use crate::StoreConfig;
use crate::TransportError;

/// Opens plaintext gRPC channels to etcd endpoints
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    connect_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
        }
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Arc<dyn KvConnection>> {
        let channel = Channel::from_shared(endpoint.uri())
            .map_err(|_| TransportError::InvalidUri(endpoint.uri()))?
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(true)
            .connect()
            .await
            .map_err(|e| {
                debug!(endpoint = %endpoint, error = %e, "gRPC connect failed");
                TransportError::Unreachable(endpoint.label())
            })?;

        Ok(Arc::new(GrpcConnection::new(endpoint.label(), channel)))
    }
}

/// One channel to one etcd member. Clients are cheap clones of the channel.
#[derive(Debug, Clone)]
pub struct GrpcConnection {
    label: String,
    kv: KvClient<Channel>,
    watch: WatchClient<Channel>,
    cluster: ClusterClient<Channel>,
    maintenance: MaintenanceClient<Channel>,
}

impl GrpcConnection {
    fn new(
        label: String,
        channel: Channel,
    ) -> Self {
        Self {
            label,
            kv: KvClient::new(channel.clone()),
            watch: WatchClient::new(channel.clone()),
            cluster: ClusterClient::new(channel.clone()),
            maintenance: MaintenanceClient::new(channel),
        }
    }
}

#[async_trait]
impl KvConnection for GrpcConnection {
    async fn status(&self) -> Result<NodeStatus> {
        let response = self.maintenance.clone().status(StatusRequest {}).await?.into_inner();
        let member_id = response.header.map(|h| h.member_id).unwrap_or_default();

        Ok(NodeStatus {
            member_id: RawMemberId::Int(member_id),
            leader: RawMemberId::Int(response.leader),
            version: response.version,
        })
    }

    async fn member_list(&self) -> Result<Vec<MemberInfo>> {
        let response = self
            .cluster
            .clone()
            .member_list(MemberListRequest { linearizable: false })
            .await?
            .into_inner();

        Ok(response
            .members
            .into_iter()
            .map(|m| MemberInfo {
                id: RawMemberId::Int(m.id),
                name: m.name,
                client_urls: m.client_urls,
            })
            .collect())
    }

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let request = RangeRequest {
            key: key.as_bytes().to_vec(),
            ..Default::default()
        };
        let response = self.kv.clone().range(request).await?.into_inner();

        Ok(response.kvs.into_iter().next().map(|kv| kv.value))
    }

    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        let request = RangeRequest {
            key: prefix.as_bytes().to_vec(),
            range_end: prefix_range_end(prefix.as_bytes()),
            ..Default::default()
        };
        let response = self.kv.clone().range(request).await?.into_inner();

        Ok(response
            .kvs
            .into_iter()
            .map(|kv| (String::from_utf8_lossy(&kv.key).into_owned(), kv.value))
            .collect())
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        let request = PutRequest {
            key: key.as_bytes().to_vec(),
            value,
            ..Default::default()
        };
        self.kv.clone().put(request).await?;
        Ok(())
    }

    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool> {
        let request = DeleteRangeRequest {
            key: key.as_bytes().to_vec(),
            ..Default::default()
        };
        let response = self.kv.clone().delete_range(request).await?.into_inner();
        Ok(response.deleted > 0)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<WatchStream> {
        let (requests, rx) = mpsc::channel(1);
        let create = WatchRequest {
            request_union: Some(RequestUnion::CreateRequest(WatchCreateRequest {
                key: prefix.as_bytes().to_vec(),
                range_end: prefix_range_end(prefix.as_bytes()),
                ..Default::default()
            })),
        };
        requests
            .send(create)
            .await
            .map_err(|_| TransportError::Unreachable(self.label.clone()))?;

        let inbound = self.watch.clone().watch(ReceiverStream::new(rx)).await?.into_inner();

        let state = WatchState {
            inbound,
            _requests: requests,
            prefix: prefix.to_string(),
            pending: VecDeque::new(),
            finished: false,
        };
        Ok(stream::unfold(state, next_event).boxed())
    }
}

struct WatchState {
    inbound: Streaming<WatchResponse>,
    // Dropping the request half closes the server-side watch
    _requests: mpsc::Sender<WatchRequest>,
    prefix: String,
    pending: VecDeque<RawWatchEvent>,
    finished: bool,
}

async fn next_event(mut state: WatchState) -> Option<(Result<RawWatchEvent>, WatchState)> {
    loop {
        if let Some(event) = state.pending.pop_front() {
            return Some((Ok(event), state));
        }
        if state.finished {
            return None;
        }

        match state.inbound.message().await {
            Ok(Some(response)) => {
                if response.canceled {
                    state.finished = true;
                    let err = TransportError::WatchCancelled {
                        prefix: state.prefix.clone(),
                        reason: response.cancel_reason.clone(),
                    };
                    return Some((Err(err.into()), state));
                }
                for event in response.events {
                    let kind = match event.r#type() {
                        EventType::Put => RawEventKind::Put,
                        EventType::Delete => RawEventKind::Delete,
                    };
                    if let Some(kv) = event.kv {
                        state.pending.push_back(RawWatchEvent {
                            kind,
                            key: String::from_utf8_lossy(&kv.key).into_owned(),
                            value: kv.value,
                        });
                    }
                }
            }
            Ok(None) => return None,
            Err(status) => {
                warn!(prefix = %state.prefix, error = %status, "watch stream failed");
                state.finished = true;
                return Some((Err(status.into()), state));
            }
        }
    }
}

/// Smallest key greater than every key starting with `prefix`
pub(crate) fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // All bytes were 0xff: range to the end of the keyspace
    vec![0]
}
