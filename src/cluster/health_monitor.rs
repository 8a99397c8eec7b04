use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::debug;
use tracing::warn;

use super::ClusterStatus;
use super::MemberId;
use super::MemberStatus;
use crate::label_from_url;
use crate::Connector;
use crate::EndpointDescriptor;
use crate::MemberInfo;
use crate::NodeStatus;
use crate::Result;
use crate::TransportError;

struct Discovery {
    leader: Option<MemberId>,
    members: Vec<MemberInfo>,
}

/// Builds one leader/member view out of independent per-endpoint probes.
pub struct ClusterHealthMonitor {
    endpoints: Vec<EndpointDescriptor>,
    connector: Arc<dyn Connector>,
    probe_timeout: Duration,
}

impl ClusterHealthMonitor {
    pub fn new(
        endpoints: Vec<EndpointDescriptor>,
        connector: Arc<dyn Connector>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            endpoints,
            connector,
            probe_timeout,
        }
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    /// Leader and per-endpoint health.
    ///
    /// The leader comes from the first endpoint that answers both status and
    /// member list; other nodes' leader opinions are ignored. Every endpoint
    /// is then probed concurrently. If discovery fails everywhere the result
    /// carries probe data only and no leader.
    pub async fn get_cluster_status(&self) -> ClusterStatus {
        let discovery = self.discover().await;

        let mut lookup: HashMap<String, (Option<MemberId>, String)> = HashMap::new();
        if let Some(discovery) = &discovery {
            for member in &discovery.members {
                for url in &member.client_urls {
                    if let Some(label) = label_from_url(url) {
                        lookup.insert(label, (member.id.normalize(), member.name.clone()));
                    }
                }
            }
        }

        let probes = join_all(self.endpoints.iter().map(|e| self.probe(e))).await;

        let mut members: Vec<MemberStatus> = self
            .endpoints
            .iter()
            .zip(probes)
            .map(|(endpoint, probe)| {
                let label = endpoint.label();
                let (known_id, name) = lookup
                    .get(&label)
                    .cloned()
                    .unwrap_or_else(|| (None, endpoint.host.clone()));

                match probe {
                    Ok(status) => MemberStatus {
                        id: known_id.or_else(|| status.member_id.normalize()),
                        name,
                        is_leader: false,
                        healthy: true,
                        endpoint: label,
                        version: Some(status.version),
                    },
                    Err(e) => {
                        debug!(endpoint = %label, error = %e, "Health probe failed");
                        MemberStatus {
                            id: known_id,
                            name,
                            is_leader: false,
                            healthy: false,
                            endpoint: label,
                            version: None,
                        }
                    }
                }
            })
            .collect();

        let leader_id = discovery.and_then(|d| d.leader).and_then(|leader| {
            let member = members.iter_mut().find(|m| m.id.as_ref() == Some(&leader))?;
            member.is_leader = true;
            Some(leader)
        });

        ClusterStatus { leader_id, members }
    }

    async fn discover(&self) -> Option<Discovery> {
        for endpoint in &self.endpoints {
            let attempt = tokio::time::timeout(self.probe_timeout, async {
                let conn = self.connector.connect(endpoint).await?;
                let status = conn.status().await?;
                let members = conn.member_list().await?;
                Ok::<_, crate::Error>((status, members))
            })
            .await;

            match attempt {
                Ok(Ok((status, members))) => {
                    return Some(Discovery {
                        leader: status.leader.normalize(),
                        members,
                    });
                }
                Ok(Err(e)) => debug!(endpoint = %endpoint, error = %e, "Discovery failed"),
                Err(_) => debug!(endpoint = %endpoint, "Discovery timed out"),
            }
        }
        warn!("No endpoint answered cluster discovery");
        None
    }

    async fn probe(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<NodeStatus> {
        tokio::time::timeout(self.probe_timeout, async {
            let conn = self.connector.connect(endpoint).await?;
            conn.status().await
        })
        .await
        .map_err(|_| TransportError::Timeout {
            endpoint: endpoint.label(),
            duration: self.probe_timeout,
        })?
    }
}
