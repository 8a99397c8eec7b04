use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::info;
use tracing::warn;

use super::ClusterHealthMonitor;
use super::ClusterStatus;
use crate::ClusterError;
use crate::Result;

/// Overlay `down` on a raw status.
///
/// Members whose endpoint is down are forced unhealthy. If the recorded
/// leader is then unhealthy, the first healthy member with a known id takes
/// over; with none left the status has no leader.
pub fn apply_down_set(
    raw: &ClusterStatus,
    down: &BTreeSet<String>,
) -> ClusterStatus {
    let mut status = raw.clone();
    for member in &mut status.members {
        if down.contains(&member.endpoint) {
            member.healthy = false;
        }
    }

    let Some(leader) = status.leader_id.clone() else {
        return status;
    };
    let leader_healthy = status
        .members
        .iter()
        .any(|m| m.id.as_ref() == Some(&leader) && m.healthy);
    if leader_healthy {
        return status;
    }

    for member in &mut status.members {
        member.is_leader = false;
    }
    status.leader_id = None;
    if let Some(successor) = status.members.iter_mut().find(|m| m.healthy && m.id.is_some()) {
        successor.is_leader = true;
        status.leader_id = successor.id.clone();
    }
    status
}

/// Simulated node failure as a process-local set of endpoint labels.
/// Nothing is sent to the backend.
pub struct FaultInjector {
    monitor: Arc<ClusterHealthMonitor>,
    down: RwLock<BTreeSet<String>>,
    /// Serializes kill-leader so two calls cannot pick the same target
    op_lock: Mutex<()>,
}

impl FaultInjector {
    pub fn new(monitor: Arc<ClusterHealthMonitor>) -> Self {
        Self {
            monitor,
            down: RwLock::new(BTreeSet::new()),
            op_lock: Mutex::new(()),
        }
    }

    /// Mark the effective leader (or, without one, the first healthy member)
    /// as down. Returns the down-set afterwards.
    pub async fn kill_leader(&self) -> Result<Vec<String>> {
        let _guard = self.op_lock.lock().await;
        let effective = self.effective_status().await;

        let target = effective
            .members
            .iter()
            .find(|m| m.is_leader && m.healthy)
            .or_else(|| effective.members.iter().find(|m| m.healthy))
            .ok_or_else(|| {
                warn!("Kill-leader requested with no healthy members left");
                ClusterError::NoHealthyMembers
            })?;

        info!(endpoint = %target.endpoint, name = %target.name, "Simulating member failure");
        let mut down = self.down.write();
        down.insert(target.endpoint.clone());
        Ok(down.iter().cloned().collect())
    }

    /// Clear every simulated failure
    pub fn revive(&self) -> Vec<String> {
        self.down.write().clear();
        info!("Simulated failures cleared");
        Vec::new()
    }

    /// Raw cluster status with the down-set applied
    pub async fn effective_status(&self) -> ClusterStatus {
        let raw = self.monitor.get_cluster_status().await;
        let down = self.down.read().clone();
        apply_down_set(&raw, &down)
    }

    pub fn down_set(&self) -> BTreeSet<String> {
        self.down.read().clone()
    }
}
