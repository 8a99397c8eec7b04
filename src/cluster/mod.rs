//! Backend cluster observability: health, simulated node loss and write
//! convergence.

mod fault_injection;
mod health_monitor;
mod member_id;
mod replication;
pub use fault_injection::*;
pub use health_monitor::*;
pub use member_id::*;
pub use replication::*;

#[cfg(test)]
mod member_id_test;

use serde::Deserialize;
use serde::Serialize;

/// One configured endpoint as seen by a status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStatus {
    pub id: Option<MemberId>,
    pub name: String,
    pub is_leader: bool,
    pub healthy: bool,
    /// `"host:port"` label of the configured endpoint
    pub endpoint: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub leader_id: Option<MemberId>,
    /// In configured endpoint order
    pub members: Vec<MemberStatus>,
}

impl ClusterStatus {
    pub fn leader(&self) -> Option<&MemberStatus> {
        self.members.iter().find(|m| m.is_leader)
    }
}
