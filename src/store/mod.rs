//! Backend store access.
//!
//! [`StoreGateway`] is the failover-aware client used by the service. It
//! reaches the backend only through [`Connector`] and [`KvConnection`], which
//! are implemented for the etcd v3 gRPC API ([`GrpcConnector`]) and for an
//! in-process simulated cluster ([`MemCluster`]).

mod endpoint;
mod gateway;
mod grpc;
mod mem;
pub use endpoint::*;
pub use gateway::*;
pub use grpc::*;
pub use mem::*;


use std::sync::Arc;

use futures::stream::BoxStream;
#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::RawMemberId;
use crate::Result;

/// Raw change notifications from one backend watch
pub type WatchStream = BoxStream<'static, Result<RawWatchEvent>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWatchEvent {
    pub kind: RawEventKind,
    pub key: String,
    /// Empty for deletes
    pub value: Vec<u8>,
}

/// What one node reports about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub member_id: RawMemberId,
    /// The node's opinion of the current leader
    pub leader: RawMemberId,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub id: RawMemberId,
    pub name: String,
    pub client_urls: Vec<String>,
}

/// Opens single-endpoint connections
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        endpoint: &EndpointDescriptor,
    ) -> Result<Arc<dyn KvConnection>>;
}

/// Key-value and maintenance calls against one backend endpoint.
///
/// Calls are not bounded by a deadline here; callers wrap them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvConnection: Send + Sync + 'static {
    async fn status(&self) -> Result<NodeStatus>;

    async fn member_list(&self) -> Result<Vec<MemberInfo>>;

    async fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>>;

    /// Every key starting with `prefix`, in key order
    async fn get_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>>;

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<()>;

    /// Returns whether the key existed
    async fn delete(
        &self,
        key: &str,
    ) -> Result<bool>;

    /// Stream of changes under `prefix`. The stream ends when the connection
    /// is lost.
    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<WatchStream>;
}
