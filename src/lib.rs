//! Configuration propagation and cluster observability over an
//! etcd-compatible key-value store.
//!
//! Values live under `/config/{namespace}/{environment}/{key}`. Writes go
//! through a failover-aware [`StoreGateway`]; backend changes are pumped by
//! the [`WatchDispatcher`] into the [`RealtimeCache`] and the
//! [`BroadcastHub`]; operators inspect the backend with the
//! [`ClusterHealthMonitor`], simulate node loss with the [`FaultInjector`]
//! and verify writes with the [`ReplicationChecker`]. [`ConfigService`] owns
//! and wires all of them.

mod cache;
mod cluster;
mod config;
mod constants;
mod entry;
mod errors;
mod hub;
mod service;
mod store;
mod watch;

pub mod http;
pub mod metrics;
pub mod proto;
pub mod utils;

pub use cache::*;
pub use cluster::*;
pub use self::config::*;
pub use constants::*;
pub use entry::*;
pub use errors::*;
pub use hub::*;
pub use service::*;
pub use store::*;
pub use utils::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
