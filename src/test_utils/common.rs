use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use chrono::Utc;
use serde_json::Value;

use crate::ConfigEntry;
use crate::MemCluster;
use crate::StoreGateway;

pub const LABELS: [&str; 3] = ["a:2379", "b:2379", "c:2379"];

/// Nodes `a`, `b` and `c` on port 2379; `a` leads
pub fn three_node_cluster() -> MemCluster {
    MemCluster::from_labels(&LABELS).expect("valid labels")
}

pub fn gateway_for(cluster: &MemCluster) -> Arc<StoreGateway> {
    Arc::new(StoreGateway::new(
        cluster.endpoints(),
        Arc::new(cluster.clone()),
        Duration::from_millis(500),
    ))
}

pub fn entry(
    value: Value,
    version: &str,
) -> ConfigEntry {
    ConfigEntry::new(
        value,
        version,
        "test",
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    )
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F, Fut>(
    timeout: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
