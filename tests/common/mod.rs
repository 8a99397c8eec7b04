use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use confwatch::ConfigService;
use confwatch::MemCluster;
use confwatch::Settings;
use lazy_static::lazy_static;

pub const LABELS: [&str; 3] = ["node-a:2379", "node-b:2379", "node-c:2379"];

// Generous enough for a loaded CI box, short enough to keep lagging-node
// cases quick
pub const REPLICATION_TIMEOUT_MS: u64 = 400;

lazy_static! {
    static ref LOGGER_INIT: () = {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    };
}

pub fn enable_logger() {
    *LOGGER_INIT;
}

pub fn cluster() -> MemCluster {
    MemCluster::from_labels(&LABELS).expect("valid labels")
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.store.endpoints = LABELS.iter().map(|l| l.to_string()).collect();
    settings.store.request_timeout_ms = 500;
    settings.replication.timeout_ms = REPLICATION_TIMEOUT_MS;
    settings.replication.interval_ms = 10;
    settings
}

pub async fn start_service(cluster: &MemCluster) -> Arc<ConfigService> {
    enable_logger();
    ConfigService::start(settings(), Arc::new(cluster.clone()))
        .await
        .expect("service starts")
}

pub async fn wait_until<F, Fut>(
    timeout: Duration,
    mut condition: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}
