//! Owns every component and exposes the operations the HTTP layer serves.

mod types;
pub use types::*;


use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use nanoid::nanoid;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;

use crate::time::elapsed_ms;
use crate::time::now_utc;
use crate::time::timestamp_millis;
use crate::BroadcastHub;
use crate::ClusterHealthMonitor;
use crate::ClusterStatus;
use crate::ConfigEntry;
use crate::Connector;
use crate::FaultInjector;
use crate::RealtimeCache;
use crate::ReplicationChecker;
use crate::Result;
use crate::Settings;
use crate::StoreGateway;
use crate::WatchDispatcher;
use crate::WatchId;
use crate::CONFIG_WATCH_PREFIX;
use crate::DEFAULT_TOMBSTONE_TTL;
use crate::HEALTH_ENVIRONMENT;
use crate::HEALTH_KEY;
use crate::HEALTH_NAMESPACE;

const VERSION_SUFFIX_LEN: usize = 8;

/// `v{unix_ms}-{random}`
pub(crate) fn new_version() -> String {
    format!("v{}-{}", timestamp_millis(), nanoid!(VERSION_SUFFIX_LEN))
}

pub struct ConfigService {
    settings: Settings,
    gateway: Arc<StoreGateway>,
    dispatcher: WatchDispatcher,
    cache: Arc<RealtimeCache>,
    hub: Arc<BroadcastHub>,
    faults: FaultInjector,
    checker: ReplicationChecker,
    watch_ids: Mutex<Vec<WatchId>>,
}

impl ConfigService {
    /// Connect to the backend and start propagating `/config/` changes into
    /// the cache and to push subscribers.
    pub async fn start(
        settings: Settings,
        connector: Arc<dyn Connector>,
    ) -> Result<Arc<Self>> {
        let gateway = Arc::new(StoreGateway::from_config(&settings.store, connector)?);
        gateway.connect().await?;

        let dispatcher = WatchDispatcher::new(gateway.clone(), settings.watch.clone());
        dispatcher.start();

        let cache = Arc::new(RealtimeCache::with_tombstone_ttl(tombstone_ttl(&settings)));
        let hub = Arc::new(BroadcastHub::new());
        let cache_watch = dispatcher.watch(CONFIG_WATCH_PREFIX, cache.clone()).await?;
        let hub_watch = dispatcher.watch(CONFIG_WATCH_PREFIX, hub.clone()).await?;

        let endpoints = gateway.endpoints().to_vec();
        let monitor = Arc::new(ClusterHealthMonitor::new(
            endpoints.clone(),
            gateway.connector(),
            settings.cluster.probe_timeout(),
        ));
        let checker = ReplicationChecker::new(endpoints, gateway.connector());

        info!(
            endpoint = ?gateway.active_endpoint(),
            prefix = CONFIG_WATCH_PREFIX,
            "Config service started"
        );

        Ok(Arc::new(Self {
            settings,
            gateway,
            dispatcher,
            cache,
            hub,
            faults: FaultInjector::new(monitor),
            checker,
            watch_ids: Mutex::new(vec![cache_watch, hub_watch]),
        }))
    }

    pub async fn shutdown(&self) {
        let ids: Vec<WatchId> = self.watch_ids.lock().drain(..).collect();
        for id in ids {
            self.dispatcher.unwatch(CONFIG_WATCH_PREFIX, id);
        }
        self.dispatcher.stop().await;
        self.gateway.close();
        info!("Config service stopped");
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn cache(&self) -> &Arc<RealtimeCache> {
        &self.cache
    }

    /// Whether the shared `/config/` watch is still delivering
    pub fn is_watching(&self) -> bool {
        self.dispatcher.is_live(CONFIG_WATCH_PREFIX)
    }

    pub async fn get_config(
        &self,
        namespace: &str,
        environment: &str,
        key: &str,
    ) -> Result<Option<ConfigEntry>> {
        if let Some(entry) = self.cache.get(namespace, environment, key) {
            debug!(namespace, environment, key, "Served from cache");
            return Ok(Some(entry));
        }

        let read_started = Instant::now();
        let entry = self.gateway.get(namespace, environment, key).await?;
        if let Some(entry) = &entry {
            self.cache
                .backfill(namespace, environment, key, entry.clone(), read_started);
        }
        Ok(entry)
    }

    /// Served from the cache only once the prefix has been scanned in full
    /// and still holds entries; otherwise scanned from the store.
    pub async fn get_all_configs(
        &self,
        namespace: &str,
        environment: &str,
    ) -> Result<BTreeMap<String, ConfigEntry>> {
        if self.cache.is_loaded(namespace, environment) {
            let cached = self.cache.get_all(namespace, environment);
            if !cached.is_empty() {
                return Ok(cached);
            }
        }

        let read_started = Instant::now();
        let entries = self.gateway.get_all(namespace, environment).await?;
        for (key, entry) in &entries {
            self.cache
                .backfill(namespace, environment, key, entry.clone(), read_started);
        }
        self.cache.mark_loaded(namespace, environment);
        Ok(entries)
    }

    /// Write a fresh version and report how it reached each endpoint
    pub async fn write_config(
        &self,
        namespace: &str,
        environment: &str,
        key: &str,
        request: WriteRequest,
    ) -> Result<WriteResponse> {
        let started_at = now_utc();
        let started = Instant::now();
        let version = new_version();
        let created_by = request
            .created_by
            .unwrap_or_else(|| DEFAULT_WRITER.to_string());
        let entry = ConfigEntry::new(request.value, version.clone(), created_by, started_at);

        self.gateway.put(namespace, environment, key, &entry).await?;
        info!(
            namespace,
            environment,
            key,
            version = %version,
            reason = request.reason.as_deref().unwrap_or_default(),
            "Emergency config written"
        );

        let replication = &self.settings.replication;
        let replication_log = self
            .checker
            .check_replication(
                namespace,
                environment,
                key,
                &entry.value,
                replication.timeout(),
                replication.interval(),
                &self.faults.down_set(),
            )
            .await;

        Ok(WriteResponse {
            success: true,
            version: version.clone(),
            replication_log,
            replication_context: ReplicationContext {
                namespace: namespace.to_string(),
                environment: environment.to_string(),
                key: key.to_string(),
                value: entry.value,
                version,
                started_at,
                completed_at: now_utc(),
                duration_ms: elapsed_ms(started.elapsed()),
            },
        })
    }

    /// Write every entry under the git ref as both version and commit.
    /// Stops at the first failed write; keys written before it stay written.
    pub async fn deploy(
        &self,
        namespace: &str,
        environment: &str,
        request: DeployRequest,
    ) -> Result<DeployResponse> {
        let created_at = now_utc();
        let mut deployed = 0;
        for (key, value) in request.configs {
            let entry = ConfigEntry::new(value, request.git_ref.clone(), request.created_by.clone(), created_at)
                .with_git_commit(request.git_ref.clone());
            self.gateway.put(namespace, environment, &key, &entry).await?;
            deployed += 1;
        }

        info!(
            namespace,
            environment,
            git_ref = %request.git_ref,
            deployed,
            "Configs deployed"
        );
        Ok(DeployResponse {
            success: true,
            deployed,
            git_ref: request.git_ref,
        })
    }

    pub async fn delete_config(
        &self,
        namespace: &str,
        environment: &str,
        key: &str,
    ) -> Result<bool> {
        self.gateway.delete(namespace, environment, key).await
    }

    /// Raw status with the simulated down-set applied
    pub async fn cluster_status(&self) -> ClusterStatus {
        self.faults.effective_status().await
    }

    pub async fn kill_leader(&self) -> Result<Vec<String>> {
        self.faults.kill_leader().await
    }

    pub fn revive(&self) -> Vec<String> {
        self.faults.revive()
    }

    /// Succeeds when the store answers a read of the health probe key
    pub async fn health_check(&self) -> Result<()> {
        self.gateway
            .get(HEALTH_NAMESPACE, HEALTH_ENVIRONMENT, HEALTH_KEY)
            .await
            .map(|_| ())
    }
}

/// Outlives a read that fails, reconnects through every endpoint and retries
fn tombstone_ttl(settings: &Settings) -> Duration {
    let store = &settings.store;
    let reconnect = store.connect_timeout() * store.endpoints.len() as u32;
    DEFAULT_TOMBSTONE_TTL.max(store.request_timeout() * 2 + reconnect)
}
