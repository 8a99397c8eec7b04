use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Connector;
use super::EndpointDescriptor;
use super::KvConnection;
use super::WatchStream;
use crate::config_path;
use crate::config_prefix;
use crate::ConfigEntry;
use crate::Error;
use crate::Result;
use crate::ScopedTimer;
use crate::StoreConfig;
use crate::StoreError;
use crate::TransportError;

struct ActiveConnection {
    index: usize,
    label: String,
    conn: Arc<dyn KvConnection>,
}

/// Failover-aware client for the configuration keyspace.
///
/// Holds at most one active connection. A transient failure drops it,
/// reconnects starting from the first endpoint and reissues the call once.
pub struct StoreGateway {
    endpoints: Vec<EndpointDescriptor>,
    connector: Arc<dyn Connector>,
    active: ArcSwapOption<ActiveConnection>,
    /// Where the next `connect` starts: the last known-good endpoint
    next_index: AtomicUsize,
    reconnect_lock: Mutex<()>,
    request_timeout: Duration,
}

impl StoreGateway {
    pub fn new(
        endpoints: Vec<EndpointDescriptor>,
        connector: Arc<dyn Connector>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            endpoints,
            connector,
            active: ArcSwapOption::empty(),
            next_index: AtomicUsize::new(0),
            reconnect_lock: Mutex::new(()),
            request_timeout,
        }
    }

    pub fn from_config(
        config: &StoreConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        Ok(Self::new(config.descriptors()?, connector, config.request_timeout()))
    }

    /// Open a connection, trying endpoints round-robin from the last
    /// known-good one. Each candidate must answer a status probe.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.reconnect_lock.lock().await;
        self.connect_from(self.next_index.load(Ordering::Acquire))
            .await
            .map(|_| ())
    }

    /// Drop the active connection
    pub fn close(&self) {
        if self.active.swap(None).is_some() {
            info!("Store connection closed");
        }
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Label of the endpoint currently in use
    pub fn active_endpoint(&self) -> Option<String> {
        self.active.load().as_ref().map(|a| a.label.clone())
    }

    /// Absent keys are `Ok(None)`; a malformed payload is a decode error.
    pub async fn get(
        &self,
        namespace: &str,
        environment: &str,
        key: &str,
    ) -> Result<Option<ConfigEntry>> {
        let _timer = ScopedTimer::new("store_get");
        let path = config_path(namespace, environment, key);

        let bytes = self
            .with_retry("get", |conn| {
                let path = path.clone();
                async move { conn.get(&path).await }
            })
            .await?;

        bytes.map(|b| ConfigEntry::decode(&path, &b)).transpose()
    }

    /// Every entry under `namespace/environment`, keyed relative to that
    /// prefix. Malformed entries are skipped.
    pub async fn get_all(
        &self,
        namespace: &str,
        environment: &str,
    ) -> Result<BTreeMap<String, ConfigEntry>> {
        let _timer = ScopedTimer::new("store_get_all");
        let prefix = config_prefix(namespace, environment);

        let rows = self
            .with_retry("get_all", |conn| {
                let prefix = prefix.clone();
                async move { conn.get_prefix(&prefix).await }
            })
            .await?;

        let mut entries = BTreeMap::new();
        for (full_key, bytes) in rows {
            let key = full_key
                .strip_prefix(prefix.as_str())
                .unwrap_or(&full_key)
                .trim_start_matches('/')
                .to_string();
            match ConfigEntry::decode(&full_key, &bytes) {
                Ok(entry) => {
                    entries.insert(key, entry);
                }
                Err(e) => {
                    warn!(key = %full_key, error = %e, "Skipping malformed entry");
                }
            }
        }
        Ok(entries)
    }

    pub async fn put(
        &self,
        namespace: &str,
        environment: &str,
        key: &str,
        entry: &ConfigEntry,
    ) -> Result<()> {
        let _timer = ScopedTimer::new("store_put");
        let path = config_path(namespace, environment, key);
        let bytes = entry.encode(&path)?;

        self.with_retry("put", |conn| {
            let path = path.clone();
            let bytes = bytes.clone();
            async move { conn.put(&path, bytes).await }
        })
        .await
    }

    /// Returns whether the key existed
    pub async fn delete(
        &self,
        namespace: &str,
        environment: &str,
        key: &str,
    ) -> Result<bool> {
        let _timer = ScopedTimer::new("store_delete");
        let path = config_path(namespace, environment, key);

        self.with_retry("delete", |conn| {
            let path = path.clone();
            async move { conn.delete(&path).await }
        })
        .await
    }

    /// Open a backend watch on `prefix` over the active connection
    pub async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<WatchStream> {
        self.with_retry("watch", |conn| {
            let prefix = prefix.to_string();
            async move { conn.watch_prefix(&prefix).await }
        })
        .await
    }

    /// Run `call` on the active connection, connecting lazily. A transient
    /// failure gets exactly one reconnect-and-retry.
    async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<T>
    where
        F: Fn(Arc<dyn KvConnection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let active = self.current().await?;
        let first = match self.bounded(&active.label, call(active.conn.clone())).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => e,
            Err(e) => return Err(e),
        };

        warn!(
            operation,
            endpoint = %active.label,
            error = %first,
            "Store call failed, reconnecting"
        );

        let active = match self.reconnect(&active).await {
            Ok(active) => active,
            Err(e) => {
                warn!(operation, error = %e, "Reconnect failed");
                return Err(unavailable(operation, first));
            }
        };

        self.bounded(&active.label, call(active.conn.clone()))
            .await
            .map_err(|e| if e.is_transient() { unavailable(operation, e) } else { e })
    }

    async fn current(&self) -> Result<Arc<ActiveConnection>> {
        if let Some(active) = self.active.load_full() {
            return Ok(active);
        }

        let _guard = self.reconnect_lock.lock().await;
        if let Some(active) = self.active.load_full() {
            return Ok(active);
        }
        self.connect_from(self.next_index.load(Ordering::Acquire)).await
    }

    /// Replace `failed` with a fresh connection chosen from endpoint 0.
    /// Concurrent callers that lost the same connection share one reconnect.
    async fn reconnect(
        &self,
        failed: &Arc<ActiveConnection>,
    ) -> Result<Arc<ActiveConnection>> {
        let _guard = self.reconnect_lock.lock().await;
        if let Some(active) = self.active.load_full() {
            if !Arc::ptr_eq(&active, failed) {
                return Ok(active);
            }
        }
        self.active.store(None);
        self.connect_from(0).await
    }

    /// Caller holds `reconnect_lock`
    async fn connect_from(
        &self,
        start: usize,
    ) -> Result<Arc<ActiveConnection>> {
        let count = self.endpoints.len();
        for offset in 0..count {
            let index = (start + offset) % count;
            let endpoint = &self.endpoints[index];
            let label = endpoint.label();

            match self.open(endpoint, &label).await {
                Ok(conn) => {
                    let active = Arc::new(ActiveConnection { index, label, conn });
                    self.active.store(Some(active.clone()));
                    self.next_index.store(active.index, Ordering::Release);
                    info!(endpoint = %active.label, "Connected to store");
                    return Ok(active);
                }
                Err(e) => {
                    warn!(endpoint = %label, error = %e, "Failed to connect to store endpoint");
                }
            }
        }

        Err(StoreError::Connection { attempted: count }.into())
    }

    async fn open(
        &self,
        endpoint: &EndpointDescriptor,
        label: &str,
    ) -> Result<Arc<dyn KvConnection>> {
        let conn = self.bounded(label, self.connector.connect(endpoint)).await?;
        let status = self.bounded(label, conn.status()).await?;
        debug!(endpoint = %label, version = %status.version, "Status probe answered");
        Ok(conn)
    }

    async fn bounded<T>(
        &self,
        label: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| TransportError::Timeout {
                endpoint: label.to_string(),
                duration: self.request_timeout,
            })?
    }
}

fn unavailable(
    operation: &'static str,
    err: Error,
) -> Error {
    match err {
        Error::Store(StoreError::Transport(source)) => StoreError::Unavailable { operation, source }.into(),
        other => other,
    }
}
