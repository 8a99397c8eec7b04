//! Settings for the configuration propagation service.
//!
//! Sources are layered, lowest priority first:
//! 1. Default values (hardcoded)
//! 2. `config/default.toml` (optional)
//! 3. File named by `CONFIG_PATH` (optional) or an explicit override path
//! 4. `ETCD_ENDPOINTS` comma-separated endpoint list
//! 5. `CONFWATCH__SECTION__FIELD` environment variables (highest priority)

mod cluster;
mod hub;
mod replication;
mod retry;
mod server;
mod store;
mod watch;
pub use cluster::*;
pub use hub::*;
pub use replication::*;
pub use retry::*;
pub use server::*;
pub use store::*;
pub use watch::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

pub(crate) const ENV_PREFIX: &str = "CONFWATCH";
pub(crate) const ENDPOINTS_ENV: &str = "ETCD_ENDPOINTS";
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Backend store endpoints and call deadlines
    #[serde(default)]
    pub store: StoreConfig,
    /// Watch dispatch queueing and resubscription
    #[serde(default)]
    pub watch: WatchConfig,
    /// Push connection fan-out
    #[serde(default)]
    pub hub: HubConfig,
    /// Cluster health probing
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Post-write convergence polling
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// HTTP listener and log output
    #[serde(default)]
    pub server: ServerConfig,
}

impl Settings {
    /// Load settings from every source, applying `override_path` (when given)
    /// after `CONFIG_PATH`.
    pub fn load(override_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false));

        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        if let Some(path) = override_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        if let Ok(raw) = env::var(ENDPOINTS_ENV) {
            let endpoints = split_endpoints(&raw);
            if !endpoints.is_empty() {
                builder = builder.set_override("store.endpoints", endpoints)?;
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.watch.validate()?;
        self.hub.validate()?;
        self.cluster.validate()?;
        self.replication.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

pub(crate) fn split_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
