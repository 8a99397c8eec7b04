use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::EndpointDescriptor;
use crate::Error;
use crate::Result;

/// Which backend adapter the service talks to
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// etcd v3 gRPC API
    #[default]
    Grpc,
    /// In-process simulated cluster, for local runs
    Memory,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Backend endpoints, `host`, `host:port` or `http://host:port`
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub backend: StoreBackend,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Deadline for a single unary backend call in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            backend: StoreBackend::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration
    /// # Errors
    /// Returns `Error::InvalidConfig` if no endpoint is configured, an endpoint
    /// cannot be parsed, or a timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::InvalidConfig(
                "store.endpoints must contain at least one endpoint".into(),
            ));
        }

        for endpoint in &self.endpoints {
            EndpointDescriptor::parse(endpoint)
                .map_err(|e| Error::InvalidConfig(format!("store.endpoints: {}", e)))?;
        }

        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "store timeouts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Parsed endpoint descriptors, in configured order
    pub fn descriptors(&self) -> Result<Vec<EndpointDescriptor>> {
        self.endpoints
            .iter()
            .map(|e| EndpointDescriptor::parse(e))
            .collect()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["localhost:2379".to_string()]
}
fn default_connect_timeout_ms() -> u64 {
    1000
}
fn default_request_timeout_ms() -> u64 {
    3000
}
