use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReplicationConfig {
    /// How long a post-write check waits for each endpoint to converge
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Poll cadence per endpoint
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl ReplicationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "replication.interval_ms must be greater than 0".into(),
            ));
        }
        if self.interval_ms > self.timeout_ms {
            return Err(Error::InvalidConfig(format!(
                "replication.interval_ms ({}) exceeds timeout_ms ({})",
                self.interval_ms, self.timeout_ms
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_timeout_ms() -> u64 {
    5000
}
fn default_interval_ms() -> u64 {
    100
}
