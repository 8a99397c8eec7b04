use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HubConfig {
    /// Outbound message buffer per push connection
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// How long a broadcast waits on one slow connection before dropping it
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.outbound_buffer == 0 {
            return Err(Error::InvalidConfig(
                "hub.outbound_buffer must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

fn default_outbound_buffer() -> usize {
    64
}
fn default_send_timeout_ms() -> u64 {
    1000
}
