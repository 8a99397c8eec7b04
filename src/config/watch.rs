use serde::Deserialize;
use serde::Serialize;

use super::BackoffPolicy;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// Capacity of the queue between backend delivery and the dispatch task
    ///
    /// A full queue applies backpressure to the backend stream reader; no
    /// notification is dropped.
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,

    /// Re-establish a backend watch after its stream ends
    ///
    /// Off by default: a lost connection silently ends the watch.
    #[serde(default)]
    pub resubscribe_on_disconnect: bool,

    /// Backoff used while resubscribing
    #[serde(default = "default_resubscribe_policy")]
    pub resubscribe: BackoffPolicy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            event_queue_size: default_event_queue_size(),
            resubscribe_on_disconnect: false,
            resubscribe: default_resubscribe_policy(),
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.event_queue_size == 0 {
            return Err(Error::InvalidConfig(
                "watch.event_queue_size must be greater than 0".into(),
            ));
        }
        if self.resubscribe.base_delay_ms > self.resubscribe.max_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "watch.resubscribe.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.resubscribe.base_delay_ms, self.resubscribe.max_delay_ms
            )));
        }
        Ok(())
    }
}

fn default_event_queue_size() -> usize {
    1000
}
fn default_resubscribe_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        timeout_ms: 3000,
        base_delay_ms: 200,
        max_delay_ms: 10_000,
    }
}
