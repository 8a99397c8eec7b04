//! Backend change notifications delivered to in-process callbacks.

mod dispatcher;
pub use dispatcher::*;


use tonic::async_trait;
use tracing::warn;

use crate::ConfigEntry;
use crate::RawEventKind;
use crate::RawWatchEvent;
use crate::Result;

/// One classified change under a watched prefix
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// `entry` is `None` when the stored payload could not be decoded
    Put {
        key: String,
        entry: Option<ConfigEntry>,
    },
    Delete {
        key: String,
    },
}

impl WatchEvent {
    pub fn key(&self) -> &str {
        match self {
            WatchEvent::Put { key, .. } | WatchEvent::Delete { key } => key,
        }
    }

    pub(crate) fn kind_label(&self) -> &'static str {
        match self {
            WatchEvent::Put { .. } => "put",
            WatchEvent::Delete { .. } => "delete",
        }
    }

    pub(crate) fn from_raw(raw: RawWatchEvent) -> Self {
        match raw.kind {
            RawEventKind::Delete => WatchEvent::Delete { key: raw.key },
            RawEventKind::Put => {
                let entry = match ConfigEntry::decode(&raw.key, &raw.value) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(key = %raw.key, error = %e, "Undecodable value in watch event");
                        None
                    }
                };
                WatchEvent::Put { key: raw.key, entry }
            }
        }
    }
}

/// Receives events for one watched prefix, on the dispatch task.
///
/// Errors are logged by the dispatcher and do not affect other callbacks.
#[async_trait]
pub trait WatchCallback: Send + Sync + 'static {
    async fn on_event(
        &self,
        event: &WatchEvent,
    ) -> Result<()>;
}

/// Adapts a plain closure into a [`WatchCallback`]
pub struct FnCallback<F>(pub F);

#[async_trait]
impl<F> WatchCallback for FnCallback<F>
where
    F: Fn(&WatchEvent) -> Result<()> + Send + Sync + 'static,
{
    async fn on_event(
        &self,
        event: &WatchEvent,
    ) -> Result<()> {
        (self.0)(event)
    }
}
