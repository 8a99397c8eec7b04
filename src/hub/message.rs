use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ConfigKey;
use crate::ConfigMetadata;
use crate::WatchEvent;

/// Frames exchanged on a push connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    Connected {
        namespace: String,
        environment: String,
        message: String,
    },
    ConfigChange {
        namespace: String,
        environment: String,
        key: String,
        value: Value,
        version: String,
        metadata: ConfigMetadata,
    },
    ConfigDelete {
        namespace: String,
        environment: String,
        key: String,
    },
    Ping,
    Pong,
}

impl PushMessage {
    /// A put with an undecodable value is announced as a delete, matching
    /// what readers observe.
    pub fn for_event(
        target: &ConfigKey,
        event: &WatchEvent,
    ) -> Self {
        match event {
            WatchEvent::Put {
                entry: Some(entry), ..
            } => PushMessage::ConfigChange {
                namespace: target.namespace.clone(),
                environment: target.environment.clone(),
                key: target.key.clone(),
                value: entry.value.clone(),
                version: entry.version.clone(),
                metadata: entry.metadata.clone(),
            },
            WatchEvent::Put { entry: None, .. } | WatchEvent::Delete { .. } => PushMessage::ConfigDelete {
                namespace: target.namespace.clone(),
                environment: target.environment.clone(),
                key: target.key.clone(),
            },
        }
    }
}
