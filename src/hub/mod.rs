//! Push fan-out to subscribers of a `(namespace, environment)` channel.

mod connection;
mod message;
pub use connection::*;
pub use message::*;


use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tonic::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::metrics::BROADCAST_FAILURES;
use crate::ConfigKey;
use crate::Result;
use crate::WatchCallback;
use crate::WatchEvent;
use crate::CONNECTED_GREETING;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub namespace: String,
    pub environment: String,
}

impl ChannelKey {
    pub fn new(
        namespace: &str,
        environment: &str,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            environment: environment.to_string(),
        }
    }
}

#[derive(Default)]
struct HubState {
    channels: HashMap<ChannelKey, HashMap<ConnectionId, Arc<dyn PushConnection>>>,
    /// Reverse index used to detach a connection from every channel
    memberships: HashMap<ConnectionId, HashSet<ChannelKey>>,
}

/// Owns channel membership. The table lock is never held while sending.
#[derive(Default)]
pub struct BroadcastHub {
    state: Mutex<HubState>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `conn` to a channel and greet it. Re-attaching a connection
    /// already in the channel does nothing.
    pub async fn connect(
        &self,
        conn: Arc<dyn PushConnection>,
        namespace: &str,
        environment: &str,
    ) -> Result<()> {
        let id = conn.id();
        let key = ChannelKey::new(namespace, environment);

        let total_connections = {
            let mut state = self.state.lock();
            let channel = state.channels.entry(key.clone()).or_default();
            if channel.contains_key(&id) {
                debug!(connection = id, namespace, environment, "Connection already subscribed");
                return Ok(());
            }
            channel.insert(id, conn.clone());
            let total = channel.len();
            state.memberships.entry(id).or_default().insert(key);
            total
        };
        info!(namespace, environment, total_connections, "Push client connected");

        let greeting = PushMessage::Connected {
            namespace: namespace.to_string(),
            environment: environment.to_string(),
            message: CONNECTED_GREETING.to_string(),
        };
        if let Err(e) = conn.send(&greeting).await {
            self.disconnect(id);
            return Err(e);
        }
        Ok(())
    }

    /// Detach a connection from every channel, dropping channels left empty.
    /// Returns whether the connection was known.
    pub fn disconnect(
        &self,
        id: ConnectionId,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(keys) = state.memberships.remove(&id) else {
            return false;
        };
        for key in keys {
            if let Some(channel) = state.channels.get_mut(&key) {
                channel.remove(&id);
                if channel.is_empty() {
                    state.channels.remove(&key);
                }
            }
        }
        info!(connection = id, "Push client disconnected");
        true
    }

    /// Send `message` to every connection in the channel concurrently.
    /// Connections whose send fails are disconnected after the pass.
    /// Returns the number of successful deliveries.
    pub async fn broadcast(
        &self,
        namespace: &str,
        environment: &str,
        message: &PushMessage,
    ) -> usize {
        let key = ChannelKey::new(namespace, environment);
        let targets: Vec<Arc<dyn PushConnection>> = self
            .state
            .lock()
            .channels
            .get(&key)
            .map(|channel| channel.values().cloned().collect())
            .unwrap_or_default();
        if targets.is_empty() {
            return 0;
        }

        let results = join_all(targets.iter().map(|conn| conn.send(message))).await;

        let mut delivered = 0;
        for (conn, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    BROADCAST_FAILURES.inc();
                    warn!(
                        connection = conn.id(),
                        namespace,
                        environment,
                        error = %e,
                        "Failed to send to push client"
                    );
                    self.disconnect(conn.id());
                }
            }
        }
        debug!(namespace, environment, delivered, "Broadcast complete");
        delivered
    }

    /// Reply for an inbound client frame: `ping` gets `pong`, anything else
    /// is ignored.
    pub fn handle_inbound(text: &str) -> Option<PushMessage> {
        let frame: serde_json::Value = serde_json::from_str(text).ok()?;
        match frame.get("type").and_then(|t| t.as_str()) {
            Some("ping") => Some(PushMessage::Pong),
            _ => None,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    pub fn connection_count(
        &self,
        namespace: &str,
        environment: &str,
    ) -> usize {
        self.state
            .lock()
            .channels
            .get(&ChannelKey::new(namespace, environment))
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl WatchCallback for BroadcastHub {
    async fn on_event(
        &self,
        event: &WatchEvent,
    ) -> Result<()> {
        let Some(target) = ConfigKey::parse(event.key()) else {
            return Ok(());
        };
        let message = PushMessage::for_event(&target, event);
        self.broadcast(&target.namespace, &target.environment, &message)
            .await;
        Ok(())
    }
}
