use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tonic::async_trait;

use super::PushMessage;
use crate::PushError;
use crate::Result;

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A live duplex subscriber, as seen by the hub
#[async_trait]
pub trait PushConnection: Send + Sync + 'static {
    fn id(&self) -> ConnectionId;

    async fn send(
        &self,
        message: &PushMessage,
    ) -> Result<()>;
}

/// Queues JSON text frames for a transport writer task
pub struct OutboundConnection {
    id: ConnectionId,
    tx: mpsc::Sender<String>,
    send_timeout: Duration,
}

impl OutboundConnection {
    /// Returns the connection and the receiver its writer drains
    pub fn new(
        buffer: usize,
        send_timeout: Duration,
    ) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                id: next_connection_id(),
                tx,
                send_timeout,
            },
            rx,
        )
    }
}

#[async_trait]
impl PushConnection for OutboundConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(
        &self,
        message: &PushMessage,
    ) -> Result<()> {
        let text = serde_json::to_string(message).map_err(|e| PushError::Encode(e.to_string()))?;
        self.tx
            .send_timeout(text, self.send_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => PushError::SendTimeout {
                    id: self.id,
                    duration: self.send_timeout,
                },
                SendTimeoutError::Closed(_) => PushError::Closed(self.id),
            })?;
        Ok(())
    }
}
