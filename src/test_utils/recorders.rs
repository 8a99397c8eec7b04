use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;
use tonic::async_trait;

use crate::next_connection_id;
use crate::ConnectionId;
use crate::PushConnection;
use crate::PushError;
use crate::PushMessage;
use crate::Result;
use crate::WatchCallback;
use crate::WatchEvent;

/// Watch callback that keeps every event it receives
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<WatchEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<WatchEvent> {
        self.events.lock().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.key().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl WatchCallback for Recorder {
    async fn on_event(
        &self,
        event: &WatchEvent,
    ) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Push connection that records sent messages and can be told to fail
pub struct RecordingConnection {
    id: ConnectionId,
    sent: Mutex<Vec<PushMessage>>,
    failing: AtomicBool,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self {
            id: next_connection_id(),
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let conn = Self::new();
        conn.set_failing(true);
        conn
    }

    pub fn set_failing(
        &self,
        failing: bool,
    ) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PushConnection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(
        &self,
        message: &PushMessage,
    ) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PushError::Closed(self.id).into());
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}
