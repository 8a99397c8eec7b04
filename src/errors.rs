//! Error hierarchy for the configuration propagation layer
//!
//! Errors are grouped by the layer that raises them: the backend store
//! gateway, the cluster observability path, settings loading and the
//! process-level plumbing around them.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backend store access failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Cluster observability and fault-injection failures
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Subscriber push connection failures
    #[error(transparent)]
    Push(#[from] PushError),

    /// Settings source could not be read or deserialized
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Settings loaded but violate a validation rule
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Infrastructure-level failures (I/O, tasks, signals)
    #[error(transparent)]
    System(#[from] SystemError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No endpoint accepted a connection during `connect`
    #[error("Failed to connect to any store endpoint ({attempted} tried)")]
    Connection { attempted: usize },

    /// I/O failure that survived one reconnect-and-retry
    #[error("Store unavailable during {operation}: {source}")]
    Unavailable {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    /// Stored payload is not a valid config entry
    #[error("Malformed entry at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Entry could not be serialized for writing
    #[error("Failed to encode entry for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Single transport-level failure, eligible for one retry
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Endpoint refused or dropped the connection
    #[error("Endpoint {0} is unreachable")]
    Unreachable(String),

    /// Call did not complete within its deadline
    #[error("Request to {endpoint} timed out after {duration:?}")]
    Timeout { endpoint: String, duration: Duration },

    /// Malformed endpoint address
    #[error("Invalid endpoint URI: {0}")]
    InvalidUri(String),

    /// Watch stream was cancelled by the backend
    #[error("Watch on {prefix} cancelled: {reason}")]
    WatchCancelled { prefix: String, reason: String },

    /// gRPC transport layer errors
    #[error(transparent)]
    Tonic(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    Status(#[from] Box<tonic::Status>),
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Every reachable member is already in the down-set
    #[error("No healthy members left to fail")]
    NoHealthyMembers,
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// Peer went away; the outbound queue is closed
    #[error("Push connection {0} is closed")]
    Closed(u64),

    /// Message could not be rendered as JSON
    #[error("Failed to encode push message: {0}")]
    Encode(String),

    /// Outbound queue stayed full past the send timeout
    #[error("Push connection {id} did not accept a message within {duration:?}")]
    SendTimeout { id: u64, duration: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSendFailed(String),

    #[error("Failed to bind HTTP listener on {address}: {reason}")]
    Bind { address: String, reason: String },
}

impl Error {
    /// Whether a retry on a fresh connection may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Store(StoreError::Transport(e)) if e.is_transient())
    }
}

impl TransportError {
    /// Statuses a different member may not return; application-level
    /// rejections surface as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::InvalidUri(_) => false,
            TransportError::Status(status) => matches!(
                status.code(),
                tonic::Code::Unavailable
                    | tonic::Code::DeadlineExceeded
                    | tonic::Code::Cancelled
                    | tonic::Code::Aborted
                    | tonic::Code::Unknown
            ),
            _ => true,
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Store(StoreError::Transport(e))
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        TransportError::Tonic(Box::new(err)).into()
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        TransportError::Status(Box::new(status)).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::System(SystemError::Io(err))
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(err))
    }
}
