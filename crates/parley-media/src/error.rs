use parley_shared::BlockedConversationError;
use parley_store::StoreError;
use thiserror::Error;

/// Local capture could not be started. The call attempt is aborted before
/// any peer connection exists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaAcquisitionError {
    #[error("Permission to use the capture device was denied")]
    PermissionDenied,

    #[error("No {0} device available")]
    NoDevice(&'static str),

    #[error("Capture device error: {0}")]
    Device(String),
}

/// A signal or candidate could not be written to the mailbox.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalRelayError {
    #[error("Mailbox write failed: {0}")]
    Store(#[from] StoreError),

    #[error("No call session bound yet")]
    Unbound,

    #[error("Call mailbox belongs to another session")]
    SessionGone,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("Peer connection error: {0}")]
    Connection(String),

    #[error("Unexpected signal: {0}")]
    InvalidSignal(String),

    #[error("Peer connection already destroyed")]
    Destroyed,
}

#[derive(Error, Debug)]
pub enum CallError {
    #[error(transparent)]
    Media(#[from] MediaAcquisitionError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Relay(#[from] SignalRelayError),

    #[error(transparent)]
    Blocked(#[from] BlockedConversationError),

    #[error("A call is already in progress")]
    AlreadyActive,

    #[error("No conversation open")]
    NoConversation,
}

impl From<StoreError> for CallError {
    fn from(e: StoreError) -> Self {
        CallError::Relay(SignalRelayError::Store(e))
    }
}
