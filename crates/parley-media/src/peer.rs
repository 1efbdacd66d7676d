use async_trait::async_trait;
use parley_shared::constants::{ANSWER_CANDIDATES, OFFER_CANDIDATES};
use parley_shared::{IceCandidate, SignalPayload};
use tokio::sync::mpsc;

use crate::devices::MediaStream;
use crate::error::PeerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Produces the offer.
    Initiator,
    /// Consumes the offer and produces the answer.
    Responder,
}

impl PeerRole {
    /// Call document field this side writes.
    pub fn signal_field(self) -> &'static str {
        match self {
            PeerRole::Initiator => "offer",
            PeerRole::Responder => "answer",
        }
    }

    /// Candidate sub-collection this side writes into. The other side
    /// watches it.
    pub fn candidate_collection(self) -> &'static str {
        match self {
            PeerRole::Initiator => OFFER_CANDIDATES,
            PeerRole::Responder => ANSWER_CANDIDATES,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            PeerRole::Initiator => PeerRole::Responder,
            PeerRole::Responder => PeerRole::Initiator,
        }
    }
}

/// Callbacks of a peer connection, delivered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A local session description to hand to the other side.
    Signal(SignalPayload),
    /// A locally discovered connectivity candidate.
    Candidate(IceCandidate),
    RemoteStream(MediaStream),
    Error(String),
    Closed,
}

pub type PeerEvents = mpsc::UnboundedReceiver<PeerEvent>;

/// A point-to-point media connection. Repeated delivery of an identical
/// signal must be harmless.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn apply_remote_signal(&self, payload: SignalPayload) -> Result<(), PeerError>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    /// Tear the connection down. Idempotent.
    fn destroy(&self);
}

/// Builds peer connections with the local stream attached.
pub trait PeerFactory: Send + Sync {
    fn create(
        &self,
        role: PeerRole,
        local: &MediaStream,
    ) -> Result<(Box<dyn PeerConnection>, PeerEvents), PeerError>;
}
