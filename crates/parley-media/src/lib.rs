//! Call signaling for one-to-one audio/video calls.
//!
//! There is no signaling server: the conversation's call document in the
//! document store is the mailbox. Each side writes its session description
//! into the field named for its role and its connectivity candidates into
//! its own sub-collection, and watches the other side's.

pub mod devices;
pub mod error;
pub mod loopback;
pub mod peer;
pub mod relay;
pub mod signaling;

pub use devices::{MediaConstraints, MediaDevices, MediaStream};
pub use error::{CallError, MediaAcquisitionError, PeerError, SignalRelayError};
pub use loopback::{LoopbackDevices, LoopbackPeerFactory, LoopbackProbe};
pub use peer::{PeerConnection, PeerEvent, PeerEvents, PeerFactory, PeerRole};
pub use relay::{CallHandle, CallRelay, CallStatus};
pub use signaling::{CallSession, CallState, EndReason, SignalingAction};
