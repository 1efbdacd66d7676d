//! In-process media capability for tests and the demo.
//!
//! Capture produces stream handles without touching hardware. Peers follow
//! the usual negotiation shape: the initiator emits an offer and one
//! candidate as soon as it exists, the responder answers an applied offer,
//! and both report a remote stream once the remote description is in.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use parley_shared::{IceCandidate, SdpType, SignalPayload};
use tokio::sync::mpsc;
use tracing::debug;

use crate::devices::{MediaConstraints, MediaDevices, MediaStream};
use crate::error::{MediaAcquisitionError, PeerError};
use crate::peer::{PeerConnection, PeerEvent, PeerEvents, PeerFactory, PeerRole};

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct LoopbackDevices {
    deny: AtomicBool,
    next_id: AtomicUsize,
    active: Mutex<HashSet<String>>,
}

impl LoopbackDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `acquire` fail as if the user refused permission.
    pub fn set_deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Streams acquired and not yet released.
    pub fn active_captures(&self) -> usize {
        self.active.lock().map(|a| a.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MediaDevices for LoopbackDevices {
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, MediaAcquisitionError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(MediaAcquisitionError::PermissionDenied);
        }
        if !constraints.audio && !constraints.video {
            return Err(MediaAcquisitionError::Device("no track requested".into()));
        }

        let id = format!("local-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.active
            .lock()
            .map_err(|e| MediaAcquisitionError::Device(e.to_string()))?
            .insert(id.clone());
        debug!(stream = %id, video = constraints.video, "Capture started");

        Ok(MediaStream {
            id,
            audio: constraints.audio,
            video: constraints.video,
        })
    }

    fn release(&self, stream: &MediaStream) {
        if let Ok(mut active) = self.active.lock() {
            if active.remove(&stream.id) {
                debug!(stream = %stream.id, "Capture stopped");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Peers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PeerStats {
    applied_signals: AtomicUsize,
    added_candidates: AtomicUsize,
    destroyed: AtomicBool,
}

/// Test-side view of one loopback peer.
#[derive(Clone)]
pub struct LoopbackProbe {
    role: PeerRole,
    stats: Arc<PeerStats>,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl LoopbackProbe {
    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn applied_signals(&self) -> usize {
        self.stats.applied_signals.load(Ordering::SeqCst)
    }

    pub fn added_candidates(&self) -> usize {
        self.stats.added_candidates.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.stats.destroyed.load(Ordering::SeqCst)
    }

    /// Report a connection failure as the peer object would.
    pub fn inject_error(&self, message: &str) {
        let _ = self.events.send(PeerEvent::Error(message.to_string()));
    }
}

struct LoopbackPeer {
    role: PeerRole,
    local: MediaStream,
    stats: Arc<PeerStats>,
    events: mpsc::UnboundedSender<PeerEvent>,
}

impl LoopbackPeer {
    fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    fn host_candidate(&self) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{} 1 udp 2122260223 127.0.0.1 9 typ host", self.local.id),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }
    }

    fn remote_stream(&self) -> MediaStream {
        MediaStream {
            id: format!("remote-of-{}", self.local.id),
            audio: true,
            video: self.local.video,
        }
    }
}

#[async_trait]
impl PeerConnection for LoopbackPeer {
    async fn apply_remote_signal(&self, payload: SignalPayload) -> Result<(), PeerError> {
        if self.stats.destroyed.load(Ordering::SeqCst) {
            return Err(PeerError::Destroyed);
        }
        self.stats.applied_signals.fetch_add(1, Ordering::SeqCst);

        match (self.role, payload.sdp_type) {
            (PeerRole::Responder, SdpType::Offer) => {
                self.emit(PeerEvent::Signal(SignalPayload::answer(format!(
                    "v=0 answer from {}",
                    self.local.id
                ))));
                self.emit(PeerEvent::Candidate(self.host_candidate()));
                self.emit(PeerEvent::RemoteStream(self.remote_stream()));
                Ok(())
            }
            (PeerRole::Initiator, SdpType::Answer) => {
                self.emit(PeerEvent::RemoteStream(self.remote_stream()));
                Ok(())
            }
            (role, other) => Err(PeerError::InvalidSignal(format!(
                "{role:?} cannot apply {other:?}"
            ))),
        }
    }

    async fn add_remote_candidate(&self, _candidate: IceCandidate) -> Result<(), PeerError> {
        if self.stats.destroyed.load(Ordering::SeqCst) {
            return Err(PeerError::Destroyed);
        }
        self.stats.added_candidates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self) {
        self.stats.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Builds [`LoopbackPeer`]s and keeps a probe for each.
#[derive(Default)]
pub struct LoopbackPeerFactory {
    probes: Mutex<Vec<LoopbackProbe>>,
}

impl LoopbackPeerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes of every peer created so far, oldest first.
    pub fn probes(&self) -> Vec<LoopbackProbe> {
        self.probes.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<LoopbackProbe> {
        self.probes().pop()
    }
}

impl PeerFactory for LoopbackPeerFactory {
    fn create(
        &self,
        role: PeerRole,
        local: &MediaStream,
    ) -> Result<(Box<dyn PeerConnection>, PeerEvents), PeerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(PeerStats::default());
        let peer = LoopbackPeer {
            role,
            local: local.clone(),
            stats: stats.clone(),
            events: tx.clone(),
        };

        if role == PeerRole::Initiator {
            peer.emit(PeerEvent::Signal(SignalPayload::offer(format!(
                "v=0 offer from {}",
                local.id
            ))));
            peer.emit(PeerEvent::Candidate(peer.host_candidate()));
        }

        self.probes
            .lock()
            .map_err(|e| PeerError::Connection(e.to_string()))?
            .push(LoopbackProbe {
                role,
                stats,
                events: tx,
            });

        Ok((Box::new(peer), rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_denied_capture() {
        let devices = LoopbackDevices::new();
        devices.set_deny(true);
        let err = devices.acquire(MediaConstraints::call(false)).await.unwrap_err();
        assert_eq!(err, MediaAcquisitionError::PermissionDenied);
        assert_eq!(devices.active_captures(), 0);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let devices = LoopbackDevices::new();
        let stream = devices.acquire(MediaConstraints::call(true)).await.unwrap();
        assert_eq!(devices.active_captures(), 1);
        devices.release(&stream);
        devices.release(&stream);
        assert_eq!(devices.active_captures(), 0);
    }

    #[tokio::test]
    async fn test_responder_answers_offer() {
        let factory = LoopbackPeerFactory::new();
        let local = MediaStream {
            id: "local-0".into(),
            audio: true,
            video: false,
        };
        let (peer, mut events) = factory.create(PeerRole::Responder, &local).unwrap();
        peer.apply_remote_signal(SignalPayload::offer("v=0")).await.unwrap();

        match events.recv().await {
            Some(PeerEvent::Signal(payload)) => assert_eq!(payload.sdp_type, SdpType::Answer),
            other => panic!("expected answer, got {other:?}"),
        }
        assert!(matches!(events.recv().await, Some(PeerEvent::Candidate(_))));
        assert!(matches!(events.recv().await, Some(PeerEvent::RemoteStream(_))));

        let probe = factory.last().unwrap();
        assert_eq!(probe.applied_signals(), 1);
        peer.destroy();
        assert!(probe.is_destroyed());
        assert_eq!(
            peer.apply_remote_signal(SignalPayload::offer("v=0")).await,
            Err(PeerError::Destroyed)
        );
    }
}
