use std::collections::HashSet;

use parley_shared::{CallDocument, CallSessionId, CandidateRecord, ChatId, IceCandidate, SignalPayload};
use tracing::debug;

use crate::peer::PeerRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    AcquiringMedia,
    /// Peer object built, local media attached.
    ConnectionCreated,
    /// Local description published, remote one not yet applied.
    SignalPending,
    /// Remote description applied.
    Negotiating,
    /// Remote media received.
    Connected,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    HangUp,
    PeerError(String),
    PeerClosed,
    /// A newer call attempt took over the conversation's mailbox.
    Superseded,
    /// The mailbox subscription stopped delivering.
    MailboxClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingAction {
    /// The responder adopts the session of the offer it is answering.
    Bind(CallSessionId),
    ApplyRemote(SignalPayload),
    End(EndReason),
}

/// Per-attempt signaling state of one side of a call.
///
/// Pure bookkeeping: the relay task feeds it mailbox snapshots and peer
/// callbacks and executes the actions it returns.
#[derive(Debug)]
pub struct CallSession {
    chat_id: ChatId,
    role: PeerRole,
    state: CallState,
    session_id: Option<CallSessionId>,
    /// Our session has been seen on the mailbox at least once.
    confirmed: bool,
    local_signal: Option<SignalPayload>,
    remote_signal: Option<SignalPayload>,
    seen_candidates: HashSet<String>,
}

impl CallSession {
    /// The initiator mints a fresh session id; the responder adopts the
    /// offer's.
    pub fn new(chat_id: ChatId, role: PeerRole) -> Self {
        let session_id = match role {
            PeerRole::Initiator => Some(CallSessionId::new()),
            PeerRole::Responder => None,
        };
        Self {
            chat_id,
            role,
            state: CallState::Idle,
            session_id,
            confirmed: false,
            local_signal: None,
            remote_signal: None,
            seen_candidates: HashSet::new(),
        }
    }

    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn session_id(&self) -> Option<CallSessionId> {
        self.session_id
    }

    pub fn is_ended(&self) -> bool {
        self.state == CallState::Ended
    }

    pub fn begin_acquire(&mut self) {
        if self.state == CallState::Idle {
            self.state = CallState::AcquiringMedia;
        }
    }

    /// Capture failed; nothing was created.
    pub fn media_failed(&mut self) {
        self.state = CallState::Idle;
    }

    pub fn connection_created(&mut self) {
        if self.state == CallState::AcquiringMedia {
            self.state = CallState::ConnectionCreated;
        }
    }

    /// Record a local description about to be published. Returns `true`
    /// when it is the first one, which the initiator writes as a whole new
    /// mailbox document.
    pub fn on_local_signal(&mut self, payload: SignalPayload) -> bool {
        let first = self.local_signal.is_none();
        self.local_signal = Some(payload);
        if self.state == CallState::ConnectionCreated {
            self.state = CallState::SignalPending;
        }
        debug!(chat = %self.chat_id, role = ?self.role, first, "Publishing local signal");
        first
    }

    /// Digest one mailbox snapshot.
    pub fn on_call_document(&mut self, doc: Option<&CallDocument>) -> Vec<SignalingAction> {
        if self.is_ended() {
            return Vec::new();
        }

        let Some(doc) = doc else {
            if self.confirmed {
                return vec![self.end_action(EndReason::Superseded)];
            }
            return Vec::new();
        };

        let mut actions = Vec::new();
        let bound = self.session_id;
        match bound {
            None => {
                // Only an offer nobody has answered yet starts a call.
                if self.role == PeerRole::Responder && doc.offer.is_some() && doc.answer.is_none() {
                    self.session_id = Some(doc.session_id);
                    actions.push(SignalingAction::Bind(doc.session_id));
                } else {
                    return actions;
                }
            }
            Some(ours) if ours != doc.session_id => {
                if self.confirmed {
                    return vec![self.end_action(EndReason::Superseded)];
                }
                // Left over from an earlier attempt; ours has not landed yet.
                return actions;
            }
            Some(_) => {}
        }
        self.confirmed = true;

        let remote = match self.role {
            PeerRole::Initiator => doc.answer.as_ref(),
            PeerRole::Responder => doc.offer.as_ref(),
        };
        if let Some(payload) = remote {
            if self.remote_signal.as_ref() != Some(payload) {
                self.remote_signal = Some(payload.clone());
                if matches!(
                    self.state,
                    CallState::ConnectionCreated | CallState::SignalPending
                ) {
                    self.state = CallState::Negotiating;
                }
                actions.push(SignalingAction::ApplyRemote(payload.clone()));
            }
        }
        actions
    }

    /// The candidate to hand to the peer, if `record_id` is new and belongs
    /// to the bound session.
    pub fn accept_candidate(
        &mut self,
        record_id: &str,
        record: &CandidateRecord,
    ) -> Option<IceCandidate> {
        if self.is_ended() || self.session_id != Some(record.session_id) {
            return None;
        }
        if !self.seen_candidates.insert(record_id.to_string()) {
            return None;
        }
        Some(record.candidate.clone())
    }

    pub fn on_remote_stream(&mut self) {
        if !self.is_ended() {
            self.state = CallState::Connected;
        }
    }

    /// Returns `false` if the call had already ended.
    pub fn end(&mut self) -> bool {
        if self.is_ended() {
            return false;
        }
        self.state = CallState::Ended;
        true
    }

    fn end_action(&self, reason: EndReason) -> SignalingAction {
        debug!(chat = %self.chat_id, ?reason, "Mailbox no longer ours");
        SignalingAction::End(reason)
    }
}
