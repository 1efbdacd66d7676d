//! Store-backed signaling relay.
//!
//! Mailbox layout for conversation `c`:
//!
//! - `calls/c`: `{sessionId, video, offer?, answer?}`
//! - `calls/c/offerCandidates/*`: written by the initiator
//! - `calls/c/answerCandidates/*`: written by the responder
//!
//! Each call attempt runs in its own tokio task owning the peer connection
//! and the local capture. Both are released on every exit path, including
//! the task being dropped.

use std::sync::Arc;

use parley_shared::{paths, CallDocument, CallSessionId, CandidateRecord, ChatId, IceCandidate, SignalPayload};
use parley_store::{
    from_document, to_document, CollectionPath, CollectionSnapshot, DocPath, Document,
    DocumentStore, FieldMerge, Snapshot, Subscription,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::devices::{MediaConstraints, MediaDevices, MediaStream};
use crate::error::{CallError, SignalRelayError};
use crate::peer::{PeerConnection, PeerEvent, PeerEvents, PeerFactory, PeerRole};
use crate::signaling::{CallSession, CallState, EndReason, SignalingAction};

/// Observable state of one call attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatus {
    pub state: CallState,
    pub session_id: Option<CallSessionId>,
    pub remote_stream: Option<MediaStream>,
    pub end_reason: Option<EndReason>,
}

impl CallStatus {
    fn from_session(session: &CallSession) -> Self {
        Self {
            state: session.state(),
            session_id: session.session_id(),
            remote_stream: None,
            end_reason: None,
        }
    }
}

/// Starts and answers calls over a [`DocumentStore`] mailbox.
#[derive(Clone)]
pub struct CallRelay {
    store: Arc<dyn DocumentStore>,
    devices: Arc<dyn MediaDevices>,
    peers: Arc<dyn PeerFactory>,
}

impl CallRelay {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        devices: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerFactory>,
    ) -> Self {
        Self {
            store,
            devices,
            peers,
        }
    }

    /// Capture local media, create an offering peer and publish its offer
    /// under a freshly minted session.
    pub async fn start_call(&self, chat_id: ChatId, video: bool) -> Result<CallHandle, CallError> {
        self.launch(chat_id, PeerRole::Initiator, video).await
    }

    /// Capture local media and answer the pending offer of `chat_id` as
    /// soon as the mailbox shows one.
    pub async fn answer_call(&self, chat_id: ChatId, video: bool) -> Result<CallHandle, CallError> {
        self.launch(chat_id, PeerRole::Responder, video).await
    }

    async fn launch(
        &self,
        chat_id: ChatId,
        role: PeerRole,
        video: bool,
    ) -> Result<CallHandle, CallError> {
        let call_doc = DocPath::parse(paths::call(&chat_id))?;
        let own_candidates = call_doc.collection(role.candidate_collection())?;
        let remote_candidates = call_doc.collection(role.opposite().candidate_collection())?;

        let mut session = CallSession::new(chat_id.clone(), role);
        session.begin_acquire();
        info!(chat = %chat_id, ?role, video, "Acquiring local media");

        let stream = match self.devices.acquire(MediaConstraints::call(video)).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(chat = %chat_id, error = %e, "Media acquisition failed, aborting call");
                session.media_failed();
                return Err(e.into());
            }
        };

        let (peer, events) = match self.peers.create(role, &stream) {
            Ok(created) => created,
            Err(e) => {
                self.devices.release(&stream);
                return Err(e.into());
            }
        };
        let resources = CallResources {
            peer,
            stream,
            devices: self.devices.clone(),
            released: false,
        };
        session.connection_created();

        if role == PeerRole::Initiator {
            self.clear_previous_attempt(&own_candidates, &remote_candidates)
                .await;
        }

        let doc_sub = self.store.watch(&call_doc)?;
        let candidate_sub = match role {
            PeerRole::Initiator => Some(self.store.watch_collection(&remote_candidates)?),
            // Bound once the offer (and with it the session) is known.
            PeerRole::Responder => None,
        };

        let (status_tx, status_rx) = watch::channel(CallStatus::from_session(&session));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = CallTask {
            store: self.store.clone(),
            session,
            resources,
            events,
            doc_sub,
            candidate_sub,
            status: status_tx,
            call_doc,
            own_candidates,
            remote_candidates,
            video,
            pending_candidates: Vec::new(),
        };
        let join = tokio::spawn(task.run(shutdown_rx));

        Ok(CallHandle {
            chat_id,
            role,
            status: status_rx,
            shutdown: Some(shutdown_tx),
            task: Some(join),
        })
    }

    /// Remove candidates left in the mailbox by an earlier attempt. The
    /// stale call document itself is overwritten by the new offer.
    async fn clear_previous_attempt(&self, own: &CollectionPath, remote: &CollectionPath) {
        for collection in [own, remote] {
            match self.store.delete_collection(collection).await {
                Ok(0) => {}
                Ok(removed) => debug!(collection = %collection, removed, "Cleared stale candidates"),
                Err(e) => warn!(collection = %collection, error = %e, "Failed to clear stale candidates"),
            }
        }
    }
}

/// Peer connection and capture of one attempt. Released exactly once.
struct CallResources {
    peer: Box<dyn PeerConnection>,
    stream: MediaStream,
    devices: Arc<dyn MediaDevices>,
    released: bool,
}

impl CallResources {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.peer.destroy();
        self.devices.release(&self.stream);
    }
}

impl Drop for CallResources {
    fn drop(&mut self) {
        self.release();
    }
}

struct CallTask {
    store: Arc<dyn DocumentStore>,
    session: CallSession,
    resources: CallResources,
    events: PeerEvents,
    doc_sub: Subscription<Snapshot>,
    candidate_sub: Option<Subscription<CollectionSnapshot>>,
    status: watch::Sender<CallStatus>,
    call_doc: DocPath,
    own_candidates: CollectionPath,
    remote_candidates: CollectionPath,
    video: bool,
    /// Local candidates produced before the responder knows its session.
    pending_candidates: Vec<IceCandidate>,
}

async fn next_batch(
    sub: &mut Option<Subscription<CollectionSnapshot>>,
) -> Option<CollectionSnapshot> {
    match sub {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

/// Merges writing one signal into the mailbox, or none when the mailbox
/// no longer belongs to `session_id`.
fn signal_merges(
    doc: &Document,
    session_id: CallSessionId,
    field: &str,
    value: &serde_json::Value,
) -> parley_store::Result<Vec<FieldMerge>> {
    let current: CallDocument = from_document(doc)?;
    if current.session_id != session_id {
        return Ok(Vec::new());
    }
    Ok(vec![FieldMerge::set(field, value.clone())])
}

impl CallTask {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let reason = loop {
            tokio::select! {
                // Fires on hang-up and when the handle is dropped.
                _ = &mut shutdown => break EndReason::HangUp,
                event = self.events.recv() => match event {
                    Some(event) => {
                        if let Some(reason) = self.on_peer_event(event).await {
                            break reason;
                        }
                    }
                    None => break EndReason::PeerClosed,
                },
                snapshot = self.doc_sub.recv() => match snapshot {
                    Some(snapshot) => {
                        if let Some(reason) = self.on_mailbox(snapshot).await {
                            break reason;
                        }
                    }
                    None => break EndReason::MailboxClosed,
                },
                batch = next_batch(&mut self.candidate_sub) => match batch {
                    Some(batch) => self.on_remote_candidates(batch).await,
                    None => break EndReason::MailboxClosed,
                },
            }
        };
        self.finish(reason);
    }

    fn publish_status(&self) {
        let state = self.session.state();
        let session_id = self.session.session_id();
        self.status.send_modify(|status| {
            status.state = state;
            status.session_id = session_id;
        });
    }

    async fn on_peer_event(&mut self, event: PeerEvent) -> Option<EndReason> {
        match event {
            PeerEvent::Signal(payload) => {
                match self.publish_signal(payload).await {
                    Ok(()) => {}
                    Err(SignalRelayError::SessionGone) => {
                        info!(chat = %self.session.chat_id(), "Mailbox taken by a newer attempt");
                        return Some(EndReason::Superseded);
                    }
                    Err(e) => {
                        warn!(chat = %self.session.chat_id(), error = %e, "Failed to relay local signal");
                    }
                }
                self.publish_status();
                None
            }
            PeerEvent::Candidate(candidate) => {
                if self.session.session_id().is_none() {
                    self.pending_candidates.push(candidate);
                } else if let Err(e) = self.publish_candidate(candidate).await {
                    warn!(chat = %self.session.chat_id(), error = %e, "Failed to relay candidate");
                }
                None
            }
            PeerEvent::RemoteStream(stream) => {
                info!(chat = %self.session.chat_id(), stream = %stream.id, "Remote stream received");
                self.session.on_remote_stream();
                self.status.send_modify(|status| status.remote_stream = Some(stream));
                self.publish_status();
                None
            }
            PeerEvent::Error(message) => {
                error!(chat = %self.session.chat_id(), error = %message, "Peer connection error");
                Some(EndReason::PeerError(message))
            }
            PeerEvent::Closed => Some(EndReason::PeerClosed),
        }
    }

    async fn publish_signal(&mut self, payload: SignalPayload) -> Result<(), SignalRelayError> {
        let session_id = self.session.session_id().ok_or(SignalRelayError::Unbound)?;
        let first = self.session.on_local_signal(payload.clone());
        let role = self.session.role();

        if role == PeerRole::Initiator && first {
            let doc = CallDocument {
                session_id,
                video: self.video,
                offer: Some(payload),
                answer: None,
            };
            self.store.set(&self.call_doc, to_document(&doc)?).await?;
        } else {
            let value = serde_json::to_value(&payload)
                .map_err(|e| SignalRelayError::Store(e.into()))?;
            let field = role.signal_field();
            let written = self
                .store
                .transact(&self.call_doc, &move |doc: &Document| {
                    signal_merges(doc, session_id, field, &value)
                })
                .await?;
            if !written {
                return Err(SignalRelayError::SessionGone);
            }
        }
        Ok(())
    }

    async fn publish_candidate(&self, candidate: IceCandidate) -> Result<(), SignalRelayError> {
        let session_id = self.session.session_id().ok_or(SignalRelayError::Unbound)?;
        let record = CandidateRecord {
            session_id,
            candidate,
        };
        self.store
            .add(&self.own_candidates, to_document(&record)?)
            .await?;
        Ok(())
    }

    async fn on_mailbox(&mut self, snapshot: Snapshot) -> Option<EndReason> {
        let doc = match snapshot.decode::<CallDocument>() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %snapshot.path, error = %e, "Ignoring malformed call document");
                return None;
            }
        };

        for action in self.session.on_call_document(doc.as_ref()) {
            match action {
                SignalingAction::Bind(session_id) => {
                    debug!(chat = %self.session.chat_id(), session = %session_id, "Bound to offer");
                    match self.store.watch_collection(&self.remote_candidates) {
                        Ok(sub) => self.candidate_sub = Some(sub),
                        Err(e) => {
                            error!(error = %e, "Cannot watch remote candidates");
                            return Some(EndReason::MailboxClosed);
                        }
                    }
                    for candidate in std::mem::take(&mut self.pending_candidates) {
                        if let Err(e) = self.publish_candidate(candidate).await {
                            warn!(error = %e, "Failed to relay buffered candidate");
                        }
                    }
                }
                SignalingAction::ApplyRemote(payload) => {
                    if let Err(e) = self.resources.peer.apply_remote_signal(payload).await {
                        error!(chat = %self.session.chat_id(), error = %e, "Remote signal rejected");
                        return Some(EndReason::PeerError(e.to_string()));
                    }
                }
                SignalingAction::End(reason) => return Some(reason),
            }
        }
        self.publish_status();
        None
    }

    async fn on_remote_candidates(&mut self, batch: CollectionSnapshot) {
        for change in batch.added() {
            let record: CandidateRecord = match from_document(&change.data) {
                Ok(record) => record,
                Err(e) => {
                    warn!(id = %change.id, error = %e, "Ignoring malformed candidate");
                    continue;
                }
            };
            if let Some(candidate) = self.session.accept_candidate(&change.id, &record) {
                if let Err(e) = self.resources.peer.add_remote_candidate(candidate).await {
                    warn!(id = %change.id, error = %e, "Remote candidate rejected");
                }
            }
        }
    }

    fn finish(mut self, reason: EndReason) {
        self.session.end();
        self.resources.release();
        self.candidate_sub = None;
        info!(chat = %self.session.chat_id(), ?reason, "Call ended");
        self.status.send_modify(|status| {
            status.state = CallState::Ended;
            status.end_reason = Some(reason);
        });
    }
}

/// Owner of a running call attempt.
///
/// Dropping the handle ends the call; [`CallHandle::hang_up`] additionally
/// waits until the peer connection is destroyed and capture released.
pub struct CallHandle {
    chat_id: ChatId,
    role: PeerRole,
    status: watch::Receiver<CallStatus>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallHandle {
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn status(&self) -> CallStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> CallState {
        self.status.borrow().state
    }

    pub fn is_active(&self) -> bool {
        self.state() != CallState::Ended
    }

    /// A receiver notified on every status change.
    pub fn watch(&self) -> watch::Receiver<CallStatus> {
        self.status.clone()
    }

    /// Wait until `predicate` holds for the status, returning that status.
    /// `None` if the call task is gone without it ever holding.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&CallStatus) -> bool) -> Option<CallStatus> {
        self.status.wait_for(predicate).await.ok().map(|status| (*status).clone())
    }

    pub async fn hang_up(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(chat = %self.chat_id, error = %e, "Call task did not finish cleanly");
            }
        }
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
