use parley_media::{CallError, CallState, PeerRole};
use tracing::info;

use crate::events::CallStatePayload;
use crate::state::ChatView;

impl ChatView {
    /// Call the receiver of the open conversation.
    pub async fn start_call(&mut self) -> Result<CallStatePayload, CallError> {
        self.launch_call(PeerRole::Initiator).await
    }

    /// Answer the pending offer of the open conversation.
    pub async fn answer_call(&mut self) -> Result<CallStatePayload, CallError> {
        self.launch_call(PeerRole::Responder).await
    }

    async fn launch_call(&mut self, role: PeerRole) -> Result<CallStatePayload, CallError> {
        if self.call.as_ref().is_some_and(|c| c.is_active()) {
            return Err(CallError::AlreadyActive);
        }
        let (chat_id, receiver) = match (self.chat_id(), self.receiver()) {
            (Some(chat_id), Some(receiver)) => (chat_id.clone(), receiver.clone()),
            _ => return Err(CallError::NoConversation),
        };
        self.block_status().ensure_open(&receiver)?;

        // A finished call still held here is dropped before the next one.
        self.call = None;

        let video = self.app.config.call_video;
        let handle = match role {
            PeerRole::Initiator => self.app.calls.start_call(chat_id, video).await?,
            PeerRole::Responder => self.app.calls.answer_call(chat_id, video).await?,
        };
        self.call = Some(handle);
        Ok(self.call_state())
    }

    /// Hang up the current call, waiting until its connection and capture
    /// are released. Does nothing when no call is active. Returns whether a
    /// call was ended.
    pub async fn end_call(&mut self) -> bool {
        match self.call.take() {
            Some(handle) => {
                let was_active = handle.is_active();
                handle.hang_up().await;
                if was_active {
                    info!("Call ended by user");
                }
                was_active
            }
            None => false,
        }
    }

    pub fn call_state(&self) -> CallStatePayload {
        match &self.call {
            Some(handle) => {
                let status = handle.status();
                CallStatePayload {
                    in_call: status.state != CallState::Ended,
                    state: format!("{:?}", status.state),
                    has_remote_stream: status.remote_stream.is_some(),
                }
            }
            None => CallStatePayload {
                in_call: false,
                state: format!("{:?}", CallState::Idle),
                has_remote_stream: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parley_media::{LoopbackDevices, LoopbackPeerFactory};
    use parley_shared::{ChatDocument, ChatId, UserId, UserProfile};
    use parley_store::{to_document, DocPath, DocumentStore, MemoryStore};
    use tokio::time::timeout;

    use crate::config::ClientConfig;
    use crate::error::SendError;
    use crate::state::AppState;

    use super::*;

    struct Side {
        view: ChatView,
        devices: Arc<LoopbackDevices>,
        peers: Arc<LoopbackPeerFactory>,
    }

    async fn side(store: &MemoryStore, me: &str, other: &str) -> Side {
        let devices = Arc::new(LoopbackDevices::new());
        let peers = Arc::new(LoopbackPeerFactory::new());
        let app = AppState::new(
            Arc::new(store.clone()),
            devices.clone(),
            peers.clone(),
            ClientConfig::default(),
        );
        let mut view = ChatView::new(app, UserId::new(me));
        view.open(ChatId::new("c1"), UserId::new(other)).await.unwrap();
        Side {
            view,
            devices,
            peers,
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set(
                &DocPath::parse("chats/c1").unwrap(),
                to_document(&ChatDocument::default()).unwrap(),
            )
            .await
            .unwrap();
        store
    }

    async fn wait_connected(view: &mut ChatView) {
        let handle = view.call_mut().unwrap();
        timeout(
            Duration::from_secs(2),
            handle.wait_for(|s| s.state == CallState::Connected),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_call_between_views() {
        let store = seeded().await;
        let mut alice = side(&store, "alice", "bob").await;
        let mut bob = side(&store, "bob", "alice").await;

        let started = alice.view.start_call().await.unwrap();
        assert!(started.in_call);
        assert!(matches!(
            alice.view.start_call().await,
            Err(CallError::AlreadyActive)
        ));

        // Wait for the offer before answering.
        let call_doc = DocPath::parse("calls/c1").unwrap();
        let mut mailbox = store.watch(&call_doc).unwrap();
        timeout(Duration::from_secs(2), async {
            while let Some(snapshot) = mailbox.recv().await {
                if snapshot.exists() {
                    break;
                }
            }
        })
        .await
        .unwrap();

        bob.view.answer_call().await.unwrap();
        wait_connected(&mut bob.view).await;
        wait_connected(&mut alice.view).await;
        assert!(alice.view.call_state().has_remote_stream);

        assert!(alice.view.end_call().await);
        assert!(bob.view.end_call().await);
        assert!(!alice.view.end_call().await);
        assert_eq!(alice.devices.active_captures(), 0);
        assert_eq!(bob.devices.active_captures(), 0);
        assert!(alice.peers.last().unwrap().is_destroyed());
        assert!(!alice.view.call_state().in_call);
    }

    #[tokio::test]
    async fn test_end_call_without_call_is_noop() {
        let store = seeded().await;
        let mut alice = side(&store, "alice", "bob").await;
        let writes = store.write_count();
        assert!(!alice.view.end_call().await);
        assert!(!alice.view.end_call().await);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_blocked_call_not_attempted() {
        let store = seeded().await;
        let mut me = UserProfile::new(UserId::new("alice"), "alice");
        me.blocked.push(UserId::new("bob"));
        store
            .set(&DocPath::parse("users/alice").unwrap(), to_document(&me).unwrap())
            .await
            .unwrap();

        let mut alice = side(&store, "alice", "bob").await;

        let writes = store.write_count();
        let err = alice.view.start_call().await.unwrap_err();
        assert!(matches!(err, CallError::Blocked(_)));
        assert_eq!(alice.devices.active_captures(), 0);
        assert!(alice.peers.probes().is_empty());
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_blocked_by_receiver_refused_right_after_open() {
        let store = seeded().await;
        let mut bob = UserProfile::new(UserId::new("bob"), "bob");
        bob.blocked.push(UserId::new("alice"));
        store
            .set(&DocPath::parse("users/bob").unwrap(), to_document(&bob).unwrap())
            .await
            .unwrap();

        let mut alice = side(&store, "alice", "bob").await;
        let writes = store.write_count();

        alice.view.compose.set_text("hello?");
        let err = alice.view.send().await.unwrap_err();
        assert!(matches!(err, SendError::Blocked(_)));

        let err = alice.view.start_call().await.unwrap_err();
        assert!(matches!(err, CallError::Blocked(_)));
        assert!(alice.view.call().is_none());
        assert!(alice.peers.probes().is_empty());
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_denied_media_leaves_no_call() {
        let store = seeded().await;
        let mut alice = side(&store, "alice", "bob").await;
        alice.devices.set_deny(true);

        let err = alice.view.start_call().await.unwrap_err();
        assert!(matches!(err, CallError::Media(_)));
        assert!(alice.view.call().is_none());
        assert!(!alice.view.call_state().in_call);
    }
}
