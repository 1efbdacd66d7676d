//! Client state: shared services plus the per-view chat state.
//!
//! [`AppState`] bundles the collaborators every command needs. A
//! [`ChatView`] owns everything tied to the open conversation: its live
//! subscriptions, the rendered messages and profiles, the compose box and the
//! active call. Switching conversations releases the previous subscriptions
//! before new ones are taken.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parley_media::{CallHandle, CallRelay, MediaDevices, PeerFactory};
use parley_shared::{BlockStatus, ChatId, Message, UserId, UserProfile};
use parley_store::{DocumentStore, StoreError};
use tracing::{debug, info, warn};

use crate::commands::profile;
use crate::config::ClientConfig;
use crate::error::ProfileError;
use crate::events::{MessageView, ViewEvent};
use crate::summaries::SummaryPropagator;
use crate::sync::{ChatFeed, MessageSync, ProfileFeed};
use crate::upload::{DisabledUploader, HttpUploader, Uploader};

/// Collaborators shared by every view of one signed-in user.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub sync: MessageSync,
    pub summaries: SummaryPropagator,
    pub uploader: Arc<dyn Uploader>,
    pub calls: CallRelay,
    pub config: ClientConfig,
}

impl AppState {
    /// Uploads go to `config.upload_url` when set and fail otherwise.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        devices: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerFactory>,
        config: ClientConfig,
    ) -> Self {
        let uploader: Arc<dyn Uploader> = match &config.upload_url {
            Some(url) => Arc::new(HttpUploader::new(url.clone())),
            None => Arc::new(DisabledUploader),
        };
        Self::with_uploader(store, devices, peers, uploader, config)
    }

    pub fn with_uploader(
        store: Arc<dyn DocumentStore>,
        devices: Arc<dyn MediaDevices>,
        peers: Arc<dyn PeerFactory>,
        uploader: Arc<dyn Uploader>,
        config: ClientConfig,
    ) -> Self {
        Self {
            sync: MessageSync::new(store.clone()),
            summaries: SummaryPropagator::new(store.clone()),
            calls: CallRelay::new(store.clone(), devices, peers),
            store,
            uploader,
            config,
        }
    }
}

// ---------------------------------------------------------------------------
// Compose box
// ---------------------------------------------------------------------------

/// A selected but not yet uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAttachment {
    pub data: Bytes,
    pub content_type: String,
    /// Shown in the compose box until the message is sent.
    pub preview: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeState {
    pub text: String,
    pub img: Option<PendingAttachment>,
    pub audio: Option<PendingAttachment>,
    pub emoji_open: bool,
}

impl ComposeState {
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn toggle_emoji(&mut self) {
        self.emoji_open = !self.emoji_open;
    }

    /// Append a picked emoji and close the picker.
    pub fn push_emoji(&mut self, emoji: &str) {
        self.text.push_str(emoji);
        self.emoji_open = false;
    }

    pub fn attach_image(&mut self, data: Bytes, content_type: impl Into<String>, preview: impl Into<String>) {
        self.img = Some(PendingAttachment {
            data,
            content_type: content_type.into(),
            preview: preview.into(),
        });
    }

    pub fn attach_audio(&mut self, data: Bytes, content_type: impl Into<String>, preview: impl Into<String>) {
        self.audio = Some(PendingAttachment {
            data,
            content_type: content_type.into(),
            preview: preview.into(),
        });
    }

    pub fn has_pending_attachment(&self) -> bool {
        self.img.is_some() || self.audio.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && !self.has_pending_attachment()
    }

    /// Hand the draft over for sending, leaving the box empty.
    pub fn take(&mut self) -> ComposeState {
        std::mem::take(self)
    }
}

// ---------------------------------------------------------------------------
// Chat view
// ---------------------------------------------------------------------------

fn tagline_of(profile: Option<&UserProfile>, default: &str) -> String {
    profile
        .and_then(|p| p.tagline.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| default.to_string())
}

struct Conversation {
    chat_id: ChatId,
    receiver: UserId,
    chat_feed: ChatFeed,
    receiver_feed: ProfileFeed,
    me_feed: ProfileFeed,
    messages: Vec<Message>,
    receiver_profile: Option<UserProfile>,
    my_profile: Option<UserProfile>,
    receiver_tagline: String,
}

impl Conversation {
    fn release(self) {
        self.chat_feed.unsubscribe();
        self.receiver_feed.unsubscribe();
        self.me_feed.unsubscribe();
    }
}

pub struct ChatView {
    pub(crate) app: AppState,
    me: UserId,
    conversation: Option<Conversation>,
    pub compose: ComposeState,
    pub(crate) call: Option<CallHandle>,
}

impl ChatView {
    pub fn new(app: AppState, me: UserId) -> Self {
        Self {
            app,
            me,
            conversation: None,
            compose: ComposeState::default(),
            call: None,
        }
    }

    pub fn me(&self) -> &UserId {
        &self.me
    }

    pub fn app(&self) -> &AppState {
        &self.app
    }

    /// Switch to the conversation `chat_id` with `receiver`. The previous
    /// conversation's subscriptions are released first.
    pub async fn open(&mut self, chat_id: ChatId, receiver: UserId) -> Result<(), StoreError> {
        self.close();

        let chat_feed = self.app.sync.subscribe(&chat_id)?;
        let receiver_feed = profile::watch_profile(self.app.store.as_ref(), &receiver)?;
        let me_feed = profile::watch_profile(self.app.store.as_ref(), &self.me)?;

        // Block flags must be known before any outbound action.
        let receiver_profile = Self::load_profile(self.app.store.as_ref(), &receiver).await?;
        let my_profile = Self::load_profile(self.app.store.as_ref(), &self.me).await?;
        let receiver_tagline = tagline_of(receiver_profile.as_ref(), &self.app.config.default_tagline);

        info!(chat = %chat_id, receiver = %receiver, "Conversation opened");
        self.conversation = Some(Conversation {
            chat_id,
            receiver,
            chat_feed,
            receiver_feed,
            me_feed,
            messages: Vec::new(),
            receiver_profile,
            my_profile,
            receiver_tagline,
        });
        Ok(())
    }

    async fn load_profile(
        store: &dyn DocumentStore,
        user: &UserId,
    ) -> Result<Option<UserProfile>, StoreError> {
        match profile::fetch_profile(store, user).await {
            Ok(found) => Ok(Some(found)),
            Err(ProfileError::NotFound(_)) => {
                warn!(user = %user, "Profile missing");
                Ok(None)
            }
            Err(ProfileError::Store(e)) => Err(e),
        }
    }

    /// Release the open conversation's subscriptions, if any.
    pub fn close(&mut self) {
        if let Some(conversation) = self.conversation.take() {
            debug!(chat = %conversation.chat_id, "Conversation closed");
            conversation.release();
        }
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        self.conversation.as_ref().map(|c| &c.chat_id)
    }

    pub fn receiver(&self) -> Option<&UserId> {
        self.conversation.as_ref().map(|c| &c.receiver)
    }

    /// Next delivery from any subscription of the open conversation.
    /// `None` when no conversation is open or its subscriptions closed.
    pub async fn next_event(&mut self) -> Option<ViewEvent> {
        let conversation = self.conversation.as_mut()?;
        let chat_id = conversation.chat_id.clone();

        tokio::select! {
            doc = conversation.chat_feed.next() => doc.map(|doc| ViewEvent::Chat { chat_id, doc }),
            profile = conversation.receiver_feed.next() => {
                profile.map(|profile| ViewEvent::ReceiverProfile { chat_id, profile })
            }
            profile = conversation.me_feed.next() => {
                profile.map(|profile| ViewEvent::CurrentProfile { chat_id, profile })
            }
        }
    }

    /// Fold a delivery into the view. Returns `false` for events of a
    /// conversation that is no longer open, which are dropped untouched.
    pub fn apply(&mut self, event: ViewEvent) -> bool {
        let default_tagline = &self.app.config.default_tagline;
        let Some(conversation) = self.conversation.as_mut() else {
            return false;
        };
        if event.chat_id() != &conversation.chat_id {
            debug!(stale = %event.chat_id(), open = %conversation.chat_id, "Dropping stale update");
            return false;
        }

        match event {
            ViewEvent::Chat { doc, .. } => {
                conversation.messages = doc.map(|d| d.messages).unwrap_or_default();
            }
            ViewEvent::ReceiverProfile { profile, .. } => {
                conversation.receiver_tagline = tagline_of(profile.as_ref(), default_tagline);
                conversation.receiver_profile = profile;
            }
            ViewEvent::CurrentProfile { profile, .. } => {
                conversation.my_profile = profile;
            }
        }
        true
    }

    /// Wait for one delivery and apply it.
    pub async fn sync_once(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => self.apply(event),
            None => false,
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation
            .as_ref()
            .map(|c| c.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn message_views(&self, now: DateTime<Utc>) -> Vec<MessageView> {
        self.messages()
            .iter()
            .map(|m| MessageView::from_message(m, &self.me, now))
            .collect()
    }

    pub fn receiver_tagline(&self) -> Option<&str> {
        self.conversation
            .as_ref()
            .map(|c| c.receiver_tagline.as_str())
    }

    pub fn receiver_profile(&self) -> Option<&UserProfile> {
        self.conversation.as_ref()?.receiver_profile.as_ref()
    }

    /// Block flags of the open conversation, from the last profiles seen.
    pub fn block_status(&self) -> BlockStatus {
        let Some(conversation) = self.conversation.as_ref() else {
            return BlockStatus::default();
        };
        BlockStatus {
            current_user_blocked: conversation
                .receiver_profile
                .as_ref()
                .is_some_and(|p| p.has_blocked(&self.me)),
            receiver_blocked: conversation
                .my_profile
                .as_ref()
                .is_some_and(|p| p.has_blocked(&conversation.receiver)),
        }
    }

    pub fn call(&self) -> Option<&CallHandle> {
        self.call.as_ref()
    }

    pub fn call_mut(&mut self) -> Option<&mut CallHandle> {
        self.call.as_mut()
    }
}

impl Drop for ChatView {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_media::{LoopbackDevices, LoopbackPeerFactory};
    use parley_shared::{ChatDocument, MessageContent};
    use parley_store::{to_document, DocPath, MemoryStore};

    fn app(store: &MemoryStore) -> AppState {
        AppState::new(
            Arc::new(store.clone()),
            Arc::new(LoopbackDevices::new()),
            Arc::new(LoopbackPeerFactory::new()),
            ClientConfig::default(),
        )
    }

    async fn seed_chat(store: &MemoryStore, chat: &str, texts: &[&str]) {
        let messages = texts
            .iter()
            .map(|t| Message::new(UserId::new("bob"), MessageContent::text(*t).unwrap(), Utc::now()))
            .collect();
        store
            .set(
                &DocPath::parse(format!("chats/{chat}")).unwrap(),
                to_document(&ChatDocument { messages }).unwrap(),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_compose_take_clears() {
        let mut compose = ComposeState::default();
        compose.set_text("hello ");
        compose.toggle_emoji();
        compose.push_emoji("🙂");
        assert!(!compose.emoji_open);
        compose.attach_image(Bytes::from_static(b"png"), "image/png", "cat.png");

        let draft = compose.take();
        assert_eq!(draft.text, "hello 🙂");
        assert!(draft.has_pending_attachment());
        assert!(compose.is_empty());
    }

    #[tokio::test]
    async fn test_switch_releases_previous_subscriptions() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", &["one"]).await;
        seed_chat(&store, "c2", &["two", "three"]).await;
        let mut view = ChatView::new(app(&store), UserId::new("alice"));

        view.open(ChatId::new("c1"), UserId::new("bob")).await.unwrap();
        assert_eq!(store.active_watchers(), 3);
        let stale = view.next_event().await.unwrap();

        view.open(ChatId::new("c2"), UserId::new("carol")).await.unwrap();
        assert_eq!(store.active_watchers(), 3);

        // A delivery taken from the old conversation changes nothing.
        assert!(!view.apply(stale));
        assert!(view.messages().is_empty());

        while view.messages().is_empty() {
            assert!(view.sync_once().await);
        }
        assert_eq!(view.messages().len(), 2);

        drop(view);
        assert_eq!(store.active_watchers(), 0);
    }

    #[tokio::test]
    async fn test_tagline_defaults_and_follows_profile() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", &[]).await;
        let bob = UserProfile::new(UserId::new("bob"), "bob");
        let bob_path = DocPath::parse("users/bob").unwrap();
        store.set(&bob_path, to_document(&bob).unwrap()).await.unwrap();

        let mut view = ChatView::new(app(&store), UserId::new("alice"));
        view.open(ChatId::new("c1"), UserId::new("bob")).await.unwrap();
        assert_eq!(view.receiver_tagline(), Some("No tagline"));

        let mut with_tagline = bob.clone();
        with_tagline.tagline = Some("Out fishing".into());
        store.set(&bob_path, to_document(&with_tagline).unwrap()).await.unwrap();

        while view.receiver_tagline() != Some("Out fishing") {
            assert!(view.sync_once().await);
        }
    }

    #[tokio::test]
    async fn test_block_status_from_profiles() {
        let store = MemoryStore::new();
        seed_chat(&store, "c1", &[]).await;
        let mut bob = UserProfile::new(UserId::new("bob"), "bob");
        bob.blocked.push(UserId::new("alice"));
        store
            .set(&DocPath::parse("users/bob").unwrap(), to_document(&bob).unwrap())
            .await
            .unwrap();
        let alice = UserProfile::new(UserId::new("alice"), "alice");
        store
            .set(&DocPath::parse("users/alice").unwrap(), to_document(&alice).unwrap())
            .await
            .unwrap();

        let mut view = ChatView::new(app(&store), UserId::new("alice"));
        view.open(ChatId::new("c1"), UserId::new("bob")).await.unwrap();
        // Known as soon as the conversation is open, before any delivery.
        assert_eq!(view.receiver_profile().map(|p| p.username.as_str()), Some("bob"));
        let status = view.block_status();
        assert!(status.current_user_blocked);
        assert!(!status.receiver_blocked);

        // Later profile changes still arrive through the feeds.
        let mut alice = alice;
        alice.blocked.push(UserId::new("bob"));
        store
            .set(&DocPath::parse("users/alice").unwrap(), to_document(&alice).unwrap())
            .await
            .unwrap();
        while !view.block_status().receiver_blocked {
            assert!(view.sync_once().await);
        }
    }
}
