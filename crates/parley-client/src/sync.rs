//! Live chat documents and the append-only message write.

use std::marker::PhantomData;
use std::sync::Arc;

use parley_shared::{paths, ChatDocument, ChatId, Message, UserProfile};
use parley_store::{
    to_document, DocPath, DocumentStore, FieldMerge, Snapshot, StoreError, Subscription,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Typed view over a document subscription.
///
/// Each item is the full current document, `None` while it does not exist.
/// Snapshots that fail to decode are logged and skipped. Dropping the feed
/// releases the underlying watcher.
pub struct DocFeed<T> {
    sub: Subscription<Snapshot>,
    _doc: PhantomData<fn() -> T>,
}

pub type ChatFeed = DocFeed<ChatDocument>;
pub type ProfileFeed = DocFeed<UserProfile>;

impl<T: DeserializeOwned> DocFeed<T> {
    pub fn new(sub: Subscription<Snapshot>) -> Self {
        Self {
            sub,
            _doc: PhantomData,
        }
    }

    /// `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<Option<T>> {
        loop {
            let snapshot = self.sub.recv().await?;
            match snapshot.decode::<T>() {
                Ok(doc) => return Some(doc),
                Err(e) => warn!(path = %snapshot.path, error = %e, "Skipping undecodable snapshot"),
            }
        }
    }

    pub fn unsubscribe(self) {
        self.sub.unsubscribe();
    }
}

/// Subscribes to chat documents and appends messages to them.
#[derive(Clone)]
pub struct MessageSync {
    store: Arc<dyn DocumentStore>,
}

impl MessageSync {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Live snapshots of `chats/{chat_id}`, starting with the current one.
    /// Subscribing again after unsubscribing starts over with a fresh
    /// initial snapshot.
    pub fn subscribe(&self, chat_id: &ChatId) -> Result<ChatFeed, StoreError> {
        let path = DocPath::parse(paths::chat(chat_id))?;
        debug!(chat = %chat_id, "Subscribing to chat");
        Ok(DocFeed::new(self.store.watch(&path)?))
    }

    /// Append `message` to the chat's `messages` array with an additive
    /// merge; concurrent appends from the other participant are kept.
    pub async fn append(&self, chat_id: &ChatId, message: &Message) -> Result<(), StoreError> {
        let path = DocPath::parse(paths::chat(chat_id))?;
        let value = Value::Object(to_document(message)?);
        self.store
            .update(&path, vec![FieldMerge::array_union("messages", vec![value])])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parley_shared::{MessageContent, UserId};
    use parley_store::MemoryStore;

    async fn store_with_chat() -> MemoryStore {
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

    fn message(sender: &str, text: &str, secs: i64) -> Message {
        Message::new(
            UserId::new(sender),
            MessageContent::text(text).unwrap(),
            Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_feed_sees_own_append() {
        let store = store_with_chat().await;
        let sync = MessageSync::new(Arc::new(store.clone()));
        let chat = ChatId::new("c1");

        let mut feed = sync.subscribe(&chat).unwrap();
        assert_eq!(feed.next().await.unwrap().unwrap().messages.len(), 0);

        sync.append(&chat, &message("alice", "gg", 0)).await.unwrap();
        let doc = feed.next().await.unwrap().unwrap();
        assert_eq!(doc.messages.len(), 1);
        assert_eq!(doc.messages[0].text.as_deref(), Some("gg"));
    }

    #[tokio::test]
    async fn test_order_is_store_order() {
        let store = store_with_chat().await;
        let sync = MessageSync::new(Arc::new(store.clone()));
        let chat = ChatId::new("c1");

        // Later timestamp first: not re-sorted.
        sync.append(&chat, &message("bob", "second", 10)).await.unwrap();
        sync.append(&chat, &message("alice", "first", 0)).await.unwrap();

        let mut feed = sync.subscribe(&chat).unwrap();
        let doc = feed.next().await.unwrap().unwrap();
        let texts: Vec<_> = doc.messages.iter().filter_map(|m| m.text.as_deref()).collect();
        assert_eq!(texts, ["second", "first"]);
    }

    #[tokio::test]
    async fn test_resubscribe_yields_fresh_snapshot() {
        let store = store_with_chat().await;
        let sync = MessageSync::new(Arc::new(store.clone()));
        let chat = ChatId::new("c1");

        let feed = sync.subscribe(&chat).unwrap();
        assert_eq!(store.active_watchers(), 1);
        feed.unsubscribe();
        assert_eq!(store.active_watchers(), 0);

        sync.append(&chat, &message("alice", "gg", 0)).await.unwrap();
        let mut again = sync.subscribe(&chat).unwrap();
        assert_eq!(again.next().await.unwrap().unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_append_to_missing_chat_fails() {
        let store = MemoryStore::new();
        let sync = MessageSync::new(Arc::new(store.clone()));
        let err = sync
            .append(&ChatId::new("nope"), &message("alice", "gg", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
