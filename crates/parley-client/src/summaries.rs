//! Chat-list summary propagation.
//!
//! After a message lands, both participants' `userchats` entries for the
//! conversation get the new last-message text, a fresh `updatedAt` and an
//! `isSeen` flag that is true only for the sender. Each entry is updated
//! with an atomic field-path write located by `chatId`, so concurrent sends
//! cannot overwrite each other's summaries. The two updates are independent:
//! one may fail while the other succeeds.

use std::sync::Arc;

use parley_shared::{paths, ChatId, UserChatsDocument, UserId};
use parley_store::{from_document, DocPath, Document, DocumentStore, FieldMerge, StoreError};
use serde_json::json;
use tracing::{debug, warn};

/// Outcome of one propagation, per participant.
#[derive(Debug)]
pub struct PropagationReport {
    pub sender: Result<(), StoreError>,
    pub receiver: Result<(), StoreError>,
}

impl PropagationReport {
    pub fn is_complete(&self) -> bool {
        self.sender.is_ok() && self.receiver.is_ok()
    }
}

#[derive(Clone)]
pub struct SummaryPropagator {
    store: Arc<dyn DocumentStore>,
}

impl SummaryPropagator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn propagate(
        &self,
        chat_id: &ChatId,
        sender: &UserId,
        receiver: &UserId,
        last_message: &str,
        updated_at: i64,
    ) -> PropagationReport {
        let (sender_result, receiver_result) = futures::join!(
            self.update_one(sender, chat_id, last_message, true, updated_at),
            self.update_one(receiver, chat_id, last_message, false, updated_at),
        );

        for (user, result) in [(sender, &sender_result), (receiver, &receiver_result)] {
            if let Err(e) = result {
                warn!(chat = %chat_id, user = %user, error = %e, "Chat-list summary not updated");
            }
        }

        PropagationReport {
            sender: sender_result,
            receiver: receiver_result,
        }
    }

    async fn update_one(
        &self,
        user: &UserId,
        chat_id: &ChatId,
        last_message: &str,
        is_seen: bool,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        let path = DocPath::parse(paths::user_chats(user))?;
        let wanted = chat_id.clone();
        let text = last_message.to_string();

        let written = self
            .store
            .transact(&path, &move |doc: &Document| -> parley_store::Result<Vec<FieldMerge>> {
                let list: UserChatsDocument = from_document(doc)?;
                let index = list.position(&wanted).ok_or_else(|| {
                    StoreError::Aborted(format!("no summary for chat {wanted}"))
                })?;
                Ok(vec![
                    FieldMerge::set(format!("chats.{index}.lastMessage"), json!(text)),
                    FieldMerge::set(format!("chats.{index}.isSeen"), json!(is_seen)),
                    FieldMerge::set(format!("chats.{index}.updatedAt"), json!(updated_at)),
                ])
            })
            .await?;

        if !written {
            return Err(StoreError::NotFound(path.to_string()));
        }
        debug!(user = %user, chat = %chat_id, is_seen, "Chat-list summary updated");
        Ok(())
    }
}
