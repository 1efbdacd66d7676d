use chrono::Utc;
use parley_shared::{BlockStatus, ChatId, Message, MessageContent, UserId};
use tracing::{info, warn};

use crate::error::{Result, SendError};
use crate::state::{AppState, ChatView, ComposeState, PendingAttachment};
use crate::summaries::PropagationReport;

/// What a successful send wrote.
#[derive(Debug)]
pub struct SendReceipt {
    pub message: Message,
    /// Summary updates are best effort; the message is in either way.
    pub summaries: PropagationReport,
}

async fn upload(app: &AppState, attachment: Option<PendingAttachment>) -> Result<Option<String>> {
    match attachment {
        Some(a) => Ok(Some(app.uploader.upload(a.data, &a.content_type).await?)),
        None => Ok(None),
    }
}

/// Send `draft` from `sender` to the conversation `chat_id`.
///
/// Nothing is written when the conversation is blocked or the draft is
/// empty. Attachments are uploaded first, then the message is appended to
/// the chat and both participants' summaries are updated.
pub async fn send_message(
    app: &AppState,
    chat_id: &ChatId,
    sender: &UserId,
    receiver: &UserId,
    block: BlockStatus,
    draft: ComposeState,
) -> Result<SendReceipt> {
    block.ensure_open(receiver)?;
    if draft.is_empty() {
        return Err(parley_shared::ContentError::Empty.into());
    }

    let img = upload(app, draft.img).await?;
    let audio = upload(app, draft.audio).await?;
    let content = MessageContent::new(Some(draft.text), img, audio)?;

    let now = Utc::now();
    let message = Message::new(sender.clone(), content, now);
    app.sync
        .append(chat_id, &message)
        .await
        .map_err(SendError::Append)?;
    info!(chat = %chat_id, kind = ?message.kind(), "Message sent");

    let summary = message.summary_text(&app.config.media_placeholder);
    let summaries = app
        .summaries
        .propagate(chat_id, sender, receiver, &summary, now.timestamp_millis())
        .await;

    Ok(SendReceipt { message, summaries })
}

impl ChatView {
    /// Send the compose box contents to the open conversation. The compose
    /// box is cleared whatever the outcome.
    pub async fn send(&mut self) -> Result<SendReceipt> {
        let draft = self.compose.take();
        let (chat_id, receiver) = match (self.chat_id(), self.receiver()) {
            (Some(chat_id), Some(receiver)) => (chat_id.clone(), receiver.clone()),
            _ => return Err(SendError::NoConversation),
        };

        let result = send_message(
            self.app(),
            &chat_id,
            self.me(),
            &receiver,
            self.block_status(),
            draft,
        )
        .await;
        if let Err(e) = &result {
            warn!(chat = %chat_id, error = %e, "Send failed");
        }
        result
    }
}
