use thiserror::Error;

use crate::types::UserId;

/// Raised when a message would carry neither text nor an attachment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("Message has no text and no attachment")]
    Empty,
}

/// Outbound actions are disabled while either participant blocks the other.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockedConversationError {
    #[error("You are blocked by {0}")]
    CurrentUserBlocked(UserId),

    #[error("You blocked {0}")]
    ReceiverBlocked(UserId),
}
