use parley_shared::{BlockedConversationError, ContentError, UserId};
use parley_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No upload endpoint configured")]
    NotConfigured,

    #[error("Upload request failed: {0}")]
    Http(String),

    #[error("Upload response invalid: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Http(e.to_string())
    }
}

/// A message could not be sent. Every variant except `Append` is raised
/// before anything is written.
#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)]
    Blocked(#[from] BlockedConversationError),

    #[error(transparent)]
    Empty(#[from] ContentError),

    #[error("Attachment upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("No conversation open")]
    NoConversation,

    #[error("Message append failed: {0}")]
    Append(StoreError),
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Profile not found: {0}")]
    NotFound(UserId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = SendError> = std::result::Result<T, E>;
