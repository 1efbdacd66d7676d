//! Identifiers, document models and error types shared by every parley crate.

pub mod constants;
pub mod error;
pub mod models;
pub mod paths;
pub mod types;

pub use error::{BlockedConversationError, ContentError};
pub use models::*;
pub use types::{CallSessionId, ChatId, UserId};
