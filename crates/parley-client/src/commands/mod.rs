//! User-facing operations of a chat view.
//!
//! Each sub-module groups related commands by domain. Most are methods on
//! [`ChatView`](crate::state::ChatView); the free functions work on an
//! [`AppState`](crate::state::AppState) directly.

pub mod media;
pub mod messaging;
pub mod profile;
