//! Updates delivered to a chat view and the render payloads derived from it.

use chrono::{DateTime, Utc};
use parley_shared::{ChatDocument, ChatId, Message, UserId, UserProfile};
use serde::Serialize;

/// One subscription delivery, tagged with the conversation it was
/// subscribed for. A view ignores events whose `chat_id` is no longer the
/// open conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Chat {
        chat_id: ChatId,
        doc: Option<ChatDocument>,
    },
    ReceiverProfile {
        chat_id: ChatId,
        profile: Option<UserProfile>,
    },
    CurrentProfile {
        chat_id: ChatId,
        profile: Option<UserProfile>,
    },
}

impl ViewEvent {
    pub fn chat_id(&self) -> &ChatId {
        match self {
            ViewEvent::Chat { chat_id, .. }
            | ViewEvent::ReceiverProfile { chat_id, .. }
            | ViewEvent::CurrentProfile { chat_id, .. } => chat_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub own: bool,
    pub sender_id: String,
    pub text: Option<String>,
    pub img: Option<String>,
    pub audio: Option<String>,
    pub created_at: String,
    /// `createdAt` relative to render time, e.g. "5 minutes ago".
    pub age: String,
}

impl MessageView {
    pub fn from_message(m: &Message, me: &UserId, now: DateTime<Utc>) -> Self {
        Self {
            own: &m.sender_id == me,
            sender_id: m.sender_id.to_string(),
            text: m.text.clone(),
            img: m.img.clone(),
            audio: m.audio.clone(),
            created_at: m.created_at.to_rfc3339(),
            age: format_relative(m.created_at, now),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallStatePayload {
    pub in_call: bool,
    pub state: String,
    pub has_remote_stream: bool,
}

const UNITS: [(f64, &str); 7] = [
    (60.0, "second"),
    (60.0, "minute"),
    (24.0, "hour"),
    (7.0, "day"),
    (365.0 / 7.0 / 12.0, "week"),
    (12.0, "month"),
    (f64::INFINITY, "year"),
];

/// Human readable distance between `at` and `now`: "just now",
/// "3 minutes ago", "in 2 days".
pub fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - at).num_seconds();
    let future = diff < 0;
    let mut value = diff.unsigned_abs() as f64;

    if value < 10.0 {
        return if future { "right now".into() } else { "just now".into() };
    }

    let mut unit = "second";
    for (step, name) in UNITS {
        unit = name;
        if value < step {
            break;
        }
        value /= step;
    }

    let n = value.floor() as u64;
    let plural = if n == 1 { "" } else { "s" };
    if future {
        format!("in {n} {unit}{plural}")
    } else {
        format!("{n} {unit}{plural} ago")
    }
}
