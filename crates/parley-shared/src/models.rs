//! Document shapes persisted in the remote store.
//!
//! Field names follow the store layout (`senderId`, `lastMessage`, ...), so
//! every struct is `camelCase` on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TAGLINE;
use crate::error::{BlockedConversationError, ContentError};
use crate::types::{CallSessionId, ChatId, UserId};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Validated body of a message: at least one of text, image or audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    text: Option<String>,
    img: Option<String>,
    audio: Option<String>,
}

impl MessageContent {
    /// Empty strings count as absent.
    pub fn new(
        text: Option<String>,
        img: Option<String>,
        audio: Option<String>,
    ) -> Result<Self, ContentError> {
        let text = text.filter(|t| !t.is_empty());
        let img = img.filter(|u| !u.is_empty());
        let audio = audio.filter(|u| !u.is_empty());

        if text.is_none() && img.is_none() && audio.is_none() {
            return Err(ContentError::Empty);
        }
        Ok(Self { text, img, audio })
    }

    pub fn text(text: impl Into<String>) -> Result<Self, ContentError> {
        Self::new(Some(text.into()), None, None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Mixed,
}

/// One entry of a chat document's `messages` array. Immutable once sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender_id: UserId,
    /// Assigned by the sending client.
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl Message {
    pub fn new(sender_id: UserId, content: MessageContent, created_at: DateTime<Utc>) -> Self {
        Self {
            sender_id,
            created_at,
            text: content.text,
            img: content.img,
            audio: content.audio,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match (self.text.is_some(), self.img.is_some(), self.audio.is_some()) {
            (true, false, false) => MessageKind::Text,
            (false, true, false) => MessageKind::Image,
            (false, false, true) => MessageKind::Audio,
            _ => MessageKind::Mixed,
        }
    }

    /// Text shown in chat-list summaries: the message text, or `placeholder`
    /// for media-only messages.
    pub fn summary_text(&self, placeholder: &str) -> String {
        self.text
            .clone()
            .unwrap_or_else(|| placeholder.to_string())
    }
}

/// `chats/{chatId}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatDocument {
    /// Insertion order as returned by the store; never re-sorted locally.
    #[serde(default)]
    pub messages: Vec<Message>,
}

// ---------------------------------------------------------------------------
// Chat list
// ---------------------------------------------------------------------------

/// Denormalized per-user view of one conversation's latest state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub chat_id: ChatId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub is_seen: bool,
    /// Unix epoch millis.
    #[serde(default)]
    pub updated_at: i64,
}

/// `userchats/{userId}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserChatsDocument {
    #[serde(default)]
    pub chats: Vec<ChatSummary>,
}

impl UserChatsDocument {
    pub fn position(&self, chat_id: &ChatId) -> Option<usize> {
        self.chats.iter().position(|c| &c.chat_id == chat_id)
    }

    pub fn get(&self, chat_id: &ChatId) -> Option<&ChatSummary> {
        self.chats.iter().find(|c| &c.chat_id == chat_id)
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// `users/{userId}`, the subset this client reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,
    #[serde(default)]
    pub blocked: Vec<UserId>,
}

impl UserProfile {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar: None,
            tagline: None,
            blocked: Vec::new(),
        }
    }

    pub fn has_blocked(&self, other: &UserId) -> bool {
        self.blocked.contains(other)
    }

    /// Tagline for display, falling back to [`DEFAULT_TAGLINE`].
    pub fn display_tagline(&self) -> &str {
        match self.tagline.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_TAGLINE,
        }
    }
}

/// Block flags of one conversation, seen from the current user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStatus {
    /// The receiver has blocked the current user.
    pub current_user_blocked: bool,
    /// The current user has blocked the receiver.
    pub receiver_blocked: bool,
}

impl BlockStatus {
    pub fn from_profiles(current: &UserProfile, receiver: &UserProfile) -> Self {
        Self {
            current_user_blocked: receiver.has_blocked(&current.id),
            receiver_blocked: current.has_blocked(&receiver.id),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.current_user_blocked || self.receiver_blocked
    }

    pub fn ensure_open(&self, receiver: &UserId) -> Result<(), BlockedConversationError> {
        if self.current_user_blocked {
            return Err(BlockedConversationError::CurrentUserBlocked(receiver.clone()));
        }
        if self.receiver_blocked {
            return Err(BlockedConversationError::ReceiverBlocked(receiver.clone()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Call signaling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description blob produced by a peer connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalPayload {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SignalPayload {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate, opaque to everything but the peer connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

/// One document of an `offerCandidates` / `answerCandidates` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub session_id: CallSessionId,
    #[serde(flatten)]
    pub candidate: IceCandidate,
}

/// `calls/{chatId}`: the signaling mailbox of one conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallDocument {
    pub session_id: CallSessionId,
    #[serde(default)]
    pub video: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<SignalPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SignalPayload>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> UserProfile {
        UserProfile::new(UserId::new(id), id)
    }

    #[test]
    fn test_content_requires_something() {
        assert_eq!(
            MessageContent::new(None, None, None),
            Err(ContentError::Empty)
        );
        assert_eq!(
            MessageContent::new(Some(String::new()), Some(String::new()), None),
            Err(ContentError::Empty)
        );
        assert!(MessageContent::new(None, Some("https://cdn/x.png".into()), None).is_ok());
    }

    #[test]
    fn test_message_omits_absent_fields() {
        let msg = Message::new(
            UserId::new("u1"),
            MessageContent::text("gg").unwrap(),
            Utc::now(),
        );
        let value = serde_json::to_value(&msg).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj["senderId"], "u1");
        assert_eq!(obj["text"], "gg");
        assert!(obj.contains_key("createdAt"));
        assert!(!obj.contains_key("img"));
        assert!(!obj.contains_key("audio"));
        assert_eq!(msg.kind(), MessageKind::Text);
    }

    #[test]
    fn test_summary_text_placeholder() {
        let msg = Message::new(
            UserId::new("u1"),
            MessageContent::new(None, None, Some("https://cdn/a.mp3".into())).unwrap(),
            Utc::now(),
        );
        assert_eq!(msg.kind(), MessageKind::Audio);
        assert_eq!(msg.summary_text("Media message"), "Media message");
    }

    #[test]
    fn test_block_status() {
        let mut alice = profile("alice");
        let bob = profile("bob");
        assert!(!BlockStatus::from_profiles(&alice, &bob).is_blocked());

        alice.blocked.push(bob.id.clone());
        let status = BlockStatus::from_profiles(&alice, &bob);
        assert!(status.receiver_blocked);
        assert!(!status.current_user_blocked);
        assert_eq!(
            status.ensure_open(&bob.id),
            Err(BlockedConversationError::ReceiverBlocked(bob.id.clone()))
        );

        let seen_by_bob = BlockStatus::from_profiles(&bob, &alice);
        assert!(seen_by_bob.current_user_blocked);
    }

    #[test]
    fn test_display_tagline_default() {
        let mut p = profile("u1");
        assert_eq!(p.display_tagline(), DEFAULT_TAGLINE);
        p.tagline = Some(String::new());
        assert_eq!(p.display_tagline(), DEFAULT_TAGLINE);
        p.tagline = Some("For democracy".into());
        assert_eq!(p.display_tagline(), "For democracy");
    }

    #[test]
    fn test_candidate_record_shape() {
        let record = CandidateRecord {
            session_id: CallSessionId::new(),
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("sessionId").is_some());
        assert_eq!(value["sdpMLineIndex"], 0);
        let back: CandidateRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
