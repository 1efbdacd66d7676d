/// Collection holding one document per conversation with its message array.
pub const CHATS_COLLECTION: &str = "chats";

/// Collection holding one chat-list document per user.
pub const USER_CHATS_COLLECTION: &str = "userchats";

/// Collection holding user profiles.
pub const USERS_COLLECTION: &str = "users";

/// Collection holding one call mailbox per conversation.
pub const CALLS_COLLECTION: &str = "calls";

/// Sub-collection of a call mailbox the initiator writes its candidates into.
pub const OFFER_CANDIDATES: &str = "offerCandidates";

/// Sub-collection of a call mailbox the responder writes its candidates into.
pub const ANSWER_CANDIDATES: &str = "answerCandidates";

/// Chat-list text used when the latest message carries no text.
pub const MEDIA_MESSAGE_PLACEHOLDER: &str = "Media message";

/// Tagline rendered for profiles that never set one.
pub const DEFAULT_TAGLINE: &str = "No tagline";
