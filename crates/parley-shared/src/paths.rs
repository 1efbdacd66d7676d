//! Document paths of the remote store layout.

use crate::constants::{
    ANSWER_CANDIDATES, CALLS_COLLECTION, CHATS_COLLECTION, OFFER_CANDIDATES,
    USERS_COLLECTION, USER_CHATS_COLLECTION,
};
use crate::types::{ChatId, UserId};

pub fn chat(chat_id: &ChatId) -> String {
    format!("{CHATS_COLLECTION}/{chat_id}")
}

pub fn user_chats(user_id: &UserId) -> String {
    format!("{USER_CHATS_COLLECTION}/{user_id}")
}

pub fn user(user_id: &UserId) -> String {
    format!("{USERS_COLLECTION}/{user_id}")
}

pub fn call(chat_id: &ChatId) -> String {
    format!("{CALLS_COLLECTION}/{chat_id}")
}

pub fn offer_candidates(chat_id: &ChatId) -> String {
    format!("{CALLS_COLLECTION}/{chat_id}/{OFFER_CANDIDATES}")
}

pub fn answer_candidates(chat_id: &ChatId) -> String {
    format!("{CALLS_COLLECTION}/{chat_id}/{ANSWER_CANDIDATES}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let chat_id = ChatId::new("c1");
        assert_eq!(chat(&chat_id), "chats/c1");
        assert_eq!(user_chats(&UserId::new("u1")), "userchats/u1");
        assert_eq!(offer_candidates(&chat_id), "calls/c1/offerCandidates");
        assert_eq!(answer_candidates(&chat_id), "calls/c1/answerCandidates");
    }
}
