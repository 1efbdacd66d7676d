use parley_shared::{paths, BlockStatus, UserId, UserProfile};
use parley_store::{DocPath, DocumentStore, FieldMerge, StoreError};
use serde_json::json;
use tracing::info;

use crate::error::ProfileError;
use crate::state::ChatView;
use crate::sync::{DocFeed, ProfileFeed};

fn profile_path(user: &UserId) -> Result<DocPath, StoreError> {
    DocPath::parse(paths::user(user))
}

pub async fn fetch_profile(
    store: &dyn DocumentStore,
    user: &UserId,
) -> Result<UserProfile, ProfileError> {
    let snapshot = store.get(&profile_path(user)?).await?;
    snapshot
        .decode::<UserProfile>()?
        .ok_or_else(|| ProfileError::NotFound(user.clone()))
}

/// One-shot read of `user`'s tagline, `default` when unset or when the
/// profile does not exist.
pub async fn fetch_tagline(
    store: &dyn DocumentStore,
    user: &UserId,
    default: &str,
) -> Result<String, ProfileError> {
    let snapshot = store.get(&profile_path(user)?).await?;
    let tagline = snapshot
        .decode::<UserProfile>()?
        .and_then(|p| p.tagline)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| default.to_string());
    Ok(tagline)
}

pub fn watch_profile(store: &dyn DocumentStore, user: &UserId) -> Result<ProfileFeed, StoreError> {
    Ok(DocFeed::new(store.watch(&profile_path(user)?)?))
}

pub async fn update_tagline(
    store: &dyn DocumentStore,
    user: &UserId,
    tagline: &str,
) -> Result<(), ProfileError> {
    let path = profile_path(user)?;
    match store
        .update(&path, vec![FieldMerge::set("tagline", json!(tagline))])
        .await
    {
        Ok(()) => {
            info!(user = %user, "Tagline updated");
            Ok(())
        }
        Err(StoreError::NotFound(_)) => Err(ProfileError::NotFound(user.clone())),
        Err(e) => Err(e.into()),
    }
}

/// Flip whether `current` blocks `receiver`, given the flags currently
/// shown. Returns the flags expected once the write lands.
pub async fn toggle_block(
    store: &dyn DocumentStore,
    current: &UserId,
    receiver: &UserId,
    status: BlockStatus,
) -> Result<BlockStatus, ProfileError> {
    let path = profile_path(current)?;
    let value = json!(receiver);
    let merge = if status.receiver_blocked {
        FieldMerge::array_remove("blocked", vec![value])
    } else {
        FieldMerge::array_union("blocked", vec![value])
    };

    match store.update(&path, vec![merge]).await {
        Ok(()) => {}
        Err(StoreError::NotFound(_)) => return Err(ProfileError::NotFound(current.clone())),
        Err(e) => return Err(e.into()),
    }

    let next = BlockStatus {
        receiver_blocked: !status.receiver_blocked,
        ..status
    };
    info!(user = %current, receiver = %receiver, blocked = next.receiver_blocked, "Block toggled");
    Ok(next)
}

impl ChatView {
    /// Toggle blocking of the open conversation's receiver. `None` when no
    /// conversation is open.
    pub async fn toggle_block(&self) -> Result<Option<BlockStatus>, ProfileError> {
        let Some(receiver) = self.receiver() else {
            return Ok(None);
        };
        toggle_block(self.app().store.as_ref(), self.me(), receiver, self.block_status())
            .await
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::{to_document, MemoryStore};

    async fn seed(store: &MemoryStore, profile: &UserProfile) {
        store
            .set(&profile_path(&profile.id).unwrap(), to_document(profile).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tagline_roundtrip_and_default() {
        let store = MemoryStore::new();
        let alice = UserId::new("alice");
        seed(&store, &UserProfile::new(alice.clone(), "alice")).await;

        assert_eq!(fetch_tagline(&store, &alice, "No tagline").await.unwrap(), "No tagline");
        assert_eq!(
            fetch_tagline(&store, &UserId::new("ghost"), "No tagline").await.unwrap(),
            "No tagline"
        );

        update_tagline(&store, &alice, "Busy").await.unwrap();
        assert_eq!(fetch_tagline(&store, &alice, "No tagline").await.unwrap(), "Busy");
        assert_eq!(fetch_profile(&store, &alice).await.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_update_tagline_missing_profile() {
        let store = MemoryStore::new();
        let err = update_tagline(&store, &UserId::new("ghost"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_toggle_block_adds_then_removes() {
        let store = MemoryStore::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        let mut profile = UserProfile::new(alice.clone(), "alice");
        profile.blocked.push(UserId::new("carol"));
        seed(&store, &profile).await;

        let status = toggle_block(&store, &alice, &bob, BlockStatus::default())
            .await
            .unwrap();
        assert!(status.receiver_blocked);
        let stored = fetch_profile(&store, &alice).await.unwrap();
        assert_eq!(stored.blocked, vec![UserId::new("carol"), bob.clone()]);

        let status = toggle_block(&store, &alice, &bob, status).await.unwrap();
        assert!(!status.receiver_blocked);
        let stored = fetch_profile(&store, &alice).await.unwrap();
        assert_eq!(stored.blocked, vec![UserId::new("carol")]);
    }

    #[tokio::test]
    async fn test_view_toggle_block_follows_profile() {
        use std::sync::Arc;

        use parley_media::{LoopbackDevices, LoopbackPeerFactory};
        use parley_shared::ChatId;

        use crate::config::ClientConfig;
        use crate::state::AppState;

        let store = MemoryStore::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");
        seed(&store, &UserProfile::new(alice.clone(), "alice")).await;
        seed(&store, &UserProfile::new(bob.clone(), "bob")).await;

        let app = AppState::new(
            Arc::new(store.clone()),
            Arc::new(LoopbackDevices::new()),
            Arc::new(LoopbackPeerFactory::new()),
            ClientConfig::default(),
        );
        let mut view = ChatView::new(app, alice.clone());
        assert_eq!(view.toggle_block().await.unwrap(), None);

        view.open(ChatId::new("c1"), bob.clone()).await.unwrap();
        let status = view.toggle_block().await.unwrap().unwrap();
        assert!(status.receiver_blocked);
        assert_eq!(fetch_profile(&store, &alice).await.unwrap().blocked, vec![bob]);

        while !view.block_status().receiver_blocked {
            assert!(view.sync_once().await);
        }
        let status = view.toggle_block().await.unwrap().unwrap();
        assert!(!status.receiver_blocked);
        assert!(fetch_profile(&store, &alice).await.unwrap().blocked.is_empty());
    }
}
