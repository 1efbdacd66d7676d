//! # parley-demo
//!
//! Two participants in one process, sharing an in-memory document store
//! and loopback media. Alice sends a message, Bob receives it, then Alice
//! calls Bob and both hang up once connected.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::Utc;
use parley_client::{init_tracing, AppState, ChatView, ClientConfig};
use parley_media::{CallState, LoopbackDevices, LoopbackPeerFactory};
use parley_shared::{
    ChatDocument, ChatId, ChatSummary, UserChatsDocument, UserId, UserProfile,
};
use parley_store::{to_document, DocPath, DocumentStore, MemoryStore};
use tokio::time::timeout;
use tracing::info;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

async fn seed(store: &MemoryStore, chat_id: &ChatId, users: [&UserId; 2]) -> anyhow::Result<()> {
    store
        .set(
            &DocPath::parse(format!("chats/{chat_id}"))?,
            to_document(&ChatDocument::default())?,
        )
        .await?;

    for (me, other) in [(users[0], users[1]), (users[1], users[0])] {
        let mut profile = UserProfile::new(me.clone(), me.as_str());
        profile.tagline = Some(format!("Hi, I'm {me}"));
        store
            .set(&DocPath::parse(format!("users/{me}"))?, to_document(&profile)?)
            .await?;

        let list = UserChatsDocument {
            chats: vec![ChatSummary {
                chat_id: chat_id.clone(),
                receiver_id: Some(other.clone()),
                last_message: String::new(),
                is_seen: true,
                updated_at: Utc::now().timestamp_millis(),
            }],
        };
        store
            .set(&DocPath::parse(format!("userchats/{me}"))?, to_document(&list)?)
            .await?;
    }
    Ok(())
}

fn participant(store: &MemoryStore, config: &ClientConfig, me: &UserId) -> ChatView {
    let app = AppState::new(
        Arc::new(store.clone()),
        Arc::new(LoopbackDevices::new()),
        Arc::new(LoopbackPeerFactory::new()),
        config.clone(),
    );
    ChatView::new(app, me.clone())
}

async fn wait_connected(view: &mut ChatView) -> anyhow::Result<()> {
    let handle = view.call_mut().ok_or_else(|| anyhow!("no call"))?;
    timeout(STEP_TIMEOUT, handle.wait_for(|s| s.state == CallState::Connected))
        .await
        .context("call did not connect in time")?
        .ok_or_else(|| anyhow!("call ended before connecting"))?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting parley demo v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let store = MemoryStore::new();
    let chat_id = ChatId::new("demo-chat");
    let alice_id = UserId::new("alice");
    let bob_id = UserId::new("bob");
    seed(&store, &chat_id, [&alice_id, &bob_id]).await?;

    let mut alice = participant(&store, &config, &alice_id);
    let mut bob = participant(&store, &config, &bob_id);
    alice.open(chat_id.clone(), bob_id.clone()).await?;
    bob.open(chat_id.clone(), alice_id.clone()).await?;
    info!(tagline = ?alice.receiver_tagline(), "Alice sees Bob's tagline");

    // -----------------------------------------------------------------------
    // Messaging
    // -----------------------------------------------------------------------
    alice.compose.set_text("gg");
    let receipt = alice.send().await?;
    info!(complete = receipt.summaries.is_complete(), "Alice sent a message");

    timeout(STEP_TIMEOUT, async {
        while bob.messages().is_empty() {
            if !bob.sync_once().await {
                break;
            }
        }
    })
    .await
    .context("message never reached Bob")?;

    for view in bob.message_views(Utc::now()) {
        info!(own = view.own, text = ?view.text, age = %view.age, "Bob renders");
    }

    // -----------------------------------------------------------------------
    // Call
    // -----------------------------------------------------------------------
    alice.start_call().await?;
    let mut mailbox = store.watch(&DocPath::parse(format!("calls/{chat_id}"))?)?;
    timeout(STEP_TIMEOUT, async {
        while let Some(snapshot) = mailbox.recv().await {
            if snapshot.exists() {
                break;
            }
        }
    })
    .await
    .context("offer never published")?;
    mailbox.unsubscribe();

    bob.answer_call().await?;
    wait_connected(&mut bob).await?;
    wait_connected(&mut alice).await?;
    info!(alice = ?alice.call_state(), bob = ?bob.call_state(), "Call connected");

    alice.end_call().await;
    bob.end_call().await;
    alice.close();
    bob.close();

    info!(
        writes = store.write_count(),
        watchers = store.active_watchers(),
        "Demo finished"
    );
    Ok(())
}
