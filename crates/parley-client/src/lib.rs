pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod state;
pub mod summaries;
pub mod sync;
pub mod upload;

use tracing_subscriber::{fmt, EnvFilter};

pub use commands::messaging::{send_message, SendReceipt};
pub use config::ClientConfig;
pub use error::{ProfileError, SendError, UploadError};
pub use events::{MessageView, ViewEvent};
pub use state::{AppState, ChatView, ComposeState, PendingAttachment};

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the built-in filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley_demo=info,parley_client=debug,parley_media=info,parley_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
