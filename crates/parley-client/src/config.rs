//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client runs with zero configuration.

use parley_shared::constants::{DEFAULT_TAGLINE, MEDIA_MESSAGE_PLACEHOLDER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint receiving attachment uploads.
    /// Env: `PARLEY_UPLOAD_URL`
    /// Default: none (attachments cannot be sent).
    pub upload_url: Option<String>,

    /// Shown when a profile has no tagline.
    /// Env: `PARLEY_DEFAULT_TAGLINE`
    /// Default: `"No tagline"`
    pub default_tagline: String,

    /// Chat-list summary text of messages without text.
    /// Env: `PARLEY_MEDIA_PLACEHOLDER`
    /// Default: `"Media message"`
    pub media_placeholder: String,

    /// Whether calls capture video in addition to audio.
    /// Env: `PARLEY_CALL_VIDEO` (true/false)
    /// Default: `false`
    pub call_video: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            upload_url: None,
            default_tagline: DEFAULT_TAGLINE.to_string(),
            media_placeholder: MEDIA_MESSAGE_PLACEHOLDER.to_string(),
            call_video: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("PARLEY_UPLOAD_URL") {
            let url = url.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                config.upload_url = Some(url.to_string());
            } else if !url.is_empty() {
                tracing::warn!(value = %url, "Invalid PARLEY_UPLOAD_URL, uploads disabled");
            }
        }

        if let Some(tagline) = lookup("PARLEY_DEFAULT_TAGLINE") {
            if !tagline.is_empty() {
                config.default_tagline = tagline;
            }
        }

        if let Some(placeholder) = lookup("PARLEY_MEDIA_PLACEHOLDER") {
            if !placeholder.is_empty() {
                config.media_placeholder = placeholder;
            }
        }

        if let Some(val) = lookup("PARLEY_CALL_VIDEO") {
            match val.as_str() {
                "true" | "1" => config.call_video = true,
                "false" | "0" => config.call_video = false,
                other => tracing::warn!(value = %other, "Invalid PARLEY_CALL_VIDEO, using default"),
            }
        }

        config
    }
}
