//! ChatModel trait — the abstraction over model backends.
//!
//! A ChatModel knows how to send one system prompt, a bounded history
//! slice, and a new user message to a completion endpoint and hand back
//! the generated text. Implementations: Anthropic, Gemini, and any
//! OpenAI-compatible endpoint (see `troupe-engines`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::conversation::ConversationTurn;
use crate::error::ModelError;

/// Configuration record for one model backend, as loaded from the
/// external configuration store. Immutable once registered; the registry
/// owns it for its process lifetime.
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Unique engine name; also the model identifier sent to the vendor
    /// (e.g. "claude-sonnet-4", "gemini-2.0-flash", "qwen-max").
    pub name: String,

    /// Vendor API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Endpoint base URL. Recognized vendors have a default; the
    /// OpenAI-compatible fallback shape requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature forwarded on every request
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request deadline; elapsed deadlines surface as
    /// `ModelError::Timeout`.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    120
}

impl EngineConfig {
    /// Create a config with defaults for everything but the name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// One completion call: the composed system prompt, the user's bounded
/// history (read-only at this point), and the new message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub history: Vec<ConversationTurn>,
    pub user_input: String,
}

/// The core ChatModel trait.
///
/// Every backend implements this. The assistant runtime calls `complete()`
/// without knowing which vendor is behind the handle — pure polymorphism.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// The engine name this handle was registered under.
    fn name(&self) -> &str;

    /// Send one completion request and get the generated text.
    async fn complete(&self, request: ChatRequest) -> std::result::Result<String, ModelError>;
}

/// Shared, read-only capability handle to a registered backend.
pub type ModelHandle = Arc<dyn ChatModel>;
