//! Engine registry — turns engine configuration records into model handles.
//!
//! Vendor selection is a closed classification over the engine *name*, not
//! duck-typed dispatch: each rule is a case-insensitive substring match,
//! evaluated in a fixed priority order, first match wins.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use troupe_core::error::{ConfigurationError, NotFoundError};
use troupe_core::model::{EngineConfig, ModelHandle};

use crate::anthropic::AnthropicModel;
use crate::gemini::GeminiModel;
use crate::openai_compat::OpenAiCompatModel;

/// The closed set of backend shapes an engine name can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    /// Native Anthropic Messages API (`x-api-key`, top-level system prompt)
    Anthropic,
    /// Gemini `generateContent` API (`x-goog-api-key`, systemInstruction)
    Gemini,
    /// Generic OpenAI-compatible `/chat/completions` endpoint
    OpenAiCompat,
}

impl Vendor {
    /// Classify an engine name into a vendor shape.
    ///
    /// Priority order, first match wins:
    /// 1. `claude` or `anthropic` → [`Vendor::Anthropic`]
    /// 2. `gemini` → [`Vendor::Gemini`]
    /// 3. anything else → [`Vendor::OpenAiCompat`]
    ///
    /// A name carrying tokens for two vendors (e.g. "claude-gemini-proxy")
    /// resolves by rule order: Anthropic wins.
    pub fn classify(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.contains("claude") || lower.contains("anthropic") {
            Vendor::Anthropic
        } else if lower.contains("gemini") {
            Vendor::Gemini
        } else {
            Vendor::OpenAiCompat
        }
    }

    /// Human-readable shape name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Vendor::Anthropic => "Anthropic",
            Vendor::Gemini => "Gemini",
            Vendor::OpenAiCompat => "OpenAI-compatible",
        }
    }
}

/// Holds the configured backend handles, keyed by engine name.
///
/// Registration is idempotent per name: re-registering replaces the handle.
/// Handles are shared read-only with assistant runtimes that reference
/// them by name.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelHandle>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the vendor-shaped client for `config` and register it.
    ///
    /// Fails with [`ConfigurationError`] when the config lacks a field the
    /// resolved vendor shape requires; other registered engines are
    /// unaffected.
    pub fn register(
        &mut self,
        config: EngineConfig,
    ) -> Result<ModelHandle, ConfigurationError> {
        let vendor = Vendor::classify(&config.name);
        debug!(engine = %config.name, vendor = vendor.label(), "Registering engine");

        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConfigurationError::MissingField {
                engine: config.name.clone(),
                field: "api_key",
                vendor: vendor.label(),
            })?;

        let handle: ModelHandle = match vendor {
            Vendor::Anthropic => Arc::new(AnthropicModel::new(&config, api_key)),
            Vendor::Gemini => Arc::new(GeminiModel::new(&config, api_key)),
            Vendor::OpenAiCompat => {
                // No default endpoint exists for an unrecognized name.
                let base_url =
                    config
                        .base_url
                        .clone()
                        .ok_or_else(|| ConfigurationError::MissingField {
                            engine: config.name.clone(),
                            field: "base_url",
                            vendor: vendor.label(),
                        })?;
                Arc::new(OpenAiCompatModel::new(&config, api_key, base_url))
            }
        };

        info!(engine = %config.name, vendor = vendor.label(), "Engine registered");
        self.models.insert(config.name.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Register a pre-built handle under `name`, bypassing vendor
    /// classification. The hook for custom backends and test doubles.
    pub fn register_handle(&mut self, name: impl Into<String>, handle: ModelHandle) {
        self.models.insert(name.into(), handle);
    }

    /// Get the handle registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<ModelHandle, NotFoundError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| NotFoundError::Model(name.to_string()))
    }

    /// List all registered engine names.
    pub fn list(&self) -> Vec<&str> {
        self.models.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
