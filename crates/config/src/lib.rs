//! Configuration loading and validation for troupe.
//!
//! Loads `troupe.toml` with environment variable overrides for API keys.
//! The file is the "initial load" interface to the external configuration
//! store: engine and assistant records are read once at startup and never
//! written back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use troupe_core::assistant::AssistantDefinition;
use troupe_core::model::EngineConfig;

/// The root configuration structure.
///
/// Maps directly to `troupe.toml`:
///
/// ```toml
/// [orchestrator]
/// max_turns = 10
/// default_language = "en"
/// default_model = "qwen-max"
///
/// [[engines]]
/// name = "qwen-max"
/// api_key = "sk-..."
/// base_url = "https://dashscope.aliyuncs.com/compatible-mode/v1"
///
/// [[assistants]]
/// name = "coach"
/// prompt_template = "You are a supportive coach."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroupeConfig {
    /// Orchestrator-level settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Model backend records
    #[serde(default)]
    pub engines: Vec<EngineConfig>,

    /// Assistant persona records
    #[serde(default)]
    pub assistants: Vec<AssistantDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-user history bound, in conversational turns (entries are 2×this)
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Language directive applied when no override is present
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Engine every assistant is bound to at load time, unless stated
    /// otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

fn default_max_turns() -> usize {
    10
}

fn default_language() -> String {
    "en".into()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            default_language: default_language(),
            default_model: None,
        }
    }
}

impl Default for TroupeConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            engines: vec![],
            assistants: vec![],
        }
    }
}

impl TroupeConfig {
    /// Load configuration from `troupe.toml` in the current directory.
    ///
    /// API keys missing from the file are filled from the environment:
    /// a per-engine `<NAME>_API_KEY` first, then `TROUPE_API_KEY`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(Path::new("troupe.toml"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Fill missing engine API keys from the environment.
    pub fn apply_env_overrides(&mut self) {
        for engine in &mut self.engines {
            if engine.api_key.is_some() {
                continue;
            }
            let per_engine = format!("{}_API_KEY", env_var_name(&engine.name));
            engine.api_key = std::env::var(&per_engine)
                .ok()
                .or_else(|| std::env::var("TROUPE_API_KEY").ok());
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        for engine in &self.engines {
            if engine.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "engine name must not be empty".into(),
                ));
            }
            if engine.temperature < 0.0 || engine.temperature > 2.0 {
                return Err(ConfigError::ValidationError(format!(
                    "engine '{}': temperature must be between 0.0 and 2.0",
                    engine.name
                )));
            }
        }

        for assistant in &self.assistants {
            if assistant.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "assistant name must not be empty".into(),
                ));
            }
        }

        if self.orchestrator.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_turns must be at least 1".into(),
            ));
        }

        if !self.assistants.is_empty() && self.orchestrator.default_model.is_none() {
            return Err(ConfigError::ValidationError(
                "assistants are configured but orchestrator.default_model is not set".into(),
            ));
        }

        Ok(())
    }
}

/// Uppercase an engine name into an environment variable prefix:
/// `qwen-max` → `QWEN_MAX`.
fn env_var_name(engine_name: &str) -> String {
    engine_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
