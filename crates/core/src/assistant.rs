//! Assistant persona definitions and output-format configuration.

use serde::{Deserialize, Serialize};

/// Configuration snapshot for one assistant persona, as loaded from the
/// external configuration store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantDefinition {
    /// Unique assistant name
    pub name: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Base system prompt template. May contain `{history}`/`{input}`
    /// placeholders plus free-form `{variable}` slots; composition leaves
    /// them untouched — they belong to upstream template generation.
    pub prompt_template: String,

    /// Whether turns through this assistant are persisted to the user's
    /// history. This is a write policy only: a supplied history slice is
    /// still visible to the model either way.
    #[serde(default = "default_true")]
    pub memory: bool,

    /// Inactive assistants are skipped at load time.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl AssistantDefinition {
    /// Create a definition with defaults for everything but name and template.
    pub fn new(name: impl Into<String>, prompt_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            prompt_template: prompt_template.into(),
            memory: true,
            active: true,
        }
    }

    pub fn with_memory(mut self, enabled: bool) -> Self {
        self.memory = enabled;
        self
    }
}

/// How the raw model output is shaped into the canonical reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputFormat {
    /// Raw text passes through unchanged
    #[default]
    None,
    /// Extract a JSON reply (whole-text or fenced block), falling back to
    /// pass-through
    Json,
    /// Extract a declared field set from a JSON reply
    Structured(StructuredSchema),
}

/// The declared field set for structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredSchema {
    /// Ordered fields; order drives the generated format instructions.
    pub fields: Vec<FieldSpec>,
}

/// One named field with the description shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

impl Default for StructuredSchema {
    /// The stock reply envelope: the reply text plus sentiment and keyword
    /// annotations.
    fn default() -> Self {
        Self {
            fields: vec![
                FieldSpec::new("response", "the reply text shown to the user"),
                FieldSpec::new("sentiment", "overall sentiment of the reply: positive, neutral, or negative"),
                FieldSpec::new("keywords", "a short list of topic keywords for the reply"),
            ],
        }
    }
}
