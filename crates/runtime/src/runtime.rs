//! Assistant runtime — one persona coupled to its bound model backend.
//!
//! The runtime carries the persona's mutable state (active language,
//! output format, bound model, prompt template) plus the composed system
//! prompt derived from it. Every setter marks the composed prompt stale;
//! `invoke` recomposes lazily before use. The runtime never writes to
//! conversation memory — the persistence decision belongs to the
//! orchestrator.

use tracing::debug;
use troupe_core::assistant::{AssistantDefinition, OutputFormat};
use troupe_core::conversation::ConversationTurn;
use troupe_core::error::ModelError;
use troupe_core::model::{ChatRequest, ModelHandle};

use crate::composer::compose;
use crate::normalizer::normalize;

/// One assistant persona bound to a model backend.
pub struct AssistantRuntime {
    definition: AssistantDefinition,
    language: String,
    output_format: OutputFormat,
    model_name: String,
    model: ModelHandle,
    /// Cached composed system prompt; `None` means stale.
    composed: Option<String>,
}

impl AssistantRuntime {
    /// Create a runtime for `definition` bound to the given handle.
    pub fn new(
        definition: AssistantDefinition,
        model_name: impl Into<String>,
        model: ModelHandle,
        language: impl Into<String>,
    ) -> Self {
        Self {
            definition,
            language: language.into(),
            output_format: OutputFormat::None,
            model_name: model_name.into(),
            model,
            composed: None,
        }
    }

    /// Rebind the runtime to a different model backend.
    pub fn set_model(&mut self, model_name: impl Into<String>, model: ModelHandle) {
        self.model_name = model_name.into();
        self.model = model;
        self.composed = None;
    }

    /// Switch the active language directive.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
        self.composed = None;
    }

    /// Switch the active output format.
    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = format;
        self.composed = None;
    }

    /// Replace the base prompt template.
    pub fn set_prompt_template(&mut self, template: impl Into<String>) {
        self.definition.prompt_template = template.into();
        self.composed = None;
    }

    /// Execute one turn: recompose the system prompt if stale, complete
    /// against the bound backend with the supplied (read-only) history
    /// slice, and normalize the result.
    pub async fn invoke(
        &mut self,
        user_input: &str,
        history: &[ConversationTurn],
    ) -> Result<String, ModelError> {
        let definition = &self.definition;
        let language = &self.language;
        let output_format = &self.output_format;
        let system_prompt = self
            .composed
            .get_or_insert_with(|| {
                debug!(assistant = %definition.name, "Recomposing system prompt");
                compose(&definition.prompt_template, language, output_format)
            })
            .clone();

        let request = ChatRequest {
            system_prompt,
            history: history.to_vec(),
            user_input: user_input.to_string(),
        };

        let raw = self.model.complete(request).await?;
        Ok(normalize(&raw, &self.output_format))
    }

    /// Whether turns through this assistant are persisted.
    pub fn memory_enabled(&self) -> bool {
        self.definition.memory
    }

    /// The assistant's name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The name of the currently bound model.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Whether the composed prompt needs recomposition.
    pub fn prompt_stale(&self) -> bool {
        self.composed.is_none()
    }
}
