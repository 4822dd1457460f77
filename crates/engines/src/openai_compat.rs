//! OpenAI-compatible backend implementation.
//!
//! Works with any endpoint exposing `/chat/completions`: DashScope (qwen),
//! DeepSeek, OpenAI itself, local gateways like Ollama and vLLM. This is
//! the fallback shape for engine names no vendor rule recognizes, so the
//! endpoint must be configured explicitly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use troupe_core::conversation::{ConversationTurn, Role};
use troupe_core::error::ModelError;
use troupe_core::model::{ChatModel, ChatRequest, EngineConfig};

/// Generic `/chat/completions` backend with Bearer auth.
pub struct OpenAiCompatModel {
    name: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    /// Create a backend from an engine config, its resolved API key, and
    /// the mandatory endpoint base URL.
    pub fn new(
        config: &EngineConfig,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: config.name.clone(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            client,
        }
    }

    /// Convert to API messages: system prompt first, then the history,
    /// then the new user message.
    fn to_api_messages(request: &ChatRequest) -> Vec<ApiMessage> {
        let mut messages = vec![ApiMessage {
            role: "system".into(),
            content: request.system_prompt.clone(),
        }];

        messages.extend(request.history.iter().map(|turn: &ConversationTurn| {
            ApiMessage {
                role: match turn.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: turn.text.clone(),
            }
        }));

        messages.push(ApiMessage {
            role: "user".into(),
            content: request.user_input.clone(),
        });

        messages
    }

    fn map_request_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else {
            ModelError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": self.name,
            "messages": Self::to_api_messages(&request),
            "temperature": self.temperature,
            "stream": false,
        });

        debug!(engine = %self.name, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ModelError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(engine = %self.name, status, body = %error_body, "Backend returned error");
            return Err(ModelError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: CompletionResponse =
            response
                .json()
                .await
                .map_err(|e| ModelError::MalformedResponse(format!(
                    "Failed to parse response: {e}"
                )))?;

        let choice = api_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::MalformedResponse("No choices in response".into()))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}
