//! Anthropic native backend implementation.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible proxy):
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - `max_tokens` is mandatory in the request body

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use troupe_core::conversation::{ConversationTurn, Role};
use troupe_core::error::ModelError;
use troupe_core::model::{ChatModel, ChatRequest, EngineConfig};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API backend.
pub struct AnthropicModel {
    name: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl AnthropicModel {
    /// Create a backend from an engine config and its resolved API key.
    pub fn new(config: &EngineConfig, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());

        Self {
            name: config.name.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            client,
        }
    }

    /// Convert the history plus the new user message to API messages.
    /// The system prompt is a top-level field, never part of this list.
    fn to_api_messages(history: &[ConversationTurn], user_input: &str) -> Vec<ApiMessage> {
        let mut messages: Vec<ApiMessage> = history
            .iter()
            .map(|turn| ApiMessage {
                role: match turn.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: turn.text.clone(),
            })
            .collect();

        messages.push(ApiMessage {
            role: "user".into(),
            content: user_input.to_string(),
        });

        messages
    }

    /// Join the text content blocks of a response.
    fn extract_text(resp: &MessagesResponse) -> String {
        let mut text = String::new();
        for block in &resp.content {
            if let ContentBlock::Text { text: t } = block {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(t);
            }
        }
        text
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
impl ChatModel for AnthropicModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);

        let body = serde_json::json!({
            "model": self.name,
            "messages": Self::to_api_messages(&request.history, &request.user_input),
            "max_tokens": DEFAULT_MAX_TOKENS,
            "temperature": self.temperature,
            "system": request.system_prompt,
        });

        debug!(engine = %self.name, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(engine = %self.name, status, body = %error_body, "Anthropic API error");
            return Err(ModelError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| ModelError::MalformedResponse(format!(
                    "Failed to parse Anthropic response: {e}"
                )))?;

        Ok(Self::extract_text(&api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Role, text: &str, position: u64) -> ConversationTurn {
        ConversationTurn {
            role,
            text: text.into(),
            position,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn constructor_defaults() {
        let config = EngineConfig::named("claude-sonnet-4");
        let model = AnthropicModel::new(&config, "sk-ant-test");
        assert_eq!(model.name(), "claude-sonnet-4");
        assert_eq!(model.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_custom_base_url_trims_slash() {
        let config =
            EngineConfig::named("claude-sonnet-4").with_base_url("https://proxy.example.com/");
        let model = AnthropicModel::new(&config, "sk-ant-test");
        assert_eq!(model.base_url, "https://proxy.example.com");
    }

    #[test]
    fn message_conversion_appends_user_input() {
        let history = vec![
            turn(Role::User, "Hello", 0),
            turn(Role::Assistant, "Hi!", 1),
        ];
        let messages = AnthropicModel::to_api_messages(&history, "How are you?");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content, "How are you?");
    }

    #[test]
    fn parse_text_response() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-sonnet-4",
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }"#,
        )
        .unwrap();
        assert_eq!(AnthropicModel::extract_text(&resp), "Hello!");
    }

    #[test]
    fn parse_response_joins_text_blocks() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "content": [
                    {"type": "text", "text": "Part one."},
                    {"type": "tool_use", "id": "x", "name": "y", "input": {}},
                    {"type": "text", "text": "Part two."}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(AnthropicModel::extract_text(&resp), "Part one.\nPart two.");
    }
}
