//! Gemini backend implementation.
//!
//! Uses the `generateContent` API:
//! - `x-goog-api-key` header authentication (keeps the key out of URLs and logs)
//! - System prompt as the `systemInstruction` field
//! - `user` / `model` role names in `contents`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use troupe_core::conversation::{ConversationTurn, Role};
use troupe_core::error::ModelError;
use troupe_core::model::{ChatModel, ChatRequest, EngineConfig};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini `generateContent` backend.
pub struct GeminiModel {
    name: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl GeminiModel {
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

    /// Convert the history plus the new user message to `contents` entries.
    /// Gemini calls the assistant side "model".
    fn to_contents(history: &[ConversationTurn], user_input: &str) -> Vec<Content> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    Role::User => "user".into(),
                    Role::Assistant => "model".into(),
                },
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        contents.push(Content {
            role: "user".into(),
            parts: vec![Part {
                text: user_input.to_string(),
            }],
        });

        contents
    }

    /// Join the text parts of the first candidate.
    fn extract_text(resp: &GenerateContentResponse) -> Result<String, ModelError> {
        let candidate = resp
            .candidates
            .first()
            .ok_or_else(|| ModelError::MalformedResponse("No candidates in response".into()))?;

        let mut text = String::new();
        for part in &candidate.content.parts {
            text.push_str(&part.text);
        }
        Ok(text)
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
impl ChatModel for GeminiModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ModelError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.name);

        let body = serde_json::json!({
            "systemInstruction": {
                "parts": [{"text": request.system_prompt}]
            },
            "contents": Self::to_contents(&request.history, &request.user_input),
            "generationConfig": {
                "temperature": self.temperature,
            },
        });

        debug!(engine = %self.name, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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
                "Invalid Gemini API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(engine = %self.name, status, body = %error_body, "Gemini API error");
            return Err(ModelError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| ModelError::MalformedResponse(format!(
                    "Failed to parse Gemini response: {e}"
                )))?;

        Self::extract_text(&api_resp)
    }
}

// --- Gemini API types ---

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}
