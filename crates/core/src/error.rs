//! Error types for the troupe domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all troupe operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Engine registration errors ---
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    // --- Lookup errors ---
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    // --- Model invocation errors ---
    #[error("Model invocation failed: {0}")]
    Model(#[from] ModelError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// An engine was registered without a field its resolved vendor shape needs.
///
/// Fatal only to that single registration; other engines are unaffected.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    #[error("Engine '{engine}' is missing required field '{field}' for the {vendor} API shape")]
    MissingField {
        engine: String,
        field: &'static str,
        vendor: &'static str,
    },
}

/// A referenced assistant or model name does not exist in its registry.
#[derive(Debug, Clone, Error)]
pub enum NotFoundError {
    #[error("Assistant not found: {0}")]
    Assistant(String),

    #[error("Model not found: {0}")]
    Model(String),
}

/// The bound model backend failed or timed out.
///
/// The caller sees the vendor's underlying failure detail; no retry happens
/// at the orchestration layer. The turn is never recorded on failure.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_displays_correctly() {
        let err = Error::Configuration(ConfigurationError::MissingField {
            engine: "qwen-max".into(),
            field: "base_url",
            vendor: "OpenAI-compatible",
        });
        assert!(err.to_string().contains("qwen-max"));
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn not_found_error_displays_correctly() {
        let err = Error::NotFound(NotFoundError::Assistant("coach".into()));
        assert!(err.to_string().contains("coach"));

        let err = Error::NotFound(NotFoundError::Model("gpt-x".into()));
        assert!(err.to_string().contains("gpt-x"));
    }

    #[test]
    fn model_error_displays_correctly() {
        let err = Error::Model(ModelError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }
}
