//! Model-backend implementations for troupe.
//!
//! All backends implement the `troupe_core::ChatModel` trait.
//! The registry classifies the configured engine name against a fixed
//! vendor priority list and builds the matching client shape.

pub mod anthropic;
pub mod gemini;
pub mod openai_compat;
pub mod registry;

pub use anthropic::AnthropicModel;
pub use gemini::GeminiModel;
pub use openai_compat::OpenAiCompatModel;
pub use registry::{ModelRegistry, Vendor};
