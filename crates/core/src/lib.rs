//! # Troupe Core
//!
//! Domain types, traits, and error definitions for the troupe conversation
//! orchestrator. This crate has **zero framework dependencies** — it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The model-backend seam is a trait here; vendor implementations live in
//! `troupe-engines`. This enables:
//! - Swapping backends via configuration (by engine name)
//! - Easy testing with mock/stub backends
//! - Clean dependency graph (all crates depend inward on core)

pub mod assistant;
pub mod conversation;
pub mod error;
pub mod model;

// Re-export key types at crate root for ergonomics
pub use assistant::{AssistantDefinition, FieldSpec, OutputFormat, StructuredSchema};
pub use conversation::{ConversationMemory, ConversationTurn, Role};
pub use error::{ConfigurationError, Error, ModelError, NotFoundError, Result};
pub use model::{ChatModel, ChatRequest, EngineConfig, ModelHandle};
