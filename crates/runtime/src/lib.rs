//! The conversation orchestration layer — the heart of troupe.
//!
//! One inbound call flows through:
//!
//! 1. **Resolve** the named assistant runtime (and any per-call overrides)
//! 2. **Compose** the effective system prompt if stale (base template +
//!    language directive + output-format instructions)
//! 3. **Complete** against the bound model backend with the user's bounded
//!    history slice and the new message
//! 4. **Normalize** the raw output into the canonical reply string
//! 5. **Record** the turn pair into the user's memory and trim — only for
//!    memory-enabled assistants, and only after the call succeeded
//!
//! The orchestrator is built once per process and injected into the
//! request-handling layer; history lives as long as the orchestrator does.

pub mod composer;
pub mod memory;
pub mod normalizer;
pub mod orchestrator;
pub mod runtime;

pub use composer::{compose, render_template};
pub use memory::{MemoryHandle, MemoryStore};
pub use normalizer::normalize;
pub use orchestrator::{InvokeOverrides, Orchestrator};
pub use runtime::AssistantRuntime;
