//! Process-wide conversation memory store.
//!
//! Maps user identity to a bounded turn history. Slots are created lazily
//! on first reference and live as long as the store does; `clear` empties
//! a history without removing the slot.
//!
//! Locking: the outer `RwLock` only guards slot creation. Each user's
//! history sits behind its own `Mutex`, so operations on different user
//! keys never contend while same-user operations serialize — the turn
//! sequence is order-sensitive.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use troupe_core::conversation::{ConversationMemory, ConversationTurn, Role};

/// Shared handle to one user's history. Hold the lock across a whole
/// snapshot→append→trim sequence to keep the turn order coherent.
pub type MemoryHandle = Arc<Mutex<ConversationMemory>>;

/// Per-user conversation memory, shared by all assistant runtimes.
#[derive(Default)]
pub struct MemoryStore {
    memories: RwLock<HashMap<String, MemoryHandle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the user's memory handle, creating an empty one on first access.
    pub async fn get_or_create(&self, user_id: &str) -> MemoryHandle {
        {
            let memories = self.memories.read().await;
            if let Some(handle) = memories.get(user_id) {
                return Arc::clone(handle);
            }
        }

        let mut memories = self.memories.write().await;
        // Re-check: another task may have created the slot between locks.
        Arc::clone(
            memories
                .entry(user_id.to_string())
                .or_insert_with(|| {
                    debug!(user = %user_id, "Creating conversation memory");
                    Arc::new(Mutex::new(ConversationMemory::new()))
                }),
        )
    }

    /// Record one turn at the end of the user's history.
    pub async fn append(&self, user_id: &str, role: Role, text: &str) {
        let handle = self.get_or_create(user_id).await;
        let mut memory = handle.lock().await;
        memory.record(role, text);
    }

    /// Retain only the most recent `2 × max_turns` entries for the user.
    pub async fn trim(&self, user_id: &str, max_turns: usize) {
        let handle = self.get_or_create(user_id).await;
        let mut memory = handle.lock().await;
        memory.trim_to(max_turns);
    }

    /// Empty the user's history without removing their slot.
    pub async fn clear(&self, user_id: &str) {
        let memories = self.memories.read().await;
        if let Some(handle) = memories.get(user_id) {
            handle.lock().await.clear();
            debug!(user = %user_id, "Cleared conversation memory");
        }
    }

    /// Snapshot the user's current turns, oldest first. Empty for users
    /// never seen.
    pub async fn snapshot(&self, user_id: &str) -> Vec<ConversationTurn> {
        let memories = self.memories.read().await;
        match memories.get(user_id) {
            Some(handle) => handle.lock().await.turns().to_vec(),
            None => Vec::new(),
        }
    }

    /// Number of entries in the user's history (0 for users never seen).
    pub async fn len(&self, user_id: &str) -> usize {
        let memories = self.memories.read().await;
        match memories.get(user_id) {
            Some(handle) => handle.lock().await.len(),
            None => 0,
        }
    }

    /// Number of user slots in the store.
    pub async fn user_count(&self) -> usize {
        self.memories.read().await.len()
    }
}
