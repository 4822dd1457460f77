//! Conversation domain types.
//!
//! A turn is one message from either side of the conversation; a
//! `ConversationMemory` is a user's ordered, size-bounded turn history.
//! Memories are the only stateful value object in the domain: turns are
//! immutable once recorded, and trimming is the only path that removes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The side of the conversation a turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant persona
    Assistant,
}

/// A single recorded message in a user's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who produced this turn
    pub role: Role,

    /// The text content
    pub text: String,

    /// Logical position in the user's history. Assigned by the memory when
    /// the turn is recorded; monotonically increasing, never reused, so
    /// positions stay meaningful after old turns are evicted.
    pub position: u64,

    /// When the turn was recorded
    pub created_at: DateTime<Utc>,
}

/// A user's ordered turn history, bounded to `2 × max_turns` entries
/// (one user + one assistant entry per conversational turn).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
    next_position: u64,
}

impl ConversationMemory {
    /// Create a new empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new turn at the end of the history.
    pub fn record(&mut self, role: Role, text: impl Into<String>) -> &ConversationTurn {
        let turn = ConversationTurn {
            role,
            text: text.into(),
            position: self.next_position,
            created_at: Utc::now(),
        };
        self.next_position += 1;
        self.turns.push(turn);
        self.turns.last().expect("just pushed")
    }

    /// Retain only the most recent `2 × max_turns` entries, dropping the
    /// oldest first. Positions of the survivors are untouched.
    pub fn trim_to(&mut self, max_turns: usize) {
        let bound = max_turns * 2;
        if self.turns.len() > bound {
            self.turns.drain(..self.turns.len() - bound);
        }
    }

    /// Empty the history. The memory itself (and its position counter)
    /// survives, so a cleared user keeps their slot.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// The recorded turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
