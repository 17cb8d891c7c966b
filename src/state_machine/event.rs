//! Events that can occur in a conversation

use crate::llm::LlmError;
use crate::persona::Persona;
use chrono::{DateTime, Utc};
use std::time::Instant;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Caller commands
    Start {
        conversation_id: String,
        started_at: DateTime<Utc>,
        topic: String,
        participants: Vec<Persona>,
        max_turns: u32,
    },
    Stop,

    // Scheduler
    /// A scheduled turn evaluation fired. `roll` is a uniform draw in [0, 1)
    /// used for the skip decision.
    TurnDue {
        generation: u64,
        roll: f64,
        now: Instant,
    },

    // Inference completions
    InferenceSucceeded {
        request_id: u64,
        content: String,
        now: Instant,
    },
    InferenceFailed {
        request_id: u64,
        error: LlmError,
    },
}
