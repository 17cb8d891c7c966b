//! Effects produced by state transitions

use super::state::{StopReason, TurnMessage};
use std::time::Duration;

/// Everything the inference client needs for one persona-turn
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub system_prompt: String,
    /// Never empty
    pub context: Vec<TurnMessage>,
    pub persona_id: String,
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start an inference call (spawns as background task)
    RequestInference {
        request_id: u64,
        request: InferenceRequest,
    },

    /// Fire a `TurnDue` for `generation` after `delay`
    ScheduleTurn { delay: Duration, generation: u64 },

    /// Drop any pending scheduled turn
    CancelScheduledTurn,

    /// Notify connected clients of an appended message
    PublishMessage { message: TurnMessage },

    /// Notify connected clients of the new state
    PublishState,

    /// Notify connected clients that a persona passed
    NotifyTurnSkipped { persona_id: String },

    /// Notify connected clients that the conversation ended
    NotifyConversationDone { reason: StopReason },

    /// Notify connected clients of an unrecoverable error
    NotifyTerminalError { message: String },
}

impl Effect {
    pub fn request_inference(request_id: u64, request: InferenceRequest) -> Self {
        Effect::RequestInference {
            request_id,
            request,
        }
    }

    pub fn schedule_turn(delay: Duration, generation: u64) -> Self {
        Effect::ScheduleTurn { delay, generation }
    }

    pub fn publish_message(message: TurnMessage) -> Self {
        Effect::PublishMessage { message }
    }

    pub fn turn_skipped(persona_id: impl Into<String>) -> Self {
        Effect::NotifyTurnSkipped {
            persona_id: persona_id.into(),
        }
    }

    pub fn conversation_done(reason: StopReason) -> Self {
        Effect::NotifyConversationDone { reason }
    }
}
