//! API request and response types

use crate::persona::Persona;
use crate::state_machine::ConversationSnapshot;
use serde::{Deserialize, Serialize};

/// Request to start a conversation
#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    #[serde(default)]
    pub topic: String,
    /// Persona ids in speaking order; two random personas when omitted
    pub participants: Option<Vec<String>>,
    pub max_turns: Option<u32>,
}

/// Query for a random persona subset
#[derive(Debug, Deserialize)]
pub struct RandomPersonasQuery {
    pub count: Option<usize>,
}

/// Response with a list of personas
#[derive(Debug, Serialize)]
pub struct PersonasResponse {
    pub personas: Vec<Persona>,
}

/// Response with the current conversation
#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub conversation: ConversationSnapshot,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
