//! Conversation state types

use crate::llm::MessageRole;
use crate::persona::Persona;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Fewest personas a conversation can run with
pub const MIN_PARTICIPANTS: usize = 2;
/// Most personas a conversation can run with
pub const MAX_PARTICIPANTS: usize = 4;
/// Upper bound on the per-participant turn limit
pub const MAX_TURNS: u32 = 20;
/// Turn limit when the caller does not pick one
pub const DEFAULT_MAX_TURNS: u32 = 5;

pub const DEFAULT_TURN_GAP: Duration = Duration::from_millis(2000);
pub const DEFAULT_MAX_FAILURES: u32 = 3;
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;
pub const DEFAULT_FACT_CHECKER_ID: &str = "factchecker";

// ============================================================================
// Transcript
// ============================================================================

/// One entry of the conversation transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnMessage {
    pub role: MessageRole,
    pub content: String,
    /// Persona that authored the message; `None` for the opening system message
    pub speaker_persona_id: Option<String>,
    /// Per-conversation logical clock, 0 for the opening message
    pub created_at: u64,
}

// ============================================================================
// Conversation Status
// ============================================================================

/// Why a conversation ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// The caller asked for it
    UserStopped,
    /// The message cap was reached
    Completed,
    /// Inference kept failing, or a turn could not be prepared
    Failed { message: String },
}

/// Orchestrator status
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvStatus {
    /// No conversation has been started
    #[default]
    Idle,

    /// Running, waiting for the next scheduled turn
    Active,

    /// Exactly one inference call is in flight
    AwaitingResponse {
        request_id: u64,
        persona_id: String,
        /// Display name the reply will be addressed to
        addressee: Option<String>,
    },

    /// Terminal until the next start
    Stopped { reason: StopReason },
}

impl ConvStatus {
    /// Active or awaiting a reply
    pub fn is_running(&self) -> bool {
        matches!(self, ConvStatus::Active | ConvStatus::AwaitingResponse { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConvStatus::Idle => "idle",
            ConvStatus::Active => "active",
            ConvStatus::AwaitingResponse { .. } => "awaiting_response",
            ConvStatus::Stopped { .. } => "stopped",
        }
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// The orchestrator's single mutable aggregate
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub conversation_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub topic: String,
    pub participants: Vec<Persona>,
    pub history: Vec<TurnMessage>,
    pub current_index: usize,
    /// Full participant cycles, counted when the index wraps. Informational.
    pub turns_completed: u32,
    /// Assistant messages appended; capped at `max_messages()`
    pub messages_appended: u32,
    pub max_turns: u32,
    pub status: ConvStatus,
    /// When the last assistant message was appended
    pub last_message_at: Option<Instant>,
    /// Inference failures on the current persona-turn
    pub consecutive_failures: u32,
    /// Bumped on every start and stop; scheduled turns carry the value they
    /// were scheduled under
    pub generation: u64,
    /// Monotonic across conversations so late replies never match
    pub next_request_id: u64,
    pub logical_clock: u64,
}

impl ConversationState {
    pub fn max_messages(&self) -> u32 {
        let participants = u32::try_from(self.participants.len()).unwrap_or(u32::MAX);
        self.max_turns.saturating_mul(participants)
    }

    pub fn current_persona(&self) -> Option<&Persona> {
        self.participants.get(self.current_index)
    }

    pub fn participant(&self, id: &str) -> Option<&Persona> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Move the turn pointer to the next participant
    pub fn advance_turn(&mut self) {
        if self.participants.is_empty() {
            return;
        }
        self.current_index = (self.current_index + 1) % self.participants.len();
        if self.current_index == 0 {
            self.turns_completed += 1;
        }
    }

    /// Append a message stamped with the next logical time
    pub fn append(
        &mut self,
        role: MessageRole,
        content: String,
        speaker_persona_id: Option<String>,
    ) -> TurnMessage {
        let message = TurnMessage {
            role,
            content,
            speaker_persona_id,
            created_at: self.logical_clock,
        };
        self.logical_clock += 1;
        self.history.push(message.clone());
        message
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            conversation_id: self.conversation_id.clone(),
            started_at: self.started_at,
            topic: self.topic.clone(),
            status: self.status.clone(),
            participants: self.participants.iter().map(ParticipantView::from).collect(),
            history: self.history.clone(),
            current_speaker: if self.status.is_running() {
                self.current_persona().map(|p| p.id.clone())
            } else {
                None
            },
            turns_completed: self.turns_completed,
            messages_appended: self.messages_appended,
            max_turns: self.max_turns,
            max_messages: self.max_messages(),
            consecutive_failures: self.consecutive_failures,
        }
    }
}

/// Public face of a participant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantView {
    pub id: String,
    pub name: String,
    pub avatar: String,
}

impl From<&Persona> for ParticipantView {
    fn from(persona: &Persona) -> Self {
        Self {
            id: persona.id.clone(),
            name: persona.display_name.clone(),
            avatar: persona.avatar_glyph.clone(),
        }
    }
}

/// Serializable view of the conversation for clients
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct ConversationSnapshot {
    pub conversation_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub topic: String,
    pub status: ConvStatus,
    pub participants: Vec<ParticipantView>,
    pub history: Vec<TurnMessage>,
    pub current_speaker: Option<String>,
    pub turns_completed: u32,
    pub messages_appended: u32,
    pub max_turns: u32,
    pub max_messages: u32,
    pub consecutive_failures: u32,
}

// ============================================================================
// Context
// ============================================================================

/// Orchestrator settings (immutable configuration)
#[derive(Debug, Clone)]
pub struct ConvContext {
    /// Floor between consecutive assistant messages
    pub min_turn_gap: Duration,
    /// Failures on one persona-turn before the conversation stops
    pub max_consecutive_failures: u32,
    /// Messages of history sent with each request
    pub context_window: usize,
    /// Persona that gets the fact-checking prompt and context
    pub fact_checker_id: String,
}

impl Default for ConvContext {
    fn default() -> Self {
        Self {
            min_turn_gap: DEFAULT_TURN_GAP,
            max_consecutive_failures: DEFAULT_MAX_FAILURES,
            context_window: DEFAULT_CONTEXT_WINDOW,
            fact_checker_id: DEFAULT_FACT_CHECKER_ID.to_string(),
        }
    }
}
