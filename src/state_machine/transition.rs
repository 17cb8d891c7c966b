//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same new
//! state and effects. Randomness and time arrive inside events.

use super::effect::Effect;
#[cfg(test)]
use super::effect::InferenceRequest;
use super::event::Event;
use super::state::{
    ConvContext, ConvStatus, ConversationState, StopReason, MAX_PARTICIPANTS, MAX_TURNS,
    MIN_PARTICIPANTS,
};
use super::turn::{pacing_delay, prepare_turn};
use crate::llm::{LlmError, MessageRole};
use crate::persona::{Persona, PersonaError};
use crate::sanitize::{prefix_mention, sanitize_response};
use crate::system_prompt::build_system_prompt;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    /// No state change, nothing to do
    fn unchanged(state: &ConversationState) -> Self {
        Self::new(state.clone())
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransitionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error(transparent)]
    InvalidPersona(#[from] PersonaError),
    #[error("A conversation is already in progress (stop it first)")]
    ConversationInProgress,
    #[error("No conversation has been started")]
    NotStarted,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    state: &ConversationState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (&state.status, event) {
        // ============================================================
        // Start
        // ============================================================
        (
            ConvStatus::Idle | ConvStatus::Stopped { .. },
            Event::Start {
                conversation_id,
                started_at,
                topic,
                participants,
                max_turns,
            },
        ) => {
            let topic = validate_start(context, &topic, &participants, max_turns)?;
            Ok(start_conversation(
                state,
                conversation_id,
                started_at,
                topic,
                participants,
                max_turns,
            ))
        }

        (ConvStatus::Active | ConvStatus::AwaitingResponse { .. }, Event::Start { .. }) => {
            Err(TransitionError::ConversationInProgress)
        }

        // ============================================================
        // Stop
        // ============================================================
        (ConvStatus::Idle, Event::Stop) => Err(TransitionError::NotStarted),

        // Already stopped by the user: idempotent
        (
            ConvStatus::Stopped {
                reason: StopReason::UserStopped,
            },
            Event::Stop,
        ) => Ok(TransitionResult::unchanged(state)),

        // Finished on its own: the transcript is still shown until stopped
        (ConvStatus::Stopped { .. }, Event::Stop) => {
            Ok(TransitionResult::new(stopped_by_user(state)).with_effect(Effect::PublishState))
        }

        (ConvStatus::Active | ConvStatus::AwaitingResponse { .. }, Event::Stop) => {
            Ok(TransitionResult::new(stopped_by_user(state))
                .with_effect(Effect::CancelScheduledTurn)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::conversation_done(StopReason::UserStopped)))
        }

        // ============================================================
        // Turn evaluation
        // ============================================================
        (ConvStatus::Active, Event::TurnDue { generation, roll, now })
            if generation == state.generation =>
        {
            Ok(evaluate_turn(state, context, roll, now))
        }

        // Two live timers for one conversation would allow two calls in flight
        (ConvStatus::AwaitingResponse { request_id, .. }, Event::TurnDue { generation, .. })
            if generation == state.generation =>
        {
            Err(TransitionError::InvalidTransition(format!(
                "turn fired while request {request_id} is in flight"
            )))
        }

        // Stale timer from an earlier generation, or nothing running
        (_, Event::TurnDue { .. }) => Ok(TransitionResult::unchanged(state)),

        // ============================================================
        // Inference results
        // ============================================================
        (
            ConvStatus::AwaitingResponse {
                request_id,
                persona_id,
                addressee,
            },
            Event::InferenceSucceeded {
                request_id: reply_id,
                content,
                now,
            },
        ) if *request_id == reply_id => {
            let text = sanitize_response(&content);
            if text.is_empty() {
                return Ok(handle_failure(
                    state,
                    context,
                    &LlmError::malformed("Reply was empty after cleanup"),
                ));
            }
            let text = prefix_mention(&text, addressee.as_deref());
            Ok(handle_success(state, context, persona_id.clone(), text, now))
        }

        (
            ConvStatus::AwaitingResponse { request_id, .. },
            Event::InferenceFailed {
                request_id: reply_id,
                error,
            },
        ) if *request_id == reply_id => Ok(handle_failure(state, context, &error)),

        // Late reply: stopped meanwhile, or from an earlier request
        (_, Event::InferenceSucceeded { .. } | Event::InferenceFailed { .. }) => {
            Ok(TransitionResult::unchanged(state))
        }
    }
}

/// Check start parameters, returning the trimmed topic
fn validate_start(
    context: &ConvContext,
    topic: &str,
    participants: &[Persona],
    max_turns: u32,
) -> Result<String, TransitionError> {
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(invalid("topic must not be empty"));
    }
    if participants.len() < MIN_PARTICIPANTS {
        return Err(invalid(format!(
            "at least {MIN_PARTICIPANTS} participants are required, got {}",
            participants.len()
        )));
    }
    if participants.len() > MAX_PARTICIPANTS {
        return Err(invalid(format!(
            "at most {MAX_PARTICIPANTS} participants are allowed, got {}",
            participants.len()
        )));
    }

    let mut seen = HashSet::new();
    for persona in participants {
        if !seen.insert(persona.id.as_str()) {
            return Err(invalid(format!("persona {:?} is listed twice", persona.id)));
        }
    }

    if !(1..=MAX_TURNS).contains(&max_turns) {
        return Err(invalid(format!(
            "max_turns must be between 1 and {MAX_TURNS}, got {max_turns}"
        )));
    }

    if participants.iter().all(Persona::always_skips) {
        return Err(invalid("every participant always skips its turn"));
    }

    for persona in participants {
        build_system_prompt(persona, topic, &context.fact_checker_id)?;
    }

    Ok(topic.to_string())
}

/// Clear the transcript and invalidate any pending timer or reply
fn stopped_by_user(state: &ConversationState) -> ConversationState {
    let mut new_state = state.clone();
    new_state.history.clear();
    new_state.generation += 1;
    new_state.consecutive_failures = 0;
    new_state.status = ConvStatus::Stopped {
        reason: StopReason::UserStopped,
    };
    new_state
}

fn invalid(message: impl Into<String>) -> TransitionError {
    TransitionError::InvalidConfiguration(message.into())
}

fn start_conversation(
    state: &ConversationState,
    conversation_id: String,
    started_at: DateTime<Utc>,
    topic: String,
    participants: Vec<Persona>,
    max_turns: u32,
) -> TransitionResult {
    let mut new_state = ConversationState {
        conversation_id: Some(conversation_id),
        started_at: Some(started_at),
        participants,
        max_turns,
        status: ConvStatus::Active,
        generation: state.generation + 1,
        next_request_id: state.next_request_id,
        ..Default::default()
    };
    let opening = new_state.append(
        MessageRole::System,
        format!("Let's discuss {topic}. What are your thoughts?"),
        None,
    );
    new_state.topic = topic;
    let generation = new_state.generation;

    TransitionResult::new(new_state)
        .with_effect(Effect::PublishState)
        .with_effect(Effect::publish_message(opening))
        .with_effect(Effect::schedule_turn(Duration::ZERO, generation))
}

fn evaluate_turn(
    state: &ConversationState,
    context: &ConvContext,
    roll: f64,
    now: Instant,
) -> TransitionResult {
    let Some(persona) = state.current_persona() else {
        return stop_failed(state, "no participant at the current turn".to_string());
    };

    // A retried turn belongs to the same persona; no second chance to pass
    if state.consecutive_failures == 0 && roll < persona.skip_probability {
        let mut new_state = state.clone();
        new_state.advance_turn();
        let delay = pacing_delay(state.last_message_at, now, context.min_turn_gap);
        return TransitionResult::new(new_state)
            .with_effect(Effect::turn_skipped(&persona.id))
            .with_effect(Effect::PublishState)
            .with_effect(Effect::schedule_turn(delay, state.generation));
    }

    match prepare_turn(state, context, persona) {
        Ok(turn) => {
            let mut new_state = state.clone();
            let request_id = new_state.next_request_id;
            new_state.next_request_id += 1;
            new_state.status = ConvStatus::AwaitingResponse {
                request_id,
                persona_id: persona.id.clone(),
                addressee: turn.addressee,
            };
            TransitionResult::new(new_state)
                .with_effect(Effect::PublishState)
                .with_effect(Effect::request_inference(request_id, turn.request))
        }
        Err(e) => stop_failed(state, e.to_string()),
    }
}

fn handle_success(
    state: &ConversationState,
    context: &ConvContext,
    persona_id: String,
    text: String,
    now: Instant,
) -> TransitionResult {
    let mut new_state = state.clone();
    let message = new_state.append(MessageRole::Assistant, text, Some(persona_id));
    new_state.messages_appended += 1;
    new_state.consecutive_failures = 0;
    new_state.last_message_at = Some(now);
    new_state.advance_turn();

    if new_state.messages_appended >= new_state.max_messages() {
        new_state.status = ConvStatus::Stopped {
            reason: StopReason::Completed,
        };
        return TransitionResult::new(new_state)
            .with_effect(Effect::publish_message(message))
            .with_effect(Effect::PublishState)
            .with_effect(Effect::conversation_done(StopReason::Completed));
    }

    new_state.status = ConvStatus::Active;
    let delay = pacing_delay(new_state.last_message_at, now, context.min_turn_gap);
    let generation = new_state.generation;
    TransitionResult::new(new_state)
        .with_effect(Effect::publish_message(message))
        .with_effect(Effect::PublishState)
        .with_effect(Effect::schedule_turn(delay, generation))
}

fn handle_failure(
    state: &ConversationState,
    context: &ConvContext,
    error: &LlmError,
) -> TransitionResult {
    let failures = state.consecutive_failures + 1;
    if failures >= context.max_consecutive_failures {
        return stop_failed(
            state,
            format!("Inference failed {failures} times in a row: {error}"),
        );
    }

    let mut new_state = state.clone();
    new_state.consecutive_failures = failures;
    new_state.status = ConvStatus::Active;
    let generation = new_state.generation;
    TransitionResult::new(new_state)
        .with_effect(Effect::PublishState)
        .with_effect(Effect::schedule_turn(context.min_turn_gap, generation))
}

fn stop_failed(state: &ConversationState, message: String) -> TransitionResult {
    let reason = StopReason::Failed {
        message: message.clone(),
    };
    let mut new_state = state.clone();
    new_state.status = ConvStatus::Stopped {
        reason: reason.clone(),
    };
    TransitionResult::new(new_state).with_effects([
        Effect::PublishState,
        Effect::NotifyTerminalError { message },
        Effect::conversation_done(reason),
    ])
}

/// The request carried by a `RequestInference` effect, if any
#[cfg(test)]
pub(crate) fn requested_inference(effects: &[Effect]) -> Option<(u64, &InferenceRequest)> {
    effects.iter().find_map(|effect| match effect {
        Effect::RequestInference {
            request_id,
            request,
        } => Some((*request_id, request)),
        _ => None,
    })
}
