//! Per-turn decisions: context window, addressee, prompt, pacing
//!
//! Pure helpers used by the transition function.

use super::effect::InferenceRequest;
use super::state::{ConvContext, ConversationState, TurnMessage};
use crate::llm::MessageRole;
use crate::persona::{Persona, PersonaError};
use crate::system_prompt::{addressing_instruction, build_system_prompt, fact_check_addendum};
use std::time::{Duration, Instant};

/// The context sent with a turn, and the message being fact-checked if any
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSelection {
    pub messages: Vec<TurnMessage>,
    /// Set only when the fact-checker override applied
    pub checked: Option<TurnMessage>,
}

/// Pick the history slice the current persona gets to see.
///
/// The fact-checker sees only the latest assistant message from someone else.
/// Everyone else, and the fact-checker when no such message exists, sees the
/// last `window` messages.
pub fn select_context(
    history: &[TurnMessage],
    persona_id: &str,
    fact_checker_id: &str,
    window: usize,
) -> ContextSelection {
    if persona_id == fact_checker_id {
        let target = history.iter().rev().find(|m| {
            m.role == MessageRole::Assistant
                && m.speaker_persona_id
                    .as_deref()
                    .is_some_and(|speaker| speaker != persona_id)
        });
        if let Some(message) = target {
            return ContextSelection {
                messages: vec![message.clone()],
                checked: Some(message.clone()),
            };
        }
    }

    let window = window.max(1);
    let start = history.len().saturating_sub(window);
    ContextSelection {
        messages: history[start..].to_vec(),
        checked: None,
    }
}

/// Display name of the latest other speaker in `context`, or `None` when only
/// the opening message is there
pub fn resolve_addressee(
    context: &[TurnMessage],
    persona_id: &str,
    participants: &[Persona],
) -> Option<String> {
    context
        .iter()
        .rev()
        .filter_map(|m| m.speaker_persona_id.as_deref())
        .find(|speaker| *speaker != persona_id)
        .map(|speaker| {
            participants
                .iter()
                .find(|p| p.id == speaker)
                .map_or_else(|| speaker.to_string(), |p| p.display_name.clone())
        })
}

/// A fully prepared persona-turn
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTurn {
    pub request: InferenceRequest,
    pub addressee: Option<String>,
}

/// Build the inference request for the current participant
pub fn prepare_turn(
    state: &ConversationState,
    context: &ConvContext,
    persona: &Persona,
) -> Result<PreparedTurn, PersonaError> {
    let selection = select_context(
        &state.history,
        &persona.id,
        &context.fact_checker_id,
        context.context_window,
    );
    let addressee = resolve_addressee(&selection.messages, &persona.id, &state.participants);

    let mut system_prompt = build_system_prompt(persona, &state.topic, &context.fact_checker_id)?;
    system_prompt.push_str("\n\n");
    system_prompt.push_str(&addressing_instruction(addressee.as_deref()));

    if let Some(checked) = &selection.checked {
        let author = checked
            .speaker_persona_id
            .as_deref()
            .and_then(|id| state.participant(id));
        if let Some(author) = author {
            system_prompt.push_str("\n\n");
            system_prompt.push_str(&fact_check_addendum(&checked.content, author));
        }
    }

    Ok(PreparedTurn {
        request: InferenceRequest {
            system_prompt,
            context: selection.messages,
            persona_id: persona.id.clone(),
        },
        addressee,
    })
}

/// Remaining wait before the next evaluation: `gap - elapsed`, floored at zero
pub fn pacing_delay(last_message_at: Option<Instant>, now: Instant, gap: Duration) -> Duration {
    match last_message_at {
        Some(last) => gap.saturating_sub(now.saturating_duration_since(last)),
        None => Duration::ZERO,
    }
}
