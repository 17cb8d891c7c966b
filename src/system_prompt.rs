//! System prompt construction for persona turns
//!
//! A persona's prompt is its base instructions plus a fixed rule block, its
//! behavior description, trait bullets and a `trait: score` summary line. The
//! designated fact-checking persona gets its own rule block. Output is a pure
//! function of the inputs.

use crate::persona::{Persona, PersonaError};
use std::fmt::Write;

/// Placeholder in a persona's base prompt
const TOPIC_PLACEHOLDER: &str = "{{topic}}";

/// Sentinel addressee when nobody has spoken yet
pub const EVERYONE: &str = "Everyone";

/// Rules for regular personas
const DEFAULT_RULES: &str = r"Important rules:
- ALWAYS start with @[username] to indicate who you're replying to
- NEVER use quotes or hashtags in your responses
- NEVER use roleplay or narration (no *actions*)
- NEVER explain your reasoning or thought process
- ALWAYS respond to the most recent speaker
- Use casual internet language, emojis, and abbreviations
- Keep it under 60 characters
- Be direct and to the point
- No pleasantries or sign-offs
- Reference specific points from the message you're replying to";

/// Rules for the fact-checking persona
const FACT_CHECKER_RULES: &str = r"Your task is to fact check the previous message and point out inaccuracies.

Rules:
- ALWAYS start with @[username] to address the previous speaker
- Point out specific inaccuracies in the previous message
- Provide correct information with sources if possible
- Keep it under 80 characters
- Be direct and factual
- No pleasantries or sign-offs
- If the message is accurate, say so briefly";

/// Build the system prompt for `persona` discussing `topic`.
///
/// `fact_checker_id` selects the fact-checking template when it matches the
/// persona's id.
pub fn build_system_prompt(
    persona: &Persona,
    topic: &str,
    fact_checker_id: &str,
) -> Result<String, PersonaError> {
    persona.check_instructions()?;
    let instructions = &persona.instructions;

    let mut prompt = if persona.id == fact_checker_id {
        format!("You are a fact checker in a discussion about {topic}.\n\n{FACT_CHECKER_RULES}")
    } else {
        let base = instructions.base_prompt.replace(TOPIC_PLACEHOLDER, topic);
        format!("{}\n\n{DEFAULT_RULES}", base.trim())
    };

    let _ = write!(
        prompt,
        "\n\nYour style:\n{}\n\nKey traits:\n",
        instructions.behavior_description.trim()
    );
    for trait_name in &instructions.traits {
        let _ = writeln!(prompt, "- {trait_name}");
    }
    let _ = write!(
        prompt,
        "\nBehavior traits (0-1):\n{}",
        behavior_summary(persona)
    );

    Ok(prompt)
}

/// `trait: score` pairs in trait-name order, joined with ` | `
pub fn behavior_summary(persona: &Persona) -> String {
    persona
        .behavior_scores
        .iter()
        .map(|(name, score)| format!("{name}: {score}"))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Instruction naming who the reply is addressed to
pub fn addressing_instruction(addressee: Option<&str>) -> String {
    match addressee {
        Some(name) => format!("Reply to @{name}. Start your message with @{name}."),
        None => format!("Reply to {EVERYONE}."),
    }
}

/// Material the fact-checker needs about the message under review
pub fn fact_check_addendum(checked_content: &str, author: &Persona) -> String {
    format!(
        "Message to fact check:\n{checked_content}\n\n{}'s style: {}",
        author.display_name,
        author.instructions.behavior_description.trim()
    )
}
