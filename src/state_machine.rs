//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;
mod turn;


pub use effect::{Effect, InferenceRequest};
pub use event::Event;
pub use state::{
    ConvContext, ConvStatus, ConversationSnapshot, ConversationState, StopReason, TurnMessage,
};
pub use transition::{transition, TransitionError};
