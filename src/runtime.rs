//! Runtime for executing conversations
//!
//! A single tokio task owns the conversation state. Callers talk to it through
//! a [`ConversationOrchestrator`] handle; clients observe it through the
//! broadcast channel of [`SseEvent`]s.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ConversationRuntime;
pub use traits::*;

use crate::llm::LlmError;
use crate::persona::Persona;
use crate::state_machine::{
    ConvContext, ConvStatus, ConversationSnapshot, StopReason, TransitionError, TurnMessage,
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Inputs consumed by the runtime loop
#[derive(Debug)]
pub enum RuntimeInput {
    Start {
        topic: String,
        participants: Vec<Persona>,
        max_turns: u32,
        reply: oneshot::Sender<Result<ConversationSnapshot, TransitionError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<ConversationSnapshot, TransitionError>>,
    },
    TimerFired {
        generation: u64,
    },
    InferenceDone {
        request_id: u64,
        result: Result<String, LlmError>,
    },
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init {
        snapshot: ConversationSnapshot,
    },
    Message {
        message: TurnMessage,
    },
    StateChange {
        status: ConvStatus,
        current_speaker: Option<String>,
        turns_completed: u32,
        messages_appended: u32,
    },
    TurnSkipped {
        persona_id: String,
    },
    ConversationDone {
        reason: StopReason,
    },
    Error {
        message: String,
    },
}

/// A command the runtime could not carry out
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Conversation runtime is not running")]
    RuntimeGone,
}

/// Handle to interact with the running orchestrator
pub struct ConversationOrchestrator {
    input_tx: mpsc::Sender<RuntimeInput>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot_rx: watch::Receiver<ConversationSnapshot>,
}

impl ConversationOrchestrator {
    /// Spawn the runtime task and return a handle to it
    pub fn spawn<C, R>(context: ConvContext, client: C, rng: R) -> Self
    where
        C: InferenceClient + 'static,
        R: RandomSource + 'static,
    {
        let (input_tx, input_rx) = mpsc::channel(64);
        let (broadcast_tx, _) = broadcast::channel(256);
        let (snapshot_tx, snapshot_rx) = watch::channel(ConversationSnapshot::default());

        let runtime = ConversationRuntime::new(
            context,
            client,
            rng,
            input_rx,
            input_tx.clone(),
            broadcast_tx.clone(),
            snapshot_tx,
        );
        tokio::spawn(runtime.run());

        Self {
            input_tx,
            broadcast_tx,
            snapshot_rx,
        }
    }

    pub async fn start(
        &self,
        topic: String,
        participants: Vec<Persona>,
        max_turns: u32,
    ) -> Result<ConversationSnapshot, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeInput::Start {
            topic,
            participants,
            max_turns,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| CommandError::RuntimeGone)??)
    }

    pub async fn stop(&self) -> Result<ConversationSnapshot, CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(RuntimeInput::Stop { reply }).await?;
        Ok(rx.await.map_err(|_| CommandError::RuntimeGone)??)
    }

    /// Latest published state
    pub fn snapshot(&self) -> ConversationSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SseEvent> {
        self.broadcast_tx.subscribe()
    }

    async fn send(&self, input: RuntimeInput) -> Result<(), CommandError> {
        self.input_tx
            .send(input)
            .await
            .map_err(|_| CommandError::RuntimeGone)
    }
}
