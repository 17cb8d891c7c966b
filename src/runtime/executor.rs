//! Conversation runtime executor

use super::traits::{InferenceClient, RandomSource};
use super::{RuntimeInput, SseEvent};

use crate::state_machine::{
    transition, ConvContext, ConversationSnapshot, ConversationState, Effect, Event,
    TransitionError,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Owns the conversation state and applies every input to it in order.
///
/// Timers and inference calls run on spawned tasks and report back through
/// the input channel, so the state has exactly one writer.
pub struct ConversationRuntime<C, R>
where
    C: InferenceClient + 'static,
    R: RandomSource,
{
    context: ConvContext,
    state: ConversationState,
    client: Arc<C>,
    rng: R,
    input_rx: mpsc::Receiver<RuntimeInput>,
    input_tx: mpsc::Sender<RuntimeInput>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot_tx: watch::Sender<ConversationSnapshot>,
    /// Token to cancel the pending scheduled turn
    turn_timer: Option<CancellationToken>,
}

impl<C, R> ConversationRuntime<C, R>
where
    C: InferenceClient + 'static,
    R: RandomSource,
{
    pub fn new(
        context: ConvContext,
        client: C,
        rng: R,
        input_rx: mpsc::Receiver<RuntimeInput>,
        input_tx: mpsc::Sender<RuntimeInput>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        snapshot_tx: watch::Sender<ConversationSnapshot>,
    ) -> Self {
        Self {
            context,
            state: ConversationState::default(),
            client: Arc::new(client),
            rng,
            input_rx,
            input_tx,
            broadcast_tx,
            snapshot_tx,
            turn_timer: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            gap_ms = %self.context.min_turn_gap.as_millis(),
            window = self.context.context_window,
            "Starting conversation runtime"
        );

        // Process inputs in a loop - no recursion
        while let Some(input) = self.input_rx.recv().await {
            self.handle_input(input);
        }

        tracing::info!("Conversation runtime stopped");
    }

    fn handle_input(&mut self, input: RuntimeInput) {
        match input {
            RuntimeInput::Start {
                topic,
                participants,
                max_turns,
                reply,
            } => {
                let event = Event::Start {
                    conversation_id: uuid::Uuid::new_v4().to_string(),
                    started_at: Utc::now(),
                    topic,
                    participants,
                    max_turns,
                };
                let result = self.apply(event).map(|()| self.state.snapshot());
                match &result {
                    Ok(snapshot) => tracing::info!(
                        conv_id = %self.conv_id(),
                        topic = %snapshot.topic,
                        participants = snapshot.participants.len(),
                        max_messages = snapshot.max_messages,
                        "Conversation started"
                    ),
                    Err(e) => tracing::info!(error = %e, "Start rejected"),
                }
                let _ = reply.send(result);
            }

            RuntimeInput::Stop { reply } => {
                let result = self.apply(Event::Stop).map(|()| self.state.snapshot());
                let _ = reply.send(result);
            }

            RuntimeInput::TimerFired { generation } => {
                let event = Event::TurnDue {
                    generation,
                    roll: self.rng.roll(),
                    now: Instant::now(),
                };
                self.apply_internal(event);
            }

            RuntimeInput::InferenceDone { request_id, result } => {
                let event = match result {
                    Ok(content) => Event::InferenceSucceeded {
                        request_id,
                        content,
                        now: Instant::now(),
                    },
                    Err(error) => Event::InferenceFailed { request_id, error },
                };
                self.apply_internal(event);
            }
        }
    }

    /// Apply an event the runtime generated itself. Rejections here mean a
    /// scheduling bug, so they are logged and surfaced but never fatal.
    fn apply_internal(&mut self, event: Event) {
        if let Err(e) = self.apply(event) {
            tracing::error!(error = %e, "Error handling event");
            let _ = self.broadcast_tx.send(SseEvent::Error {
                message: e.to_string(),
            });
        }
    }

    fn apply(&mut self, event: Event) -> Result<(), TransitionError> {
        // Pure state transition
        let result = transition(&self.state, &self.context, event)?;
        self.state = result.new_state;

        for effect in result.effects {
            self.execute_effect(effect);
        }

        self.snapshot_tx.send_replace(self.state.snapshot());
        Ok(())
    }

    fn conv_id(&self) -> &str {
        self.state.conversation_id.as_deref().unwrap_or("-")
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RequestInference {
                request_id,
                request,
            } => {
                tracing::info!(
                    conv_id = %self.conv_id(),
                    persona = %request.persona_id,
                    request_id,
                    attempt = self.state.consecutive_failures + 1,
                    context_len = request.context.len(),
                    "Requesting persona turn"
                );

                // Not cancelled on stop; a late result is discarded by the
                // state machine instead
                let client = self.client.clone();
                let input_tx = self.input_tx.clone();
                tokio::spawn(async move {
                    let result = client.send(&request).await;
                    let _ = input_tx
                        .send(RuntimeInput::InferenceDone { request_id, result })
                        .await;
                });
            }

            Effect::ScheduleTurn { delay, generation } => {
                self.cancel_turn_timer();
                let token = CancellationToken::new();
                self.turn_timer = Some(token.clone());

                let input_tx = self.input_tx.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;

                        () = token.cancelled() => {}

                        () = tokio::time::sleep(delay) => {
                            let _ = input_tx.send(RuntimeInput::TimerFired { generation }).await;
                        }
                    }
                });
            }

            Effect::CancelScheduledTurn => self.cancel_turn_timer(),

            Effect::PublishMessage { message } => {
                let _ = self.broadcast_tx.send(SseEvent::Message { message });
            }

            Effect::PublishState => {
                let _ = self.broadcast_tx.send(SseEvent::StateChange {
                    status: self.state.status.clone(),
                    current_speaker: self.state.snapshot().current_speaker,
                    turns_completed: self.state.turns_completed,
                    messages_appended: self.state.messages_appended,
                });
            }

            Effect::NotifyTurnSkipped { persona_id } => {
                tracing::info!(conv_id = %self.conv_id(), persona = %persona_id, "Persona skipped turn");
                let _ = self.broadcast_tx.send(SseEvent::TurnSkipped { persona_id });
            }

            Effect::NotifyConversationDone { reason } => {
                tracing::info!(conv_id = %self.conv_id(), reason = ?reason, "Conversation finished");
                let _ = self.broadcast_tx.send(SseEvent::ConversationDone { reason });
            }

            Effect::NotifyTerminalError { message } => {
                tracing::error!(conv_id = %self.conv_id(), error = %message, "Conversation failed");
                let _ = self.broadcast_tx.send(SseEvent::Error { message });
            }
        }
    }

    fn cancel_turn_timer(&mut self) {
        if let Some(token) = self.turn_timer.take() {
            token.cancel();
        }
    }
}
