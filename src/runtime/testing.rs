//! Mock implementations for testing
//!
//! These mocks enable integration testing of the runtime without real I/O.

use super::traits::*;
use crate::llm::LlmError;
use crate::state_machine::InferenceRequest;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Inference Client
// ============================================================================

/// Mock inference client that returns queued results
pub struct MockInferenceClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    /// Reply used once the queue runs dry
    fallback: Option<String>,
    /// Record of all requests made
    pub requests: Mutex<Vec<InferenceRequest>>,
}

impl MockInferenceClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every unqueued request with `reply`
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::new()
        }
    }

    /// Queue a successful reply
    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(reply.into()));
    }

    /// Queue an error
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_result(&self) -> Result<String, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                self.fallback
                    .clone()
                    .ok_or_else(|| LlmError::transport("No mock response queued"))
            })
    }
}

#[async_trait]
impl InferenceClient for MockInferenceClient {
    async fn send(&self, request: &InferenceRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.next_result()
    }
}

// ============================================================================
// Delayed Mock Inference Client (for stop-while-awaiting testing)
// ============================================================================

/// Mock inference client with configurable delay
pub struct DelayedMockInferenceClient {
    inner: MockInferenceClient,
    delay: Duration,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedMockInferenceClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockInferenceClient::new(),
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.inner.queue_reply(reply);
    }

    pub fn call_count(&self) -> usize {
        self.inner.call_count()
    }
}

#[async_trait]
impl InferenceClient for DelayedMockInferenceClient {
    async fn send(&self, request: &InferenceRequest) -> Result<String, LlmError> {
        self.inner.requests.lock().unwrap().push(request.clone());
        self.request_started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.next_result()
    }
}

// ============================================================================
// Scripted random source
// ============================================================================

/// Deterministic rolls; once the script is exhausted every roll speaks
pub struct ScriptedRolls {
    rolls: VecDeque<f64>,
}

impl ScriptedRolls {
    pub fn new(rolls: impl IntoIterator<Item = f64>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
        }
    }

    /// Never skips a persona with skip probability below 1
    pub fn never_skip() -> Self {
        Self::new([])
    }
}

impl RandomSource for ScriptedRolls {
    fn roll(&mut self) -> f64 {
        self.rolls.pop_front().unwrap_or(0.999_999)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmErrorKind, MessageRole};
    use crate::persona::tests::persona;
    use crate::persona::Persona;
    use crate::runtime::{CommandError, ConversationOrchestrator, SseEvent};
    use crate::state_machine::{
        ConvContext, ConvStatus, ConversationSnapshot, StopReason, TransitionError,
    };
    use tokio::sync::broadcast;

    const GAP: Duration = Duration::from_millis(20);

    fn test_context() -> ConvContext {
        ConvContext {
            min_turn_gap: GAP,
            ..ConvContext::default()
        }
    }

    fn pair() -> Vec<Persona> {
        vec![persona("sunny", 0.0), persona("dave", 0.0)]
    }

    /// Receive events until the conversation reports it is done
    async fn wait_for_done(rx: &mut broadcast::Receiver<SseEvent>) -> StopReason {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(SseEvent::ConversationDone { reason })) => return reason,
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(e)) => panic!("broadcast closed: {e}"),
                Err(_) => panic!("conversation did not finish in time"),
            }
        }
    }

    async fn wait_until(
        orchestrator: &ConversationOrchestrator,
        pred: impl Fn(&ConversationSnapshot) -> bool,
    ) -> ConversationSnapshot {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = orchestrator.snapshot();
            if pred(&snapshot) {
                return snapshot;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached, last snapshot: {snapshot:?}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_mock_inference_client() {
        let client = MockInferenceClient::new();
        client.queue_reply("hello");
        client.queue_error(LlmError::timeout("slow"));

        let request = InferenceRequest {
            system_prompt: "x".to_string(),
            context: vec![],
            persona_id: "p".to_string(),
        };
        assert_eq!(client.send(&request).await.unwrap(), "hello");
        assert_eq!(
            client.send(&request).await.unwrap_err().kind,
            LlmErrorKind::Timeout
        );
        assert_eq!(
            client.send(&request).await.unwrap_err().kind,
            LlmErrorKind::Transport
        );
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn test_scripted_rolls() {
        let mut rolls = ScriptedRolls::new([0.1, 0.5]);
        assert!((rolls.roll() - 0.1).abs() < f64::EPSILON);
        assert!((rolls.roll() - 0.5).abs() < f64::EPSILON);
        assert!(rolls.roll() > 0.99);
    }

    /// maxTurns 3 with two participants stops after exactly six messages
    #[tokio::test]
    async fn test_conversation_runs_to_message_cap() {
        let client = Arc::new(MockInferenceClient::always("sounds good"));
        let orchestrator =
            ConversationOrchestrator::spawn(test_context(), client.clone(), ScriptedRolls::never_skip());
        let mut rx = orchestrator.subscribe();

        let started = orchestrator
            .start("tea".to_string(), pair(), 3)
            .await
            .unwrap();
        assert_eq!(started.status, ConvStatus::Active);
        assert_eq!(started.history.len(), 1);
        assert_eq!(started.max_messages, 6);

        assert_eq!(wait_for_done(&mut rx).await, StopReason::Completed);

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.messages_appended, 6);
        assert_eq!(snapshot.history.len(), 7);
        assert_eq!(snapshot.turns_completed, 3);
        assert_eq!(client.call_count(), 6);

        // Speakers alternate, and every reply after the first addresses the previous speaker
        let speakers: Vec<_> = snapshot.history[1..]
            .iter()
            .map(|m| m.speaker_persona_id.clone().unwrap())
            .collect();
        assert_eq!(speakers, ["sunny", "dave", "sunny", "dave", "sunny", "dave"]);
        assert_eq!(snapshot.history[1].content, "sounds good");
        assert_eq!(snapshot.history[2].content, "@sunny-name sounds good");
        assert_eq!(snapshot.history[3].content, "@dave-name sounds good");
    }

    #[tokio::test]
    async fn test_consecutive_messages_respect_turn_gap() {
        let gap = Duration::from_millis(60);
        let client = Arc::new(MockInferenceClient::always("ok"));
        let orchestrator = ConversationOrchestrator::spawn(
            ConvContext {
                min_turn_gap: gap,
                ..ConvContext::default()
            },
            client,
            ScriptedRolls::never_skip(),
        );
        let mut rx = orchestrator.subscribe();
        orchestrator.start("tea".to_string(), pair(), 2).await.unwrap();

        let mut arrivals = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while arrivals.len() < 4 {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(SseEvent::Message { message })) if message.role == MessageRole::Assistant => {
                    arrivals.push(tokio::time::Instant::now());
                }
                Ok(Ok(_)) => {}
                other => panic!("unexpected {other:?}"),
            }
        }

        // Allow for scheduling jitter on the receiving side
        let floor = gap - Duration::from_millis(5);
        for window in arrivals.windows(2) {
            let apart = window[1] - window[0];
            assert!(apart >= floor, "messages {apart:?} apart, gap is {gap:?}");
        }
    }

    #[tokio::test]
    async fn test_skipped_turns_never_call_inference() {
        let client = Arc::new(MockInferenceClient::always("hi"));
        // sunny passes on the first roll, dave speaks, then no more skips
        let orchestrator = ConversationOrchestrator::spawn(
            test_context(),
            client.clone(),
            ScriptedRolls::new([0.1]),
        );
        let mut rx = orchestrator.subscribe();
        let participants = vec![persona("sunny", 0.5), persona("dave", 0.0)];
        orchestrator
            .start("tea".to_string(), participants, 1)
            .await
            .unwrap();

        let mut skipped = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(SseEvent::TurnSkipped { persona_id })) => skipped.push(persona_id),
                Ok(Ok(SseEvent::ConversationDone { .. })) => break,
                Ok(Ok(_)) => {}
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(skipped, ["sunny"]);
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.messages_appended, 2);
        assert_eq!(client.call_count(), 2);
        assert_eq!(
            client.recorded_requests()[0].persona_id,
            "dave",
            "first call should belong to the persona after the skip"
        );
    }

    #[tokio::test]
    async fn test_stop_while_awaiting_discards_late_reply() {
        let client = Arc::new(DelayedMockInferenceClient::new(Duration::from_millis(150)));
        client.queue_reply("this should never land");
        let request_started = client.request_started.clone();

        let orchestrator = ConversationOrchestrator::spawn(
            test_context(),
            client.clone(),
            ScriptedRolls::never_skip(),
        );
        orchestrator.start("tea".to_string(), pair(), 3).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), request_started.notified())
            .await
            .expect("inference request should start");
        wait_until(&orchestrator, |s| {
            matches!(s.status, ConvStatus::AwaitingResponse { .. })
        })
        .await;

        let stopped = orchestrator.stop().await.unwrap();
        assert_eq!(
            stopped.status,
            ConvStatus::Stopped {
                reason: StopReason::UserStopped
            }
        );
        assert!(stopped.history.is_empty());

        // Let the in-flight call resolve, plus a few gaps for anything it might schedule
        tokio::time::sleep(Duration::from_millis(300)).await;

        let after = orchestrator.snapshot();
        assert!(after.history.is_empty());
        assert_eq!(after.status, stopped.status);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fact_checker_receives_single_message_context() {
        let client = Arc::new(MockInferenceClient::always("the moon is made of cheese"));
        let orchestrator = ConversationOrchestrator::spawn(
            test_context(),
            client.clone(),
            ScriptedRolls::never_skip(),
        );
        let mut rx = orchestrator.subscribe();
        let participants = vec![persona("sunny", 0.0), persona("factchecker", 0.0)];
        orchestrator
            .start("space".to_string(), participants, 1)
            .await
            .unwrap();
        wait_for_done(&mut rx).await;

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 2);
        let check = &requests[1];
        assert_eq!(check.persona_id, "factchecker");
        assert_eq!(check.context.len(), 1);
        assert_eq!(check.context[0].speaker_persona_id.as_deref(), Some("sunny"));
        assert!(check.system_prompt.contains("fact checker"));
        assert!(check
            .system_prompt
            .contains("Message to fact check:\nthe moon is made of cheese"));
    }

    #[tokio::test]
    async fn test_repeated_transport_failures_stop_without_history_change() {
        let client = Arc::new(MockInferenceClient::new());
        for _ in 0..3 {
            client.queue_error(LlmError::transport("connection refused"));
        }
        let orchestrator = ConversationOrchestrator::spawn(
            test_context(),
            client.clone(),
            ScriptedRolls::never_skip(),
        );
        let mut rx = orchestrator.subscribe();
        orchestrator.start("tea".to_string(), pair(), 3).await.unwrap();

        let reason = wait_for_done(&mut rx).await;
        assert!(matches!(reason, StopReason::Failed { .. }));

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.messages_appended, 0);
        assert_eq!(client.call_count(), 3);
        assert!(client
            .recorded_requests()
            .iter()
            .all(|r| r.persona_id == "sunny"));
    }

    #[tokio::test]
    async fn test_failure_then_recovery_continues_with_same_persona() {
        let client = Arc::new(MockInferenceClient::always("back again"));
        client.queue_error(LlmError::upstream(500, "oops"));
        client.queue_reply("\"quoted\" #tag reply");
        let orchestrator = ConversationOrchestrator::spawn(
            test_context(),
            client.clone(),
            ScriptedRolls::never_skip(),
        );
        let mut rx = orchestrator.subscribe();
        orchestrator.start("tea".to_string(), pair(), 1).await.unwrap();
        assert_eq!(wait_for_done(&mut rx).await, StopReason::Completed);

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.history[1].content, "quoted reply");
        assert_eq!(snapshot.history[1].speaker_persona_id.as_deref(), Some("sunny"));
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_command_rejections() {
        let orchestrator = ConversationOrchestrator::spawn(
            test_context(),
            Arc::new(MockInferenceClient::always("hi")),
            ScriptedRolls::never_skip(),
        );

        assert!(matches!(
            orchestrator.stop().await,
            Err(CommandError::Rejected(TransitionError::NotStarted))
        ));
        assert!(matches!(
            orchestrator.start("  ".to_string(), pair(), 3).await,
            Err(CommandError::Rejected(TransitionError::InvalidConfiguration(_)))
        ));

        orchestrator.start("tea".to_string(), pair(), 3).await.unwrap();
        assert!(matches!(
            orchestrator.start("coffee".to_string(), pair(), 3).await,
            Err(CommandError::Rejected(TransitionError::ConversationInProgress))
        ));

        orchestrator.stop().await.unwrap();
        // Stopping twice is fine
        orchestrator.stop().await.unwrap();

        let restarted = orchestrator
            .start("coffee".to_string(), pair(), 3)
            .await
            .unwrap();
        assert_eq!(restarted.topic, "coffee");
        assert_eq!(restarted.history.len(), 1);
        orchestrator.stop().await.unwrap();
    }
}
