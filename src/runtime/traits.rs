//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService};
use crate::state_machine::InferenceRequest;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Client for persona-turn inference
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Produce the raw reply text for one persona-turn
    async fn send(&self, request: &InferenceRequest) -> Result<String, LlmError>;
}

/// Source of uniform draws in [0, 1) for skip decisions
pub trait RandomSource: Send {
    fn roll(&mut self) -> f64;
}

impl RandomSource for StdRng {
    fn roll(&mut self) -> f64 {
        self.gen::<f64>()
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: InferenceClient + ?Sized> InferenceClient for Arc<T> {
    async fn send(&self, request: &InferenceRequest) -> Result<String, LlmError> {
        (**self).send(request).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use an `LlmService` as the `InferenceClient`
pub struct ServiceInferenceClient {
    llm: Arc<dyn LlmService>,
    timeout: Duration,
}

impl ServiceInferenceClient {
    pub fn new(llm: Arc<dyn LlmService>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// System prompt first, then the context in order
    fn build_request(request: &InferenceRequest) -> LlmRequest {
        let mut messages = Vec::with_capacity(request.context.len() + 1);
        messages.push(LlmMessage::system(request.system_prompt.clone()));
        messages.extend(
            request
                .context
                .iter()
                .map(|m| LlmMessage::new(m.role, m.content.clone())),
        );
        LlmRequest { messages }
    }
}

#[async_trait]
impl InferenceClient for ServiceInferenceClient {
    async fn send(&self, request: &InferenceRequest) -> Result<String, LlmError> {
        let llm_request = Self::build_request(request);
        let start = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.llm.complete(&llm_request)).await
        {
            Ok(Ok(response)) if response.content.trim().is_empty() => {
                Err(LlmError::malformed("Inference server returned empty content"))
            }
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LlmError::timeout(format!(
                "No reply within {}s",
                self.timeout.as_secs()
            ))),
        };

        let duration_ms = start.elapsed().as_millis();
        match &result {
            Ok(_) => tracing::debug!(
                persona = %request.persona_id,
                model = %self.llm.model_id(),
                duration_ms = %duration_ms,
                "Persona turn generated"
            ),
            Err(e) => tracing::warn!(
                persona = %request.persona_id,
                model = %self.llm.model_id(),
                duration_ms = %duration_ms,
                kind = ?e.kind,
                error = %e.message,
                "Persona turn failed"
            ),
        }

        result
    }
}
