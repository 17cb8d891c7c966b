//! Ollama chat provider implementation

use super::types::{LlmMessage, LlmRequest, LlmResponse};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Ollama service implementation
pub struct OllamaService {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaService {
    pub fn new(config: &OllamaConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    pub(super) fn translate_request(&self, request: &LlmRequest) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.model.clone(),
            messages: request.messages.clone(),
            stream: false,
        }
    }

    /// Turn a 2xx body into a response, rejecting payloads without content
    pub(super) fn normalize_response(body: &str) -> Result<LlmResponse, LlmError> {
        let parsed: OllamaChatResponse = serde_json::from_str(body).map_err(|e| {
            LlmError::malformed(format!("Invalid response from inference server: {e}"))
        })?;

        let content = parsed
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                LlmError::malformed("Invalid response from inference server: no message content")
            })?;

        Ok(LlmResponse {
            content,
            model: parsed.model.unwrap_or_default(),
            done: parsed.done,
        })
    }

    /// Prefer the server's `error` field, then the raw body, then the status reason
    pub(super) fn classify_error(status: StatusCode, body: &str) -> LlmError {
        let message = serde_json::from_str::<OllamaErrorResponse>(body)
            .ok()
            .map(|e| e.error)
            .filter(|m| !m.trim().is_empty())
            .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Upstream error")
                    .to_string()
            });
        LlmError::upstream(status.as_u16(), message)
    }

    fn classify_send_error(e: &reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::timeout("Request to inference server timed out")
        } else {
            LlmError::transport(format!("No response received from inference server: {e}"))
        }
    }
}

#[async_trait]
impl LlmService for OllamaService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let ollama_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| Self::classify_send_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::classify_send_error(&e))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }

        Self::normalize_response(&body)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
pub(super) struct OllamaChatRequest {
    pub(super) model: String,
    pub(super) messages: Vec<LlmMessage>,
    pub(super) stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaResponseMessage>,
    model: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}
