//! LLM error types

use serde::Serialize;
use thiserror::Error;

/// LLM error with classification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// Upstream HTTP status, when one was received
    pub status: Option<u16>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Transport, message)
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(LlmErrorKind::Upstream, message)
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::MalformedResponse, message)
    }

    /// Status the proxy endpoint answers with for this error
    pub fn http_status(&self) -> u16 {
        match self.kind {
            LlmErrorKind::Timeout => 504,
            LlmErrorKind::Transport => 502,
            LlmErrorKind::Upstream => self.status.unwrap_or(502),
            LlmErrorKind::MalformedResponse => 500,
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    /// No complete response within the request timeout
    Timeout,
    /// No response at all (connection refused, reset, DNS)
    Transport,
    /// The server answered with a non-2xx status
    Upstream,
    /// 2xx, but the payload lacks usable content
    MalformedResponse,
}
