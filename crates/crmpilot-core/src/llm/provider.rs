//! LLM provider trait — the core abstraction for chat completions.
//!
//! The orchestrator and the summarizer only ever talk to a model through this
//! interface, so the inference endpoint stays an external collaborator.

use crate::BoxFuture;

use super::types::{ChatRequest, ChatResponse};

/// Errors from LLM provider calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    Request(String),

    #[error("authentication failed (check API key): {0}")]
    Auth(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("context length exceeded: {0}")]
    ContextLength(String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("provider error {status}: {message}")]
    ProviderError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout")]
    Timeout,
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Network(_) | LlmError::Timeout => true,
            LlmError::ProviderError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Core trait for LLM providers.
///
/// Implementations must be `Send + Sync`. Uses `BoxFuture` for object safety
/// (allows `Box<dyn LlmProvider>`).
pub trait LlmProvider: Send + Sync {
    /// Provider display name, used in logs.
    fn name(&self) -> &str;

    /// Perform a chat completion (non-streaming).
    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::Network("reset".into()).is_transient());
        assert!(LlmError::RateLimited { retry_after_secs: 1 }.is_transient());
        assert!(
            LlmError::ProviderError {
                status: 503,
                message: "busy".into()
            }
            .is_transient()
        );
        assert!(
            !LlmError::ProviderError {
                status: 400,
                message: "bad".into()
            }
            .is_transient()
        );
        assert!(!LlmError::Auth("nope".into()).is_transient());
        assert!(!LlmError::Parse("junk".into()).is_transient());
    }
}
