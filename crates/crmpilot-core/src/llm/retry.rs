//! Retrying decorator for any [`LlmProvider`].
//!
//! The orchestrator never retries a model call itself; a fixed small retry
//! budget on transient failures lives here, at the provider boundary.

use std::time::Duration;

use tracing::warn;

use crate::BoxFuture;

use super::provider::{LlmError, LlmProvider};
use super::types::{ChatRequest, ChatResponse};

/// Wraps a provider and retries transient failures with linear backoff.
pub struct RetryingProvider {
    inner: Box<dyn LlmProvider>,
    max_retries: u32,
    backoff: Duration,
}

impl RetryingProvider {
    pub fn new(inner: Box<dyn LlmProvider>, max_retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            backoff,
        }
    }
}

impl LlmProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let request = request.clone();
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                match self.inner.chat(&request).await {
                    Ok(resp) => return Ok(resp),
                    Err(e) if e.is_transient() && attempt < self.max_retries => {
                        attempt += 1;
                        warn!(
                            provider = self.inner.name(),
                            attempt,
                            max_retries = self.max_retries,
                            error = %e,
                            "transient model failure, retrying"
                        );
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        })
    }
}
