//! LLM provider integration — chat completions with tool use.
//!
//! The orchestrator and summarizer depend only on the [`LlmProvider`] trait.
//! The shipped backend speaks the OpenAI Chat Completions format, which also
//! covers Groq, Ollama, vLLM and similar endpoints.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌────────────────┐
//! │ Orchestrator │────▶│ RetryingProvider │────▶│ OpenAiProvider │
//! │  Summarizer  │     │  (transient only)│     │  (HTTP, JSON)  │
//! └──────────────┘     └──────────────────┘     └────────────────┘
//! ```

pub mod openai;
pub mod provider;
pub mod retry;
pub mod types;

use std::time::Duration;

pub use openai::OpenAiProvider;
pub use provider::{LlmError, LlmProvider};
pub use retry::RetryingProvider;
pub use types::*;

use crate::secrets::SecretValue;

/// Create the LLM provider described by the `[llm]` config section.
///
/// The returned provider already carries the configured retry policy.
pub fn create_provider(
    config: &crmpilot_config::LlmConfig,
    api_key: SecretValue,
) -> Box<dyn LlmProvider> {
    let provider = OpenAiProvider::new(api_key)
        .with_model(&config.model)
        .with_base_url(&config.base_url);

    Box::new(RetryingProvider::new(
        Box::new(provider),
        config.max_retries,
        Duration::from_millis(config.retry_backoff_ms),
    ))
}
