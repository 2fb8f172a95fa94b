#![deny(unsafe_code)]

//! CRMPilot core runtime.
//!
//! An LLM agent that operates a CRM through a fixed set of tools. This crate
//! holds the conversation state machine, the message window and rolling
//! summary, the tool registry, the COQL query validator, and the clients for
//! the model endpoint and the CRM backend.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send`-safe, boxed future — the standard return type for async
/// trait methods that require dynamic dispatch (`dyn Trait`).
///
/// Native `async fn` in traits produces opaque return types that are **not**
/// object-safe. Traits consumed via `Box<dyn Trait>` or `Arc<dyn Trait>` must
/// return a concrete `Pin<Box<dyn Future>>` instead. This alias keeps those
/// signatures readable.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Tool registry, message window and summarizer.
pub mod context;
/// Per-conversation state.
pub mod conversation;
/// COQL query validation and normalization.
pub mod coql;
/// CRM backend trait, Zoho client and the tool catalogue.
pub mod crm;
/// LLM provider integration.
pub mod llm;
/// Conversation state machine.
pub mod orchestrator;
/// Base system prompt.
pub mod prompt;
/// Credential loading with zeroization.
pub mod secrets;

pub use context::{ToolError, ToolRegistry};
pub use conversation::ConversationState;
pub use coql::{QueryValidationResult, validate_query};
pub use crm::{CrmBackend, ZohoClient, register_crm_tools};
pub use orchestrator::{AgentError, Orchestrator, State, StepOutcome, Transition};
pub use prompt::BasePrompt;
pub use secrets::{Credentials, SecretError, SecretValue};
