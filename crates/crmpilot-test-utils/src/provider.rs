//! A scripted [`LlmProvider`] for driving the orchestrator in tests.
//!
//! Responses are queued up front and returned in order; every request is
//! recorded so tests can inspect the exact context the model was sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crmpilot_core::BoxFuture;
use crmpilot_core::llm::{ChatRequest, ChatResponse, LlmError, LlmProvider, ToolCall};
use serde_json::Value;

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<ChatResponse, LlmError>>,
    requests: Vec<ChatRequest>,
}

/// Returns queued responses and records requests.
///
/// Clones share the same script, so a test can keep one handle and hand a
/// clone to the orchestrator.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: ChatResponse) -> &Self {
        self.script.lock().unwrap().responses.push_back(Ok(response));
        self
    }

    /// Queue a final text answer.
    pub fn push_text(&self, text: &str) -> &Self {
        self.push_response(ChatResponse::text(text))
    }

    /// Queue an answer requesting the given tool calls.
    pub fn push_tool_calls(&self, calls: Vec<ToolCall>) -> &Self {
        self.push_response(ChatResponse::tool_calls(calls))
    }

    pub fn push_error(&self, error: LlmError) -> &Self {
        self.script.lock().unwrap().responses.push_back(Err(error));
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    /// Responses still queued.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().responses.len()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let next = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request.clone());
            script.responses.pop_front()
        };
        Box::pin(async move {
            next.unwrap_or_else(|| {
                tracing::debug!("scripted provider exhausted");
                Err(LlmError::Request("no scripted response left".to_string()))
            })
        })
    }
}

/// Shorthand for building a [`ToolCall`].
pub fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}
