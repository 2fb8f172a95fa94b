//! Conversation state machine.
//!
//! One call to [`Orchestrator::step`] processes one human message:
//!
//! ```text
//!            len > (summary_count + 1) * interval
//!   Start ───────────────────────────────▶ Summarize
//!     │                                       │
//!     │ otherwise                             │
//!     ▼                                       │
//!   Agent ◀───────────────────────────────────┘
//!     │  ▲
//!     │  │ results appended
//!     │  │
//!     │  Tools ◀── response carries tool calls
//!     │
//!     └──▶ End   (response without tool calls)
//! ```
//!
//! Everything inside a step runs sequentially: one model call or one tool call
//! at a time, tools in the order the model emitted them. Retries belong to the
//! provider; the orchestrator never repeats a call itself.

use std::fmt;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::{MessageWindow, Summarizer, ToolRegistry};
use crate::conversation::ConversationState;
use crate::llm::{ChatMessage, ChatRequest, LlmError, LlmProvider, TokenUsage};
use crate::prompt::BasePrompt;

/// Errors that end a step early.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model call failed: {0}")]
    Model(#[from] LlmError),

    #[error("summarization failed: {0}")]
    Summarization(LlmError),

    #[error("tool round limit of {limit} reached without a final answer")]
    ToolRoundLimit { limit: usize },
}

/// States of the per-step machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    Summarize,
    Agent,
    Tools,
    End,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Start => "start",
            State::Summarize => "summarize",
            State::Agent => "agent",
            State::Tools => "tools",
            State::End => "end",
        };
        f.write_str(name)
    }
}

/// One edge taken by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: State,
    pub to: State,
}

/// Result of a completed step.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Text of the final assistant message.
    pub reply: String,
    /// Every edge taken, in order, ending with `→ End`.
    pub transitions: Vec<Transition>,
    /// Number of tools dispatched during the step.
    pub tool_calls: usize,
    /// Tokens used by all model calls of the step, summary included.
    pub usage: TokenUsage,
}

impl StepOutcome {
    pub fn summarized(&self) -> bool {
        self.transitions.iter().any(|t| t.to == State::Summarize)
    }
}

/// Drives conversations through the state machine.
pub struct Orchestrator {
    provider: Box<dyn LlmProvider>,
    tools: ToolRegistry,
    window: MessageWindow,
    summarizer: Summarizer,
    prompt: BasePrompt,
    model: String,
    max_tokens: u32,
    temperature: f32,
    summary_interval: usize,
    max_tool_rounds: usize,
}

impl Orchestrator {
    pub fn new(
        config: &crmpilot_config::AppConfig,
        provider: Box<dyn LlmProvider>,
        tools: ToolRegistry,
        prompt: BasePrompt,
    ) -> Self {
        Self {
            provider,
            tools,
            window: MessageWindow::new(config.agent.window_size),
            summarizer: Summarizer::from_config(config),
            prompt,
            model: config.llm.model.clone(),
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            summary_interval: config.agent.summary_interval,
            max_tool_rounds: config.agent.max_tool_rounds,
        }
    }

    /// Append `user_input` as a human message and run the machine to `End`.
    pub async fn step(
        &self,
        state: &mut ConversationState,
        user_input: &str,
    ) -> Result<StepOutcome, AgentError> {
        state.push(ChatMessage::user(user_input));
        self.run(state).await
    }

    /// Run the machine on `state` as it is.
    ///
    /// On error, messages appended so far stay in `state`.
    pub async fn run(&self, state: &mut ConversationState) -> Result<StepOutcome, AgentError> {
        let mut outcome = StepOutcome::default();
        let mut current = State::Start;
        let mut tool_rounds = 0;

        while current != State::End {
            let next = match current {
                State::Start => {
                    if state.needs_summary(self.summary_interval) {
                        State::Summarize
                    } else {
                        State::Agent
                    }
                }
                State::Summarize => {
                    let usage = self
                        .summarizer
                        .summarize(self.provider.as_ref(), state)
                        .await
                        .map_err(AgentError::Summarization)?;
                    outcome.usage.add(&usage);
                    State::Agent
                }
                State::Agent => {
                    let wants_tools = self.call_model(state, &mut outcome.usage).await?;
                    if wants_tools { State::Tools } else { State::End }
                }
                State::Tools => {
                    tool_rounds += 1;
                    if tool_rounds > self.max_tool_rounds {
                        self.refuse_pending_calls(state);
                        warn!(limit = self.max_tool_rounds, "tool round limit reached");
                        return Err(AgentError::ToolRoundLimit {
                            limit: self.max_tool_rounds,
                        });
                    }
                    outcome.tool_calls += self.dispatch_pending_calls(state).await;
                    State::Agent
                }
                State::End => State::End,
            };

            info!(from = %current, to = %next, messages = state.len(), "state transition");
            outcome.transitions.push(Transition {
                from: current,
                to: next,
            });
            current = next;
        }

        outcome.reply = state
            .messages()
            .last()
            .map(|m| m.text().to_string())
            .unwrap_or_default();
        Ok(outcome)
    }

    /// Send the windowed context to the model and append its answer.
    /// Returns whether the answer requests tools.
    async fn call_model(
        &self,
        state: &mut ConversationState,
        usage: &mut TokenUsage,
    ) -> Result<bool, AgentError> {
        let base = self.prompt.render(Utc::now());
        let request = ChatRequest {
            model: self.model.clone(),
            messages: self
                .window
                .build_context(&base, state.summary(), state.messages()),
            tools: self.tools.definitions(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        debug!(
            context_messages = request.messages.len(),
            tools = request.tools.len(),
            "calling model"
        );

        let response = self.provider.chat(&request).await?;
        usage.add(&response.usage);

        let wants_tools = response.message.has_tool_calls();
        state.push(response.message);
        Ok(wants_tools)
    }

    /// Dispatch every call on the last assistant message, in order.
    async fn dispatch_pending_calls(&self, state: &mut ConversationState) -> usize {
        let calls = state
            .messages()
            .last()
            .map(|m| m.calls().to_vec())
            .unwrap_or_default();

        for call in &calls {
            let envelope = self.tools.dispatch(call).await;
            state.push(ChatMessage::tool_result(&call.id, envelope.to_string()));
        }
        calls.len()
    }

    /// Answer every pending call with a refusal so the log stays well formed.
    fn refuse_pending_calls(&self, state: &mut ConversationState) {
        let calls = state
            .messages()
            .last()
            .map(|m| m.calls().to_vec())
            .unwrap_or_default();

        for call in &calls {
            let envelope = json!({
                "success": false,
                "error": "TOOL_ROUND_LIMIT",
                "message": "Too many consecutive tool rounds in one turn; the call was not executed.",
                "details": { "tool": call.name, "limit": self.max_tool_rounds },
            });
            state.push(ChatMessage::tool_result(&call.id, envelope.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(State::Summarize.to_string(), "summarize");
        assert_eq!(State::End.to_string(), "end");
    }

    #[test]
    fn test_summarized_flag() {
        let mut outcome = StepOutcome::default();
        assert!(!outcome.summarized());
        outcome.transitions.push(Transition {
            from: State::Start,
            to: State::Summarize,
        });
        assert!(outcome.summarized());
    }

    #[test]
    fn test_error_messages() {
        let err = AgentError::ToolRoundLimit { limit: 3 };
        assert_eq!(
            err.to_string(),
            "tool round limit of 3 reached without a final answer"
        );
        let err: AgentError = LlmError::Timeout.into();
        assert!(matches!(err, AgentError::Model(LlmError::Timeout)));
    }
}
