//! Per-conversation state.
//!
//! A [`ConversationState`] is owned by exactly one session. The message log is
//! append-only; only the orchestrator and the summarizer mutate it.

use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;

/// Everything the agent remembers about one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    /// Condensed text of older turns; replaced on every summarization.
    #[serde(default)]
    summary: Option<String>,
    /// Number of summarizations so far. Never decreases.
    #[serde(default)]
    summary_count: u32,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a persisted session.
    pub fn restore(messages: Vec<ChatMessage>, summary: Option<String>, summary_count: u32) -> Self {
        Self {
            messages,
            summary,
            summary_count,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn summary_count(&self) -> u32 {
        self.summary_count
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Message count above which the next summarization runs:
    /// `(summary_count + 1) * interval`.
    pub fn summarization_threshold(&self, interval: usize) -> usize {
        (self.summary_count as usize + 1) * interval
    }

    pub fn needs_summary(&self, interval: usize) -> bool {
        self.messages.len() > self.summarization_threshold(interval)
    }

    pub(crate) fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replace the summary and bump the counter.
    pub(crate) fn record_summary(&mut self, summary: String) {
        self.summary = Some(summary);
        self.summary_count += 1;
    }
}
