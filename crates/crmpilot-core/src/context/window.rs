//! Message window: which part of the conversation the model sees on a turn.
//!
//! The context is always one system message followed by the tail of the
//! message log:
//!
//! - no summary yet: the last `N` messages;
//! - with a summary: the system message carries it, followed by the last
//!   `N - 1` messages.
//!
//! Tool results at the very start of the tail are dropped when the assistant
//! turn that requested them fell outside the window. Chat endpoints reject a
//! tool message without its call, and the window still never exceeds its cap.

use crate::llm::{ChatMessage, Role};

/// Prefix that introduces the running summary inside the system message.
pub const SUMMARY_PREFIX: &str = "\nSummary of conversation earlier: ";

/// Builds the per-turn context from a fixed window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageWindow {
    size: usize,
}

impl MessageWindow {
    /// `size` is the number of log messages visible without a summary.
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// How many log messages fit next to the system message.
    pub fn capacity(&self, has_summary: bool) -> usize {
        if has_summary { self.size - 1 } else { self.size }
    }

    /// Assemble `[system] + tail(messages)`.
    pub fn build_context(
        &self,
        base_prompt: &str,
        summary: Option<&str>,
        messages: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let summary = summary.filter(|s| !s.is_empty());

        let system = match summary {
            Some(summary) => format!("{base_prompt}{SUMMARY_PREFIX}{summary}"),
            None => base_prompt.to_string(),
        };

        let capacity = self.capacity(summary.is_some());
        let mut tail = &messages[messages.len().saturating_sub(capacity)..];
        while let Some((first, rest)) = tail.split_first() {
            if first.role != Role::Tool {
                break;
            }
            tail = rest;
        }

        let mut context = Vec::with_capacity(tail.len() + 1);
        context.push(ChatMessage::system(system));
        context.extend_from_slice(tail);
        context
    }
}
