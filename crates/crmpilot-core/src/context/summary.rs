//! Rolling summarization of older conversation turns.
//!
//! The summarizer looks at a fixed tail of the raw log (not the model window)
//! and keeps only human turns, tool results and assistant turns with visible
//! text. Assistant turns that only request tools are dropped. The model is asked
//! to fold those messages, plus any earlier summary, into a new summary.
//!
//! The request carries no tools. Tool results are rendered as plain user text
//! and assistant turns lose their tool calls, so the request stays valid for
//! chat endpoints that require every tool message to follow its call.

use tracing::{debug, info, warn};

use crate::conversation::ConversationState;
use crate::llm::{ChatMessage, ChatRequest, LlmError, LlmProvider, Role, TokenUsage};

const INSTRUCTION: &str = "\
You condense conversations between a CRM operator and an assistant into a working summary.

Rules:
- Keep every essential fact: record ids, module and field API names, values, decisions, constraints and open requests.
- Drop repetition, pleasantries and filler.
- Use precise, technical wording and keep the logical order of events.
- Never invent or omit information.

The summary must keep 100% of the essential information while being 50-70% shorter than the messages above.

Return only the summary text.";

/// Condenses older turns into `ConversationState::summary`.
#[derive(Debug, Clone)]
pub struct Summarizer {
    model: String,
    source_len: usize,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(model: impl Into<String>, source_len: usize, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            source_len,
            max_tokens,
        }
    }

    pub fn from_config(config: &crmpilot_config::AppConfig) -> Self {
        Self::new(
            &config.llm.model,
            config.agent.summary_source_len,
            config.llm.summary_max_tokens,
        )
    }

    /// The filtered tail of `messages` that feeds the summary.
    pub fn select_source<'a>(&self, messages: &'a [ChatMessage]) -> Vec<&'a ChatMessage> {
        messages[messages.len().saturating_sub(self.source_len)..]
            .iter()
            .filter(|m| match m.role {
                Role::User | Role::Tool => true,
                Role::Assistant => m.has_text(),
                Role::System => false,
            })
            .collect()
    }

    /// The request sent to the model for one summarization.
    pub fn build_request(&self, state: &ConversationState) -> ChatRequest {
        let mut messages: Vec<ChatMessage> = self
            .select_source(state.messages())
            .into_iter()
            .map(|m| match m.role {
                Role::Tool => ChatMessage::user(format!("[tool result]\n{}", m.text())),
                Role::Assistant => ChatMessage::assistant(m.text()),
                _ => m.clone(),
            })
            .collect();

        let mut instruction = INSTRUCTION.to_string();
        if let Some(existing) = state.summary().filter(|s| !s.is_empty()) {
            instruction.push_str("\n\nExisting summary:\n");
            instruction.push_str(existing);
            instruction.push_str(
                "\n\nMerge the existing summary with the new messages above. \
                 Do not discard anything it contains.",
            );
        }
        messages.push(ChatMessage::user(instruction));

        ChatRequest {
            model: self.model.clone(),
            messages,
            tools: Vec::new(),
            max_tokens: self.max_tokens,
            temperature: 0.0,
        }
    }

    /// Run one summarization and store the result in `state`.
    ///
    /// Model failures propagate unchanged and a blank reply is a
    /// [`LlmError::Parse`]; `state` is untouched on error.
    pub async fn summarize(
        &self,
        provider: &dyn LlmProvider,
        state: &mut ConversationState,
    ) -> Result<TokenUsage, LlmError> {
        let request = self.build_request(state);
        debug!(
            source_messages = request.messages.len() - 1,
            max_tokens = self.max_tokens,
            "requesting summary"
        );

        let response = provider.chat(&request).await?;
        let summary = response.message.text().trim();
        // A blank reply would overwrite the running summary with nothing.
        if summary.is_empty() {
            warn!(finish_reason = %response.finish_reason, "model returned an empty summary");
            return Err(LlmError::Parse("model returned an empty summary".to_string()));
        }

        state.record_summary(summary.to_string());
        info!(
            summary_count = state.summary_count(),
            summary_len = state.summary().map(str::len).unwrap_or(0),
            "conversation summarized"
        );
        Ok(response.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;
    use serde_json::json;

    fn sample_log() -> Vec<ChatMessage> {
        let call = ToolCall {
            id: "c1".into(),
            name: "query_records_tool".into(),
            arguments: json!({"query": "SELECT id FROM Leads"}),
        };
        vec![
            ChatMessage::user("show my leads"),
            ChatMessage::assistant_with_calls(None, vec![call.clone()]),
            ChatMessage::tool_result("c1", r#"{"success":true,"data":[]}"#),
            ChatMessage::assistant_with_calls(Some("   ".into()), vec![call]),
            ChatMessage::assistant("You have no leads."),
        ]
    }

    #[test]
    fn test_select_source_filters_roles() {
        let summarizer = Summarizer::new("m", 10, 512);
        let log = sample_log();
        let source = summarizer.select_source(&log);
        assert_eq!(source.len(), 3);
        assert_eq!(source[0].role, Role::User);
        assert_eq!(source[1].role, Role::Tool);
        assert_eq!(source[2].text(), "You have no leads.");
    }

    #[test]
    fn test_select_source_uses_fixed_tail() {
        let summarizer = Summarizer::new("m", 2, 512);
        let log = sample_log();
        let source = summarizer.select_source(&log);
        assert_eq!(source.len(), 1);
        assert_eq!(source[0].text(), "You have no leads.");
    }

    #[test]
    fn test_request_has_no_tools_or_tool_messages() {
        let summarizer = Summarizer::new("qwen", 10, 512);
        let state = ConversationState::restore(sample_log(), None, 0);
        let request = summarizer.build_request(&state);

        assert!(request.tools.is_empty());
        assert_eq!(request.max_tokens, 512);
        assert_eq!(request.model, "qwen");
        assert!(request.messages.iter().all(|m| m.role != Role::Tool));
        assert!(request.messages.iter().all(|m| !m.has_tool_calls()));
        assert!(request.messages[1].text().starts_with("[tool result]"));

        let instruction = request.messages.last().unwrap().text();
        assert!(instruction.contains("100%"));
        assert!(instruction.contains("50-70%"));
        assert!(!instruction.contains("Existing summary"));
    }

    #[test]
    fn test_request_merges_existing_summary() {
        let summarizer = Summarizer::new("qwen", 10, 512);
        let state = ConversationState::restore(sample_log(), Some("Lead 42 is hot.".into()), 1);
        let request = summarizer.build_request(&state);
        let instruction = request.messages.last().unwrap().text();
        assert!(instruction.contains("Existing summary:\nLead 42 is hot."));
        assert!(instruction.contains("Merge"));
    }
}
