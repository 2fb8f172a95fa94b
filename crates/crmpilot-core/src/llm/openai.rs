//! Chat Completions provider.
//!
//! Speaks the OpenAI Chat Completions wire format, which Groq, Ollama and
//! vLLM also accept. The endpoint comes from `llm.base_url`; the default is
//! Groq serving Qwen3.
//!
//! Qwen3 may prefix its answer with a `<think>…</think>` reasoning block.
//! That block is stripped before the message enters the conversation, so
//! neither the window nor the summarizer ever sees it.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::BoxFuture;
use crate::secrets::SecretValue;

use super::provider::{LlmError, LlmProvider};
use super::types::*;

pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "qwen/qwen3-32b";

/// Provider for any Chat Completions endpoint.
pub struct OpenAiProvider {
    client: Client,
    api_key: SecretValue,
    endpoint: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretValue) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Model used when a request leaves `model` empty.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    fn wire_request(&self, request: &ChatRequest) -> WireRequest {
        let model = match request.model.as_str() {
            "" => self.default_model.clone(),
            model => model.to_string(),
        };
        let tools: Vec<WireTool> = request.tools.iter().map(WireTool::from).collect();

        WireRequest {
            model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: (!tools.is_empty()).then_some(tools),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    async fn send(&self, body: WireRequest) -> Result<ChatResponse, LlmError> {
        debug!(
            endpoint = %self.endpoint,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "chat completion request"
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LlmError::Auth(format!(
                    "endpoint answered {}",
                    resp.status().as_u16()
                )));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(60);
                return Err(LlmError::RateLimited { retry_after_secs });
            }
            status if !status.is_success() => {
                let message = resp.text().await.unwrap_or_default();
                if message.contains("context_length_exceeded") {
                    return Err(LlmError::ContextLength(message));
                }
                return Err(LlmError::ProviderError {
                    status: status.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let wire: WireResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        into_chat_response(wire)
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn chat(&self, request: &ChatRequest) -> BoxFuture<'_, Result<ChatResponse, LlmError>> {
        let body = self.wire_request(request);
        Box::pin(self.send(body))
    }
}

/// Take the first choice. Tool-call arguments that are not valid JSON are
/// kept as a string so dispatch can report them to the model.
fn into_chat_response(wire: WireResponse) -> Result<ChatResponse, LlmError> {
    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("no choices in response".to_string()))?;

    let calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            arguments: serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments)),
            id: call.id,
            name: call.function.name,
        })
        .collect();

    let content = choice
        .message
        .content
        .map(|text| strip_reasoning(&text).to_string())
        .filter(|text| !text.is_empty());

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("tool_calls") => "tool_use",
        Some(other) => other,
        None => "unknown",
    }
    .to_string();

    Ok(ChatResponse {
        message: ChatMessage::assistant_with_calls(content, calls),
        finish_reason,
        usage: wire.usage.unwrap_or_default(),
        model: wire.model,
    })
}

/// Drop a leading `<think>…</think>` block. An unterminated block is left as is.
fn strip_reasoning(text: &str) -> &str {
    let trimmed = text.trim_start();
    match trimmed.strip_prefix("<think>") {
        Some(rest) => match rest.find("</think>") {
            Some(end) => rest[end + "</think>".len()..].trim(),
            None => text.trim(),
        },
        None => text.trim(),
    }
}

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
            tool_calls: msg
                .tool_calls
                .as_ref()
                .map(|calls| calls.iter().map(WireToolCall::from).collect()),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_kind(),
            function: WireFunctionCall {
                name: call.name.clone(),
                // The wire format carries arguments as a JSON-encoded string.
                arguments: match &call.arguments {
                    Value::String(raw) => raw.clone(),
                    other => other.to_string(),
                },
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionSpec,
}

impl From<&ToolDefinition> for WireTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            kind: function_kind(),
            function: WireFunctionSpec {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct WireFunctionSpec {
    name: String,
    description: String,
    parameters: Value,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(SecretValue::new("test-key"))
    }

    fn response(value: Value) -> WireResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults_target_groq() {
        let p = provider();
        assert_eq!(p.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(p.wire_request(&ChatRequest::default()).model, DEFAULT_MODEL);
    }

    #[test]
    fn test_request_with_tools() {
        let request = ChatRequest {
            model: "llama-3.3-70b".to_string(),
            messages: vec![
                ChatMessage::system("You operate a CRM."),
                ChatMessage::user("List my leads"),
            ],
            tools: vec![ToolDefinition {
                name: "query_records_tool".to_string(),
                description: "Run a COQL query".to_string(),
                parameters: json!({"type": "object"}),
            }],
            max_tokens: 1024,
            ..Default::default()
        };

        let wire = serde_json::to_value(provider().wire_request(&request)).unwrap();
        assert_eq!(wire["model"], "llama-3.3-70b");
        assert_eq!(wire["messages"][0]["role"], "system");
        assert_eq!(wire["messages"][1]["content"], "List my leads");
        assert_eq!(wire["tools"][0]["type"], "function");
        assert_eq!(wire["tools"][0]["function"]["name"], "query_records_tool");
        assert_eq!(wire["max_tokens"], 1024);
    }

    #[test]
    fn test_tool_turns_on_the_wire() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "get_fields_tool".to_string(),
            arguments: json!({"module": "Leads"}),
        };
        let request = ChatRequest {
            messages: vec![
                ChatMessage::assistant_with_calls(None, vec![call]),
                ChatMessage::tool_result("call_1", r#"{"success":true}"#),
            ],
            ..Default::default()
        };

        let wire = serde_json::to_value(provider().wire_request(&request)).unwrap();
        assert!(wire.get("tools").is_none());
        // Assistant turns carrying only calls still send `content: null`.
        assert_eq!(wire["messages"][0]["content"], Value::Null);
        let function = &wire["messages"][0]["tool_calls"][0]["function"];
        assert_eq!(function["arguments"], r#"{"module":"Leads"}"#);
        assert_eq!(wire["messages"][1]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_raw_string_arguments_are_not_double_encoded() {
        let call = ToolCall {
            id: "x".to_string(),
            name: "t".to_string(),
            arguments: Value::String("not json".to_string()),
        };
        assert_eq!(WireToolCall::from(&call).function.arguments, "not json");
    }

    #[test]
    fn test_text_response() {
        let resp = into_chat_response(response(json!({
            "model": "qwen/qwen3-32b",
            "choices": [{
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        })))
        .unwrap();

        assert_eq!(resp.message.text(), "Hello!");
        assert!(!resp.message.has_tool_calls());
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(resp.usage.total_tokens, 8);
    }

    #[test]
    fn test_reasoning_block_is_stripped() {
        let resp = into_chat_response(response(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "<think>\nThe user wants leads.\n</think>\n\nYou have 3 leads."
                },
                "finish_reason": "stop"
            }]
        })))
        .unwrap();
        assert_eq!(resp.message.text(), "You have 3 leads.");
    }

    #[test]
    fn test_reasoning_only_reply_has_no_text() {
        let resp = into_chat_response(response(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "<think>calling a tool</think>",
                    "tool_calls": [{"id": "a", "type": "function",
                        "function": {"name": "get_module_api_name_tool", "arguments": "{}"}}]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .unwrap();
        assert!(!resp.message.has_text());
        assert!(resp.message.has_tool_calls());
    }

    #[test]
    fn test_strip_reasoning_edge_cases() {
        assert_eq!(strip_reasoning("  plain  "), "plain");
        assert_eq!(strip_reasoning("<think>unterminated"), "<think>unterminated");
        assert_eq!(strip_reasoning("<think></think>"), "");
    }

    #[test]
    fn test_tool_calls_keep_order() {
        let resp = into_chat_response(response(json!({
            "model": "m",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "a", "type": "function",
                         "function": {"name": "get_fields_tool", "arguments": "{\"module\":\"Deals\"}"}},
                        {"id": "b", "type": "function",
                         "function": {"name": "create_records_tool", "arguments": "not json"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .unwrap();

        let calls = resp.message.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "a");
        assert_eq!(calls[0].arguments["module"], "Deals");
        assert_eq!(calls[1].arguments, json!("not json"));
        assert_eq!(resp.finish_reason, "tool_use");
    }

    #[test]
    fn test_empty_choices_is_parse_error() {
        let result = into_chat_response(response(json!({"model": "m", "choices": []})));
        assert!(matches!(result, Err(LlmError::Parse(_))));
    }
}
