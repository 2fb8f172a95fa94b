//! Tool registry: the operations the model may call, and their dispatch.
//!
//! Each tool pairs a [`ToolDefinition`] (name, usage contract, JSON Schema for
//! parameters) with a [`ToolHandler`]. Dispatch never fails: unknown tools,
//! malformed arguments and handler errors all come back as error envelopes so
//! the model can see them and correct itself.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::BoxFuture;
use crate::llm::types::{ToolCall, ToolDefinition};

/// Errors raised while invoking a tool. Rendered into an envelope by
/// [`ToolRegistry::dispatch`]; never surfaced to the orchestrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },
}

impl ToolError {
    /// Machine-readable code carried in the envelope's `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "UNKNOWN_TOOL",
            ToolError::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            ToolError::Failed { .. } => "TOOL_FAILED",
        }
    }

    /// `{ "success": false, "error": <code>, "message": ..., "details": {...} }`
    pub fn to_envelope(&self) -> Value {
        let tool = match self {
            ToolError::UnknownTool(name) => name,
            ToolError::InvalidArguments { tool, .. } | ToolError::Failed { tool, .. } => tool,
        };
        json!({
            "success": false,
            "error": self.code(),
            "message": self.to_string(),
            "details": { "tool": tool },
        })
    }
}

/// Deserialize tool arguments into a typed struct.
///
/// Arguments the provider could not parse arrive as a JSON string; those are
/// parsed here before giving up.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::String(raw) if raw.trim().is_empty() => json!({}),
        Value::String(raw) => serde_json::from_str(&raw).map_err(|e| ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: e.to_string(),
        })?,
        Value::Null => json!({}),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Executes one tool call. Object safe so handlers can be stored as trait objects.
pub trait ToolHandler: Send + Sync {
    /// Run the tool. `Ok` carries the envelope returned to the model.
    fn call(&self, args: Value) -> BoxFuture<'_, Result<Value, ToolError>>;
}

struct FnHandler<F>(F);

impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn call(&self, args: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        Box::pin((self.0)(args))
    }
}

/// A registered tool with its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    /// Tool definition (name, description, parameters schema).
    pub definition: ToolDefinition,
    pub handler: Arc<dyn ToolHandler>,
    /// Disabled tools are neither advertised nor dispatched.
    pub enabled: bool,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.definition.name)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Registry of all tools available to the model.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        self.tools.insert(
            definition.name.clone(),
            RegisteredTool {
                definition,
                handler,
                enabled: true,
            },
        );
    }

    /// Register a tool backed by an async closure.
    pub fn register_fn<F, Fut>(&mut self, definition: ToolDefinition, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(definition, Arc::new(FnHandler(f)));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Enable or disable a tool. Returns `false` if no such tool exists.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.tools.get_mut(name) {
            Some(tool) => {
                tool.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of every enabled tool, sorted by name (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| t.enabled)
            .map(|t| t.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Run one tool call and return the envelope for its result message.
    pub async fn dispatch(&self, call: &ToolCall) -> Value {
        let result = match self.tools.get(&call.name).filter(|t| t.enabled) {
            Some(tool) => {
                debug!(tool = %call.name, call_id = %call.id, "dispatching tool");
                tool.handler.call(call.arguments.clone()).await
            }
            None => Err(ToolError::UnknownTool(call.name.clone())),
        };

        match result {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                e.to_envelope()
            }
        }
    }
}
