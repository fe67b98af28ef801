use async_trait::async_trait;
use canary_core::{envelope, CanaryError};
use canary_historian::SizeGuard;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Describes a tool's interface for LLM consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name (e.g., "resolve_tag", "query_timeseries")
    pub name: String,
    /// Human-readable description for the LLM
    pub description: String,
    /// JSON Schema describing the expected input
    pub input_schema: Value,
}

/// Result of executing a tool: one serialized response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The envelope as JSON text, already size-checked.
    pub content: String,
    /// True when the envelope carries `success: false`.
    pub is_error: bool,
}

impl ToolResult {
    /// Wrap an outcome in the response envelope and run it through the size guard.
    pub fn from_outcome<T: Serialize>(
        outcome: Result<T, CanaryError>,
        guard: &SizeGuard,
    ) -> Result<Self, ToolError> {
        let rendered = guard.render(envelope(outcome));
        let is_error = rendered.get("success") == Some(&Value::Bool(false));
        Ok(Self {
            content: serde_json::to_string(&rendered)?,
            is_error,
        })
    }

    /// Parse the content back into JSON.
    pub fn json(&self) -> Result<Value, ToolError> {
        Ok(serde_json::from_str(&self.content)?)
    }
}

/// Per-invocation context handed to every tool.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Correlates the tool's log lines with the inbound request.
    pub request_id: String,
}

impl ToolContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

/// The primary extension point: all tools implement this trait.
///
/// Tools are object-safe, Send + Sync, and async. Domain failures never come
/// back as `Err`; they are folded into the `success: false` envelope.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition (name, description, JSON Schema).
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given JSON input.
    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// Decode tool arguments, reporting schema mismatches as an invalid query.
///
/// A missing or `null` argument object is read as `{}`.
pub fn parse_input<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T, CanaryError> {
    let input = if input.is_null() {
        Value::Object(Default::default())
    } else {
        input
    };
    serde_json::from_value(input).map_err(|e| {
        CanaryError::invalid_query(
            format!("bad arguments for {}: {}", tool, e),
            format!("Check the {} input schema from tools/list", tool),
        )
    })
}
