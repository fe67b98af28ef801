use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::tool::{Tool, ToolDefinition};

/// The tools a server exposes, keyed by name.
///
/// Iteration is by name so `tools/list` is stable across runs. A tool is
/// only accepted when MCP clients can call it: a snake_case name and an
/// object input schema.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_shared(Arc::new(tool))
    }

    /// Register an already shared tool, e.g. one also held by another registry.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let def = tool.definition();
        if !is_tool_name(&def.name) {
            return Err(RegistryError::InvalidName(def.name));
        }
        if def.input_schema.get("type").and_then(|t| t.as_str()) != Some("object") {
            return Err(RegistryError::SchemaNotObject(def.name));
        }
        if self.tools.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        debug!(tool = %def.name, "Tool registered");
        self.tools.insert(def.name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions in name order.
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_tool_name(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateName(String),

    #[error("Tool name '{0}' must be snake_case")]
    InvalidName(String),

    #[error("Tool '{0}' input schema must be a JSON object schema")]
    SchemaNotObject(String),
}
