//! Namespace browsing: flat tag listing or one level of child nodes.

use std::sync::Arc;

use async_trait::async_trait;
use canary_core::CanaryError;
use serde::Deserialize;
use serde_json::{json, Value};

use super::payload_or_marker;
use crate::services::CanaryServices;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub struct BrowseTagsTool {
    services: Arc<CanaryServices>,
}

impl BrowseTagsTool {
    pub fn new(services: Arc<CanaryServices>) -> Self {
        Self { services }
    }

    async fn browse(&self, input: Value) -> Result<Value, CanaryError> {
        let input: Input = parse_input("browse_tags", input)?;
        let client = self.services.client();
        let path = input.path.as_deref().map(str::trim).filter(|p| !p.is_empty());

        match input.mode {
            Mode::Nodes => {
                let fetched = client.browse_nodes(path, input.bypass_cache).await?;
                Ok(payload_or_marker(fetched, |nodes| {
                    json!({
                        "path": path.unwrap_or(""),
                        "count": nodes.len(),
                        "nodes": nodes,
                    })
                }))
            }
            Mode::Tags => {
                let fetched = client
                    .browse_tags(path, input.search.as_deref(), input.deep, input.bypass_cache)
                    .await?;
                Ok(payload_or_marker(fetched, |tags| {
                    json!({
                        "path": path.unwrap_or(""),
                        "search": input.search,
                        "deep": input.deep,
                        "count": tags.len(),
                        "tags": tags,
                    })
                }))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Mode {
    #[default]
    Tags,
    Nodes,
}

#[derive(Debug, Deserialize)]
struct Input {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default = "default_deep")]
    deep: bool,
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    bypass_cache: bool,
}

fn default_deep() -> bool {
    true
}

#[async_trait]
impl Tool for BrowseTagsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "browse_tags".to_string(),
            description: "List historian tags under a namespace path, optionally filtered by a \
                plain substring. Use mode 'nodes' to walk the tree one level at a time."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Namespace path, e.g. 'Plant.Kiln6'; empty for the root"
                    },
                    "search": {
                        "type": "string",
                        "description": "Substring filter; wildcards are not supported"
                    },
                    "deep": {
                        "type": "boolean",
                        "description": "Include tags in all descendant nodes",
                        "default": true
                    },
                    "mode": { "type": "string", "enum": ["tags", "nodes"], "default": "tags" },
                    "bypass_cache": { "type": "boolean", "default": false }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        ToolResult::from_outcome(self.browse(input).await, &self.services.guard())
    }
}
