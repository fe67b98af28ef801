//! Most recent value per tag.

use std::sync::Arc;

use async_trait::async_trait;
use canary_core::CanaryError;
use canary_resolver::TagRef;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{tag_list, TagList};
use crate::services::CanaryServices;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub struct GetLastValueTool {
    services: Arc<CanaryServices>,
}

impl GetLastValueTool {
    pub fn new(services: Arc<CanaryServices>) -> Self {
        Self { services }
    }

    async fn last_values(&self, input: Value) -> Result<Value, CanaryError> {
        let input: Input = parse_input("get_last_value", input)?;
        let refs: Vec<TagRef> = tag_list(input.tags)?
            .iter()
            .map(|raw| TagRef::infer(raw))
            .collect();
        let (tags, warnings) = self
            .services
            .orchestrator()
            .resolve_tags(&refs, input.bypass_cache)
            .await?;
        let paths: Vec<String> = tags.iter().map(|t| t.path.clone()).collect();

        let fetched = self
            .services
            .client()
            .get_current_values(&paths, input.bypass_cache)
            .await?;
        if let Some(truncation) = fetched.truncation {
            return Ok(truncation.to_envelope());
        }
        let values = fetched.value;
        let missing: Vec<&String> = paths
            .iter()
            .filter(|p| !values.iter().any(|s| &s.tag_path == *p))
            .collect();
        Ok(json!({
            "tags": tags,
            "values": values,
            "missing": missing,
            "warnings": warnings,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    tags: TagList,
    #[serde(default)]
    bypass_cache: bool,
}

#[async_trait]
impl Tool for GetLastValueTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_last_value".to_string(),
            description: "Current (most recent) value, timestamp and quality for each tag. Tags \
                may be exact paths or plain descriptions."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tags": {
                        "oneOf": [
                            { "type": "string" },
                            { "type": "array", "items": { "type": "string" }, "minItems": 1 }
                        ]
                    },
                    "bypass_cache": { "type": "boolean", "default": false }
                },
                "required": ["tags"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        ToolResult::from_outcome(self.last_values(input).await, &self.services.guard())
    }
}
