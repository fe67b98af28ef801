//! Tag properties from the historian, with catalog entries alongside.

use std::sync::Arc;

use async_trait::async_trait;
use canary_core::CanaryError;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{tag_list, TagList};
use crate::services::CanaryServices;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub struct GetTagMetadataTool {
    services: Arc<CanaryServices>,
}

impl GetTagMetadataTool {
    pub fn new(services: Arc<CanaryServices>) -> Self {
        Self { services }
    }

    async fn lookup(&self, input: Value) -> Result<Value, CanaryError> {
        let input: Input = parse_input("get_tag_metadata", input)?;
        let paths = tag_list(input.tags)?;
        let fetched = self
            .services
            .client()
            .get_tag_properties(&paths, input.bypass_cache)
            .await?;
        if let Some(truncation) = fetched.truncation {
            return Ok(truncation.to_envelope());
        }

        let properties = fetched.value;
        let catalog = self.services.catalog();
        let missing: Vec<&String> = paths.iter().filter(|p| !properties.contains_key(*p)).collect();
        let local: Vec<_> = paths.iter().filter_map(|p| catalog.get(p)).collect();
        Ok(json!({
            "count": properties.len(),
            "properties": properties,
            "catalog": local,
            "missing": missing,
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
impl Tool for GetTagMetadataTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_tag_metadata".to_string(),
            description: "Fetch properties (description, engineering units, limits) for exact \
                tag paths. Paths the historian does not know are listed under 'missing'."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tags": {
                        "description": "One tag path or a list of paths",
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
        ToolResult::from_outcome(self.lookup(input).await, &self.services.guard())
    }
}
