use std::sync::Arc;

use async_trait::async_trait;
use canary_core::CanaryError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::services::CanaryServices;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub struct CacheInvalidateTool {
    services: Arc<CanaryServices>,
}

impl CacheInvalidateTool {
    pub fn new(services: Arc<CanaryServices>) -> Self {
        Self { services }
    }

    fn invalidate(&self, input: Value, context: &ToolContext) -> Result<Value, CanaryError> {
        let input: Input = parse_input("cache_invalidate", input)?;
        let pattern = input.pattern.unwrap_or_default();
        let cache = self.services.client().cache();
        let removed = cache.invalidate(&pattern);
        info!(request_id = %context.request_id, pattern = %pattern, removed, "cache_invalidate");
        Ok(json!({
            "pattern": if pattern.is_empty() { "*" } else { pattern.as_str() },
            "removed": removed,
            "stats": cache.stats(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    #[serde(default)]
    pattern: Option<String>,
}

#[async_trait]
impl Tool for CacheInvalidateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "cache_invalidate".to_string(),
            description: "Drop cached historian responses whose key matches a pattern \
                anywhere in the key ('*' or '%' match any run of characters). \
                An empty pattern clears everything."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "e.g. 'getTagData:*Kiln6*' or 'browseTags'"
                    }
                }
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        ToolResult::from_outcome(self.invalidate(input, context), &self.services.guard())
    }
}
