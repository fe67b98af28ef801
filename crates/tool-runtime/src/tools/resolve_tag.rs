//! Natural-language tag resolution.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::services::CanaryServices;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub struct ResolveTagTool {
    services: Arc<CanaryServices>,
}

impl ResolveTagTool {
    pub fn new(services: Arc<CanaryServices>) -> Self {
        Self { services }
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    description: String,
    #[serde(default)]
    bypass_cache: bool,
}

#[async_trait]
impl Tool for ResolveTagTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "resolve_tag".to_string(),
            description: "Map a plain-language signal description (e.g. 'kiln 6 shell temperature') \
                to ranked historian tag paths with a confidence score. Low confidence comes back \
                with a clarifying question instead of a path."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "description": {
                        "type": "string",
                        "description": "What the signal measures and where"
                    },
                    "bypass_cache": {
                        "type": "boolean",
                        "description": "Skip cached resolutions and metadata",
                        "default": false
                    }
                },
                "required": ["description"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let outcome = async {
            let input: Input = parse_input("resolve_tag", input)?;
            debug!(request_id = %context.request_id, "resolve_tag");
            self.services
                .resolver()
                .resolve(&input.description, input.bypass_cache)
                .await
        }
        .await;
        ToolResult::from_outcome(outcome, &self.services.guard())
    }
}
