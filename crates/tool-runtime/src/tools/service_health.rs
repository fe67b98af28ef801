//! Local health report; never sends a request to the historian.

use std::sync::Arc;

use async_trait::async_trait;
use canary_core::CanaryError;
use canary_historian::CircuitState;
use serde_json::{json, Value};

use crate::services::CanaryServices;
use crate::tool::{Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub struct ServiceHealthTool {
    services: Arc<CanaryServices>,
}

impl ServiceHealthTool {
    pub fn new(services: Arc<CanaryServices>) -> Self {
        Self { services }
    }

    fn report(&self) -> Result<Value, CanaryError> {
        let client = self.services.client();
        let health = client.core().health();
        let status = match health.breaker.state {
            CircuitState::Closed => "ok",
            CircuitState::HalfOpen | CircuitState::Open => "degraded",
        };
        let catalog = self.services.catalog();
        let cache = client.cache();
        let categories: serde_json::Map<String, Value> = cache
            .category_counts()
            .iter()
            .map(|(category, count)| (category.as_str().to_string(), json!(count)))
            .collect();
        Ok(json!({
            "status": status,
            "historian": health,
            "cache": {
                "stats": cache.stats(),
                "by_category": categories,
                "oldest_entry_age_secs": cache.oldest_entry_age().map(|d| d.as_secs()),
            },
            "catalog": {
                "records": catalog.len(),
                "plants": catalog.plants(),
            },
            "config": self.services.config().redacted_summary(),
        }))
    }
}

#[async_trait]
impl Tool for ServiceHealthTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "service_health".to_string(),
            description: "Report circuit breaker state, session validity, cache statistics and \
                catalog size. Credentials are never included."
                .to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        ToolResult::from_outcome(self.report(), &self.services.guard())
    }
}
