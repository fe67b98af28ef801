//! Offline lookup against the local catalog only; never touches the historian.

use std::sync::Arc;

use async_trait::async_trait;
use canary_catalog::normalize_query;
use canary_core::CanaryError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::services::CanaryServices;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

pub struct SearchCatalogTool {
    services: Arc<CanaryServices>,
}

impl SearchCatalogTool {
    pub fn new(services: Arc<CanaryServices>) -> Self {
        Self { services }
    }

    fn search(&self, input: Value) -> Result<Value, CanaryError> {
        let input: Input = parse_input("search_catalog", input)?;
        let keywords = normalize_query(&input.query);
        if keywords.is_empty() {
            return Err(CanaryError::invalid_query(
                "query has no searchable words",
                "Search with equipment or measurement words, e.g. 'mill motor current'",
            ));
        }
        let limit = input.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let catalog = self.services.catalog();
        let candidates = catalog.lookup(&keywords, limit);
        Ok(json!({
            "query": input.query.trim(),
            "keywords": keywords.iter().map(|k| k.term.as_str()).collect::<Vec<_>>(),
            "count": candidates.len(),
            "catalog_size": catalog.len(),
            "candidates": candidates,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for SearchCatalogTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_catalog".to_string(),
            description: "Keyword search over the local tag catalog. Works when the historian is \
                unreachable; results are scored but not confidence-rated."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Keywords to look for" },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LIMIT,
                        "default": DEFAULT_LIMIT
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, input: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        ToolResult::from_outcome(self.search(input), &self.services.guard())
    }
}
