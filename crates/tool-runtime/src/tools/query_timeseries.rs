//! Historical reads over a time window, tags given as paths or descriptions.

use std::sync::Arc;

use async_trait::async_trait;
use canary_core::CanaryError;
use canary_historian::Aggregate;
use canary_resolver::{TagRef, TimeWindow, TimeseriesQuery};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{tag_list, TagList};
use crate::services::CanaryServices;
use crate::tool::{parse_input, Tool, ToolContext, ToolDefinition, ToolError, ToolResult};

pub struct QueryTimeseriesTool {
    services: Arc<CanaryServices>,
}

impl QueryTimeseriesTool {
    pub fn new(services: Arc<CanaryServices>) -> Self {
        Self { services }
    }

    fn build_query(&self, input: Input) -> Result<TimeseriesQuery, CanaryError> {
        let tags = tag_list(input.tags)?
            .iter()
            .map(|raw| TagRef::infer(raw))
            .collect();
        let window = TimeWindow::parse(&input.start_time, &input.end_time, Utc::now())?;
        let aggregate = match (input.aggregate_name, input.aggregate_interval) {
            (None, None) => None,
            (Some(name), Some(interval)) => Some(Aggregate { name, interval }),
            _ => {
                return Err(CanaryError::invalid_query(
                    "aggregate_name and aggregate_interval must be given together",
                    "Pass both, e.g. aggregate_name 'TimeAverage2' with aggregate_interval '00:05:00'",
                ))
            }
        };
        if input.page_size == Some(0) {
            return Err(CanaryError::invalid_query(
                "page_size must be positive",
                "Omit page_size to use the configured default",
            ));
        }
        Ok(TimeseriesQuery {
            tags,
            window,
            aggregate,
            page_size: input.page_size,
            bypass_cache: input.bypass_cache,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    tags: TagList,
    #[serde(default = "default_start")]
    start_time: String,
    #[serde(default = "default_end")]
    end_time: String,
    #[serde(default)]
    aggregate_name: Option<String>,
    #[serde(default)]
    aggregate_interval: Option<String>,
    #[serde(default)]
    page_size: Option<u32>,
    #[serde(default)]
    bypass_cache: bool,
}

fn default_start() -> String {
    "now-1h".to_string()
}

fn default_end() -> String {
    "now".to_string()
}

#[async_trait]
impl Tool for QueryTimeseriesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "query_timeseries".to_string(),
            description: "Read historical samples for one or more tags over a time window. Tags \
                may be exact paths or plain descriptions, which are resolved first. An empty \
                window falls back to each tag's last known value."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "tags": {
                        "description": "Tag paths or descriptions",
                        "oneOf": [
                            { "type": "string" },
                            { "type": "array", "items": { "type": "string" }, "minItems": 1 }
                        ]
                    },
                    "start_time": {
                        "type": "string",
                        "description": "e.g. 'now-24h', '2h ago', 'yesterday', '2024-05-01T00:00:00Z'",
                        "default": "now-1h"
                    },
                    "end_time": { "type": "string", "default": "now" },
                    "aggregate_name": {
                        "type": "string",
                        "description": "Server-side aggregate, e.g. 'TimeAverage2'"
                    },
                    "aggregate_interval": {
                        "type": "string",
                        "description": "Aggregate bucket, e.g. '00:05:00'"
                    },
                    "page_size": { "type": "integer", "minimum": 1 },
                    "bypass_cache": { "type": "boolean", "default": false }
                },
                "required": ["tags"]
            }),
        }
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let outcome = async {
            let input: Input = parse_input("query_timeseries", input)?;
            let query = self.build_query(input)?;
            info!(
                request_id = %context.request_id,
                tags = query.tags.len(),
                start = %query.window.start,
                end = %query.window.end,
                "query_timeseries"
            );
            self.services.orchestrator().query(&query).await
        }
        .await;
        ToolResult::from_outcome(outcome, &self.services.guard())
    }
}
