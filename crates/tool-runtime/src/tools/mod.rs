//! The historian tools exposed to LLM clients.
//!
//! Every tool returns the standard response envelope and passes its final
//! payload through the response size guard.

pub mod browse_tags;
pub mod cache_invalidate;
pub mod get_last_value;
pub mod get_tag_metadata;
pub mod query_timeseries;
pub mod resolve_tag;
pub mod search_catalog;
pub mod service_health;

use std::sync::Arc;

use canary_core::CanaryError;
use canary_historian::Fetched;
use serde::Deserialize;
use serde_json::Value;

pub use browse_tags::BrowseTagsTool;
pub use cache_invalidate::CacheInvalidateTool;
pub use get_last_value::GetLastValueTool;
pub use get_tag_metadata::GetTagMetadataTool;
pub use query_timeseries::QueryTimeseriesTool;
pub use resolve_tag::ResolveTagTool;
pub use search_catalog::SearchCatalogTool;
pub use service_health::ServiceHealthTool;

use crate::registry::{RegistryError, ToolRegistry};
use crate::services::CanaryServices;

/// Register every historian tool against one shared set of services.
pub fn register_all(
    registry: &mut ToolRegistry,
    services: Arc<CanaryServices>,
) -> Result<(), RegistryError> {
    registry.register(ResolveTagTool::new(services.clone()))?;
    registry.register(SearchCatalogTool::new(services.clone()))?;
    registry.register(BrowseTagsTool::new(services.clone()))?;
    registry.register(GetTagMetadataTool::new(services.clone()))?;
    registry.register(QueryTimeseriesTool::new(services.clone()))?;
    registry.register(GetLastValueTool::new(services.clone()))?;
    registry.register(CacheInvalidateTool::new(services.clone()))?;
    registry.register(ServiceHealthTool::new(services))?;
    Ok(())
}

/// One tag or a list of tags.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum TagList {
    One(String),
    Many(Vec<String>),
}

/// Trimmed, non-empty tag strings.
pub(crate) fn tag_list(tags: TagList) -> Result<Vec<String>, CanaryError> {
    let raw = match tags {
        TagList::One(tag) => vec![tag],
        TagList::Many(tags) => tags,
    };
    let tags: Vec<String> = raw
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        return Err(CanaryError::invalid_query(
            "no tags given",
            "Pass at least one tag path or description",
        ));
    }
    Ok(tags)
}

/// The payload built from a fetched value, or the truncation marker in its place.
pub(crate) fn payload_or_marker<T>(fetched: Fetched<T>, build: impl FnOnce(T) -> Value) -> Value {
    match fetched.truncation {
        Some(truncation) => truncation.to_envelope(),
        None => build(fetched.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_lists_accept_one_or_many() {
        assert_eq!(tag_list(TagList::One(" A.B ".into())).unwrap(), vec!["A.B"]);
        assert_eq!(
            tag_list(TagList::Many(vec!["A.B".into(), "".into(), "C.D".into()])).unwrap(),
            vec!["A.B", "C.D"]
        );
        let err = tag_list(TagList::Many(vec!["  ".into()])).unwrap_err();
        assert_eq!(err.error_type(), "invalid_query");
    }
}
