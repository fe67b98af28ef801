use canary_core::CanaryError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::wire;

pub const MAX_PATH_LEN: usize = 512;
const WILDCARDS: &[char] = &['*', '?', '%'];

/// The historian operations the core knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    BrowseTags,
    BrowseNodes,
    GetTagProperties,
    GetTagData,
    GetCurrentValues,
}

impl Operation {
    pub fn endpoint(self) -> &'static str {
        match self {
            Operation::BrowseTags => "browseTags",
            Operation::BrowseNodes => "browseNodes",
            Operation::GetTagProperties => "getTagProperties",
            Operation::GetTagData => "getTagData",
            Operation::GetCurrentValues => "getCurrentValues",
        }
    }

    /// Reject shapes the historian would refuse, before any I/O.
    pub fn validate(self, params: &Value, max_tags: usize) -> Result<(), CanaryError> {
        if !params.is_object() {
            return Err(CanaryError::invalid_query(
                "parameters must be a JSON object",
                "Pass named parameters",
            ));
        }
        match self {
            Operation::BrowseTags => {
                optional_path(params, "path")?;
                if let Some(search) = optional_str(params, "search")? {
                    if search.contains(WILDCARDS) {
                        return Err(CanaryError::invalid_query(
                            format!("search '{}' contains wildcard characters", search),
                            "Search is a plain substring match; remove *, ? and %",
                        ));
                    }
                }
                if params.get("deep").is_some_and(|d| !d.is_boolean()) {
                    return Err(CanaryError::invalid_query(
                        "deep must be a boolean",
                        "Use true or false",
                    ));
                }
                Ok(())
            }
            Operation::BrowseNodes => optional_path(params, "path"),
            Operation::GetTagProperties | Operation::GetCurrentValues => {
                tag_list(params, max_tags)
            }
            Operation::GetTagData => {
                tag_list(params, max_tags)?;
                let start = required_time(params, "startTime")?;
                let end = required_time(params, "endTime")?;
                if start >= end {
                    return Err(CanaryError::invalid_query(
                        "start time must be before end time",
                        "Swap the times or widen the window",
                    ));
                }
                if let Some(size) = params.get("maxSize") {
                    if size.as_u64().map_or(true, |n| n == 0) {
                        return Err(CanaryError::invalid_query(
                            "maxSize must be a positive integer",
                            "Omit maxSize or pass a value above zero",
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Tag paths are non-empty, bounded and free of control characters.
pub fn validate_path(path: &str) -> Result<(), CanaryError> {
    if path.trim().is_empty() {
        return Err(CanaryError::invalid_query(
            "tag path is empty",
            "Provide a full dotted tag path or resolve a description first",
        ));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(CanaryError::invalid_query(
            format!("tag path exceeds {} characters", MAX_PATH_LEN),
            "Check the path; historian paths are far shorter",
        ));
    }
    if path.chars().any(char::is_control) {
        return Err(CanaryError::invalid_query(
            "tag path contains control characters",
            "Remove newlines and other control characters from the path",
        ));
    }
    Ok(())
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Result<Option<&'a str>, CanaryError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(CanaryError::invalid_query(
            format!("{} must be a string", key),
            format!("Pass {} as text", key),
        )),
    }
}

fn optional_path(params: &Value, key: &str) -> Result<(), CanaryError> {
    match optional_str(params, key)? {
        Some(p) if !p.is_empty() => validate_path(p),
        _ => Ok(()),
    }
}

fn tag_list(params: &Value, max_tags: usize) -> Result<(), CanaryError> {
    let tags = params.get("tags").and_then(Value::as_array).ok_or_else(|| {
        CanaryError::invalid_query("tags must be a list of tag paths", "Pass at least one tag path")
    })?;
    if tags.is_empty() {
        return Err(CanaryError::invalid_query(
            "no tags given",
            "Pass at least one tag path",
        ));
    }
    if tags.len() > max_tags {
        return Err(CanaryError::invalid_query(
            format!("{} tags requested, at most {} allowed", tags.len(), max_tags),
            "Split the request into smaller batches",
        ));
    }
    for tag in tags {
        let path = tag.as_str().ok_or_else(|| {
            CanaryError::invalid_query("tag paths must be strings", "Pass tag paths as text")
        })?;
        validate_path(path)?;
    }
    Ok(())
}

fn required_time(params: &Value, key: &str) -> Result<DateTime<Utc>, CanaryError> {
    let raw = params.get(key).and_then(Value::as_str).ok_or_else(|| {
        CanaryError::invalid_query(format!("{} is required", key), "Provide an RFC 3339 timestamp")
    })?;
    wire::parse_timestamp(raw).ok_or_else(|| {
        CanaryError::invalid_query(
            format!("{} '{}' is not a timestamp", key, raw),
            "Use RFC 3339, e.g. 2024-05-01T00:00:00Z",
        )
    })
}
