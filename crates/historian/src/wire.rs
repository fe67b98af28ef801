//! Lenient decoding of Views API response bodies.
//!
//! Historian versions disagree on small details (strings vs objects in tag
//! lists, `v`/`value` keys, numeric vs named quality), so decoders accept
//! every shape seen in the field and skip what they cannot read.

use std::collections::BTreeMap;

use canary_core::{Quality, SampleValue, TimeseriesSample};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Remote error message when the body carries a non-`Good` status code.
pub fn status_error(body: &Value) -> Option<String> {
    let code = body.get("statusCode")?.as_str()?;
    if code.eq_ignore_ascii_case("good") {
        return None;
    }
    let detail = match body.get("errors") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
            .collect::<Vec<_>>()
            .join("; "),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    Some(if detail.is_empty() {
        code.to_string()
    } else {
        format!("{}: {}", code, detail)
    })
}

/// Status messages that mean the session token is no longer accepted.
pub fn is_session_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["session", "token", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// RFC 3339, a naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` taken as UTC, or epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    raw.parse::<i64>().ok().and_then(timestamp_from_millis)
}

fn timestamp_from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn timestamp_of(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(timestamp_from_millis),
        _ => None,
    }
}

fn str_field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Tag paths from a `browseTags` reply.
pub fn decode_tags(body: &Value) -> Vec<String> {
    let items = match body.get("tags").or_else(|| body.get("items")) {
        Some(Value::Array(items)) => items,
        _ => return Vec::new(),
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(_) => str_field(item, &["path", "fullPath", "name"]).map(str::to_string),
            _ => None,
        })
        .collect()
}

/// One child of a namespace node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseNode {
    pub name: String,
    pub path: String,
    pub has_children: bool,
}

/// Children from a `browseNodes` reply, either a list or a name-keyed map.
pub fn decode_nodes(body: &Value, parent: &str) -> Vec<BrowseNode> {
    let child_path = |name: &str| {
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", parent, name)
        }
    };
    match body.get("nodes") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(BrowseNode {
                    path: child_path(name),
                    name: name.clone(),
                    has_children: true,
                }),
                Value::Object(_) => {
                    let name = str_field(item, &["name", "nodeName"])?.to_string();
                    let path = str_field(item, &["path", "fullPath"])
                        .map(str::to_string)
                        .unwrap_or_else(|| child_path(&name));
                    Some(BrowseNode {
                        has_children: item
                            .get("hasNodes")
                            .or_else(|| item.get("hasChildren"))
                            .and_then(Value::as_bool)
                            .unwrap_or(true),
                        name,
                        path,
                    })
                }
                _ => None,
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, info)| BrowseNode {
                path: str_field(info, &["fullPath", "path"])
                    .map(str::to_string)
                    .unwrap_or_else(|| child_path(name)),
                has_children: info.get("hasNodes").and_then(Value::as_bool).unwrap_or(true),
                name: name.clone(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Properties of one tag as returned by `getTagProperties`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagProperties {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Remaining scalar properties, stringified.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl TagProperties {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.unit.is_none() && self.extra.is_empty()
    }

    /// All free text carried by the properties, for keyword matching.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(self.description.as_deref());
        parts.extend(self.unit.as_deref());
        parts.extend(self.extra.values().map(String::as_str));
        parts.join(" ")
    }
}

const DESCRIPTION_KEYS: &[&str] = &["description", "desc", "tagdescription"];
const UNIT_KEYS: &[&str] = &["engunits", "units", "unit", "engineeringunits"];

fn decode_property_set(path: &str, raw: &Value) -> TagProperties {
    let mut props = TagProperties {
        path: path.to_string(),
        ..Default::default()
    };
    let Value::Object(map) = raw else {
        return props;
    };
    for (key, value) in map {
        let text = match value {
            Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        let lower = key.to_ascii_lowercase();
        if DESCRIPTION_KEYS.contains(&lower.as_str()) {
            props.description.get_or_insert(text);
        } else if UNIT_KEYS.contains(&lower.as_str()) {
            props.unit.get_or_insert(text);
        } else {
            props.extra.insert(key.clone(), text);
        }
    }
    props
}

/// Properties keyed by path. Tags the historian omitted are absent.
pub fn decode_properties(body: &Value) -> BTreeMap<String, TagProperties> {
    let source = body.get("properties").unwrap_or(body);
    match source {
        Value::Object(map) => map
            .iter()
            .filter(|(k, _)| k.as_str() != "statusCode" && k.as_str() != "errors")
            .filter(|(_, v)| v.is_object())
            .map(|(path, raw)| (path.clone(), decode_property_set(path, raw)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Server-side aggregation for a data read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub name: String,
    /// Interval in the historian's `HH:MM:SS` or `1m`-style notation, passed through.
    pub interval: String,
}

/// One page of a `getTagData` (or `getCurrentValues`) reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPage {
    pub samples: BTreeMap<String, Vec<TimeseriesSample>>,
    /// Opaque cursor for the next page; `None` when the window is exhausted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<Value>,
    /// Raw samples that could not be decoded.
    #[serde(default)]
    pub skipped: usize,
}

impl DataPage {
    pub fn sample_count(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }
}

fn decode_sample(path: &str, raw: &Value) -> Option<TimeseriesSample> {
    let timestamp = ["t", "timestamp", "time"]
        .iter()
        .find_map(|k| raw.get(*k))
        .and_then(timestamp_of)?;
    let value = ["v", "value"]
        .iter()
        .find_map(|k| raw.get(*k))
        .map(SampleValue::from_wire)
        .unwrap_or(SampleValue::Empty);
    let quality = ["q", "quality"]
        .iter()
        .find_map(|k| raw.get(*k))
        .map(Quality::from_wire)
        .unwrap_or(Quality::Good);
    Some(TimeseriesSample {
        timestamp,
        value,
        quality,
        tag_path: path.to_string(),
    })
}

pub fn decode_data(body: &Value) -> DataPage {
    let mut page = DataPage {
        continuation: body.get("continuation").filter(|c| !c.is_null()).cloned(),
        ..Default::default()
    };
    let Some(Value::Object(tags)) = body.get("data") else {
        return page;
    };
    for (path, series) in tags {
        let raw_samples = match series {
            Value::Array(items) => items.as_slice(),
            Value::Object(_) => match series.get("values") {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            },
            _ => &[],
        };
        let mut samples = Vec::with_capacity(raw_samples.len());
        for raw in raw_samples {
            match decode_sample(path, raw) {
                Some(s) => samples.push(s),
                None => page.skipped += 1,
            }
        }
        // getCurrentValues may return one bare sample per tag.
        if samples.is_empty() && series.is_object() && series.get("values").is_none() {
            if let Some(s) = decode_sample(path, series) {
                samples.push(s);
            }
        }
        page.samples.insert(path.clone(), samples);
    }
    if page.skipped > 0 {
        debug!(skipped = page.skipped, "Skipped undecodable samples");
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_codes() {
        assert_eq!(status_error(&json!({"statusCode": "Good", "tags": []})), None);
        assert_eq!(status_error(&json!({"tags": []})), None);
        let msg = status_error(&json!({"statusCode": "BadSessionToken", "errors": ["expired"]}))
            .unwrap();
        assert_eq!(msg, "BadSessionToken: expired");
        assert!(is_session_message(&msg));
        assert!(!is_session_message("BadTagPath: no such tag"));
    }

    #[test]
    fn timestamps_in_every_shape() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01 12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("1714564800000"), Some(expected));
        assert_eq!(parse_timestamp("noon"), None);
    }

    #[test]
    fn tag_lists_accept_strings_and_objects() {
        let body = json!({"tags": ["A.B", {"path": "A.C"}, {"name": "A.D"}, 7, ""]});
        assert_eq!(decode_tags(&body), vec!["A.B", "A.C", "A.D"]);
        assert!(decode_tags(&json!({})).is_empty());
    }

    #[test]
    fn nodes_from_list_or_map() {
        let list = decode_nodes(&json!({"nodes": ["Kiln6", {"name": "Mill2", "hasNodes": false}]}), "Plant");
        assert_eq!(list[0].path, "Plant.Kiln6");
        assert!(!list[1].has_children);

        let map = decode_nodes(&json!({"nodes": {"Kiln6": {"fullPath": "Plant.Kiln6"}}}), "");
        assert_eq!(map[0].name, "Kiln6");
        assert_eq!(map[0].path, "Plant.Kiln6");
    }

    #[test]
    fn properties_split_known_fields() {
        let body = json!({"properties": {
            "Plant.Kiln6.Section15.ShellTemp": {
                "Description": "Kiln 6 shell temperature, section 15",
                "EngUnits": "degC",
                "Area": "Pyro",
                "Nested": {"ignored": true}
            },
            "Plant.Unknown": null
        }});
        let props = decode_properties(&body);
        assert_eq!(props.len(), 1);
        let p = &props["Plant.Kiln6.Section15.ShellTemp"];
        assert_eq!(p.unit.as_deref(), Some("degC"));
        assert_eq!(p.extra["Area"], "Pyro");
        assert!(p.text().contains("shell temperature"));
    }

    #[test]
    fn data_pages_keep_per_tag_identity() {
        let body = json!({
            "data": {
                "A.B": [
                    {"t": "2024-05-01T00:00:00Z", "v": 1.5, "q": 192},
                    {"t": "garbage", "v": 2.0},
                ],
                "A.C": {"values": [{"timestamp": 1714521600000i64, "value": "RUN", "quality": "Good"}]},
            },
            "continuation": "page-2",
        });
        let page = decode_data(&body);
        assert_eq!(page.samples["A.B"].len(), 1);
        assert_eq!(page.samples["A.B"][0].tag_path, "A.B");
        assert_eq!(page.samples["A.C"][0].value, SampleValue::Text("RUN".into()));
        assert_eq!(page.skipped, 1);
        assert_eq!(page.continuation, Some(json!("page-2")));
        assert_eq!(page.sample_count(), 2);
    }

    #[test]
    fn current_values_as_bare_samples() {
        let body = json!({"data": {"A.B": {"t": "2024-05-01T00:00:00Z", "v": 3, "q": 0}}});
        let page = decode_data(&body);
        assert_eq!(page.samples["A.B"][0].quality, Quality::Bad);
        assert!(page.continuation.is_none());
    }
}
