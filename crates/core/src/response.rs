//! The response envelope every caller of the core receives.
//!
//! Success: `{"success": true, ...payload}`.
//! Failure: `{"success": false, "error": {"type", "message", "remediation"}}`.
//! Truncated: `{"success": true, "truncated": true, "limit_bytes", "original_size_bytes", "preview"}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CanaryError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub remediation: String,
}

impl From<&CanaryError> for ErrorBody {
    fn from(err: &CanaryError) -> Self {
        Self {
            error_type: err.error_type().to_string(),
            message: err.to_string(),
            remediation: err.remediation(),
        }
    }
}

/// Marker left in place of a payload that exceeded the byte cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Truncation {
    pub limit_bytes: usize,
    pub original_size_bytes: usize,
    pub preview: String,
}

impl Truncation {
    pub fn to_envelope(&self) -> Value {
        serde_json::json!({
            "success": true,
            "truncated": true,
            "limit_bytes": self.limit_bytes,
            "original_size_bytes": self.original_size_bytes,
            "preview": self.preview,
        })
    }
}

/// Wrap a serializable payload as a success envelope.
///
/// Object payloads are flattened next to `success`; anything else lands
/// under `data`.
pub fn success_envelope<T: Serialize>(payload: &T) -> Result<Value, CanaryError> {
    let value = serde_json::to_value(payload)?;
    let mut map = Map::new();
    map.insert("success".to_string(), Value::Bool(true));
    match value {
        Value::Object(fields) => {
            for (k, v) in fields {
                if k != "success" {
                    map.insert(k, v);
                }
            }
        }
        other => {
            map.insert("data".to_string(), other);
        }
    }
    Ok(Value::Object(map))
}

pub fn error_envelope(err: &CanaryError) -> Value {
    serde_json::json!({
        "success": false,
        "error": ErrorBody::from(err),
    })
}

/// Collapse a result into its envelope; errors never escape as anything else.
pub fn envelope<T: Serialize>(result: Result<T, CanaryError>) -> Value {
    match result.and_then(|payload| success_envelope(&payload)) {
        Ok(v) => v,
        Err(e) => error_envelope(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_flattens_objects() {
        let v = success_envelope(&json!({"path": "A.B", "count": 2})).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["path"], "A.B");
        assert_eq!(v["count"], 2);
    }

    #[test]
    fn success_wraps_scalars_under_data() {
        let v = success_envelope(&vec![1, 2, 3]).unwrap();
        assert_eq!(v["data"], json!([1, 2, 3]));
    }

    #[test]
    fn errors_carry_type_message_and_remediation() {
        let err = CanaryError::invalid_query("description is empty", "describe the signal");
        let v = envelope::<Value>(Err(err));
        assert_eq!(v["success"], false);
        assert_eq!(v["error"]["type"], "invalid_query");
        assert!(v["error"]["message"].as_str().unwrap().contains("description is empty"));
        assert_eq!(v["error"]["remediation"], "describe the signal");
    }

    #[test]
    fn truncation_envelope_shape() {
        let t = Truncation {
            limit_bytes: 10,
            original_size_bytes: 100,
            preview: "{\"a\":".into(),
        };
        let v = t.to_envelope();
        assert_eq!(v["truncated"], true);
        assert_eq!(v["limit_bytes"], 10);
        assert_eq!(v["original_size_bytes"], 100);
    }
}
