use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// OPC-style quality of a historian reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Bad,
    Uncertain,
}

impl Quality {
    /// Interpret the quality field as the historian sends it: either an OPC
    /// numeric code (192+ good, 64..192 uncertain, below bad) or a name.
    /// Anything unrecognised is treated as uncertain.
    pub fn from_wire(raw: &Value) -> Self {
        match raw {
            Value::Number(n) => match n.as_u64() {
                Some(code) if code >= 192 => Quality::Good,
                Some(code) if code >= 64 => Quality::Uncertain,
                Some(_) => Quality::Bad,
                None => Quality::Uncertain,
            },
            Value::String(s) => {
                let s = s.to_ascii_lowercase();
                if s.starts_with("good") {
                    Quality::Good
                } else if s.starts_with("bad") {
                    Quality::Bad
                } else {
                    Quality::Uncertain
                }
            }
            Value::Null => Quality::Good,
            _ => Quality::Uncertain,
        }
    }
}

/// A reading is numeric or text; bad-quality samples may carry no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(f64),
    Text(String),
    Empty,
}

impl SampleValue {
    pub fn from_wire(raw: &Value) -> Self {
        match raw {
            Value::Number(n) => n.as_f64().map(SampleValue::Number).unwrap_or(SampleValue::Empty),
            Value::Bool(b) => SampleValue::Number(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => SampleValue::Text(s.clone()),
            Value::Null => SampleValue::Empty,
            other => SampleValue::Text(other.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// One historian reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesSample {
    pub timestamp: DateTime<Utc>,
    pub value: SampleValue,
    pub quality: Quality,
    pub tag_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quality_from_opc_codes_and_names() {
        assert_eq!(Quality::from_wire(&json!(192)), Quality::Good);
        assert_eq!(Quality::from_wire(&json!(216)), Quality::Good);
        assert_eq!(Quality::from_wire(&json!(64)), Quality::Uncertain);
        assert_eq!(Quality::from_wire(&json!(0)), Quality::Bad);
        assert_eq!(Quality::from_wire(&json!("Good")), Quality::Good);
        assert_eq!(Quality::from_wire(&json!("BadNoData")), Quality::Bad);
        assert_eq!(Quality::from_wire(&json!("weird")), Quality::Uncertain);
    }

    #[test]
    fn values_keep_numeric_and_text_apart() {
        assert_eq!(SampleValue::from_wire(&json!(1.5)).as_f64(), Some(1.5));
        assert_eq!(SampleValue::from_wire(&json!("RUN")), SampleValue::Text("RUN".into()));
        assert_eq!(SampleValue::from_wire(&json!(null)), SampleValue::Empty);
        assert_eq!(serde_json::to_value(SampleValue::Empty).unwrap(), json!(null));
    }
}
