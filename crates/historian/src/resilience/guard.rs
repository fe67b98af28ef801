use canary_core::Truncation;
use serde_json::Value;
use tracing::warn;

/// Upper bound on the preview kept from an oversized response.
pub const PREVIEW_BYTES: usize = 1024;

/// A response after the size check.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded {
    Complete(Value),
    Truncated(Truncation),
}

impl Guarded {
    pub fn is_truncated(&self) -> bool {
        matches!(self, Guarded::Truncated(_))
    }

    /// What a caller should hand on: the value itself, or the truncation envelope.
    pub fn into_value(self) -> Value {
        match self {
            Guarded::Complete(v) => v,
            Guarded::Truncated(t) => t.to_envelope(),
        }
    }
}

/// Replaces any serialized payload over `max_bytes` with a truncation marker.
#[derive(Debug, Clone, Copy)]
pub struct SizeGuard {
    max_bytes: usize,
}

impl SizeGuard {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn check(&self, value: Value) -> Guarded {
        let serialized = value.to_string();
        if serialized.len() <= self.max_bytes {
            return Guarded::Complete(value);
        }
        warn!(
            size_bytes = serialized.len(),
            limit_bytes = self.max_bytes,
            "Response exceeds size limit, truncating"
        );
        let cut = floor_char_boundary(&serialized, PREVIEW_BYTES.min(self.max_bytes));
        Guarded::Truncated(Truncation {
            limit_bytes: self.max_bytes,
            original_size_bytes: serialized.len(),
            preview: serialized[..cut].to_string(),
        })
    }

    /// Size-check a final outgoing value, returning whatever should be sent.
    pub fn render(&self, value: Value) -> Value {
        self.check(value).into_value()
    }
}

fn floor_char_boundary(s: &str, mut at: usize) -> usize {
    if at >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn small_values_pass_through() {
        let guard = SizeGuard::new(1_000);
        let v = json!({"a": [1, 2, 3]});
        assert_eq!(guard.check(v.clone()), Guarded::Complete(v));
    }

    #[test]
    fn oversized_values_become_a_marker() {
        let guard = SizeGuard::new(100);
        let big = json!({"blob": "x".repeat(500)});
        let size = big.to_string().len();
        match guard.check(big) {
            Guarded::Truncated(t) => {
                assert_eq!(t.limit_bytes, 100);
                assert_eq!(t.original_size_bytes, size);
                assert_eq!(t.preview.len(), 100);
                assert!(t.preview.starts_with("{\"blob\":\"xxx"));
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let guard = SizeGuard::new(10);
        let v = json!("ééééééééééééé");
        match guard.check(v) {
            Guarded::Truncated(t) => {
                assert!(t.preview.len() <= 10);
                assert!(t.preview.starts_with('"'));
            }
            _ => panic!("expected truncation"),
        }
    }

    #[test]
    fn render_yields_envelope() {
        let guard = SizeGuard::new(5);
        let out = guard.render(json!({"long": "value"}));
        assert_eq!(out["success"], true);
        assert_eq!(out["truncated"], true);
    }
}
