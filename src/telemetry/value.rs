//! Label values attached to transactions and spans.
//!
//! Labels are indexed by the backend, so they are restricted to a closed set
//! of scalar kinds. Arbitrary structured payloads go into custom context
//! (`serde_json::Value`) instead, which the backend stores without indexing.

use serde::Serialize;

/// A scalar label value.
///
/// Serializes untagged, so `{"has_body": true, "content_length": "42"}` comes
/// out flat on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LabelValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for LabelValue {
    fn from(v: &str) -> Self {
        LabelValue::Str(v.to_string())
    }
}

impl From<String> for LabelValue {
    fn from(v: String) -> Self {
        LabelValue::Str(v)
    }
}

impl From<i64> for LabelValue {
    fn from(v: i64) -> Self {
        LabelValue::Int(v)
    }
}

impl From<u16> for LabelValue {
    fn from(v: u16) -> Self {
        LabelValue::Int(v as i64)
    }
}

impl From<u64> for LabelValue {
    fn from(v: u64) -> Self {
        LabelValue::Int(v as i64)
    }
}

impl From<usize> for LabelValue {
    fn from(v: usize) -> Self {
        LabelValue::Int(v as i64)
    }
}

impl From<f64> for LabelValue {
    fn from(v: f64) -> Self {
        LabelValue::Float(v)
    }
}

impl From<bool> for LabelValue {
    fn from(v: bool) -> Self {
        LabelValue::Bool(v)
    }
}

impl std::fmt::Display for LabelValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelValue::Str(v) => write!(f, "{}", v),
            LabelValue::Int(v) => write!(f, "{}", v),
            LabelValue::Float(v) => write!(f, "{}", v),
            LabelValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_flat() {
        let mut labels = std::collections::BTreeMap::new();
        labels.insert("method", LabelValue::from("POST"));
        labels.insert("status", LabelValue::from(200u16));
        labels.insert("success", LabelValue::from(true));

        let json = serde_json::to_value(&labels).unwrap();
        assert_eq!(json["method"], "POST");
        assert_eq!(json["status"], 200);
        assert_eq!(json["success"], true);
    }
}
