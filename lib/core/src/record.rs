use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A single row: field name to JSON value
pub type Record = Map<String, Value>;

/// Field that identifies a record across datasets and requests
pub const RECORD_ID_FIELD: &str = "PTR_SEQUENCE_NUM";

/// Identifier used when the target record carries no id field
pub const UNKNOWN_RECORD_ID: &str = "unknown";

/// Identifier of a target record, echoed back to the caller verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Value);

impl RecordId {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Extract the id from a record, falling back to `"unknown"`
    pub fn of(record: &Record) -> Self {
        match record.get(RECORD_ID_FIELD) {
            Some(value) => Self(value.clone()),
            None => Self(Value::String(UNKNOWN_RECORD_ID.to_string())),
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Rendering used for cache keys. Strings render raw so that `42` and
    /// `"42"` address the same entry.
    pub fn key(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Type a raw CSV cell the way a dataframe reader would: empty is null,
/// integers and floats become numbers, `True`/`False` become booleans,
/// everything else stays text.
pub fn infer_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "" => return Value::Null,
        "True" | "TRUE" | "true" => return Value::Bool(true),
        "False" | "FALSE" | "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        // JSON has no NaN / inf
        return serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    Value::String(raw.to_string())
}
