//! JSON dialect: one object per line.

use serde_json::{Map, Value};

use pdns_core::errors::ReadError;

/// Parse one line into a JSON object.
pub(crate) fn parse_object(line: &str, line_no: u64) -> Result<Map<String, Value>, ReadError> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ReadError::BadJson {
            line: line_no,
            message: "not an object".to_string(),
        }),
        Err(err) => Err(ReadError::BadJson {
            line: line_no,
            message: err.to_string(),
        }),
    }
}

/// Render a timestamp value to its canonical string form. String values
/// pass through; integers render plain; fractional numbers render with
/// six decimal places, matching the sensors' own formatting.
pub(crate) fn timestamp_string(field: &str, value: &Value) -> Result<String, ReadError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.to_string())
            } else if let Some(f) = n.as_f64() {
                Ok(format!("{f:.6}"))
            } else {
                Err(wrong_type(field, "timestamp"))
            }
        }
        _ => Err(wrong_type(field, "timestamp")),
    }
}

/// Render a JSON array to a list of strings. Numbers are stringified so
/// numeric TTL arrays read the same as string ones.
pub(crate) fn string_list(field: &str, value: &Value) -> Result<Vec<String>, ReadError> {
    let Value::Array(items) = value else {
        return Err(wrong_type(field, "array"));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => out.push(s.clone()),
            Value::Number(n) => out.push(n.to_string()),
            _ => return Err(wrong_type(field, "array of strings")),
        }
    }
    Ok(out)
}

pub(crate) fn wrong_type(field: &str, expected: &'static str) -> ReadError {
    ReadError::WrongType {
        field: field.to_string(),
        expected,
    }
}
