//! # Runtime Value Representation
//!
//! [`Value`] is the tagged variant carried from the record decoder to the
//! SQLite binder. The variants map one-to-one onto SQLite's storage
//! classes, which keeps binding a plain dispatch on the tag.
//!
//! | Variant | Rust Type | SQLite storage class |
//! |---------|-----------|----------------------|
//! | Null    | -         | NULL                 |
//! | Int     | i64       | INTEGER              |
//! | Real    | f64       | REAL                 |
//! | Text    | String    | TEXT                 |
//! | Blob    | Vec<u8>   | BLOB                 |
//!
//! The JSON projection is used when a value becomes an element of an array
//! column. Non-finite reals have no JSON representation and project to
//! null, the same convention the NULL-sentinel DOUBLE uses.

/// A decoded cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Projects this value into JSON for array-column serialization.
    ///
    /// Blobs never occur as array elements; a blob projects to null rather
    /// than inventing an encoding the round-trip contract does not name.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Blob(_) => serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
