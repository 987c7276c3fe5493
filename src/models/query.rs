//! Query-related data models.
//!
//! This module defines positional parameters, the raw result shape reported by
//! the pooled client and the normalized result handed to callers.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// A decoded row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// A positional parameter value for compiled queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(serialize_with = "base64_bytes::serialize")]
    Bytes(Vec<u8>),
    /// Structured value bound as json
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }
}

impl From<JsonValue> for QueryParam {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Json(JsonValue::Number(n))),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

/// Result of a raw statement as reported by the pooled client.
///
/// `command` is the statement's command tag (e.g. `INSERT`) and `count` the
/// number of rows it touched, when the client knows them.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult<R = Row> {
    pub rows: Vec<R>,
    pub command: Option<String>,
    pub count: Option<u64>,
}

impl<R> RawResult<R> {
    /// A result carrying only rows.
    pub fn rows(rows: Vec<R>) -> Self {
        Self {
            rows,
            command: None,
            count: None,
        }
    }

    /// Attach a command tag and count.
    pub fn with_command(mut self, command: impl Into<String>, count: Option<u64>) -> Self {
        self.command = Some(command.into());
        self.count = count;
        self
    }
}

impl<R> Default for RawResult<R> {
    fn default() -> Self {
        Self::rows(Vec::new())
    }
}

/// Normalized query result.
///
/// `num_affected_rows` is only present for INSERT, UPDATE, DELETE and MERGE
/// statements whose count was reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult<R = Row> {
    pub rows: Vec<R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_affected_rows: Option<u64>,
}
