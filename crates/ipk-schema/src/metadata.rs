//! Parsed component metadata (`appinfo.json`, `services.json`, ...).

use serde::Serialize;
use serde_json::{Map, Value};

/// Errors that can occur when parsing a metadata file.
#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    /// The bytes are not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed, but its root is not an object.
    #[error("expected a JSON object at the document root, found {0}")]
    NotAnObject(&'static str),
}

/// Key/value view over one parsed metadata file.
///
/// Read-only once built; the only mutator is [`MetadataStore::set`], kept for
/// in-memory normalization during resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataStore {
    data: Map<String, Value>,
}

impl MetadataStore {
    /// Parse raw metadata bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Json`] for malformed input and
    /// [`MetadataError::NotAnObject`] when the root is an array or scalar.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MetadataError> {
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(data) => Ok(Self { data }),
            other => Err(MetadataError::NotAnObject(json_kind(&other))),
        }
    }

    /// Look up a field. A missing key is `None`, not an error.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Look up a field holding a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// The whole parsed document.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Overwrite a field of the in-memory copy. The file on disk is untouched.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
