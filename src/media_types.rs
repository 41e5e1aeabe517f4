//! Media type handling: content type normalization, wildcard lookup and
//! the deserialize stage that turns raw bytes into a structural value.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Function that deserializes a raw body. Returns a message on failure.
pub type DeserializeFn = fn(&[u8]) -> Result<Value, String>;

/// Reduce a content type to its essence (`type/subtype`), lowercased.
///
/// Parameters such as `charset` are dropped.
pub fn normalize_mimetype(raw: &str) -> String {
    match raw.trim().parse::<mime::Mime>() {
        Ok(parsed) => parsed.essence_str().to_string(),
        Err(_) => raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase(),
    }
}

/// True if a declared media type key covers `mimetype`.
///
/// Keys may be exact (`application/json`), a type wildcard
/// (`application/*`) or the full wildcard (`*/*`). An empty content type
/// matches nothing.
pub fn mimetype_matches(pattern: &str, mimetype: &str) -> bool {
    if mimetype.is_empty() {
        return false;
    }
    if pattern == "*/*" || pattern == mimetype {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(kind) => mimetype
            .split_once('/')
            .is_some_and(|(actual_kind, _)| actual_kind == kind),
        None => false,
    }
}

/// Registry of body deserializers keyed by media type.
///
/// JSON (including `+json` suffixes), form-urlencoded and `text/*` are
/// built in. Anything else passes through as a string when it is UTF-8.
#[derive(Debug, Clone, Default)]
pub struct MediaTypeDeserializers {
    custom: IndexMap<String, DeserializeFn>,
}

impl MediaTypeDeserializers {
    /// Create a registry with only the built-in deserializers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a deserializer for a media type, replacing any built-in one.
    pub fn register(mut self, mimetype: &str, deserialize: DeserializeFn) -> Self {
        self.custom.insert(normalize_mimetype(mimetype), deserialize);
        self
    }

    /// Deserialize `raw` according to `mimetype`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Deserialize` if the body is malformed for
    /// its media type.
    pub fn deserialize(&self, mimetype: &str, raw: &[u8]) -> Result<Value, ValidationError> {
        let deserialize = self.find(mimetype);
        deserialize(raw).map_err(|message| ValidationError::Deserialize {
            mimetype: mimetype.to_string(),
            message,
        })
    }

    fn find(&self, mimetype: &str) -> DeserializeFn {
        if let Some(custom) = self.custom.get(mimetype) {
            return *custom;
        }
        if mimetype == "application/json" || mimetype.ends_with("+json") {
            return deserialize_json;
        }
        if mimetype == "application/x-www-form-urlencoded" {
            return deserialize_form;
        }
        deserialize_text
    }
}

fn deserialize_json(raw: &[u8]) -> Result<Value, String> {
    serde_json::from_slice(raw).map_err(|e| e.to_string())
}

/// Decodes form fields into an object of strings. Repeated keys become arrays.
fn deserialize_form(raw: &[u8]) -> Result<Value, String> {
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(raw).map_err(|e| e.to_string())?;

    let mut fields = Map::new();
    for (key, value) in pairs {
        match fields.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                fields.insert(key, Value::String(value));
            }
        }
    }
    Ok(Value::Object(fields))
}

fn deserialize_text(raw: &[u8]) -> Result<Value, String> {
    std::str::from_utf8(raw)
        .map(|text| Value::String(text.to_string()))
        .map_err(|e| e.to_string())
}
