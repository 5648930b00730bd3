//! Job configuration model
//!
//! A JSON object addressed by dot-path keys. `elasticSearchDataxParams.index`
//! reads and writes the `index` member of the nested `elasticSearchDataxParams`
//! object, creating intermediate objects on write.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Errors from building a model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model root must be a JSON object, got {0}")]
    NotAnObject(String),
}

/// Flat key -> value view over the job configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Model {
    root: Map<String, Value>,
}

impl Model {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a model from a JSON value (must be an object; null is treated as empty)
    pub fn from_value(value: Value) -> Result<Self, ModelError> {
        debug!("Model::from_value: called");
        match value {
            Value::Object(root) => Ok(Self { root }),
            Value::Null => Ok(Self::default()),
            other => Err(ModelError::NotAnObject(kind_name(&other).to_string())),
        }
    }

    /// Read the value at a dot-path key
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let first = parts.next()?;
        let mut current = self.root.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Write the value at a dot-path key
    ///
    /// Missing or non-object intermediates are replaced by empty objects.
    pub fn set(&mut self, key: &str, value: Value) {
        debug!(%key, "Model::set: called");
        let parts: Vec<&str> = key.split('.').collect();
        let (last, parents) = match parts.split_last() {
            Some(split) => split,
            None => return,
        };

        let mut current = &mut self.root;
        for part in parents {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.to_string(), value);
    }

    /// Remove the value at a top-level or dot-path key
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        debug!(%key, "Model::remove: called");
        match key.rsplit_once('.') {
            Some((parent, last)) => {
                let mut current = &mut self.root;
                for part in parent.split('.') {
                    current = current.get_mut(part)?.as_object_mut()?;
                }
                current.remove(last)
            }
            None => self.root.remove(key),
        }
    }

    /// Whether a value exists at the key
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert `default` when the key is absent; returns true if inserted
    pub fn ensure(&mut self, key: &str, default: Value) -> bool {
        if self.contains(key) {
            return false;
        }
        debug!(%key, "Model::ensure: filling default");
        self.set(key, default);
        true
    }

    /// Textual form of a scalar value (`""` for missing, null or structured values)
    pub fn text(&self, key: &str) -> String {
        self.get(key).map(value_text).unwrap_or_default()
    }

    /// Whether the value at the key is missing or empty
    pub fn is_blank(&self, key: &str) -> bool {
        self.get(key).is_none_or(is_blank)
    }

    /// Whether the value at the key reads as "on"
    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_truthy)
    }

    /// Borrow the underlying object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Clone into a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }
}

/// Textual form of a scalar JSON value
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Missing-value check used by triggers and the `required` rule
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) | Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Switch semantics: booleans, non-zero numbers and "1"/"true"/"yes"
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        _ => false,
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
