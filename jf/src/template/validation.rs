//! Field validation rules
//!
//! Rules are evaluated against the current model value of a field. The
//! field-mapping rule is evaluated by the mapping reconciler instead.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::{is_blank, value_text};

/// Per-field validation failure
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{id}: {message}")]
pub struct FieldError {
    /// Descriptor id
    pub id: String,
    /// Model key
    pub key: String,
    pub message: String,
}

/// Presence/format rule attached to a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum ValidationRule {
    /// Value must be present and non-empty
    Required,
    /// Every `column=value` entry needs a value; an empty list passes
    PartitionValues,
    /// Value must be a number
    Number,
    /// Custom parameters need a non-empty, unique `prop`
    UniqueProps,
    /// Both column lists must be complete
    FieldMapping,
}

impl ValidationRule {
    /// Check a model value, returning the failure message
    pub fn check(&self, value: Option<&Value>) -> Result<(), String> {
        debug!(rule = ?self, "ValidationRule::check: called");
        match self {
            Self::Required => match value {
                Some(v) if !is_blank(v) => Ok(()),
                _ => Err("value is required".to_string()),
            },
            Self::PartitionValues => check_partitions(value),
            Self::Number => match value {
                Some(Value::Number(_)) => Ok(()),
                _ => Err("value must be a number".to_string()),
            },
            Self::UniqueProps => check_unique_props(value),
            // Evaluated against the mapping lists by the resolver
            Self::FieldMapping => Ok(()),
        }
    }
}

fn check_partitions(value: Option<&Value>) -> Result<(), String> {
    let entries = match value {
        Some(Value::Array(entries)) => entries,
        None | Some(Value::Null) => return Ok(()),
        Some(_) => return Err("partitions must be a list".to_string()),
    };
    for entry in entries {
        let text = value_text(entry);
        let (column, partition_value) = text.split_once('=').unwrap_or((text.as_str(), ""));
        if partition_value.is_empty() {
            return Err(format!("partition '{column}' needs a value"));
        }
    }
    Ok(())
}

fn check_unique_props(value: Option<&Value>) -> Result<(), String> {
    let items = match value {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => return Ok(()),
        Some(_) => return Err("parameters must be a list".to_string()),
    };
    let mut seen = HashSet::new();
    for item in items {
        let prop = item.get("prop").map(value_text).unwrap_or_default();
        if prop.is_empty() {
            return Err("parameter name is required".to_string());
        }
        if !seen.insert(prop.clone()) {
            return Err(format!("parameter '{prop}' is repeated"));
        }
    }
    Ok(())
}
