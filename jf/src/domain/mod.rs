//! Domain types for jobform
//!
//! The job model, select options and the column records edited by the
//! field-mapping editor.

mod column;
mod model;

pub use column::{CUSTOM_DATA_TYPE, ColumnRecord};
pub use model::{Model, ModelError, is_blank, is_truthy, value_text};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One label/value pair offered by a select field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: Value,
}

impl SelectOption {
    /// Option whose label is also its value
    pub fn same(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            value: Value::String(text.clone()),
            label: text,
        }
    }

    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}
