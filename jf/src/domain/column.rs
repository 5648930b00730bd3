//! Column records of the field-mapping editor

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Data type given to records the user adds by hand
pub const CUSTOM_DATA_TYPE: &str = "custom";

/// One row of the source or target column list
///
/// `connected` only means something pairwise: `source[i].connected &&
/// target[i].connected` is one logical connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRecord {
    #[serde(rename = "index", default)]
    pub ordinal_hint: u32,

    #[serde(rename = "columnName", default)]
    pub name: String,

    #[serde(rename = "dataType", default)]
    pub data_type: String,

    #[serde(rename = "enable", default)]
    pub connected: bool,

    /// Raw structured payload, used by document sinks
    #[serde(rename = "json", default)]
    pub raw_json: String,
}

impl ColumnRecord {
    /// Empty, unconnected record
    pub fn empty() -> Self {
        Self {
            ordinal_hint: 0,
            name: String::new(),
            data_type: CUSTOM_DATA_TYPE.to_string(),
            connected: false,
            raw_json: String::new(),
        }
    }

    /// Record built from catalog column metadata
    pub fn from_column(ordinal: usize, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let name = name.into();
        debug!(ordinal, %name, "ColumnRecord::from_column: called");
        Self {
            ordinal_hint: ordinal as u32,
            name,
            data_type: data_type.into(),
            connected: false,
            raw_json: String::new(),
        }
    }
}

impl Default for ColumnRecord {
    fn default() -> Self {
        Self::empty()
    }
}
