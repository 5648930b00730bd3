//! Field mapping
//!
//! Two ordered column lists, source and target. A connection between the
//! records at index `i` exists when both carry the connected flag, so every
//! structural edit has to keep the two lists' flags consistent.

mod reconciler;

pub use reconciler::MappingReconciler;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which column list an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Self::Source => Self::Target,
            Self::Target => Self::Source,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// Move direction within a list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// How the target list is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingMode {
    /// Target columns are typed table columns
    #[default]
    Standard,
    /// Target records carry a raw structured payload (document sinks)
    Document,
}

/// Mapping errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("{side} column {index} has no name")]
    MissingName { side: Side, index: usize },

    #[error("{side} column {index} has no data type")]
    MissingType { side: Side, index: usize },

    #[error("Target record {index} is not valid JSON: {message}")]
    MalformedJson { index: usize, message: String },

    #[error("Target record {index} has no JSON payload")]
    MissingJson { index: usize },

    #[error("No {side} record at index {index}")]
    OutOfRange { side: Side, index: usize },
}
