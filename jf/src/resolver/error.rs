//! Resolver errors

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::domain::ModelError;
use crate::template::TemplateError;

/// Errors surfaced by the form resolver
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Invalid template: {0}")]
    Template(#[from] TemplateError),

    #[error("Invalid model: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid column list under '{key}': {message}")]
    InvalidColumns { key: String, message: String },

    #[error("Lookup for '{trigger}' failed: {source}")]
    Lookup {
        trigger: String,
        #[source]
        source: CatalogError,
    },
}
