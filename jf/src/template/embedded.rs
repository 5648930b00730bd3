//! Embedded templates
//!
//! These are compiled into the binary from .yml files at build time.

use tracing::debug;

/// DataX synchronization job template
pub const DATAX: &str = include_str!("../../templates/datax.yml");

/// Get the embedded template by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "datax" => {
            debug!("get_embedded: matched datax");
            Some(DATAX)
        }
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
