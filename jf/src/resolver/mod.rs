//! Dependency resolver
//!
//! Keeps the derived state of a form consistent with its model: spans follow
//! the layout table, trigger keys clear what they produce and issue remote
//! lookups, and late results of superseded lookups are discarded.
//!
//! ```text
//! on_field_change(key) ──► write model ──► clear produced keys (cascade)
//!                                     └──► spawn lookup(generation, value)
//! next_outcome()/settle() ◄── completion ──► apply if generation and value still match
//! ```

mod engine;
mod error;
mod events;
mod lookup;

use std::time::Duration;

pub use engine::{FieldView, FormResolver};
pub use error::ResolverError;
pub use events::{EventBus, FormEvent};
pub use lookup::{LookupOutcome, LookupRequest, LookupResult};

/// Default capacity of the completion and event channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Runtime knobs of a resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upper bound for each catalog call; `None` waits indefinitely
    pub lookup_timeout: Option<Duration>,

    /// Capacity of the completion and event channels
    pub channel_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
