//! Scripted form sessions
//!
//! A session replays a sequence of user edits against a resolver: field
//! changes, waits for outstanding lookups, and mapping editor operations.
//!
//! ```yaml
//! model: {customConfig: false}
//! steps:
//!   - {step: set, key: dsType, value: MYSQL}
//!   - {step: settle}
//!   - {step: mapping, op: set-all-connections, connected: true}
//! ```

use std::path::Path;
use std::sync::Arc;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::DatasourceCatalog;
use crate::domain::Model;
use crate::mapping::{Direction, MappingError, MappingReconciler, Side};
use crate::resolver::{FieldView, FormResolver, LookupOutcome, ResolverConfig, ResolverError};
use crate::template::{FieldError, FormTemplate};

/// Structural edit of the mapping editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum MappingOp {
    AddRecord { side: Side },
    RemoveRecord { side: Side, index: usize },
    MoveRecord { side: Side, index: usize, direction: Direction },
    SetConnection { index: usize, connected: bool },
    SetAllConnections { connected: bool },
    Rename { side: Side, index: usize, name: String },
    SetRawJson { index: usize, json: String },
}

impl MappingOp {
    pub fn apply(&self, mapping: &mut MappingReconciler) -> Result<(), MappingError> {
        debug!(op = ?self, "MappingOp::apply: called");
        match self {
            Self::AddRecord { side } => mapping.add_record(*side),
            Self::RemoveRecord { side, index } => mapping.remove_record(*side, *index),
            Self::MoveRecord { side, index, direction } => mapping.move_record(*side, *index, *direction),
            Self::SetConnection { index, connected } => mapping.set_connection(*index, *connected),
            Self::SetAllConnections { connected } => mapping.set_all_connections(*connected),
            Self::Rename { side, index, name } => mapping.rename(*side, *index, name)?,
            Self::SetRawJson { index, json } => mapping.set_raw_json(*index, json)?,
        }
        Ok(())
    }
}

/// One scripted edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum Step {
    /// Write a field value
    Set { key: String, value: Value },
    /// Wait for every outstanding lookup
    Settle,
    /// Edit the column mapping
    Mapping(MappingOp),
}

/// A model and the edits to replay on it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub model: Option<Value>,
    pub steps: Vec<Step>,
}

impl Session {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let session: Self = serde_yaml::from_str(&content).context("Failed to parse session file")?;
        info!(
            steps = session.steps.len(),
            "Loaded session from: {}",
            path.as_ref().display()
        );
        Ok(session)
    }
}

/// Result of replaying a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Model with the mapping lists merged in
    pub snapshot: Value,

    /// Visible fields after the last step
    pub fields: Vec<FieldView>,

    /// Validation failures of visible fields
    pub errors: Vec<FieldError>,

    /// Lookups that failed during the run
    pub lookup_failures: Vec<String>,

    /// Mapping edits that were rejected
    pub mapping_errors: Vec<String>,
}

impl SessionReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Replay a session and report the final state
///
/// Outstanding lookups are settled before the report is built.
pub async fn run(
    session: Session,
    template: FormTemplate,
    catalog: Arc<dyn DatasourceCatalog>,
    config: ResolverConfig,
) -> Result<SessionReport, ResolverError> {
    info!(steps = session.steps.len(), "session::run: called");
    let model = Model::from_value(session.model.unwrap_or(Value::Null))?;
    let mut resolver = FormResolver::new(template, model, catalog, config)?;

    let mut lookup_failures = Vec::new();
    if let Err(e) = resolver.initialize().await {
        warn!(error = %e, "session::run: initialize failed");
        lookup_failures.push(e.to_string());
    }

    let mut mapping_errors = Vec::new();
    for step in session.steps {
        debug!(?step, "session::run: step");
        match step {
            Step::Set { key, value } => resolver.on_field_change(&key, value),
            Step::Settle => record_failures(resolver.settle().await, &mut lookup_failures),
            Step::Mapping(op) => {
                if let Err(e) = op.apply(resolver.mapping_mut()) {
                    warn!(error = %e, "session::run: mapping edit rejected");
                    mapping_errors.push(e.to_string());
                }
            }
        }
    }
    record_failures(resolver.settle().await, &mut lookup_failures);

    let errors = resolver.validate().err().unwrap_or_default();
    Ok(SessionReport {
        snapshot: resolver.snapshot(),
        fields: resolver.visible_fields(),
        errors,
        lookup_failures,
        mapping_errors,
    })
}

fn record_failures(outcomes: Vec<LookupOutcome>, failures: &mut Vec<String>) {
    for outcome in outcomes {
        if let LookupOutcome::Failed { trigger, error, .. } = outcome {
            failures.push(format!("{trigger}: {error}"));
        }
    }
}
