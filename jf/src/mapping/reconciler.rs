//! Mapping reconciler
//!
//! Owns the source and target column lists and applies the editor's
//! structural operations to them.

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::ColumnRecord;

use super::{Direction, MappingError, MappingMode, Side};

/// Positional source/target column lists with pairwise connections
#[derive(Debug, Clone, PartialEq)]
pub struct MappingReconciler {
    source: Vec<ColumnRecord>,
    target: Vec<ColumnRecord>,
    mode: MappingMode,
    editable: bool,
}

impl Default for MappingReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingReconciler {
    pub fn new() -> Self {
        Self {
            source: Vec::new(),
            target: Vec::new(),
            mode: MappingMode::Standard,
            editable: true,
        }
    }

    /// Reconciler over existing lists; lengths are reconciled immediately
    pub fn with_lists(source: Vec<ColumnRecord>, target: Vec<ColumnRecord>, mode: MappingMode) -> Self {
        let mut reconciler = Self {
            source,
            target,
            mode,
            editable: true,
        };
        reconciler.reconcile_lengths();
        reconciler
    }

    pub fn source(&self) -> &[ColumnRecord] {
        &self.source
    }

    pub fn target(&self) -> &[ColumnRecord] {
        &self.target
    }

    pub fn list(&self, side: Side) -> &[ColumnRecord] {
        match side {
            Side::Source => &self.source,
            Side::Target => &self.target,
        }
    }

    fn list_mut(&mut self, side: Side) -> &mut Vec<ColumnRecord> {
        match side {
            Side::Source => &mut self.source,
            Side::Target => &mut self.target,
        }
    }

    pub fn mode(&self) -> MappingMode {
        self.mode
    }

    /// Switch mode; switching into document mode may grow the target list
    pub fn set_mode(&mut self, mode: MappingMode) {
        if self.mode != mode {
            debug!(?mode, "MappingReconciler::set_mode: changed");
            self.mode = mode;
            self.reconcile_lengths();
        }
    }

    /// Whether the editor accepts edits and auto-growth
    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn set_editable(&mut self, editable: bool) {
        if self.editable != editable {
            debug!(editable, "MappingReconciler::set_editable: changed");
            self.editable = editable;
            self.reconcile_lengths();
        }
    }

    /// Append an empty, unconnected record; the other list is untouched
    pub fn add_record(&mut self, side: Side) {
        debug!(%side, "MappingReconciler::add_record: called");
        self.list_mut(side).push(ColumnRecord::empty());
    }

    /// Remove a record, severing the connection at its index first
    ///
    /// Connections after `index` shift down by one on this side only.
    pub fn remove_record(&mut self, side: Side, index: usize) {
        debug!(%side, index, "MappingReconciler::remove_record: called");
        if index >= self.list(side).len() {
            debug!(%side, index, "MappingReconciler::remove_record: out of range");
            return;
        }
        if let Some(counterpart) = self.list_mut(side.other()).get_mut(index) {
            counterpart.connected = false;
        }
        self.list_mut(side).remove(index);
    }

    /// Swap a record with its neighbour; both swapped records are disconnected
    pub fn move_record(&mut self, side: Side, index: usize, direction: Direction) {
        debug!(%side, index, %direction, "MappingReconciler::move_record: called");
        let len = self.list(side).len();
        let neighbour = match direction {
            Direction::Up if index > 0 && index < len => index - 1,
            Direction::Down if index + 1 < len => index + 1,
            _ => {
                debug!(%side, index, %direction, "MappingReconciler::move_record: at boundary");
                return;
            }
        };
        let list = self.list_mut(side);
        list.swap(index, neighbour);
        list[index].connected = false;
        list[neighbour].connected = false;
    }

    /// Connect or disconnect the pair at `index`
    pub fn set_connection(&mut self, index: usize, connected: bool) {
        debug!(index, connected, "MappingReconciler::set_connection: called");
        if index >= self.source.len() || index >= self.target.len() {
            debug!(index, "MappingReconciler::set_connection: index not present in both lists");
            return;
        }
        self.source[index].connected = connected;
        self.target[index].connected = connected;
    }

    /// Set every pair in the overlapping prefix
    pub fn set_all_connections(&mut self, connected: bool) {
        debug!(connected, "MappingReconciler::set_all_connections: called");
        let overlap = self.source.len().min(self.target.len());
        for index in 0..overlap {
            self.source[index].connected = connected;
            self.target[index].connected = connected;
        }
    }

    /// Grow the lists so every source row has a counterpart
    ///
    /// Runs when a list is replaced wholesale or the mode or editable state
    /// changes, never on single-record edits. The source list is grown to the
    /// target's length. In document mode the target list is also grown to the
    /// source's length. Growth only appends and only happens while the editor
    /// is editable.
    pub fn reconcile_lengths(&mut self) {
        if !self.editable {
            return;
        }
        while self.source.len() < self.target.len() {
            self.source.push(ColumnRecord::empty());
        }
        if self.mode == MappingMode::Document {
            while self.target.len() < self.source.len() {
                self.target.push(ColumnRecord::empty());
            }
        }
        debug!(
            source = self.source.len(),
            target = self.target.len(),
            "MappingReconciler::reconcile_lengths: done"
        );
    }

    /// Connection state of every index present in both lists
    pub fn connection_summary(&self) -> Vec<bool> {
        self.source
            .iter()
            .zip(&self.target)
            .map(|(source, target)| source.connected && target.connected)
            .collect()
    }

    /// State of the "select all" control: some pairs exist and all are connected
    pub fn all_connected(&self) -> bool {
        let summary = self.connection_summary();
        !summary.is_empty() && summary.into_iter().all(|connected| connected)
    }

    /// Rename a record in place
    pub fn rename(&mut self, side: Side, index: usize, name: &str) -> Result<(), MappingError> {
        debug!(%side, index, %name, "MappingReconciler::rename: called");
        let record = self
            .list_mut(side)
            .get_mut(index)
            .ok_or(MappingError::OutOfRange { side, index })?;
        record.name = name.to_string();
        Ok(())
    }

    /// Edit a target record's raw payload
    ///
    /// Well-formed JSON is stored pretty-printed. Malformed input clears the
    /// payload and is reported.
    pub fn set_raw_json(&mut self, index: usize, text: &str) -> Result<(), MappingError> {
        debug!(index, "MappingReconciler::set_raw_json: called");
        let record = self.target.get_mut(index).ok_or(MappingError::OutOfRange {
            side: Side::Target,
            index,
        })?;
        if text.trim().is_empty() {
            record.raw_json.clear();
            return Ok(());
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                record.raw_json = serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string());
                Ok(())
            }
            Err(e) => {
                warn!(index, error = %e, "MappingReconciler::set_raw_json: malformed payload cleared");
                record.raw_json.clear();
                Err(MappingError::MalformedJson {
                    index,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Replace one list wholesale, then reconcile lengths
    pub fn replace(&mut self, side: Side, records: Vec<ColumnRecord>) {
        debug!(%side, count = records.len(), "MappingReconciler::replace: called");
        *self.list_mut(side) = records;
        self.reconcile_lengths();
    }

    pub fn clear(&mut self, side: Side) {
        debug!(%side, "MappingReconciler::clear: called");
        self.list_mut(side).clear();
    }

    /// Check both lists against the current mode
    pub fn validate(&self) -> Result<(), MappingError> {
        debug!(mode = ?self.mode, "MappingReconciler::validate: called");
        for (index, record) in self.source.iter().enumerate() {
            if record.name.trim().is_empty() {
                return Err(MappingError::MissingName {
                    side: Side::Source,
                    index,
                });
            }
            if self.mode == MappingMode::Standard && record.data_type.trim().is_empty() {
                return Err(MappingError::MissingType {
                    side: Side::Source,
                    index,
                });
            }
        }
        for (index, record) in self.target.iter().enumerate() {
            match self.mode {
                MappingMode::Standard => {
                    if record.name.trim().is_empty() {
                        return Err(MappingError::MissingName {
                            side: Side::Target,
                            index,
                        });
                    }
                    if record.data_type.trim().is_empty() {
                        return Err(MappingError::MissingType {
                            side: Side::Target,
                            index,
                        });
                    }
                }
                MappingMode::Document => {
                    if record.raw_json.trim().is_empty() {
                        return Err(MappingError::MissingJson { index });
                    }
                    if let Err(e) = serde_json::from_str::<Value>(&record.raw_json) {
                        return Err(MappingError::MalformedJson {
                            index,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<ColumnRecord> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnRecord::from_column(i, *name, "varchar"))
            .collect()
    }

    fn names(records: &[ColumnRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    fn connected(names: &[&str], target: &[&str]) -> MappingReconciler {
        let mut reconciler = MappingReconciler::with_lists(columns(names), columns(target), MappingMode::Standard);
        reconciler.set_all_connections(true);
        reconciler
    }

    #[test]
    fn test_source_grows_to_target_length() {
        let reconciler = MappingReconciler::with_lists(columns(&["id"]), columns(&["id", "name", "age"]), MappingMode::Standard);
        assert_eq!(reconciler.source().len(), 3);
        assert_eq!(reconciler.source()[2], ColumnRecord::empty());
    }

    #[test]
    fn test_target_grows_only_in_document_mode() {
        let reconciler = MappingReconciler::with_lists(columns(&["id", "name"]), columns(&["uid"]), MappingMode::Standard);
        assert_eq!(reconciler.target().len(), 1);

        let reconciler = MappingReconciler::with_lists(columns(&["id", "name"]), columns(&["uid"]), MappingMode::Document);
        assert_eq!(reconciler.source().len(), 2);
        assert_eq!(reconciler.target().len(), 2);
        assert_eq!(names(reconciler.target()), vec!["uid", ""]);
    }

    #[test]
    fn test_no_growth_while_disabled() {
        let mut reconciler = MappingReconciler::new();
        reconciler.set_editable(false);
        reconciler.replace(Side::Target, columns(&["a", "b"]));
        assert!(reconciler.source().is_empty());
        assert!(!reconciler.is_editable());

        reconciler.set_editable(true);
        assert_eq!(reconciler.source().len(), 2);
    }

    #[test]
    fn test_remove_severs_connection_then_shifts() {
        let mut reconciler = connected(&["a", "b", "c"], &["x", "y", "z"]);
        reconciler.remove_record(Side::Source, 1);

        assert_eq!(names(reconciler.source()), vec!["a", "c"]);
        assert_eq!(reconciler.target().len(), 3);
        assert!(!reconciler.target()[1].connected);
        assert_eq!(reconciler.connection_summary(), vec![true, false]);
    }

    #[test]
    fn test_single_record_edits_leave_other_list_alone() {
        let mut reconciler = MappingReconciler::with_lists(columns(&["a"]), columns(&["x"]), MappingMode::Standard);
        reconciler.add_record(Side::Target);
        assert_eq!(reconciler.source().len(), 1);
        assert_eq!(reconciler.target().len(), 2);

        let mut reconciler = MappingReconciler::with_lists(columns(&["a", "b"]), columns(&["x", "y"]), MappingMode::Standard);
        reconciler.remove_record(Side::Source, 0);
        assert_eq!(names(reconciler.source()), vec!["b"]);
        assert_eq!(reconciler.target().len(), 2);

        let mut reconciler = MappingReconciler::with_lists(columns(&["a"]), columns(&["x"]), MappingMode::Document);
        reconciler.add_record(Side::Source);
        assert_eq!(reconciler.source().len(), 2);
        assert_eq!(reconciler.target().len(), 1);
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let mut reconciler = connected(&["a"], &["x"]);
        let before = reconciler.clone();
        reconciler.remove_record(Side::Target, 5);
        assert_eq!(reconciler, before);
    }

    #[test]
    fn test_move_disconnects_both_swapped_records() {
        let mut reconciler = connected(&["a", "b", "c"], &["x", "y", "z"]);
        reconciler.move_record(Side::Source, 1, Direction::Up);

        assert_eq!(names(reconciler.source()), vec!["b", "a", "c"]);
        assert!(!reconciler.source()[0].connected);
        assert!(!reconciler.source()[1].connected);
        assert!(reconciler.source()[2].connected);
        assert_eq!(reconciler.connection_summary(), vec![false, false, true]);
    }

    #[test]
    fn test_move_at_boundary_is_noop() {
        let mut reconciler = connected(&["a", "b"], &["x", "y"]);
        let before = reconciler.clone();
        reconciler.move_record(Side::Source, 0, Direction::Up);
        reconciler.move_record(Side::Target, 1, Direction::Down);
        assert_eq!(reconciler, before);
    }

    #[test]
    fn test_set_connection_requires_both_records() {
        let mut reconciler = MappingReconciler::with_lists(columns(&["a", "b"]), columns(&["x"]), MappingMode::Standard);
        reconciler.set_connection(1, true);
        assert!(!reconciler.source()[1].connected);

        reconciler.set_connection(0, true);
        assert_eq!(reconciler.connection_summary(), vec![true]);
    }

    #[test]
    fn test_set_all_connections_overlapping_prefix() {
        let mut reconciler = MappingReconciler::with_lists(columns(&["a", "b", "c"]), columns(&["x"]), MappingMode::Standard);
        reconciler.set_all_connections(true);
        assert_eq!(reconciler.connection_summary(), vec![true]);
        assert!(!reconciler.source()[1].connected);
        assert!(!reconciler.source()[2].connected);

        reconciler.add_record(Side::Target);
        reconciler.add_record(Side::Target);
        assert_eq!(reconciler.connection_summary(), vec![true, false, false]);
        assert!(!reconciler.all_connected());

        reconciler.set_all_connections(true);
        assert_eq!(reconciler.connection_summary(), vec![true, true, true]);
        assert!(reconciler.all_connected());
    }

    #[test]
    fn test_summary_covers_shorter_list_only() {
        let reconciler = MappingReconciler::with_lists(columns(&["a", "b", "c"]), columns(&["x"]), MappingMode::Standard);
        assert_eq!(reconciler.connection_summary().len(), 1);

        let mut reconciler = MappingReconciler::new();
        reconciler.set_editable(false);
        reconciler.replace(Side::Source, columns(&["a"]));
        reconciler.replace(Side::Target, columns(&["x", "y"]));
        reconciler.set_all_connections(true);
        assert_eq!(reconciler.connection_summary(), vec![true]);
        assert!(!reconciler.target()[1].connected);
    }

    #[test]
    fn test_empty_lists_are_not_all_connected() {
        let reconciler = MappingReconciler::new();
        assert!(reconciler.connection_summary().is_empty());
        assert!(!reconciler.all_connected());

        let mut reconciler = MappingReconciler::with_lists(Vec::new(), Vec::new(), MappingMode::Document);
        reconciler.set_all_connections(true);
        assert!(!reconciler.all_connected());
    }

    #[test]
    fn test_add_record_appends_empty() {
        let mut reconciler = MappingReconciler::new();
        reconciler.add_record(Side::Source);
        assert_eq!(reconciler.source(), &[ColumnRecord::empty()]);
        assert!(reconciler.target().is_empty());
    }

    #[test]
    fn test_set_raw_json_normalizes_and_rejects() {
        let mut reconciler = MappingReconciler::with_lists(columns(&["a"]), columns(&["doc"]), MappingMode::Document);
        reconciler.set_raw_json(0, r#"{"name":"a","type":"keyword"}"#).unwrap();
        assert!(reconciler.target()[0].raw_json.contains("\n"));
        assert!(reconciler.validate().is_ok());

        let err = reconciler.set_raw_json(0, "{broken").unwrap_err();
        assert!(matches!(err, MappingError::MalformedJson { index: 0, .. }));
        assert!(reconciler.target()[0].raw_json.is_empty());
        assert_eq!(reconciler.validate(), Err(MappingError::MissingJson { index: 0 }));

        assert!(matches!(
            reconciler.set_raw_json(3, "{}"),
            Err(MappingError::OutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_validate_standard_mode() {
        let mut reconciler = connected(&["a"], &["x"]);
        assert!(reconciler.validate().is_ok());

        reconciler.add_record(Side::Target);
        assert_eq!(
            reconciler.validate(),
            Err(MappingError::MissingName {
                side: Side::Target,
                index: 1
            })
        );

        reconciler.add_record(Side::Source);
        assert_eq!(
            reconciler.validate(),
            Err(MappingError::MissingName {
                side: Side::Source,
                index: 1
            })
        );

        reconciler.rename(Side::Source, 1, "b").unwrap();
        reconciler.rename(Side::Target, 1, "y").unwrap();
        assert!(reconciler.validate().is_ok());
    }

    #[test]
    fn test_validate_document_mode_ignores_target_names() {
        let mut reconciler = MappingReconciler::with_lists(columns(&["a"]), Vec::new(), MappingMode::Document);
        assert_eq!(reconciler.target().len(), 1);
        reconciler.set_raw_json(0, r#"{"name": "a"}"#).unwrap();
        assert!(reconciler.validate().is_ok());
    }

    #[test]
    fn test_switching_to_document_mode_grows_target() {
        let mut reconciler = MappingReconciler::with_lists(columns(&["id", "name"]), columns(&["uid"]), MappingMode::Standard);
        reconciler.set_mode(MappingMode::Document);
        assert_eq!(reconciler.target().len(), 2);
    }
}
