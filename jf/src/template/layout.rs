//! Layout table
//!
//! Spans are a pure function of `(template mode, source type, target type)`.
//! The table holds one row for the custom-template mode, one standard row, and
//! override rows per source and target datasource type. Slots a row does not
//! list resolve to 0 (hidden).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Model;

/// Slot name -> span
pub type SpanRow = BTreeMap<String, u8>;

/// Inputs of the layout policy
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    pub custom: bool,
    pub source: String,
    pub target: String,
}

impl LayoutKey {
    pub fn new(custom: bool, source: &str, target: &str) -> Self {
        Self {
            custom,
            source: source.to_string(),
            target: target.to_string(),
        }
    }
}

/// Table-driven layout policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LayoutTable {
    /// Switch that selects the free-form template mode
    pub template_key: String,

    /// Source datasource type key
    pub source_key: String,

    /// Target datasource type key
    pub target_key: String,

    pub custom: SpanRow,

    pub standard: SpanRow,

    pub source_overrides: BTreeMap<String, SpanRow>,

    pub target_overrides: BTreeMap<String, SpanRow>,
}

impl LayoutTable {
    /// The model keys every slot-spanned descriptor depends on
    pub fn driver_keys(&self) -> [&str; 3] {
        [
            self.template_key.as_str(),
            self.source_key.as_str(),
            self.target_key.as_str(),
        ]
    }

    /// Read the policy inputs from the model
    pub fn key_for(&self, model: &Model) -> LayoutKey {
        LayoutKey {
            custom: model.is_truthy(&self.template_key),
            source: model.text(&self.source_key),
            target: model.text(&self.target_key),
        }
    }

    /// Span of one slot
    ///
    /// Target overrides win over source overrides, which win over the
    /// standard row.
    pub fn weight(&self, key: &LayoutKey, slot: &str) -> u8 {
        if key.custom {
            return self.custom.get(slot).copied().unwrap_or(0);
        }
        let from_target = self.target_overrides.get(&key.target).and_then(|row| row.get(slot));
        let from_source = self.source_overrides.get(&key.source).and_then(|row| row.get(slot));
        from_target
            .or(from_source)
            .or_else(|| self.standard.get(slot))
            .copied()
            .unwrap_or(0)
    }

    /// Every slot mentioned anywhere in the table
    pub fn slots(&self) -> BTreeSet<&str> {
        self.custom
            .keys()
            .chain(self.standard.keys())
            .chain(self.source_overrides.values().flat_map(|row| row.keys()))
            .chain(self.target_overrides.values().flat_map(|row| row.keys()))
            .map(String::as_str)
            .collect()
    }

    /// Resolved span of every slot for the given inputs
    pub fn weights(&self, key: &LayoutKey) -> SpanRow {
        debug!(?key, "LayoutTable::weights: called");
        self.slots()
            .into_iter()
            .map(|slot| (slot.to_string(), self.weight(key, slot)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(entries: &[(&str, u8)]) -> SpanRow {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn table() -> LayoutTable {
        LayoutTable {
            template_key: "customConfig".to_string(),
            source_key: "dsType".to_string(),
            target_key: "dtType".to_string(),
            custom: row(&[("json-editor", 24)]),
            standard: row(&[("where", 24), ("ds-partitions", 0), ("write-mode", 0), ("json-editor", 0)]),
            source_overrides: [("HIVE".to_string(), row(&[("where", 0), ("ds-partitions", 24)]))].into(),
            target_overrides: [("MYSQL".to_string(), row(&[("write-mode", 24)]))].into(),
        }
    }

    #[test]
    fn test_standard_row_with_overrides() {
        let table = table();
        let key = LayoutKey::new(false, "HIVE", "MYSQL");
        assert_eq!(table.weight(&key, "where"), 0);
        assert_eq!(table.weight(&key, "ds-partitions"), 24);
        assert_eq!(table.weight(&key, "write-mode"), 24);
        assert_eq!(table.weight(&key, "json-editor"), 0);

        let plain = LayoutKey::new(false, "MYSQL", "POSTGRESQL");
        assert_eq!(table.weight(&plain, "where"), 24);
        assert_eq!(table.weight(&plain, "write-mode"), 0);
    }

    #[test]
    fn test_custom_mode_hides_unlisted_slots() {
        let table = table();
        let key = LayoutKey::new(true, "HIVE", "MYSQL");
        assert_eq!(table.weight(&key, "json-editor"), 24);
        assert_eq!(table.weight(&key, "where"), 0);
        assert_eq!(table.weight(&key, "write-mode"), 0);
    }

    #[test]
    fn test_key_for_model() {
        let model = Model::from_value(serde_json::json!({"customConfig": 1, "dsType": "HIVE"})).unwrap();
        let key = table().key_for(&model);
        assert_eq!(key, LayoutKey::new(true, "HIVE", ""));
    }

    #[test]
    fn test_weights_cover_every_slot() {
        let weights = table().weights(&LayoutKey::new(false, "MYSQL", "MYSQL"));
        assert_eq!(weights.len(), 4);
        assert_eq!(weights["write-mode"], 24);
    }
}
