//! Form templates
//!
//! A template is the declarative description of a form: its field descriptors,
//! the layout table, and the binding of the field-mapping editor to model keys.
//! Templates are YAML; the DataX template ships embedded in the binary.
//!
//! Loading chain used by the CLI:
//! 1. `template.path` from the config file
//! 2. Embedded DataX template

pub mod embedded;
mod descriptor;
mod layout;
mod validation;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub use descriptor::{Condition, FieldDescriptor, FieldKind, Lookup, OptionsSource, RemoteTrigger, SpanRef};
pub use layout::{LayoutKey, LayoutTable, SpanRow};
pub use validation::{FieldError, ValidationRule};

/// Errors found while loading or checking a template
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Failed to parse template: {0}")]
    Parse(String),

    #[error("Duplicate descriptor id: {0}")]
    DuplicateId(String),

    #[error("Descriptor '{id}' uses a layout slot but does not declare a dependency on '{key}'")]
    UndeclaredLayoutDependency { id: String, key: String },

    #[error("Descriptor '{id}' uses unknown layout slot '{slot}'")]
    UnknownSlot { id: String, slot: String },

    #[error("Descriptor '{id}' depends on unknown key '{key}'")]
    UnknownDependency { id: String, key: String },

    #[error("Trigger '{trigger}' fills options of '{target}', which has no remote options")]
    UnknownOptionsTarget { trigger: String, target: String },

    #[error("Trigger '{trigger}' refers to unknown key '{key}'")]
    UnknownKey { trigger: String, key: String },

    #[error("Key '{0}' carries more than one trigger")]
    DuplicateTrigger(String),

    #[error("Trigger chain through '{0}' is cyclic")]
    TriggerCycle(String),
}

/// Binding of the field-mapping editor to model keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MappingBinding {
    /// Key holding the source column list
    pub source_key: String,

    /// Key holding the target column list
    pub target_key: String,

    /// Key whose value selects the mapping mode
    pub mode_key: String,

    /// Target types that accept arbitrary structured records
    #[serde(default)]
    pub document_types: Vec<String>,

    /// The editor is disabled until this key is set
    pub source_gate: String,

    /// Target key that must be set in standard mode
    pub target_gate: String,

    /// Target key that must be set in document mode
    pub document_target_gate: String,
}

/// Declarative form definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FormTemplate {
    #[serde(default)]
    pub name: String,

    pub descriptors: Vec<FieldDescriptor>,

    pub layout: LayoutTable,

    #[serde(default)]
    pub mapping: Option<MappingBinding>,
}

impl FormTemplate {
    /// The embedded DataX job template
    pub fn datax() -> Result<Self, TemplateError> {
        debug!("FormTemplate::datax: called");
        Self::from_yaml(embedded::DATAX)
    }

    /// Parse and check a template
    pub fn from_yaml(content: &str) -> Result<Self, TemplateError> {
        let template: Self = serde_yaml::from_str(content).map_err(|e| TemplateError::Parse(e.to_string()))?;
        template.validate()?;
        Ok(template)
    }

    /// Load a template file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).context("Failed to read template file")?;
        let template = Self::from_yaml(&content).context(format!("Invalid template {}", path.as_ref().display()))?;
        info!(
            "Loaded template '{}' from: {}",
            template.name,
            path.as_ref().display()
        );
        Ok(template)
    }

    pub fn descriptor(&self, id: &str) -> Option<&FieldDescriptor> {
        self.descriptors.iter().find(|d| d.id() == id)
    }

    /// Descriptor carrying the trigger of a key
    pub fn trigger_for(&self, key: &str) -> Option<&RemoteTrigger> {
        self.descriptors
            .iter()
            .filter(|d| d.key == key)
            .find_map(|d| d.trigger.as_ref())
    }

    /// Span a descriptor resolves to for the given layout inputs
    pub fn span_for(&self, descriptor: &FieldDescriptor, key: &LayoutKey) -> u8 {
        match &descriptor.span {
            SpanRef::Fixed(span) => *span,
            SpanRef::Slot(slot) => self.layout.weight(key, slot),
        }
    }

    /// Model keys addressable by dependencies and triggers
    pub fn known_keys(&self) -> HashSet<&str> {
        let mut keys: HashSet<&str> = self
            .descriptors
            .iter()
            .filter(|d| d.kind.reads_model())
            .map(|d| d.key.as_str())
            .collect();
        if let Some(mapping) = &self.mapping {
            keys.insert(mapping.source_key.as_str());
            keys.insert(mapping.target_key.as_str());
        }
        keys
    }

    /// Check ids, declared dependencies, slots and the trigger graph
    pub fn validate(&self) -> Result<(), TemplateError> {
        debug!(descriptors = self.descriptors.len(), "FormTemplate::validate: called");
        let known = self.known_keys();
        let slots = self.layout.slots();

        let mut ids = HashSet::new();
        let mut trigger_keys = HashSet::new();
        for descriptor in &self.descriptors {
            let id = descriptor.id();
            if !ids.insert(id) {
                return Err(TemplateError::DuplicateId(id.to_string()));
            }

            if let SpanRef::Slot(slot) = &descriptor.span {
                if !slots.contains(slot.as_str()) {
                    return Err(TemplateError::UnknownSlot {
                        id: id.to_string(),
                        slot: slot.clone(),
                    });
                }
                for driver in self.layout.driver_keys() {
                    if !descriptor.depends_on(driver) {
                        return Err(TemplateError::UndeclaredLayoutDependency {
                            id: id.to_string(),
                            key: driver.to_string(),
                        });
                    }
                }
            }

            for key in &descriptor.depends_on {
                if !known.contains(key.as_str()) {
                    return Err(TemplateError::UnknownDependency {
                        id: id.to_string(),
                        key: key.clone(),
                    });
                }
            }

            if let Some(trigger) = &descriptor.trigger {
                if !trigger_keys.insert(descriptor.key.as_str()) {
                    return Err(TemplateError::DuplicateTrigger(descriptor.key.clone()));
                }
                self.validate_trigger(&descriptor.key, trigger, &known)?;
            }
        }

        self.check_trigger_cycles()
    }

    fn validate_trigger(&self, key: &str, trigger: &RemoteTrigger, known: &HashSet<&str>) -> Result<(), TemplateError> {
        if let Some(target) = trigger.lookup.options_target() {
            let has_remote = self
                .descriptors
                .iter()
                .any(|d| d.key == target && d.options == OptionsSource::Remote);
            if !has_remote {
                return Err(TemplateError::UnknownOptionsTarget {
                    trigger: key.to_string(),
                    target: target.to_string(),
                });
            }
        }

        let mut referenced = trigger.produced_keys();
        if let Lookup::Columns { datasource_key, .. } = &trigger.lookup {
            referenced.push(datasource_key.as_str());
        }
        if let Some(condition) = &trigger.skip_when {
            referenced.push(condition.key());
        }
        match referenced.into_iter().find(|k| !known.contains(k)) {
            Some(unknown) => Err(TemplateError::UnknownKey {
                trigger: key.to_string(),
                key: unknown.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn check_trigger_cycles(&self) -> Result<(), TemplateError> {
        let edges: HashMap<&str, Vec<&str>> = self
            .descriptors
            .iter()
            .filter_map(|d| d.trigger.as_ref().map(|t| (d.key.as_str(), t.produced_keys())))
            .collect();

        fn visit<'a>(
            key: &'a str,
            edges: &HashMap<&'a str, Vec<&'a str>>,
            active: &mut HashSet<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> Result<(), TemplateError> {
            if done.contains(key) {
                return Ok(());
            }
            if !active.insert(key) {
                return Err(TemplateError::TriggerCycle(key.to_string()));
            }
            for next in edges.get(key).into_iter().flatten() {
                visit(next, edges, active, done)?;
            }
            active.remove(key);
            done.insert(key);
            Ok(())
        }

        let mut active = HashSet::new();
        let mut done = HashSet::new();
        for key in edges.keys() {
            visit(key, &edges, &mut active, &mut done)?;
        }
        Ok(())
    }
}
