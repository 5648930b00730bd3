//! Form resolver
//!
//! Owns the model, the derived span/options state of every descriptor and the
//! mapping reconciler. Field changes are applied synchronously; remote lookups
//! run as tokio tasks whose completions are applied by `next_outcome` /
//! `settle` on the owner's side, so the model is never mutated concurrently.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::catalog::{DatasourceCatalog, TableSchema};
use crate::domain::{ColumnRecord, Model, SelectOption, is_blank, value_text};
use crate::mapping::{MappingMode, MappingReconciler, Side};
use crate::template::{FieldError, FieldKind, FormTemplate, Lookup, OptionsSource, RemoteTrigger, ValidationRule};

use super::ResolverConfig;
use super::error::ResolverError;
use super::events::{EventBus, FormEvent};
use super::lookup::{self, LookupCompletion, LookupOutcome, LookupRequest, LookupResult};

/// Render-ready state of one descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub id: String,
    pub key: String,
    pub kind: FieldKind,
    pub span: u8,
    pub visible: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dependency resolver for one form instance
pub struct FormResolver {
    template: FormTemplate,
    model: Model,
    mapping: MappingReconciler,

    /// Derived span per descriptor id
    spans: HashMap<String, u8>,

    /// Current options per descriptor id
    options: HashMap<String, Vec<SelectOption>>,

    /// Model key -> indexes of descriptors that declare a dependency on it
    dependents: HashMap<String, Vec<usize>>,

    /// Trigger key -> generation of its latest issued lookup
    generations: HashMap<String, u64>,

    /// Trigger key -> error of its last failed lookup
    errors: HashMap<String, String>,

    in_flight: usize,
    catalog: Arc<dyn DatasourceCatalog>,
    config: ResolverConfig,
    completion_tx: mpsc::Sender<LookupCompletion>,
    completion_rx: mpsc::Receiver<LookupCompletion>,
    events: EventBus,
}

impl FormResolver {
    /// Bind a template to a model
    ///
    /// Missing keys are filled with descriptor defaults. Column lists found
    /// under the mapping keys are moved into the reconciler.
    pub fn new(
        template: FormTemplate,
        model: Model,
        catalog: Arc<dyn DatasourceCatalog>,
        config: ResolverConfig,
    ) -> Result<Self, ResolverError> {
        debug!(template = %template.name, "FormResolver::new: called");
        template.validate()?;

        let mut model = model;
        for descriptor in &template.descriptors {
            if let Some(default) = descriptor.default_value() {
                model.ensure(&descriptor.key, default);
            }
        }

        let mut lists = Vec::new();
        if let Some(binding) = &template.mapping {
            lists.push((Side::Source, take_columns(&mut model, &binding.source_key)?));
            lists.push((Side::Target, take_columns(&mut model, &binding.target_key)?));
        }

        let mut dependents: HashMap<String, Vec<usize>> = HashMap::new();
        let mut generations = HashMap::new();
        let mut options = HashMap::new();
        for (index, descriptor) in template.descriptors.iter().enumerate() {
            for key in &descriptor.depends_on {
                dependents.entry(key.clone()).or_default().push(index);
            }
            if descriptor.trigger.is_some() {
                generations.insert(descriptor.key.clone(), 0);
            }
            if let OptionsSource::Static { items } = &descriptor.options {
                options.insert(descriptor.id().to_string(), items.clone());
            }
        }

        let (completion_tx, completion_rx) = mpsc::channel(config.channel_capacity.max(1));
        let events = EventBus::new(config.channel_capacity);

        let mut resolver = Self {
            template,
            model,
            mapping: MappingReconciler::new(),
            spans: HashMap::new(),
            options,
            dependents,
            generations,
            errors: HashMap::new(),
            in_flight: 0,
            catalog,
            config,
            completion_tx,
            completion_rx,
            events,
        };

        let layout_key = resolver.template.layout.key_for(&resolver.model);
        for descriptor in &resolver.template.descriptors {
            let span = resolver.template.span_for(descriptor, &layout_key);
            resolver.spans.insert(descriptor.id().to_string(), span);
        }

        resolver.sync_mapping();
        for (side, records) in lists {
            resolver.mapping.replace(side, records);
        }
        Ok(resolver)
    }

    /// Evaluate every span, load datasource types and restore option lists
    ///
    /// Triggers that already carry a value get their option lookup re-issued
    /// without clearing downstream keys, so a saved job keeps its selections.
    pub async fn initialize(&mut self) -> Result<(), ResolverError> {
        info!(template = %self.template.name, "FormResolver::initialize: called");
        self.reevaluate_all();
        self.sync_mapping();

        let restore: Vec<(String, RemoteTrigger)> = self
            .template
            .descriptors
            .iter()
            .filter_map(|d| d.trigger.as_ref().map(|t| (d.key.clone(), t.clone())))
            .filter(|(_, trigger)| trigger.lookup.options_target().is_some())
            .collect();
        for (key, trigger) in restore {
            if self.should_issue(&key, &trigger) {
                let generation = self.generation(&key);
                self.issue_lookup(&key, &trigger.lookup, generation);
            }
        }

        self.load_datasource_types().await
    }

    async fn load_datasource_types(&mut self) -> Result<(), ResolverError> {
        let targets: Vec<(String, String, Vec<String>)> = self
            .template
            .descriptors
            .iter()
            .filter_map(|d| match &d.options {
                OptionsSource::DatasourceTypes { exclude } => Some((d.id().to_string(), d.key.clone(), exclude.clone())),
                _ => None,
            })
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let timeout = self.config.lookup_timeout;
        let result = lookup::with_timeout(self.catalog.list_datasource_types(), timeout).await;
        match result {
            Ok(types) => {
                debug!(count = types.len(), "FormResolver::load_datasource_types: loaded");
                for (id, key, exclude) in targets {
                    let options: Vec<SelectOption> = types
                        .iter()
                        .filter(|t| t.enabled && !exclude.contains(&t.code))
                        .map(|t| SelectOption::same(t.code.clone()))
                        .collect();
                    self.errors.remove(&key);
                    self.set_options(&id, options);
                }
                Ok(())
            }
            Err(error) => {
                warn!(%error, "FormResolver::load_datasource_types: failed");
                for (_, key, _) in &targets {
                    self.errors.insert(key.clone(), error.to_string());
                }
                Err(ResolverError::Lookup {
                    trigger: targets[0].1.clone(),
                    source: error,
                })
            }
        }
    }

    /// Apply a value written by the user
    ///
    /// Re-evaluates dependents of the key. When the key is a trigger, every
    /// key it produces is cleared before this returns and its lookup is
    /// issued in the background. Must be called inside a tokio runtime.
    pub fn on_field_change(&mut self, key: &str, value: Value) {
        debug!(%key, "FormResolver::on_field_change: called");
        self.events.emit(FormEvent::FieldChanged {
            key: key.to_string(),
            value: value.clone(),
        });

        if let Some(side) = self.mapping_side(key) {
            match serde_json::from_value::<Vec<ColumnRecord>>(value) {
                Ok(records) => {
                    self.errors.remove(key);
                    self.sync_mapping();
                    self.mapping.replace(side, records);
                    self.emit_mapping(side);
                }
                Err(e) => {
                    warn!(%key, error = %e, "FormResolver::on_field_change: invalid column list");
                    self.errors.insert(key.to_string(), e.to_string());
                }
            }
            self.reevaluate(&[key.to_string()]);
            return;
        }

        self.model.set(key, value);
        self.errors.remove(key);

        let mut touched = vec![key.to_string()];
        if let Some(trigger) = self.template.trigger_for(key).cloned() {
            let generation = self.bump_generation(key);
            let mut visited = HashSet::from([key.to_string()]);
            self.clear_downstream(&trigger, &mut visited, &mut touched);
            if self.should_issue(key, &trigger) {
                self.issue_lookup(key, &trigger.lookup, generation);
            }
        }

        self.reevaluate(&touched);
        self.sync_mapping();
    }

    /// Clear every key a trigger produces, cascading through nested triggers
    fn clear_downstream(&mut self, trigger: &RemoteTrigger, visited: &mut HashSet<String>, touched: &mut Vec<String>) {
        if let Some(target) = trigger.lookup.options_target() {
            self.set_options_for_key(target, Vec::new());
        }
        let produced: Vec<String> = trigger.produced_keys().into_iter().map(str::to_string).collect();
        for key in produced {
            if !visited.insert(key.clone()) {
                continue;
            }
            self.clear_key(&key);
            touched.push(key.clone());

            if let Some(nested) = self.template.trigger_for(&key).cloned() {
                self.bump_generation(&key);
                self.clear_downstream(&nested, visited, touched);
            }
        }
    }

    fn clear_key(&mut self, key: &str) {
        debug!(%key, "FormResolver::clear_key: called");
        if let Some(side) = self.mapping_side(key) {
            self.sync_mapping();
            self.mapping.clear(side);
            self.emit_mapping(side);
            return;
        }
        let empty = self
            .template
            .descriptors
            .iter()
            .find(|d| d.key == key && d.kind.reads_model())
            .and_then(|d| d.kind.default_value())
            .unwrap_or(Value::Null);
        self.model.set(key, empty);
    }

    /// A trigger's lookup runs unless its value is blank or `skip-when` holds
    fn should_issue(&self, key: &str, trigger: &RemoteTrigger) -> bool {
        if self.model.is_blank(key) {
            debug!(%key, "FormResolver::should_issue: blank trigger value");
            return false;
        }
        if trigger.skip_when.as_ref().is_some_and(|c| c.holds(&self.model)) {
            debug!(%key, "FormResolver::should_issue: skip condition holds");
            return false;
        }
        true
    }

    fn issue_lookup(&mut self, key: &str, lookup: &Lookup, generation: u64) {
        let trigger_value = self.model.get(key).cloned().unwrap_or(Value::Null);
        let text = value_text(&trigger_value);
        let Some(request) = LookupRequest::build(lookup, &text, &self.model) else {
            debug!(%key, "FormResolver::issue_lookup: upstream key blank, not issued");
            return;
        };

        debug!(%key, generation, ?request, "FormResolver::issue_lookup: spawning");
        self.in_flight += 1;
        self.events.emit(FormEvent::LookupIssued {
            trigger: key.to_string(),
            generation,
            lookup: lookup.name().to_string(),
        });

        let catalog = Arc::clone(&self.catalog);
        let tx = self.completion_tx.clone();
        let timeout = self.config.lookup_timeout;
        let trigger = key.to_string();
        tokio::spawn(async move {
            let result = lookup::run(catalog.as_ref(), &request, timeout).await;
            let completion = LookupCompletion {
                trigger,
                generation,
                trigger_value,
                result,
            };
            if tx.send(completion).await.is_err() {
                debug!("lookup task: resolver dropped, completion lost");
            }
        });
    }

    /// Number of lookups whose completion has not been applied yet
    pub fn pending_lookups(&self) -> usize {
        self.in_flight
    }

    /// Wait for the next lookup completion and apply it
    ///
    /// Returns `None` when nothing is in flight.
    pub async fn next_outcome(&mut self) -> Option<LookupOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completion_rx.recv().await?;
        self.in_flight -= 1;
        Some(self.apply_completion(completion))
    }

    /// Apply completions that are already available without waiting
    pub fn poll_outcomes(&mut self) -> Vec<LookupOutcome> {
        let mut outcomes = Vec::new();
        while self.in_flight > 0 {
            match self.completion_rx.try_recv() {
                Ok(completion) => {
                    self.in_flight -= 1;
                    outcomes.push(self.apply_completion(completion));
                }
                Err(_) => break,
            }
        }
        outcomes
    }

    /// Wait until every issued lookup has completed
    pub async fn settle(&mut self) -> Vec<LookupOutcome> {
        debug!(in_flight = self.in_flight, "FormResolver::settle: called");
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_outcome().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    fn apply_completion(&mut self, completion: LookupCompletion) -> LookupOutcome {
        let LookupCompletion {
            trigger,
            generation,
            trigger_value,
            result,
        } = completion;

        let current_value = self.model.get(&trigger).cloned().unwrap_or(Value::Null);
        if generation != self.generation(&trigger) || current_value != trigger_value {
            debug!(%trigger, generation, "FormResolver::apply_completion: stale, discarded");
            self.events.emit(FormEvent::LookupDiscarded {
                trigger: trigger.clone(),
                generation,
            });
            return LookupOutcome::Discarded { trigger, generation };
        }

        let Some(declared) = self.template.trigger_for(&trigger).cloned() else {
            return LookupOutcome::Discarded { trigger, generation };
        };

        match result {
            Err(error) => {
                warn!(%trigger, generation, %error, "FormResolver::apply_completion: lookup failed");
                self.errors.insert(trigger.clone(), error.to_string());
                self.events.emit(FormEvent::LookupFailed {
                    trigger: trigger.clone(),
                    generation,
                    error: error.to_string(),
                });
                LookupOutcome::Failed {
                    trigger,
                    generation,
                    error,
                }
            }
            Ok(LookupResult::Options(options)) => {
                if let Some(target) = declared.lookup.options_target() {
                    debug!(%trigger, %target, count = options.len(), "FormResolver::apply_completion: options");
                    self.set_options_for_key(target, options);
                }
                self.events.emit(FormEvent::LookupApplied {
                    trigger: trigger.clone(),
                    generation,
                });
                LookupOutcome::Applied { trigger, generation }
            }
            Ok(LookupResult::Schema(schema)) => {
                if let Lookup::Columns {
                    columns_key,
                    partitions_key,
                    ..
                } = &declared.lookup
                {
                    self.write_schema(columns_key, partitions_key, schema);
                    self.reevaluate(&[columns_key.clone(), partitions_key.clone()]);
                    self.sync_mapping();
                }
                self.events.emit(FormEvent::LookupApplied {
                    trigger: trigger.clone(),
                    generation,
                });
                LookupOutcome::Applied { trigger, generation }
            }
        }
    }

    fn write_schema(&mut self, columns_key: &str, partitions_key: &str, schema: TableSchema) {
        debug!(%columns_key, columns = schema.columns.len(), "FormResolver::write_schema: called");
        let records: Vec<ColumnRecord> = schema
            .columns
            .iter()
            .enumerate()
            .map(|(ordinal, column)| ColumnRecord::from_column(ordinal, column.name.clone(), column.data_type.clone()))
            .collect();

        match self.mapping_side(columns_key) {
            Some(side) => {
                self.sync_mapping();
                self.mapping.replace(side, records);
                self.emit_mapping(side);
            }
            None => {
                let value = serde_json::to_value(&records).unwrap_or_default();
                self.model.set(columns_key, value);
            }
        }

        let partitions = schema.partition_entries().into_iter().map(Value::String).collect();
        self.model.set(partitions_key, Value::Array(partitions));
    }

    fn generation(&self, key: &str) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }

    /// Invalidate any in-flight lookup of a trigger
    fn bump_generation(&mut self, key: &str) -> u64 {
        let generation = self.generations.entry(key.to_string()).or_insert(0);
        *generation += 1;
        let generation = *generation;
        self.errors.remove(key);
        debug!(%key, generation, "FormResolver::bump_generation: called");
        generation
    }

    fn set_options(&mut self, id: &str, options: Vec<SelectOption>) {
        let count = options.len();
        self.options.insert(id.to_string(), options);
        self.events.emit(FormEvent::OptionsUpdated {
            id: id.to_string(),
            count,
        });
    }

    /// Replace the remote options of every descriptor bound to `key`
    fn set_options_for_key(&mut self, key: &str, options: Vec<SelectOption>) {
        let ids: Vec<String> = self
            .template
            .descriptors
            .iter()
            .filter(|d| d.key == key && d.options == OptionsSource::Remote)
            .map(|d| d.id().to_string())
            .collect();
        for id in ids {
            self.set_options(&id, options.clone());
        }
    }

    /// Recompute the span of every descriptor depending on the given keys
    fn reevaluate(&mut self, keys: &[String]) {
        let indexes: BTreeSet<usize> = keys
            .iter()
            .filter_map(|key| self.dependents.get(key))
            .flatten()
            .copied()
            .collect();
        if indexes.is_empty() {
            return;
        }
        debug!(?keys, count = indexes.len(), "FormResolver::reevaluate: called");
        self.update_spans(indexes);
    }

    fn reevaluate_all(&mut self) {
        let indexes: BTreeSet<usize> = (0..self.template.descriptors.len()).collect();
        self.update_spans(indexes);
    }

    fn update_spans(&mut self, indexes: BTreeSet<usize>) {
        let layout_key = self.template.layout.key_for(&self.model);
        for index in indexes {
            let descriptor = &self.template.descriptors[index];
            let span = self.template.span_for(descriptor, &layout_key);
            let id = descriptor.id().to_string();
            if self.spans.get(&id) != Some(&span) {
                debug!(%id, span, "FormResolver::update_spans: span changed");
                self.spans.insert(id.clone(), span);
                self.events.emit(FormEvent::SpanChanged { id, span });
            }
        }
    }

    fn mapping_side(&self, key: &str) -> Option<Side> {
        let binding = self.template.mapping.as_ref()?;
        if key == binding.source_key {
            Some(Side::Source)
        } else if key == binding.target_key {
            Some(Side::Target)
        } else {
            None
        }
    }

    /// Derive the reconciler's mode and editable state from the model
    fn sync_mapping(&mut self) {
        let Some(binding) = &self.template.mapping else {
            return;
        };
        let target_type = self.model.text(&binding.mode_key);
        let document = binding.document_types.iter().any(|t| *t == target_type);
        let target_gate = if document {
            &binding.document_target_gate
        } else {
            &binding.target_gate
        };
        let editable = !self.model.is_blank(&binding.source_gate) && !self.model.is_blank(target_gate);
        let mode = if document {
            MappingMode::Document
        } else {
            MappingMode::Standard
        };

        let before = (self.mapping.source().len(), self.mapping.target().len());
        self.mapping.set_editable(editable);
        self.mapping.set_mode(mode);
        if self.mapping.source().len() != before.0 {
            self.emit_mapping(Side::Source);
        }
        if self.mapping.target().len() != before.1 {
            self.emit_mapping(Side::Target);
        }
    }

    fn emit_mapping(&self, side: Side) {
        self.events.emit(FormEvent::MappingChanged {
            side,
            len: self.mapping.list(side).len(),
        });
    }

    /// Whether a descriptor is currently shown
    pub fn compute_visible(&self, id: &str) -> bool {
        self.spans.get(id).is_some_and(|span| *span != 0)
    }

    pub fn span(&self, id: &str) -> Option<u8> {
        self.spans.get(id).copied()
    }

    pub fn options(&self, id: &str) -> &[SelectOption] {
        self.options.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Error indicator of a trigger whose last lookup failed
    pub fn field_error(&self, key: &str) -> Option<&str> {
        self.errors.get(key).map(String::as_str)
    }

    pub fn field(&self, id: &str) -> Option<FieldView> {
        let descriptor = self.template.descriptor(id)?;
        let span = self.spans.get(id).copied().unwrap_or(0);
        let value = if descriptor.kind.reads_model() {
            self.model.get(&descriptor.key).cloned()
        } else {
            None
        };
        Some(FieldView {
            id: id.to_string(),
            key: descriptor.key.clone(),
            kind: descriptor.kind,
            span,
            visible: span != 0,
            options: self.options(id).to_vec(),
            value,
            error: self.errors.get(&descriptor.key).cloned(),
        })
    }

    /// Views of every descriptor, in template order
    pub fn fields(&self) -> Vec<FieldView> {
        self.template
            .descriptors
            .iter()
            .filter_map(|d| self.field(d.id()))
            .collect()
    }

    pub fn visible_fields(&self) -> Vec<FieldView> {
        self.fields().into_iter().filter(|f| f.visible).collect()
    }

    /// Run the validation rule of every visible descriptor
    ///
    /// Hidden descriptors are never validated.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        debug!("FormResolver::validate: called");
        let mut errors = Vec::new();
        for descriptor in &self.template.descriptors {
            let Some(rule) = &descriptor.validation else {
                continue;
            };
            if !self.compute_visible(descriptor.id()) {
                continue;
            }
            let result = match rule {
                ValidationRule::FieldMapping => self.mapping.validate().map_err(|e| e.to_string()),
                rule => rule.check(self.model.get(&descriptor.key)),
            };
            if let Err(message) = result {
                errors.push(FieldError {
                    id: descriptor.id().to_string(),
                    key: descriptor.key.clone(),
                    message,
                });
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// The model with the mapping lists merged back under their keys
    pub fn snapshot(&self) -> Value {
        let mut model = self.model.clone();
        if let Some(binding) = &self.template.mapping {
            model.set(
                &binding.source_key,
                serde_json::to_value(self.mapping.source()).unwrap_or_default(),
            );
            model.set(
                &binding.target_key,
                serde_json::to_value(self.mapping.target()).unwrap_or_default(),
            );
        }
        model.to_value()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FormEvent> {
        self.events.subscribe()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn template(&self) -> &FormTemplate {
        &self.template
    }

    pub fn mapping(&self) -> &MappingReconciler {
        &self.mapping
    }

    /// Mutable access for the editor's structural operations
    pub fn mapping_mut(&mut self) -> &mut MappingReconciler {
        &mut self.mapping
    }
}

/// Move a column list out of the model
fn take_columns(model: &mut Model, key: &str) -> Result<Vec<ColumnRecord>, ResolverError> {
    match model.remove(key) {
        None => Ok(Vec::new()),
        Some(value) if is_blank(&value) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value).map_err(|e| ResolverError::InvalidColumns {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
