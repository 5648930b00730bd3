//! Field descriptors
//!
//! Static declaration of one form field: its model key, kind, span rule,
//! declared dependencies, option source, validation and remote trigger.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Model, SelectOption, value_text};

use super::validation::ValidationRule;

/// Field kinds the rendering layer knows how to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    Select,
    Input,
    Editor,
    Switch,
    Number,
    MultiInput,
    PartitionList,
    CustomParameters,
    FieldMapping,
    Divider,
}

impl FieldKind {
    /// Value a missing model key of this kind resolves to
    ///
    /// Dividers and the mapping editor do not read the model.
    pub fn default_value(&self) -> Option<Value> {
        match self {
            Self::Select | Self::Input | Self::Editor => Some(Value::String(String::new())),
            Self::Switch => Some(Value::Bool(false)),
            Self::Number => Some(Value::Null),
            Self::MultiInput | Self::PartitionList | Self::CustomParameters => Some(Value::Array(Vec::new())),
            Self::FieldMapping | Self::Divider => None,
        }
    }

    pub fn reads_model(&self) -> bool {
        !matches!(self, Self::FieldMapping | Self::Divider)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Input => "input",
            Self::Editor => "editor",
            Self::Switch => "switch",
            Self::Number => "number",
            Self::MultiInput => "multi-input",
            Self::PartitionList => "partition-list",
            Self::CustomParameters => "custom-parameters",
            Self::FieldMapping => "field-mapping",
            Self::Divider => "divider",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Layout rule of a descriptor
///
/// A fixed span never changes; a slot span is looked up in the layout table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpanRef {
    Fixed(u8),
    Slot(String),
}

impl Default for SpanRef {
    fn default() -> Self {
        Self::Fixed(24)
    }
}

/// Where a descriptor's options come from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "kebab-case")]
pub enum OptionsSource {
    #[default]
    None,
    /// Fixed list declared in the template
    Static { items: Vec<SelectOption> },
    /// Enabled datasource types, loaded once at initialization
    DatasourceTypes {
        #[serde(default)]
        exclude: Vec<String>,
    },
    /// Filled by the lookup of an upstream trigger
    Remote,
}

/// Predicate over the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "kebab-case")]
pub enum Condition {
    Equals { key: String, value: Value },
    NotEquals { key: String, value: Value },
    Blank { key: String },
}

impl Condition {
    pub fn holds(&self, model: &Model) -> bool {
        match self {
            Self::Equals { key, value } => model.get(key).is_some_and(|v| same_scalar(v, value)),
            Self::NotEquals { key, value } => !model.get(key).is_some_and(|v| same_scalar(v, value)),
            Self::Blank { key } => model.is_blank(key),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Equals { key, .. } | Self::NotEquals { key, .. } | Self::Blank { key } => key,
        }
    }
}

fn same_scalar(a: &Value, b: &Value) -> bool {
    a == b || (!value_text(a).is_empty() && value_text(a) == value_text(b))
}

/// Remote lookup issued when the trigger key changes
///
/// The trigger's own value is the last argument of the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fetch", rename_all = "kebab-case")]
pub enum Lookup {
    /// Datasource instances of the selected type, as options of `options_for`
    Instances {
        #[serde(rename = "options-for")]
        options_for: String,
    },
    /// Tables of the selected datasource, as options of `options_for`
    Tables {
        #[serde(rename = "options-for")]
        options_for: String,
    },
    /// Columns and partitions of the selected table
    Columns {
        #[serde(rename = "datasource-key")]
        datasource_key: String,
        #[serde(rename = "columns-key")]
        columns_key: String,
        #[serde(rename = "partitions-key")]
        partitions_key: String,
    },
}

impl Lookup {
    /// Descriptor key whose options this lookup fills
    pub fn options_target(&self) -> Option<&str> {
        match self {
            Self::Instances { options_for } | Self::Tables { options_for } => Some(options_for),
            Self::Columns { .. } => None,
        }
    }

    /// Model keys this lookup writes
    pub fn written_keys(&self) -> Vec<&str> {
        match self {
            Self::Instances { .. } | Self::Tables { .. } => Vec::new(),
            Self::Columns {
                columns_key,
                partitions_key,
                ..
            } => vec![columns_key.as_str(), partitions_key.as_str()],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Instances { .. } => "instances",
            Self::Tables { .. } => "tables",
            Self::Columns { .. } => "columns",
        }
    }
}

/// Trigger declaration of a descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoteTrigger {
    pub lookup: Lookup,

    /// Extra model keys reset whenever the trigger changes
    #[serde(default)]
    pub clears: Vec<String>,

    /// Skip the lookup (but still clear) while this holds
    #[serde(default)]
    pub skip_when: Option<Condition>,
}

impl RemoteTrigger {
    /// Every model key that is reset when the trigger changes
    pub fn produced_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.clears.iter().map(String::as_str).collect();
        for key in self.lookup.written_keys() {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

/// Static definition of one form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FieldDescriptor {
    /// Unique descriptor id; defaults to the key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    /// Model key (dot-path for nested fields)
    pub key: String,

    pub kind: FieldKind,

    #[serde(default)]
    pub span: SpanRef,

    /// Model keys whose change re-evaluates this descriptor
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub options: OptionsSource,

    #[serde(default)]
    pub validation: Option<ValidationRule>,

    #[serde(default)]
    pub trigger: Option<RemoteTrigger>,

    /// Initial value when the model lacks the key
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldDescriptor {
    pub fn new(key: &str, kind: FieldKind) -> Self {
        Self {
            id: String::new(),
            key: key.to_string(),
            kind,
            span: SpanRef::default(),
            depends_on: Vec::new(),
            options: OptionsSource::None,
            validation: None,
            trigger: None,
            default: None,
        }
    }

    pub fn id(&self) -> &str {
        if self.id.is_empty() { &self.key } else { &self.id }
    }

    /// Value a missing key resolves to: the declared default, else the kind default
    pub fn default_value(&self) -> Option<Value> {
        if !self.kind.reads_model() {
            return None;
        }
        self.default.clone().or_else(|| self.kind.default_value())
    }

    pub fn depends_on(&self, key: &str) -> bool {
        self.depends_on.iter().any(|k| k == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_yaml() {
        let yaml = r#"
key: dataTarget
kind: select
span: target-datasource
depends-on: [customConfig, dsType, dtType]
options: {from: remote}
validation: {rule: required}
trigger:
  lookup: {fetch: tables, options-for: targetTable}
  clears: [targetTable]
  skip-when: {test: equals, key: dtType, value: ELASTICSEARCH}
"#;
        let descriptor: FieldDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.id(), "dataTarget");
        assert_eq!(descriptor.span, SpanRef::Slot("target-datasource".to_string()));
        assert_eq!(descriptor.options, OptionsSource::Remote);

        let trigger = descriptor.trigger.unwrap();
        assert_eq!(trigger.lookup.options_target(), Some("targetTable"));
        assert_eq!(trigger.produced_keys(), vec!["targetTable"]);
    }

    #[test]
    fn test_fixed_span_and_static_options() {
        let yaml = r#"
key: jobSpeedRecord
kind: select
span: 12
options:
  from: static
  items:
    - {label: "500", value: 500}
default: 0
"#;
        let descriptor: FieldDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.span, SpanRef::Fixed(12));
        assert_eq!(descriptor.options, OptionsSource::Static {
                items: vec![SelectOption::new("500", 500)]
            });
        assert_eq!(descriptor.default_value(), Some(json!(0)));
    }

    #[test]
    fn test_columns_lookup_produces_both_keys() {
        let trigger = RemoteTrigger {
            lookup: Lookup::Columns {
                datasource_key: "dataSource".to_string(),
                columns_key: "dsColumns".to_string(),
                partitions_key: "dsPartitions".to_string(),
            },
            clears: vec!["dsPartitions".to_string()],
            skip_when: None,
        };
        assert_eq!(trigger.produced_keys(), vec!["dsPartitions", "dsColumns"]);
    }

    #[test]
    fn test_condition_matches_numbers_and_strings() {
        let model = Model::from_value(json!({"dtType": "ELASTICSEARCH", "flag": 1})).unwrap();
        let es = Condition::Equals {
            key: "dtType".to_string(),
            value: json!("ELASTICSEARCH"),
        };
        assert!(es.holds(&model));
        assert!(
            Condition::Equals {
                key: "flag".to_string(),
                value: json!("1")
            }
            .holds(&model)
        );
        assert!(
            Condition::Blank {
                key: "missing".to_string()
            }
            .holds(&model)
        );
        assert!(
            !Condition::NotEquals {
                key: "dtType".to_string(),
                value: json!("ELASTICSEARCH")
            }
            .holds(&model)
        );
    }

    #[test]
    fn test_kind_defaults() {
        assert_eq!(FieldKind::PartitionList.default_value(), Some(json!([])));
        assert_eq!(FieldKind::Switch.default_value(), Some(json!(false)));
        assert_eq!(FieldKind::Divider.default_value(), None);
        assert!(!FieldDescriptor::new("fieldMapping", FieldKind::FieldMapping).kind.reads_model());
    }
}
