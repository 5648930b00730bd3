//! File-backed catalog
//!
//! Serves datasource metadata from a YAML fixture. Used by the `jf run`
//! command and by tests that need a deterministic catalog.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CatalogError, ColumnInfo, DatasourceCatalog, DatasourceInstance, DatasourceTypeEntry, PartitionColumn, TableSchema};

/// Datasource types supported by DataX jobs, with the ones that cannot be used disabled
pub fn default_datasource_types() -> Vec<DatasourceTypeEntry> {
    [
        ("MYSQL", true),
        ("POSTGRESQL", true),
        ("HIVE", true),
        ("SPARK", false),
        ("CLICKHOUSE", true),
        ("ORACLE", true),
        ("SQLSERVER", true),
        ("DB2", false),
        ("PRESTO", false),
        ("ELASTICSEARCH", true),
        ("DM", true),
    ]
    .into_iter()
    .map(|(code, enabled)| DatasourceTypeEntry {
        code: code.to_string(),
        enabled,
    })
    .collect()
}

/// Catalog backed by in-memory maps
///
/// ```yaml
/// types: [{code: MYSQL, enabled: true}]
/// instances: {MYSQL: [{id: "1", name: mysql-prod}]}
/// tables: {"1": [orders]}
/// schemas:
///   "1":
///     orders: {columns: [{name: id, type: bigint}], partitioned: false}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticCatalog {
    /// Datasource types; empty means the DataX defaults
    types: Vec<DatasourceTypeEntry>,

    /// Instances keyed by type code
    instances: BTreeMap<String, Vec<DatasourceInstance>>,

    /// Table names keyed by datasource id
    tables: BTreeMap<String, Vec<String>>,

    /// Schemas keyed by datasource id, then table name
    schemas: BTreeMap<String, BTreeMap<String, TableSchema>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a fixture file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).context("Failed to read catalog fixture")?;
        let catalog = Self::from_yaml(&content)?;
        info!("Loaded catalog fixture from: {}", path.as_ref().display());
        Ok(catalog)
    }

    /// Parse a fixture from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse catalog fixture")
    }

    pub fn with_type(mut self, code: &str, enabled: bool) -> Self {
        self.types.push(DatasourceTypeEntry {
            code: code.to_string(),
            enabled,
        });
        self
    }

    pub fn with_instance(mut self, datasource_type: &str, id: &str, name: &str) -> Self {
        self.instances
            .entry(datasource_type.to_string())
            .or_default()
            .push(DatasourceInstance {
                id: id.to_string(),
                name: name.to_string(),
            });
        self
    }

    pub fn with_tables(mut self, datasource_id: &str, tables: &[&str]) -> Self {
        self.tables
            .entry(datasource_id.to_string())
            .or_default()
            .extend(tables.iter().map(|t| t.to_string()));
        self
    }

    /// Register a table schema; `columns` are `(name, type)` pairs
    pub fn with_schema(mut self, datasource_id: &str, table: &str, columns: &[(&str, &str)], partitions: &[&str]) -> Self {
        let schema = TableSchema {
            columns: columns
                .iter()
                .map(|(name, data_type)| ColumnInfo {
                    name: name.to_string(),
                    data_type: data_type.to_string(),
                })
                .collect(),
            partition_columns: partitions
                .iter()
                .map(|name| PartitionColumn { name: name.to_string() })
                .collect(),
            is_partitioned: !partitions.is_empty(),
        };
        self.schemas
            .entry(datasource_id.to_string())
            .or_default()
            .insert(table.to_string(), schema);
        self
    }
}

#[async_trait]
impl DatasourceCatalog for StaticCatalog {
    async fn list_datasource_types(&self) -> Result<Vec<DatasourceTypeEntry>, CatalogError> {
        debug!(count = self.types.len(), "StaticCatalog::list_datasource_types: called");
        if self.types.is_empty() {
            return Ok(default_datasource_types());
        }
        Ok(self.types.clone())
    }

    async fn list_datasource_instances(&self, datasource_type: &str) -> Result<Vec<DatasourceInstance>, CatalogError> {
        debug!(%datasource_type, "StaticCatalog::list_datasource_instances: called");
        Ok(self.instances.get(datasource_type).cloned().unwrap_or_default())
    }

    async fn list_tables(&self, datasource_id: &str) -> Result<Vec<String>, CatalogError> {
        debug!(%datasource_id, "StaticCatalog::list_tables: called");
        self.tables
            .get(datasource_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("datasource {datasource_id}")))
    }

    async fn fetch_columns_and_partitions(&self, datasource_id: &str, table: &str) -> Result<TableSchema, CatalogError> {
        debug!(%datasource_id, %table, "StaticCatalog::fetch_columns_and_partitions: called");
        self.schemas
            .get(datasource_id)
            .and_then(|tables| tables.get(table))
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("table {table} in datasource {datasource_id}")))
    }
}
