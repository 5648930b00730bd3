//! Datasource catalog
//!
//! The remote queries the resolver depends on: datasource types, datasource
//! instances of a type, tables of an instance, and the column/partition layout
//! of a table. All of them are asynchronous and may fail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod fixture;

pub use fixture::{StaticCatalog, default_datasource_types};

/// Errors returned by catalog lookups
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Lookup timed out after {0}ms")]
    Timeout(u64),
}

/// A datasource type code and whether jobs may use it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceTypeEntry {
    pub code: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A configured datasource of some type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceInstance {
    pub id: String,
    pub name: String,
}

/// Column name and type as reported by the datasource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

/// Partition column of a partitioned table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionColumn {
    pub name: String,
}

/// Columns and partition layout of one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSchema {
    pub columns: Vec<ColumnInfo>,

    #[serde(rename = "partition-columns")]
    pub partition_columns: Vec<PartitionColumn>,

    #[serde(rename = "partitioned")]
    pub is_partitioned: bool,
}

impl TableSchema {
    /// Partition entries in `column=` form, empty for unpartitioned tables
    pub fn partition_entries(&self) -> Vec<String> {
        if !self.is_partitioned {
            return Vec::new();
        }
        self.partition_columns.iter().map(|p| format!("{}=", p.name)).collect()
    }
}

/// Source of datasource metadata consumed by the resolver
#[async_trait]
pub trait DatasourceCatalog: Send + Sync {
    /// All known datasource types
    async fn list_datasource_types(&self) -> Result<Vec<DatasourceTypeEntry>, CatalogError>;

    /// Datasource instances of the given type
    async fn list_datasource_instances(&self, datasource_type: &str) -> Result<Vec<DatasourceInstance>, CatalogError>;

    /// Table names of a datasource instance
    async fn list_tables(&self, datasource_id: &str) -> Result<Vec<String>, CatalogError>;

    /// Columns and partition info of one table
    async fn fetch_columns_and_partitions(&self, datasource_id: &str, table: &str)
    -> Result<TableSchema, CatalogError>;
}
