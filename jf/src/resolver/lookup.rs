//! Lookup requests
//!
//! A trigger change is turned into one catalog call. The call runs on a
//! spawned task and its completion is handed back to the resolver, tagged with
//! the trigger's generation and value at issue time.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::catalog::{CatalogError, DatasourceCatalog, TableSchema};
use crate::domain::{Model, SelectOption};
use crate::template::Lookup;

/// A resolved catalog call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    Instances { datasource_type: String },
    Tables { datasource_id: String },
    Columns { datasource_id: String, table: String },
}

impl LookupRequest {
    /// Build the call for a trigger value
    ///
    /// Column lookups also need the datasource key; `None` when it is blank.
    pub fn build(lookup: &Lookup, trigger_value: &str, model: &Model) -> Option<Self> {
        match lookup {
            Lookup::Instances { .. } => Some(Self::Instances {
                datasource_type: trigger_value.to_string(),
            }),
            Lookup::Tables { .. } => Some(Self::Tables {
                datasource_id: trigger_value.to_string(),
            }),
            Lookup::Columns { datasource_key, .. } => {
                let datasource_id = model.text(datasource_key);
                if datasource_id.is_empty() {
                    return None;
                }
                Some(Self::Columns {
                    datasource_id,
                    table: trigger_value.to_string(),
                })
            }
        }
    }
}

/// Payload of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    Options(Vec<SelectOption>),
    Schema(TableSchema),
}

/// Completion sent from a lookup task to the resolver
#[derive(Debug)]
pub struct LookupCompletion {
    pub trigger: String,
    pub generation: u64,
    pub trigger_value: Value,
    pub result: Result<LookupResult, CatalogError>,
}

/// What happened to one completion
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Applied { trigger: String, generation: u64 },
    Discarded { trigger: String, generation: u64 },
    Failed {
        trigger: String,
        generation: u64,
        error: CatalogError,
    },
}

impl LookupOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Await a catalog call, failing with `Timeout` past the limit
pub async fn with_timeout<T, F>(future: F, timeout: Option<Duration>) -> Result<T, CatalogError>
where
    F: Future<Output = Result<T, CatalogError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| CatalogError::Timeout(limit.as_millis() as u64))?,
        None => future.await,
    }
}

/// Execute one request against the catalog
pub async fn run(
    catalog: &dyn DatasourceCatalog,
    request: &LookupRequest,
    timeout: Option<Duration>,
) -> Result<LookupResult, CatalogError> {
    debug!(?request, "lookup::run: called");
    match request {
        LookupRequest::Instances { datasource_type } => {
            let instances = with_timeout(catalog.list_datasource_instances(datasource_type), timeout).await?;
            Ok(LookupResult::Options(
                instances
                    .into_iter()
                    .map(|instance| SelectOption::new(instance.name, instance.id))
                    .collect(),
            ))
        }
        LookupRequest::Tables { datasource_id } => {
            let tables = with_timeout(catalog.list_tables(datasource_id), timeout).await?;
            Ok(LookupResult::Options(tables.into_iter().map(SelectOption::same).collect()))
        }
        LookupRequest::Columns { datasource_id, table } => {
            let schema = with_timeout(catalog.fetch_columns_and_partitions(datasource_id, table), timeout).await?;
            Ok(LookupResult::Schema(schema))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::catalog::mock::MockCatalog;
    use serde_json::json;

    fn columns_lookup() -> Lookup {
        Lookup::Columns {
            datasource_key: "dataSource".to_string(),
            columns_key: "dsColumns".to_string(),
            partitions_key: "dsPartitions".to_string(),
        }
    }

    #[test]
    fn test_columns_request_needs_datasource() {
        let model = Model::from_value(json!({"dataSource": ""})).unwrap();
        assert_eq!(LookupRequest::build(&columns_lookup(), "users", &model), None);

        let model = Model::from_value(json!({"dataSource": 1})).unwrap();
        assert_eq!(
            LookupRequest::build(&columns_lookup(), "users", &model),
            Some(LookupRequest::Columns {
                datasource_id: "1".to_string(),
                table: "users".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_instances_become_id_options() {
        let catalog = StaticCatalog::new().with_instance("MYSQL", "1", "mysql-prod");
        let request = LookupRequest::Instances {
            datasource_type: "MYSQL".to_string(),
        };
        let result = run(&catalog, &request, None).await.unwrap();
        assert_eq!(
            result,
            LookupResult::Options(vec![SelectOption::new("mysql-prod", "1")])
        );
    }

    #[tokio::test]
    async fn test_tables_use_name_as_value() {
        let catalog = StaticCatalog::new().with_tables("1", &["users"]);
        let request = LookupRequest::Tables {
            datasource_id: "1".to_string(),
        };
        let result = run(&catalog, &request, None).await.unwrap();
        assert_eq!(result, LookupResult::Options(vec![SelectOption::same("users")]));
    }

    #[tokio::test]
    async fn test_timeout() {
        let catalog = MockCatalog::new(StaticCatalog::new().with_tables("1", &["users"]))
            .with_delay("1", Duration::from_millis(200));
        let request = LookupRequest::Tables {
            datasource_id: "1".to_string(),
        };
        let err = run(&catalog, &request, Some(Duration::from_millis(10))).await.unwrap_err();
        assert_eq!(err, CatalogError::Timeout(10));
    }
}
