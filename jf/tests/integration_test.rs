//! Integration tests for jobform
//!
//! These tests drive the resolver, the mapping reconciler and the session
//! runner end to end against the fixture catalog.

use std::path::PathBuf;
use std::sync::Arc;

use jobform::catalog::{DatasourceCatalog, StaticCatalog};
use jobform::domain::Model;
use jobform::mapping::{Direction, MappingMode, MappingReconciler, Side};
use jobform::resolver::{FormResolver, LookupOutcome, ResolverConfig};
use jobform::session::{self, Session};
use jobform::template::FormTemplate;
use proptest::prelude::*;
use serde_json::json;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}

fn catalog() -> Arc<dyn DatasourceCatalog> {
    Arc::new(StaticCatalog::load(fixture_path("catalog.yml")).expect("Failed to load catalog fixture"))
}

fn resolver(model: serde_json::Value) -> FormResolver {
    FormResolver::new(
        FormTemplate::datax().expect("Embedded template should be valid"),
        Model::from_value(model).expect("Model should be an object"),
        catalog(),
        ResolverConfig::default(),
    )
    .expect("Failed to build resolver")
}

fn visible_spans(resolver: &FormResolver) -> Vec<(String, u8)> {
    resolver.visible_fields().into_iter().map(|f| (f.id, f.span)).collect()
}

// =============================================================================
// Resolver Flows
// =============================================================================

#[tokio::test]
async fn test_full_job_flow_is_valid() {
    let mut resolver = resolver(json!({}));
    resolver.initialize().await.expect("initialize should succeed");

    resolver.on_field_change("dsType", json!("MYSQL"));
    resolver.settle().await;
    resolver.on_field_change("dataSource", json!("1"));
    resolver.settle().await;
    resolver.on_field_change("sourceTable", json!("users"));
    resolver.on_field_change("dtType", json!("MYSQL"));
    resolver.settle().await;
    resolver.on_field_change("dataTarget", json!("2"));
    resolver.settle().await;
    resolver.on_field_change("targetTable", json!("users_stage"));
    resolver.on_field_change("writeMode", json!("1"));
    let outcomes = resolver.settle().await;
    assert!(outcomes.iter().all(LookupOutcome::is_applied));

    resolver.mapping_mut().set_all_connections(true);
    assert!(resolver.mapping().all_connected());
    assert!(resolver.validate().is_ok(), "{:?}", resolver.validate());

    let snapshot = resolver.snapshot();
    assert_eq!(snapshot["dsColumns"].as_array().map(Vec::len), Some(2));
    assert_eq!(snapshot["dtColumns"][1]["columnName"], "name");
    assert_eq!(snapshot["writeMode"], "1");
}

#[tokio::test]
async fn test_rapid_reselection_keeps_latest_tables() {
    let mut resolver = resolver(json!({"dsType": "MYSQL"}));

    for datasource in ["1", "2", "1", "2"] {
        resolver.on_field_change("dataSource", json!(datasource));
    }
    let outcomes = resolver.settle().await;

    let applied: Vec<_> = outcomes.iter().filter(|o| o.is_applied()).collect();
    assert_eq!(applied.len(), 1);
    let table_options: Vec<_> = resolver.options("sourceTable").iter().map(|o| o.label.clone()).collect();
    assert_eq!(table_options, vec!["users_stage"]);
}

#[tokio::test]
async fn test_document_target_switch_back_to_standard() {
    let mut resolver = resolver(json!({}));
    resolver.on_field_change("dsType", json!("MYSQL"));
    resolver.settle().await;
    resolver.on_field_change("dataSource", json!("1"));
    resolver.settle().await;
    resolver.on_field_change("sourceTable", json!("users"));
    resolver.on_field_change("dtType", json!("ELASTICSEARCH"));
    resolver.settle().await;
    resolver.on_field_change("dataTarget", json!("5"));

    assert_eq!(resolver.mapping().mode(), MappingMode::Document);
    assert_eq!(resolver.mapping().target().len(), 2);

    resolver.on_field_change("dtType", json!("MYSQL"));
    assert_eq!(resolver.mapping().mode(), MappingMode::Standard);
    assert!(resolver.mapping().target().is_empty());
    assert!(!resolver.mapping().is_editable());
    assert_eq!(resolver.model().get("dataTarget"), Some(&json!("")));
    resolver.settle().await;
}

#[tokio::test]
async fn test_nested_model_keys() {
    let mut resolver = resolver(json!({"dtType": "ELASTICSEARCH"}));
    resolver.on_field_change("elasticSearchDataxParams.index", json!("logs"));
    resolver.on_field_change("elasticSearchDataxParams.timeout", json!(600));

    let snapshot = resolver.snapshot();
    assert_eq!(snapshot["elasticSearchDataxParams"]["index"], "logs");
    assert_eq!(snapshot["elasticSearchDataxParams"]["timeout"], 600);
    assert_eq!(snapshot["elasticSearchDataxParams"]["cleanUp"], false);
}

// =============================================================================
// Session Runner
// =============================================================================

#[tokio::test]
async fn test_session_fixture_runs_clean() {
    let session = Session::load(fixture_path("hive_to_mysql.yml")).expect("Failed to load session");
    let report = session::run(session, FormTemplate::datax().unwrap(), catalog(), ResolverConfig::default())
        .await
        .expect("session should run");

    assert!(report.is_valid(), "{:?}", report.errors);
    assert_eq!(report.snapshot["dsPartitions"], json!(["dt=2024-01-01"]));
    assert_eq!(report.snapshot["dsColumns"][1]["columnName"], "amount");
    assert!(report.fields.iter().any(|f| f.id == "dsPartitions"));
    assert!(!report.fields.iter().any(|f| f.id == "where"));
}

#[tokio::test]
async fn test_incomplete_session_reports_errors() {
    let session = Session::load(fixture_path("incomplete.yml")).expect("Failed to load session");
    let report = session::run(session, FormTemplate::datax().unwrap(), catalog(), ResolverConfig::default())
        .await
        .expect("session should run");

    let ids: Vec<_> = report.errors.iter().map(|e| e.id.as_str()).collect();
    assert!(ids.contains(&"dataSource"));
    assert!(ids.contains(&"dtType"));
    assert!(!ids.contains(&"dsType"));
}

// =============================================================================
// Properties
// =============================================================================

const SOURCES: [&str; 4] = ["", "MYSQL", "HIVE", "POSTGRESQL"];
const TARGETS: [&str; 5] = ["", "MYSQL", "HIVE", "ELASTICSEARCH", "CLICKHOUSE"];
const ORDERS: [[usize; 3]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

#[derive(Debug, Clone)]
enum Edit {
    Add(Side),
    Remove(Side, usize),
    Move(Side, usize, Direction),
    Connect(usize, bool),
    ConnectAll(bool),
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Source), Just(Side::Target)]
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        side().prop_map(Edit::Add),
        (side(), 0usize..6).prop_map(|(s, i)| Edit::Remove(s, i)),
        (side(), 0usize..6, prop_oneof![Just(Direction::Up), Just(Direction::Down)])
            .prop_map(|(s, i, d)| Edit::Move(s, i, d)),
        (0usize..6, any::<bool>()).prop_map(|(i, c)| Edit::Connect(i, c)),
        any::<bool>().prop_map(Edit::ConnectAll),
    ]
}

proptest! {
    #[test]
    fn prop_layout_is_independent_of_edit_order(
        custom in any::<bool>(),
        source in prop::sample::select(SOURCES.to_vec()),
        target in prop::sample::select(TARGETS.to_vec()),
        order in prop::sample::select(ORDERS.to_vec()),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let edits = [
                ("customConfig", json!(custom)),
                ("dsType", json!(source)),
                ("dtType", json!(target)),
            ];
            let mut edited = resolver(json!({}));
            for index in order {
                let (key, value) = &edits[index];
                edited.on_field_change(key, value.clone());
            }

            let fresh = resolver(json!({"customConfig": custom, "dsType": source, "dtType": target}));
            prop_assert_eq!(visible_spans(&edited), visible_spans(&fresh));
            Ok(())
        })?;
    }

    #[test]
    fn prop_reconciler_keeps_lists_consistent(
        source_len in 0usize..4,
        target_len in 0usize..4,
        document in any::<bool>(),
        edits in prop::collection::vec(edit(), 0..24),
    ) {
        let mode = if document { MappingMode::Document } else { MappingMode::Standard };
        let mut reconciler = MappingReconciler::with_lists(
            (0..source_len).map(|_| Default::default()).collect(),
            (0..target_len).map(|_| Default::default()).collect(),
            mode,
        );

        // Single-record edits never grow or shrink the other list
        let mut expected = (reconciler.source().len(), reconciler.target().len());
        for edit in edits {
            match edit {
                Edit::Add(side) => {
                    reconciler.add_record(side);
                    match side {
                        Side::Source => expected.0 += 1,
                        Side::Target => expected.1 += 1,
                    }
                }
                Edit::Remove(side, index) => {
                    let len = reconciler.list(side).len();
                    reconciler.remove_record(side, index);
                    if index < len {
                        match side {
                            Side::Source => expected.0 -= 1,
                            Side::Target => expected.1 -= 1,
                        }
                    }
                }
                Edit::Move(side, index, direction) => reconciler.move_record(side, index, direction),
                Edit::Connect(index, connected) => reconciler.set_connection(index, connected),
                Edit::ConnectAll(connected) => reconciler.set_all_connections(connected),
            }

            let (source, target) = (reconciler.source(), reconciler.target());
            prop_assert_eq!((source.len(), target.len()), expected);
            let summary = reconciler.connection_summary();
            prop_assert_eq!(summary.len(), source.len().min(target.len()));
            for (index, connected) in summary.iter().enumerate() {
                prop_assert_eq!(*connected, source[index].connected && target[index].connected);
            }
            prop_assert_eq!(
                reconciler.all_connected(),
                !summary.is_empty() && summary.iter().all(|c| *c)
            );
        }
    }
}
