//! Graph module tests

use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::Error;
use crate::graph::{GraphQueryExecutor, MemoryGraph, Params, Record};
use crate::templates::TemplateRegistry;

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn params(value: Value) -> Params {
    value
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn executor(graph: &MemoryGraph) -> GraphQueryExecutor {
    GraphQueryExecutor::new(
        Arc::new(graph.clone()),
        Arc::new(TemplateRegistry::defaults()),
    )
}

// ========== Executor ==========

#[tokio::test]
async fn test_unknown_query_type_touches_nothing() {
    let graph = MemoryGraph::new();
    let executor = executor(&graph);

    let err = executor
        .try_execute("fallback", &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownQueryType(ref t) if t == "fallback"));
    assert_eq!(graph.sessions_opened(), 0);

    assert!(executor.execute("fallback", &Params::new()).await.is_empty());
}

#[tokio::test]
async fn test_missing_parameters_touch_nothing() {
    let graph = MemoryGraph::new();
    let executor = executor(&graph);

    let err = executor
        .try_execute("find_programs_by_university", &params(json!({"level": "Master"})))
        .await
        .unwrap_err();
    match err {
        Error::MissingParameters { missing, .. } => {
            assert_eq!(missing, vec!["university_name".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(graph.sessions_opened(), 0);
    assert!(graph.queries().is_empty());
}

#[tokio::test]
async fn test_execute_sends_only_referenced_parameters() {
    let graph = MemoryGraph::new().with_result(
        "HAS_ABOUT_INFO",
        vec![record(json!({"visa_name": "Student visa", "subclass": "500"}))],
    );
    let executor = executor(&graph);

    let records = executor
        .execute(
            "visa_info",
            &params(json!({"subclass": "500", "keyword": "housing"})),
        )
        .await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["visa_name"], json!("Student visa"));

    let queries = graph.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].params, params(json!({"subclass": "500"})));
    assert_eq!(graph.sessions_opened(), 1);
    assert_eq!(graph.sessions_closed(), 1);
}

#[tokio::test]
async fn test_records_keep_store_order() {
    let graph = MemoryGraph::new().with_result(
        "ielts_required",
        (0..4)
            .map(|i| record(json!({"program_name": format!("P{}", 3 - i)})))
            .collect(),
    );
    let records = executor(&graph)
        .execute("find_programs_by_ielts", &params(json!({"max_score": 6.5})))
        .await;

    let names: Vec<_> = records
        .iter()
        .map(|r| r["program_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["P3", "P2", "P1", "P0"]);
}

#[tokio::test]
async fn test_store_error_degrades_and_releases_session() {
    let graph = MemoryGraph::new().failing("connection reset");
    let executor = executor(&graph);

    let err = executor
        .try_execute("visa_info", &params(json!({"subclass": "500"})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::GraphStoreError(_)));

    assert!(
        executor
            .execute("visa_info", &params(json!({"subclass": "500"})))
            .await
            .is_empty()
    );
    assert_eq!(graph.sessions_opened(), 2);
    assert_eq!(graph.sessions_closed(), 2);
}

#[tokio::test]
async fn test_stats() {
    let graph = MemoryGraph::new().with_result(
        "count(u)",
        vec![record(json!({"unis": 42, "progs": 1337, "visas": 19}))],
    );
    let stats = executor(&graph).stats().await.unwrap();
    assert_eq!(stats.universities, 42);
    assert_eq!(stats.programs, 1337);
    assert_eq!(stats.visas, 19);

    let empty = executor(&MemoryGraph::new()).stats().await.unwrap();
    assert_eq!(empty.universities, 0);
}

#[tokio::test]
async fn test_health() {
    assert!(executor(&MemoryGraph::new()).health().await);
    assert!(!executor(&MemoryGraph::new().failing("down")).health().await);
}
