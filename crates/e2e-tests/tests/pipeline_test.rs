//! Happy-path E2E tests: schema resolution through bulk write.

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{error_kinds, job, numbered_docs, TestHarness, NUMBERED_FIELDS};
use reindex_pipeline::{OrchestratorConfig, STEP_DONE};
use reindex_types::{ErrorKind, FieldTypeOverride, JobStatus};

#[tokio::test]
async fn test_dotted_documents_are_nested() {
    let harness = TestHarness::new()
        .with_source("a", &[("a.b", "long")], vec![json!({"a.b": 1})])
        .with_source(
            "b",
            &[("a.b", "long"), ("a.c", "long")],
            vec![json!({"a.b": 2, "a.c": 3})],
        );

    let mut job = job(&["a", "b"], "new_index");
    harness.run(&mut job).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.errors.is_empty());
    assert_eq!(
        harness.written("new_index"),
        vec![json!({"a": {"b": 1}}), json!({"a": {"b": 2, "c": 3}})]
    );
    assert_eq!(
        harness.backend.created_mapping("new_index").unwrap(),
        json!({"mappings": {"properties": {
            "a": {"properties": {"b": {"type": "long"}, "c": {"type": "long"}}}
        }}})
    );
}

#[tokio::test]
async fn test_flatten_keeps_dotted_keys() {
    let harness =
        TestHarness::new().with_source("src", NUMBERED_FIELDS, numbered_docs(2));

    let mut job = job(&["src"], "flat").with_flatten(true);
    harness.run(&mut job).await.unwrap();

    assert_eq!(
        harness.written("flat"),
        vec![
            json!({"n": 0, "meta.parity": "even"}),
            json!({"n": 1, "meta.parity": "odd"})
        ]
    );
}

#[tokio::test]
async fn test_chunks_follow_scroll_size() {
    let harness =
        TestHarness::new().with_source("src", NUMBERED_FIELDS, numbered_docs(23));

    let mut job = job(&["src"], "dest").with_scroll_size(5);
    let report = harness.run(&mut job).await.unwrap();

    assert_eq!(report.chunks, 5);
    assert_eq!(report.documents_written, 23);
    assert_eq!(job.documents_written, 23);
    assert_eq!(harness.backend.bulk_call_sizes(), vec![5, 5, 5, 5, 3]);
}

#[tokio::test]
async fn test_every_source_document_is_copied_once() {
    let harness =
        TestHarness::new().with_source("src", NUMBERED_FIELDS, numbered_docs(40));

    let mut job = job(&["src"], "dest").with_scroll_size(7);
    harness.run(&mut job).await.unwrap();

    let written: Vec<u64> = harness
        .written("dest")
        .iter()
        .filter_map(|doc| doc["n"].as_u64())
        .collect();
    let distinct: HashSet<_> = written.iter().copied().collect();
    assert_eq!(written.len(), 40);
    assert_eq!(distinct.len(), 40);
}

#[tokio::test]
async fn test_requested_fields_and_overrides() {
    let harness =
        TestHarness::new().with_source("src", NUMBERED_FIELDS, numbered_docs(3));

    let mut job = job(&["src"], "dest")
        .with_fields(vec!["meta.parity".to_string()])
        .with_type_overrides(vec![
            FieldTypeOverride::new("meta.parity", "text").with_old_type("keyword")
        ]);
    harness.run(&mut job).await.unwrap();

    assert_eq!(
        harness.written("dest"),
        vec![
            json!({"meta": {"parity": "even"}}),
            json!({"meta": {"parity": "odd"}}),
            json!({"meta": {"parity": "even"}})
        ]
    );
    let mapping = harness.backend.created_mapping("dest").unwrap();
    assert_eq!(
        mapping["mappings"]["properties"],
        json!({"meta": {"properties": {"parity": {"type": "text"}}}})
    );
}

#[tokio::test]
async fn test_query_filters_source() {
    let harness =
        TestHarness::new().with_source("src", NUMBERED_FIELDS, numbered_docs(10));

    let mut job = job(&["src"], "odd_only")
        .with_query(json!({"query": {"term": {"meta.parity": "odd"}}}));
    harness.run(&mut job).await.unwrap();

    let written: Vec<_> = harness
        .written("odd_only")
        .iter()
        .filter_map(|doc| doc["n"].as_u64())
        .collect();
    assert_eq!(written, vec![1, 3, 5, 7, 9]);
}

#[tokio::test]
async fn test_facts_mapping_is_added() {
    let harness =
        TestHarness::new().with_source("src", NUMBERED_FIELDS, numbered_docs(1));

    let mut job = job(&["src"], "with_facts").with_facts_mapping(true);
    harness.run(&mut job).await.unwrap();

    let mapping = harness.backend.created_mapping("with_facts").unwrap();
    let facts = &mapping["mappings"]["properties"]["texta_facts"];
    assert_eq!(facts["type"], "nested");
    assert_eq!(facts["properties"]["num_val"]["type"], "long");
    assert_eq!(facts["properties"]["fact"]["type"], "keyword");
}

#[tokio::test]
async fn test_excluded_ids_never_written() {
    let harness = TestHarness::new()
        .with_source("src", NUMBERED_FIELDS, numbered_docs(9))
        .with_config(OrchestratorConfig::default().with_exclude_ids(["src-0", "src-4", "src-8"]));

    let mut job = job(&["src"], "dest").with_scroll_size(3);
    let report = harness.run(&mut job).await.unwrap();

    let written: Vec<_> = harness
        .written("dest")
        .iter()
        .filter_map(|doc| doc["n"].as_u64())
        .collect();
    assert_eq!(written, vec![1, 2, 3, 5, 6, 7]);
    assert_eq!(harness.backend.bulk_call_sizes(), vec![3, 3]);
    assert_eq!(report.chunks, 2);
}

#[tokio::test]
async fn test_progress_is_reported() {
    let harness =
        TestHarness::new().with_source("src", NUMBERED_FIELDS, numbered_docs(8));

    let mut job = job(&["src"], "dest").with_scroll_size(4);
    harness.run(&mut job).await.unwrap();

    assert_eq!(job.progress.step, STEP_DONE);
    assert_eq!(job.progress.percent, 100);
    assert_eq!(
        harness.reporter.statuses(),
        vec![
            JobStatus::SchemaResolved,
            JobStatus::IndexCreated,
            JobStatus::Streaming,
            JobStatus::Completed
        ]
    );
    assert_eq!(harness.reporter.views(), vec![50, 99, 100, 100]);
    assert!(error_kinds(&job).iter().all(|kind| *kind != ErrorKind::UnexpectedError));
}
