//! Random sample and limit E2E tests.

use std::collections::HashSet;

use pretty_assertions::assert_eq;

use e2e_tests::{job, numbered_docs, TestHarness, NUMBERED_FIELDS};
use reindex_pipeline::OrchestratorConfig;
use reindex_types::JobStatus;

fn written_numbers(harness: &TestHarness, index: &str) -> Vec<u64> {
    harness
        .written(index)
        .iter()
        .filter_map(|doc| doc["n"].as_u64())
        .collect()
}

#[tokio::test]
async fn test_random_sample_returns_k_distinct_documents() {
    let harness =
        TestHarness::new().with_source("src", NUMBERED_FIELDS, numbered_docs(50));

    let mut job = job(&["src"], "sample").with_random_size(12).with_scroll_size(5);
    let report = harness.run(&mut job).await.unwrap();

    let written = written_numbers(&harness, "sample");
    let distinct: HashSet<_> = written.iter().copied().collect();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(written.len(), 12);
    assert_eq!(distinct.len(), 12);
    assert_eq!(report.chunks, 3);
}

#[tokio::test]
async fn test_random_sample_larger_than_source() {
    let harness =
        TestHarness::new().with_source("src", NUMBERED_FIELDS, numbered_docs(4));

    let mut job = job(&["src"], "sample").with_random_size(10);
    harness.run(&mut job).await.unwrap();

    let mut written = written_numbers(&harness, "sample");
    written.sort_unstable();
    assert_eq!(written, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_random_sample_without_excluded_ids() {
    let harness = TestHarness::new()
        .with_source("src", NUMBERED_FIELDS, numbered_docs(6))
        .with_config(OrchestratorConfig::default().with_exclude_ids(["src-1", "src-2"]));

    let mut job = job(&["src"], "sample").with_random_size(6);
    harness.run(&mut job).await.unwrap();

    let mut written = written_numbers(&harness, "sample");
    written.sort_unstable();
    assert_eq!(written, vec![0, 3, 4, 5]);
}

#[tokio::test]
async fn test_limit_caps_documents() {
    let harness = TestHarness::new()
        .with_source("src", NUMBERED_FIELDS, numbered_docs(30))
        .with_config(OrchestratorConfig::default().with_limit(11));

    let mut job = job(&["src"], "head").with_scroll_size(4);
    harness.run(&mut job).await.unwrap();

    assert_eq!(written_numbers(&harness, "head"), (0..11).collect::<Vec<u64>>());
    assert_eq!(harness.backend.bulk_call_sizes(), vec![4, 4, 3]);
}

#[tokio::test]
async fn test_random_sample_fills_size_despite_exclusions() {
    let excluded: Vec<String> = (0..25).map(|n| format!("src-{n}")).collect();
    let harness = TestHarness::new()
        .with_source("src", NUMBERED_FIELDS, numbered_docs(50))
        .with_config(OrchestratorConfig::default().with_exclude_ids(excluded));

    for round in 0..20 {
        let dest = format!("sample-{round}");
        let mut job = job(&["src"], &dest).with_random_size(10).with_scroll_size(4);
        harness.run(&mut job).await.unwrap();

        let written = written_numbers(&harness, &dest);
        let distinct: HashSet<_> = written.iter().copied().collect();
        assert_eq!(written.len(), 10);
        assert_eq!(distinct.len(), 10);
        assert!(written.iter().all(|n| *n >= 25));
        assert_eq!(job.documents_written, 10);
    }
}
