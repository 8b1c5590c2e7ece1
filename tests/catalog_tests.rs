//! Catalog runs end to end against the in-memory store

use bookstore_reports::catalog::{SECTION_CRUD, SECTION_INDEXING};
use bookstore_reports::{
    sample_books, Catalog, CollectingSink, DocumentStore, FailurePolicy, JsonSink, MemoryStore,
    Outcome, QueryRunner, ReportError,
};

async fn sample_runner() -> QueryRunner<MemoryStore> {
    let runner = QueryRunner::new(MemoryStore::new("books"));
    runner.insert_books(&sample_books()).await.unwrap();
    runner
}

#[tokio::test]
async fn test_continue_policy_records_every_failure() {
    let runner = sample_runner().await;
    runner.store().close().await.unwrap();
    let mut sink = CollectingSink::new();

    let summary = Catalog::new()
        .with_policy(FailurePolicy::Continue)
        .run(&runner, &mut sink)
        .await
        .unwrap();

    // Only the dry-run delete never reaches the store
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 20);
    assert_eq!(sink.entries.len(), 21);
    for entry in sink.entries.iter().filter(|e| !e.outcome.is_ok()) {
        match &entry.outcome {
            Outcome::Failed { unavailable, .. } => assert!(*unavailable),
            Outcome::Ok { .. } => unreachable!(),
        }
    }
}

#[tokio::test]
async fn test_abort_policy_stops_at_first_failure() {
    let runner = sample_runner().await;
    runner.store().close().await.unwrap();
    let mut sink = CollectingSink::new();

    let err = Catalog::new()
        .with_policy(FailurePolicy::Abort)
        .run(&runner, &mut sink)
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::StoreUnavailable(_)));
    assert_eq!(sink.entries.len(), 1);
    assert_eq!(sink.entries[0].section, SECTION_CRUD);
    assert!(!sink.entries[0].outcome.is_ok());
}

#[tokio::test]
async fn test_catalog_creates_both_indexes() {
    let runner = sample_runner().await;
    let mut sink = CollectingSink::new();

    Catalog::new().run(&runner, &mut sink).await.unwrap();

    let names: Vec<String> = runner
        .list_indexes()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, vec!["_id_", "title_1", "author_1_published_year_-1"]);

    let after = sink.get("explain() after indexes (title search)").unwrap();
    assert_eq!(after.section, SECTION_INDEXING);
    match &after.outcome {
        Outcome::Ok { data } => {
            assert_eq!(data["scan"]["type"], "index_scan");
            assert_eq!(data["scan"]["index_name"], "title_1");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_json_sink_output_is_line_per_report() {
    let runner = sample_runner().await;
    let mut sink = JsonSink::new(Vec::new());

    let summary = Catalog::new().run(&runner, &mut sink).await.unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<serde_json::Value> = output
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), summary.total());
    assert!(lines.iter().all(|l| l["status"] == "ok"));
    assert_eq!(lines[0]["name"], "Find all Fiction books");
}
