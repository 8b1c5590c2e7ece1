//! Index and explain() report tests

mod common;

use bookstore_reports::query::{
    FilterExpr, IndexSpec, QuerySpec, ScanType, SortDirection, SortKey, ID_INDEX_NAME,
};
use bookstore_reports::ReportError;
use common::{empty_runner, seeded_runner};

#[tokio::test]
async fn test_fresh_collection_has_identity_index() {
    let runner = empty_runner();

    let indexes = runner.list_indexes().await.unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, ID_INDEX_NAME);
    assert_eq!(indexes[0].keys.leading_field(), Some("_id"));
}

#[tokio::test]
async fn test_create_index_then_list() {
    let runner = seeded_runner().await;

    let name = runner
        .create_index(&IndexSpec::single("title", SortDirection::Ascending).unwrap())
        .await
        .unwrap();
    assert_eq!(name, "title_1");

    let indexes = runner.list_indexes().await.unwrap();
    let names: Vec<&str> = indexes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec![ID_INDEX_NAME, "title_1"]);
}

#[tokio::test]
async fn test_compound_index_name_and_idempotence() {
    let runner = seeded_runner().await;
    let spec = IndexSpec::new(vec![SortKey::asc("author"), SortKey::desc("published_year")]).unwrap();

    let first = runner.create_index(&spec).await.unwrap();
    let second = runner.create_index(&spec).await.unwrap();
    assert_eq!(first, "author_1_published_year_-1");
    assert_eq!(first, second);
    assert_eq!(runner.list_indexes().await.unwrap().len(), 2);

    let info = runner
        .list_indexes()
        .await
        .unwrap()
        .into_iter()
        .find(|i| i.name == first)
        .unwrap();
    assert_eq!(info.keys.pattern(), vec![("author", 1), ("published_year", -1)]);
}

#[test]
fn test_invalid_index_specs() {
    assert!(matches!(IndexSpec::new(vec![]), Err(ReportError::InvalidSpec(_))));
    assert!(matches!(
        IndexSpec::new(vec![SortKey::asc("title"), SortKey::desc("title")]),
        Err(ReportError::InvalidSpec(_))
    ));
}

#[tokio::test]
async fn test_explain_before_and_after_title_index() {
    let runner = seeded_runner().await;

    let before = runner.explain_title_lookup("Echo").await.unwrap();
    assert_eq!(before.scan, ScanType::CollectionScan);
    assert_eq!(before.winning_stage, "COLLSCAN");
    assert_eq!(before.documents_examined, 12);
    assert_eq!(before.keys_examined, 0);
    assert_eq!(before.documents_returned, 1);

    runner
        .create_index(&IndexSpec::new(vec![SortKey::asc("title")]).unwrap())
        .await
        .unwrap();

    let after = runner.explain_title_lookup("Echo").await.unwrap();
    assert_eq!(
        after.scan,
        ScanType::IndexScan {
            index_name: "title_1".to_string()
        }
    );
    assert_eq!(after.documents_examined, 1);
    assert_eq!(after.keys_examined, 1);
    assert_eq!(after.documents_returned, 1);
    assert!(after.documents_examined < before.documents_examined);
}

#[tokio::test]
async fn test_compound_index_does_not_serve_title_lookup() {
    let runner = seeded_runner().await;
    runner
        .create_index(
            &IndexSpec::new(vec![SortKey::asc("author"), SortKey::desc("published_year")]).unwrap(),
        )
        .await
        .unwrap();

    let report = runner.explain_title_lookup("Echo").await.unwrap();
    assert!(!report.scan.is_index_scan());
}

#[tokio::test]
async fn test_explain_range_query_uses_leading_field() {
    let runner = seeded_runner().await;
    runner
        .create_index(
            &IndexSpec::new(vec![SortKey::asc("author"), SortKey::desc("published_year")]).unwrap(),
        )
        .await
        .unwrap();

    let spec = QuerySpec::filter(
        FilterExpr::eq("author", "A. Kumar").and(FilterExpr::gt("published_year", 2015)),
    )
    .unwrap();
    let report = runner.explain_query(&spec).await.unwrap();
    assert!(report.scan.is_index_scan());
    assert_eq!(report.keys_examined, 3);
    assert_eq!(report.documents_returned, 2);
}

#[tokio::test]
async fn test_explain_unmatched_lookup() {
    let runner = seeded_runner().await;

    let report = runner.explain_title_lookup("Zulu").await.unwrap();
    assert_eq!(report.documents_returned, 0);
    assert_eq!(report.selectivity(), None);
}
