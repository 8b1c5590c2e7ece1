//! Aggregation pipeline report tests

mod common;

use bookstore_reports::query::{Accumulator, Expr, Pipeline};
use bookstore_reports::{Book, DocumentStore, ReportError};
use common::{empty_runner, seeded_runner};

#[tokio::test]
async fn test_average_price_by_genre() {
    let runner = seeded_runner().await;

    let rows = runner.average_price_by_genre().await.unwrap();
    let genres: Vec<&str> = rows.iter().map(|r| r.genre.as_deref().unwrap()).collect();
    assert_eq!(genres, vec!["Fiction", "History", "Mystery", "Science"]);

    let fiction = &rows[0];
    assert_eq!(fiction.count, 5);
    assert!((fiction.avg_price.unwrap() - 14.2).abs() < 1e-9);

    let history = &rows[1];
    assert_eq!(history.count, 2);
    assert!((history.avg_price.unwrap() - 17.25).abs() < 1e-9);

    let total: u64 = rows.iter().map(|r| r.count).sum();
    assert_eq!(total, runner.count_documents().await.unwrap());
}

#[tokio::test]
async fn test_author_with_most_books() {
    let runner = seeded_runner().await;

    let top = runner.author_with_most_books().await.unwrap().unwrap();
    assert_eq!(top.author.as_deref(), Some("A. Kumar"));
    assert_eq!(top.count, 3);
}

#[tokio::test]
async fn test_count_by_decade() {
    let runner = seeded_runner().await;

    let rows = runner.count_by_decade().await.unwrap();
    let pairs: Vec<(i64, u64)> = rows
        .iter()
        .map(|r| (r.decade.unwrap(), r.count))
        .collect();
    assert_eq!(
        pairs,
        vec![(1980, 1), (1990, 1), (2000, 2), (2010, 6), (2020, 2)]
    );

    let total: u64 = rows.iter().map(|r| r.count).sum();
    assert_eq!(total, 12);
}

#[tokio::test]
async fn test_decade_of_2015_is_2010() {
    let runner = empty_runner();
    runner
        .insert_books(&[Book::new("Solo", "Z. Author", "Fiction", 2015, 5.0, true)])
        .await
        .unwrap();

    let rows = runner.count_by_decade().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].decade, Some(2010));
    assert_eq!(rows[0].count, 1);
}

#[tokio::test]
async fn test_missing_year_groups_under_null_decade() {
    let runner = empty_runner();
    let undated = Book {
        title: Some("Undated".to_string()),
        ..Book::default()
    };
    runner
        .insert_books(&[undated, Book::new("Dated", "Z", "Fiction", 2001, 1.0, true)])
        .await
        .unwrap();

    let rows = runner.count_by_decade().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].decade, None);
    assert_eq!(rows[1].decade, Some(2000));
}

#[tokio::test]
async fn test_empty_collection() {
    let runner = empty_runner();

    assert!(runner.average_price_by_genre().await.unwrap().is_empty());
    assert!(runner.author_with_most_books().await.unwrap().is_none());
    assert!(runner.count_by_decade().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_divide_by_zero_is_store_operation_error() {
    let runner = seeded_runner().await;
    let pipeline = Pipeline::builder()
        .group(
            None,
            [(
                "ratio",
                Accumulator::Sum(Expr::field("price").divide(Expr::literal(0))),
            )],
        )
        .build()
        .unwrap();

    let err = runner.store().aggregate(&pipeline).await.unwrap_err();
    assert!(matches!(err, ReportError::StoreOperation(_)));
}
