//! The default report batch and its sample dataset.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::document::Book;
use crate::error::ReportResult;
use crate::query::{IndexSpec, SortDirection, SortKey};
use crate::report::{Outcome, ReportEntry, ReportSink};
use crate::runner::{DeleteMode, QueryRunner};
use crate::store::DocumentStore;

pub const SECTION_CRUD: &str = "Basic CRUD";
pub const SECTION_ADVANCED: &str = "Advanced Queries";
pub const SECTION_AGGREGATION: &str = "Aggregation Pipelines";
pub const SECTION_INDEXING: &str = "Indexing & explain()";

const EXAMPLE_GENRE: &str = "Fiction";
const EXAMPLE_YEAR: i64 = 2015;
const EXAMPLE_AUTHOR: &str = "A. Kumar";
const EXAMPLE_TITLE: &str = "The Last Algorithm";
const EXAMPLE_PRICE: f64 = 25.00;
const DELETE_TITLE: &str = "Mystery at Dawn";
const IN_STOCK_YEAR: i64 = 2010;
const PAGE_SIZE: i64 = 5;

/// What to do when a report fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Record the error in the entry and run the next report.
    #[default]
    Continue,
    /// Stop at the first error and return it.
    Abort,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl CatalogSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// The fixed sequence of reports run by the binary.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    delete_mode: DeleteMode,
    policy: FailurePolicy,
}

struct Recorder<'a> {
    sink: &'a mut dyn ReportSink,
    policy: FailurePolicy,
    section: &'static str,
    summary: CatalogSummary,
}

impl Recorder<'_> {
    fn section(&mut self, title: &'static str) -> ReportResult<()> {
        self.section = title;
        self.sink.section(title)
    }

    fn record<T: Serialize>(&mut self, name: &str, result: ReportResult<T>) -> ReportResult<()> {
        let result = result.and_then(|data| Ok(serde_json::to_value(data)?));
        let (outcome, failure) = match result {
            Ok(data) => {
                self.summary.succeeded += 1;
                (Outcome::Ok { data }, None)
            }
            Err(err) => {
                self.summary.failed += 1;
                tracing::warn!("Report '{}' failed: {}", name, err);
                (Outcome::from_error(&err), Some(err))
            }
        };
        self.sink.entry(&ReportEntry {
            section: self.section.to_string(),
            name: name.to_string(),
            outcome,
        })?;
        match (failure, self.policy) {
            (Some(err), FailurePolicy::Abort) => Err(err),
            _ => Ok(()),
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delete_mode(mut self, mode: DeleteMode) -> Self {
        self.delete_mode = mode;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs every report in order, handing each result to `sink`.
    ///
    /// Under [`FailurePolicy::Abort`] the first failing report is still
    /// delivered to the sink before its error is returned.
    pub async fn run<S: DocumentStore>(
        &self,
        runner: &QueryRunner<S>,
        sink: &mut dyn ReportSink,
    ) -> ReportResult<CatalogSummary> {
        let mut rec = Recorder {
            sink,
            policy: self.policy,
            section: SECTION_CRUD,
            summary: CatalogSummary::default(),
        };

        rec.section(SECTION_CRUD)?;
        rec.record(
            &format!("Find all {} books", EXAMPLE_GENRE),
            runner.find_by_genre(EXAMPLE_GENRE).await,
        )?;
        rec.record(
            &format!("Books published after {}", EXAMPLE_YEAR),
            runner.find_published_after(EXAMPLE_YEAR).await,
        )?;
        rec.record(
            &format!("Books by {}", EXAMPLE_AUTHOR),
            runner.find_by_author(EXAMPLE_AUTHOR).await,
        )?;
        rec.record(
            &format!("Update price of '{}'", EXAMPLE_TITLE),
            runner.update_price(EXAMPLE_TITLE, EXAMPLE_PRICE).await,
        )?;
        rec.record(
            &format!("'{}' after update", EXAMPLE_TITLE),
            runner.find_by_title(EXAMPLE_TITLE).await,
        )?;
        rec.record(
            &format!("Delete '{}'", DELETE_TITLE),
            runner.delete_by_title(DELETE_TITLE, self.delete_mode).await,
        )?;

        rec.section(SECTION_ADVANCED)?;
        rec.record(
            &format!("In stock and published after {}", IN_STOCK_YEAR),
            runner.find_in_stock_after(IN_STOCK_YEAR).await,
        )?;
        let fields: BTreeSet<String> = ["title", "author", "price"]
            .into_iter()
            .map(String::from)
            .collect();
        rec.record(
            "Projection: title, author, price",
            runner.project_fields(&fields, false).await,
        )?;
        rec.record(
            "Sorted by price (ascending)",
            runner.sort_by_price(SortDirection::Ascending).await,
        )?;
        rec.record(
            "Sorted by price (descending)",
            runner.sort_by_price(SortDirection::Descending).await,
        )?;
        for page in 1..=2 {
            rec.record(
                &format!("Page {} ({} per page, by title)", page, PAGE_SIZE),
                runner.paginate(PAGE_SIZE, page, "title").await,
            )?;
        }

        rec.section(SECTION_AGGREGATION)?;
        rec.record(
            "Average price by genre",
            runner.average_price_by_genre().await,
        )?;
        rec.record(
            "Author with the most books",
            runner.author_with_most_books().await,
        )?;
        rec.record("Books per decade", runner.count_by_decade().await)?;

        rec.section(SECTION_INDEXING)?;
        rec.record("Indexes before", runner.list_indexes().await)?;
        rec.record(
            "explain() before indexes (title search)",
            runner.explain_title_lookup(EXAMPLE_TITLE).await,
        )?;
        rec.record(
            "Create index on title",
            create_index(runner, vec![SortKey::asc("title")]).await,
        )?;
        rec.record(
            "Create index on author, published_year",
            create_index(
                runner,
                vec![SortKey::asc("author"), SortKey::desc("published_year")],
            )
            .await,
        )?;
        rec.record("Indexes after", runner.list_indexes().await)?;
        rec.record(
            "explain() after indexes (title search)",
            runner.explain_title_lookup(EXAMPLE_TITLE).await,
        )?;

        tracing::info!(
            "Catalog finished: {} succeeded, {} failed",
            rec.summary.succeeded,
            rec.summary.failed
        );
        Ok(rec.summary)
    }
}

async fn create_index<S: DocumentStore>(
    runner: &QueryRunner<S>,
    keys: Vec<SortKey>,
) -> ReportResult<String> {
    let spec = IndexSpec::new(keys)?;
    runner.create_index(&spec).await
}

/// Books loaded into the in-memory store for `--memory` runs.
pub fn sample_books() -> Vec<Book> {
    vec![
        Book::new("The Last Algorithm", "A. Kumar", "Fiction", 2018, 19.99, true)
            .with_pages(342)
            .with_publisher("Northwind Press"),
        Book::new("Silicon Rivers", "A. Kumar", "Technology", 2015, 34.50, true)
            .with_pages(410)
            .with_publisher("Byteworks"),
        Book::new("Patterns of Rain", "A. Kumar", "Fiction", 2009, 12.75, false)
            .with_pages(288)
            .with_publisher("Northwind Press"),
        Book::new("Mystery at Dawn", "L. Mensah", "Mystery", 2012, 9.99, true)
            .with_pages(256)
            .with_publisher("Harbor House"),
        Book::new("The Quiet Harbor", "L. Mensah", "Mystery", 2021, 15.00, true)
            .with_pages(301)
            .with_publisher("Harbor House"),
        Book::new("Gardens of Nairobi", "W. Otieno", "Fiction", 1998, 11.20, true)
            .with_pages(224)
            .with_publisher("Savanna Books"),
        Book::new("Data in the Wild", "R. Chen", "Technology", 2020, 42.00, false)
            .with_pages(512)
            .with_publisher("Byteworks"),
        Book::new("A Brief Map of Stars", "M. Duarte", "Science", 2005, 18.40, true)
            .with_pages(198)
            .with_publisher("Lumen"),
        Book::new("Echoes of the Valley", "W. Otieno", "History", 1987, 22.10, false)
            .with_pages(376)
            .with_publisher("Savanna Books"),
        Book::new("Kitchen Chemistry", "S. Ibrahim", "Science", 2016, 16.80, true)
            .with_pages(240)
            .with_publisher("Lumen"),
        Book::new("The Clockmaker's Daughter", "E. Novak", "Fiction", 2011, 13.60, true)
            .with_pages(318)
            .with_publisher("Northwind Press"),
        Book::new("Old Roads", "E. Novak", "History", 1974, 8.50, true)
            .with_pages(164)
            .with_publisher("Harbor House"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingSink;
    use crate::store::MemoryStore;

    async fn seeded_runner() -> QueryRunner<MemoryStore> {
        let runner = QueryRunner::new(MemoryStore::new("books"));
        runner.insert_books(&sample_books()).await.unwrap();
        runner
    }

    #[test]
    fn test_sample_titles_are_unique() {
        let books = sample_books();
        let titles: BTreeSet<_> = books.iter().map(|b| b.title.clone()).collect();
        assert_eq!(titles.len(), books.len());
        assert!(books.iter().any(|b| b.published_year == Some(EXAMPLE_YEAR)));
        assert!(books.iter().any(|b| b.title.as_deref() == Some(DELETE_TITLE)));
    }

    #[tokio::test]
    async fn test_full_catalog_runs_in_order() {
        let runner = seeded_runner().await;
        let mut sink = CollectingSink::new();

        let summary = Catalog::new().run(&runner, &mut sink).await.unwrap();

        assert_eq!(summary.failed, 0);
        assert_eq!(summary.total(), 21);
        assert_eq!(
            sink.sections,
            vec![SECTION_CRUD, SECTION_ADVANCED, SECTION_AGGREGATION, SECTION_INDEXING]
        );
        assert_eq!(sink.entries.len(), 21);
        assert_eq!(sink.entries[0].section, SECTION_CRUD);
        assert_eq!(sink.entries[20].section, SECTION_INDEXING);
    }

    #[tokio::test]
    async fn test_default_catalog_keeps_deleted_title() {
        let runner = seeded_runner().await;
        let mut sink = CollectingSink::new();
        Catalog::new().run(&runner, &mut sink).await.unwrap();

        let entry = sink.get("Delete 'Mystery at Dawn'").unwrap();
        match &entry.outcome {
            Outcome::Ok { data } => assert_eq!(data["status"], "dry_run"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(runner.find_by_title(DELETE_TITLE).await.unwrap().is_some());
        assert_eq!(runner.count_documents().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_confirmed_catalog_deletes() {
        let runner = seeded_runner().await;
        let mut sink = CollectingSink::new();
        Catalog::new()
            .with_delete_mode(DeleteMode::Confirmed)
            .run(&runner, &mut sink)
            .await
            .unwrap();

        assert!(runner.find_by_title(DELETE_TITLE).await.unwrap().is_none());
        assert_eq!(runner.count_documents().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_update_is_visible_to_lookup() {
        let runner = seeded_runner().await;
        let mut sink = CollectingSink::new();
        Catalog::new().run(&runner, &mut sink).await.unwrap();

        let entry = sink.get("'The Last Algorithm' after update").unwrap();
        match &entry.outcome {
            Outcome::Ok { data } => assert_eq!(data["price"], 25.0),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
