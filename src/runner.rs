//! The report catalog as typed operations over a [`DocumentStore`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{decode_rows, AuthorCount, Book, DecadeCount, GenreAverage, TitlePrice};
use crate::error::{ReportError, ReportResult};
use crate::query::{
    Accumulator, ExecutionReport, Expr, FilterExpr, IndexInfo, IndexSpec, Pagination, Pipeline,
    ProjectField, Projection, QuerySpec, SetFields, SortDirection, SortKey,
};
use crate::store::{DeleteResult, DocumentStore, UpdateResult};

/// Whether a destructive operation may touch the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteMode {
    /// Describe the delete without running it.
    #[default]
    DryRun,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// Nothing was sent to the store.
    DryRun { description: String, filter: FilterExpr },
    Deleted(DeleteResult),
}

/// Runs report queries against one collection.
///
/// Each operation sends exactly one request and hands failures back
/// unchanged; deciding whether to carry on after an error is up to the
/// caller.
pub struct QueryRunner<S> {
    store: S,
}

impl<S: DocumentStore> QueryRunner<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Releases the store connection.
    pub async fn close(self) -> ReportResult<()> {
        self.store.close().await
    }

    async fn find_books(&self, spec: QuerySpec) -> ReportResult<Vec<Book>> {
        tracing::debug!(
            "find on {}: {:?}",
            self.store.collection_name(),
            spec.filter_expr()
        );
        decode_rows(self.store.find(&spec).await?)
    }

    async fn aggregate_rows<T>(&self, name: &str, pipeline: Pipeline) -> ReportResult<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        tracing::debug!(
            "aggregate {} on {} ({} stages)",
            name,
            self.store.collection_name(),
            pipeline.stages().len()
        );
        decode_rows(self.store.aggregate(&pipeline).await?)
    }

    pub async fn find_by_genre(&self, genre: &str) -> ReportResult<Vec<Book>> {
        self.find_books(QuerySpec::filter(FilterExpr::eq("genre", genre))?)
            .await
    }

    /// Books with `published_year` strictly greater than `year`.
    pub async fn find_published_after(&self, year: i64) -> ReportResult<Vec<Book>> {
        self.find_books(QuerySpec::filter(FilterExpr::gt("published_year", year))?)
            .await
    }

    pub async fn find_by_author(&self, author: &str) -> ReportResult<Vec<Book>> {
        self.find_books(QuerySpec::filter(FilterExpr::eq("author", author))?)
            .await
    }

    pub async fn find_by_title(&self, title: &str) -> ReportResult<Option<Book>> {
        let spec = QuerySpec::builder()
            .filter(FilterExpr::eq("title", title))
            .paginate(Pagination::new(0, 1)?)
            .build()?;
        Ok(self.find_books(spec).await?.into_iter().next())
    }

    /// Sets the price of the first book titled `title`.
    ///
    /// No match is not an error: the result reports zero matched and zero
    /// modified documents.
    pub async fn update_price(&self, title: &str, new_price: f64) -> ReportResult<UpdateResult> {
        if !new_price.is_finite() || new_price < 0.0 {
            return Err(ReportError::invalid(format!(
                "price must be a non-negative number, got {}",
                new_price
            )));
        }
        let set = SetFields::single("price", new_price)?;
        tracing::debug!(
            "update_one on {}: title={:?} price={}",
            self.store.collection_name(),
            title,
            new_price
        );
        self.store
            .update_one(&FilterExpr::eq("title", title), &set)
            .await
    }

    /// Deletes the first book titled `title`, but only under
    /// [`DeleteMode::Confirmed`].
    pub async fn delete_by_title(&self, title: &str, mode: DeleteMode) -> ReportResult<DeleteOutcome> {
        let filter = FilterExpr::eq("title", title);
        filter.validate()?;
        match mode {
            DeleteMode::DryRun => Ok(DeleteOutcome::DryRun {
                description: format!(
                    "would delete one document from {} where title == {:?}",
                    self.store.collection_name(),
                    title
                ),
                filter,
            }),
            DeleteMode::Confirmed => {
                tracing::debug!(
                    "delete_one on {}: title={:?}",
                    self.store.collection_name(),
                    title
                );
                Ok(DeleteOutcome::Deleted(self.store.delete_one(&filter).await?))
            }
        }
    }

    pub async fn find_in_stock_after(&self, year: i64) -> ReportResult<Vec<Book>> {
        let filter = FilterExpr::eq("in_stock", true).and(FilterExpr::gt("published_year", year));
        self.find_books(QuerySpec::filter(filter)?).await
    }

    /// Every book reduced to `fields` (plus `_id` when `include_key`).
    pub async fn project_fields(
        &self,
        fields: &BTreeSet<String>,
        include_key: bool,
    ) -> ReportResult<Vec<Value>> {
        let spec = QuerySpec::builder()
            .projection(Projection::new(fields.iter().cloned()).with_key(include_key))
            .build()?;
        self.store.find(&spec).await
    }

    pub async fn sort_by_price(&self, direction: SortDirection) -> ReportResult<Vec<TitlePrice>> {
        let spec = QuerySpec::builder()
            .projection(Projection::new(["title", "price"]))
            .sort_by(SortKey::new("price", direction))
            .build()?;
        decode_rows(self.store.find(&spec).await?)
    }

    /// One page of titles ordered by `sort_key`; `page_number` is 1-based.
    ///
    /// Pages are only stable when `sort_key` is unique across the
    /// collection: the store orders ties arbitrarily.
    pub async fn paginate(
        &self,
        page_size: i64,
        page_number: i64,
        sort_key: &str,
    ) -> ReportResult<Vec<Value>> {
        let page = Pagination::page(page_size, page_number)?;
        let projection = if sort_key == "title" {
            Projection::new(["title"])
        } else {
            Projection::new(["title", sort_key])
        };
        let spec = QuerySpec::builder()
            .projection(projection)
            .sort_by(SortKey::asc(sort_key))
            .paginate(page)
            .build()?;
        self.store.find(&spec).await
    }

    /// Average price and book count per genre, ascending by genre.
    pub async fn average_price_by_genre(&self) -> ReportResult<Vec<GenreAverage>> {
        let pipeline = Pipeline::builder()
            .group(
                Some(Expr::field("genre")),
                [
                    ("avgPrice", Accumulator::Avg(Expr::field("price"))),
                    ("count", Accumulator::count()),
                ],
            )
            .sort([SortKey::asc("_id")])
            .build()?;
        self.aggregate_rows("average_price_by_genre", pipeline).await
    }

    /// The author with the most books, `None` for an empty collection.
    ///
    /// When several authors share the top count, which one is returned is
    /// up to the store.
    pub async fn author_with_most_books(&self) -> ReportResult<Option<AuthorCount>> {
        let pipeline = Pipeline::builder()
            .group(Some(Expr::field("author")), [("count", Accumulator::count())])
            .sort([SortKey::desc("count")])
            .limit(1)
            .build()?;
        let rows: Vec<AuthorCount> = self.aggregate_rows("author_with_most_books", pipeline).await?;
        Ok(rows.into_iter().next())
    }

    /// Books per decade (`floor(year / 10) * 10`), ascending.
    pub async fn count_by_decade(&self) -> ReportResult<Vec<DecadeCount>> {
        let decade = Expr::field("published_year")
            .divide(Expr::literal(10))
            .floor()
            .multiply(Expr::literal(10));
        let pipeline = Pipeline::builder()
            .project([
                ("published_year", ProjectField::Include),
                ("title", ProjectField::Include),
                ("decade", ProjectField::Computed(decade)),
            ])
            .group(Some(Expr::field("decade")), [("count", Accumulator::count())])
            .sort([SortKey::asc("_id")])
            .build()?;
        self.aggregate_rows("count_by_decade", pipeline).await
    }

    pub async fn list_indexes(&self) -> ReportResult<Vec<IndexInfo>> {
        tracing::debug!("list_indexes on {}", self.store.collection_name());
        self.store.list_indexes().await
    }

    pub async fn explain_query(&self, spec: &QuerySpec) -> ReportResult<ExecutionReport> {
        tracing::debug!(
            "explain on {}: {:?}",
            self.store.collection_name(),
            spec.filter_expr()
        );
        self.store.explain_find(spec).await
    }

    /// Explains the single-title lookup used to compare plans before and
    /// after indexing.
    pub async fn explain_title_lookup(&self, title: &str) -> ReportResult<ExecutionReport> {
        self.explain_query(&QuerySpec::filter(FilterExpr::eq("title", title))?)
            .await
    }

    /// Returns the index name.
    pub async fn create_index(&self, spec: &IndexSpec) -> ReportResult<String> {
        tracing::debug!(
            "create_index {} on {}",
            spec.default_name(),
            self.store.collection_name()
        );
        self.store.create_index(spec).await
    }

    pub async fn insert_books(&self, books: &[Book]) -> ReportResult<usize> {
        let documents = books
            .iter()
            .map(Book::to_value)
            .collect::<ReportResult<Vec<_>>>()?;
        self.store.insert_many(documents).await
    }

    pub async fn count_documents(&self) -> ReportResult<u64> {
        self.store.count_documents(&FilterExpr::All).await
    }
}
