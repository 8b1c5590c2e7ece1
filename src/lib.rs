pub mod catalog;
pub mod config;
pub mod document;
pub mod error;
pub mod query;
pub mod report;
pub mod runner;
pub mod store;

pub use catalog::{sample_books, Catalog, CatalogSummary, FailurePolicy};
pub use config::Config;
pub use document::{AuthorCount, Book, DecadeCount, GenreAverage, TitlePrice};
pub use error::{ReportError, ReportResult};
pub use report::{CollectingSink, JsonSink, Outcome, ReportEntry, ReportSink, TextSink};
pub use runner::{DeleteMode, DeleteOutcome, QueryRunner};
pub use store::{DeleteResult, DocumentStore, MemoryStore, MongoStore, UpdateResult};
