//! Document store backends.
//!
//! [`DocumentStore`] is the only seam between the report runner and the
//! database. Records cross it as JSON objects.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReportResult;
use crate::query::{
    ExecutionReport, FilterExpr, IndexInfo, IndexSpec, Pipeline, QuerySpec, SetFields,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// One collection of an external document store.
///
/// Every method issues exactly one request. Implementations surface
/// transport failures as `StoreUnavailable` and rejected requests as
/// `StoreOperation`, without retrying.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the collection this handle reads and writes.
    fn collection_name(&self) -> &str;

    async fn find(&self, spec: &QuerySpec) -> ReportResult<Vec<Value>>;

    /// Applies `set` to the first document matching `filter`.
    async fn update_one(&self, filter: &FilterExpr, set: &SetFields)
        -> ReportResult<UpdateResult>;

    /// Deletes the first document matching `filter`.
    async fn delete_one(&self, filter: &FilterExpr) -> ReportResult<DeleteResult>;

    /// Returns the number of inserted documents.
    async fn insert_many(&self, documents: Vec<Value>) -> ReportResult<usize>;

    async fn count_documents(&self, filter: &FilterExpr) -> ReportResult<u64>;

    async fn aggregate(&self, pipeline: &Pipeline) -> ReportResult<Vec<Value>>;

    /// Returns the index name. Creating an index whose key pattern already
    /// exists returns the existing name.
    async fn create_index(&self, spec: &IndexSpec) -> ReportResult<String>;

    async fn list_indexes(&self) -> ReportResult<Vec<IndexInfo>>;

    /// Runs `spec` with execution statistics and reports the chosen plan.
    async fn explain_find(&self, spec: &QuerySpec) -> ReportResult<ExecutionReport>;

    /// Releases the connection. Further calls fail with `StoreUnavailable`.
    async fn close(&self) -> ReportResult<()>;
}
