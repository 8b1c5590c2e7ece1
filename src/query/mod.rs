//! Typed request and response shapes exchanged with a document store.

pub mod explain;
pub mod filter;
pub mod index;
pub mod pipeline;
pub mod spec;
pub mod update;

pub use explain::{ExecutionReport, ScanType};
pub use filter::{CompareOp, FilterExpr};
pub use index::{IndexInfo, IndexSpec, ID_INDEX_NAME};
pub use pipeline::{Accumulator, Expr, Pipeline, PipelineBuilder, PipelineStage, ProjectField};
pub use spec::{Pagination, Projection, QuerySpec, QuerySpecBuilder, SortDirection, SortKey};
pub use update::SetFields;
