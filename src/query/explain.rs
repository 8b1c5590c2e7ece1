use serde::{Deserialize, Serialize};

/// How the store physically read the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanType {
    CollectionScan,
    IndexScan { index_name: String },
}

impl ScanType {
    pub fn is_index_scan(&self) -> bool {
        matches!(self, ScanType::IndexScan { .. })
    }
}

/// Store diagnostic for a find that was explained with execution stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub scan: ScanType,
    /// Stage name of the winning plan's root (`COLLSCAN`, `FETCH`, ...)
    pub winning_stage: String,
    pub documents_examined: u64,
    pub keys_examined: u64,
    pub documents_returned: u64,
    pub execution_time_ms: u64,
}

impl ExecutionReport {
    /// Documents examined per document returned; `None` when nothing was
    /// returned.
    pub fn selectivity(&self) -> Option<f64> {
        if self.documents_returned == 0 {
            None
        } else {
            Some(self.documents_examined as f64 / self.documents_returned as f64)
        }
    }
}
