use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::filter::validate_field_name;
use super::spec::{SortDirection, SortKey};
use crate::error::{ReportError, ReportResult};

/// Name of the identity index every collection carries.
pub const ID_INDEX_NAME: &str = "_id_";

/// Ordered index key pattern, e.g. `{author: 1, published_year: -1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIndexSpec")]
pub struct IndexSpec {
    keys: Vec<SortKey>,
}

#[derive(Deserialize)]
struct RawIndexSpec {
    keys: Vec<SortKey>,
}

impl TryFrom<RawIndexSpec> for IndexSpec {
    type Error = ReportError;

    fn try_from(raw: RawIndexSpec) -> ReportResult<Self> {
        Self::new(raw.keys)
    }
}

impl IndexSpec {
    pub fn new(keys: Vec<SortKey>) -> ReportResult<Self> {
        if keys.is_empty() {
            return Err(ReportError::invalid("index needs at least one key"));
        }
        let mut seen = HashSet::new();
        for key in &keys {
            validate_field_name(&key.field)?;
            if !seen.insert(key.field.as_str()) {
                return Err(ReportError::invalid(format!(
                    "index key '{}' repeated",
                    key.field
                )));
            }
        }
        Ok(Self { keys })
    }

    /// Key pattern of the identity index, `{_id: 1}`.
    pub fn identity() -> Self {
        Self {
            keys: vec![SortKey::asc("_id")],
        }
    }

    /// Single-field index.
    pub fn single(field: impl Into<String>, direction: SortDirection) -> ReportResult<Self> {
        Self::new(vec![SortKey::new(field, direction)])
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn leading_field(&self) -> Option<&str> {
        self.keys.first().map(|k| k.field.as_str())
    }

    /// Default index name: `field_dir` pairs joined by `_`.
    pub fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|k| format!("{}_{}", k.field, k.direction.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Key pattern as `(field, +1/-1)` pairs.
    pub fn pattern(&self) -> Vec<(&str, i32)> {
        self.keys
            .iter()
            .map(|k| (k.field.as_str(), k.direction.as_i32()))
            .collect()
    }
}

/// An index as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub keys: IndexSpec,
    #[serde(default)]
    pub unique: bool,
}
