use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::filter::{validate_field_name, FilterExpr};
use crate::error::{ReportError, ReportResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Numeric form used in sort and index key patterns (+1 / -1).
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }

    pub fn from_i64(value: i64) -> ReportResult<Self> {
        match value {
            1 => Ok(SortDirection::Ascending),
            -1 => Ok(SortDirection::Descending),
            other => Err(ReportError::invalid(format!(
                "sort direction must be 1 or -1, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }
}

/// Inclusion projection: only `fields` are returned, plus the identity key
/// when `include_key` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub fields: Vec<String>,
    pub include_key: bool,
}

impl Projection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            include_key: false,
        }
    }

    pub fn with_key(mut self, include_key: bool) -> Self {
        self.include_key = include_key;
        self
    }

    fn validate(&self) -> ReportResult<()> {
        if self.fields.is_empty() {
            return Err(ReportError::invalid("projection needs at least one field"));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            validate_field_name(field)?;
            if !seen.insert(field.as_str()) {
                return Err(ReportError::invalid(format!(
                    "field '{}' projected twice",
                    field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub skip: u64,
    pub limit: u64,
}

impl Pagination {
    /// Signed inputs so that negative values from callers are rejected here
    /// instead of wrapping.
    pub fn new(skip: i64, limit: i64) -> ReportResult<Self> {
        if skip < 0 {
            return Err(ReportError::invalid(format!("skip must be >= 0, got {}", skip)));
        }
        if limit < 0 {
            return Err(ReportError::invalid(format!(
                "limit must be >= 0, got {}",
                limit
            )));
        }
        Ok(Self {
            skip: skip as u64,
            limit: limit as u64,
        })
    }

    /// 1-based page addressing: skip = page_size * (page_number - 1).
    pub fn page(page_size: i64, page_number: i64) -> ReportResult<Self> {
        if page_size <= 0 {
            return Err(ReportError::invalid(format!(
                "page_size must be > 0, got {}",
                page_size
            )));
        }
        if page_number < 1 {
            return Err(ReportError::invalid(format!(
                "page_number must be >= 1, got {}",
                page_number
            )));
        }
        let skip = page_size
            .checked_mul(page_number - 1)
            .ok_or_else(|| ReportError::invalid("page offset overflows"))?;
        Self::new(skip, page_size)
    }
}

/// An immutable find request. Build with [`QuerySpec::builder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuerySpec")]
pub struct QuerySpec {
    filter: FilterExpr,
    projection: Option<Projection>,
    sort: Vec<SortKey>,
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct RawQuerySpec {
    #[serde(default)]
    filter: Option<FilterExpr>,
    #[serde(default)]
    projection: Option<Projection>,
    #[serde(default)]
    sort: Vec<SortKey>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

impl TryFrom<RawQuerySpec> for QuerySpec {
    type Error = ReportError;

    fn try_from(raw: RawQuerySpec) -> ReportResult<Self> {
        QuerySpecBuilder {
            filter: raw.filter,
            projection: raw.projection,
            sort: raw.sort,
            pagination: raw.pagination,
        }
        .build()
    }
}

impl QuerySpec {
    pub fn builder() -> QuerySpecBuilder {
        QuerySpecBuilder::default()
    }

    /// Filter-only spec.
    pub fn filter(filter: FilterExpr) -> ReportResult<Self> {
        Self::builder().filter(filter).build()
    }

    pub fn filter_expr(&self) -> &FilterExpr {
        &self.filter
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuerySpecBuilder {
    filter: Option<FilterExpr>,
    projection: Option<Projection>,
    sort: Vec<SortKey>,
    pagination: Option<Pagination>,
}

impl QuerySpecBuilder {
    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn build(self) -> ReportResult<QuerySpec> {
        let filter = self.filter.unwrap_or(FilterExpr::All);
        filter.validate()?;

        if let Some(projection) = &self.projection {
            projection.validate()?;
        }

        let mut seen = HashSet::new();
        for key in &self.sort {
            validate_field_name(&key.field)?;
            if !seen.insert(key.field.as_str()) {
                return Err(ReportError::invalid(format!(
                    "sort key '{}' repeated",
                    key.field
                )));
            }
        }

        Ok(QuerySpec {
            filter,
            projection: self.projection,
            sort: self.sort,
            pagination: self.pagination,
        })
    }
}
