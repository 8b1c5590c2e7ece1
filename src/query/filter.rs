use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReportError, ReportResult};

/// Comparison operator used by a single-field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    /// Store operator name (`$gt`, `$lte`, ...).
    pub fn operator(&self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Gt => "$gt",
            CompareOp::Gte => "$gte",
            CompareOp::Lt => "$lt",
            CompareOp::Lte => "$lte",
        }
    }
}

/// A filter over book documents.
///
/// `And` of an empty list behaves like `All`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    All,
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    And(Vec<FilterExpr>),
}

impl FilterExpr {
    fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        FilterExpr::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    /// Conjunction; nested `And`s are flattened and `All` terms dropped.
    pub fn and(self, other: FilterExpr) -> Self {
        let mut terms = Vec::new();
        for expr in [self, other] {
            match expr {
                FilterExpr::All => {}
                FilterExpr::And(inner) => terms.extend(inner),
                other => terms.push(other),
            }
        }
        match terms.len() {
            0 => FilterExpr::All,
            1 => terms.remove(0),
            _ => FilterExpr::And(terms),
        }
    }

    /// Fields constrained by this filter, in declaration order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            FilterExpr::All => Vec::new(),
            FilterExpr::Compare { field, .. } => vec![field.as_str()],
            FilterExpr::And(terms) => terms.iter().flat_map(|t| t.fields()).collect(),
        }
    }

    pub(crate) fn validate(&self) -> ReportResult<()> {
        match self {
            FilterExpr::All => Ok(()),
            FilterExpr::Compare { field, value, .. } => {
                validate_field_name(field)?;
                if value.is_array() || value.is_object() {
                    return Err(ReportError::invalid(format!(
                        "filter on '{}' must compare against a scalar value",
                        field
                    )));
                }
                Ok(())
            }
            FilterExpr::And(terms) => terms.iter().try_for_each(|t| t.validate()),
        }
    }
}

/// Field names must be non-empty, must not start with `$` and must not
/// contain empty path segments.
pub(crate) fn validate_field_name(field: &str) -> ReportResult<()> {
    if field.is_empty() {
        return Err(ReportError::invalid("field name must not be empty"));
    }
    if field.starts_with('$') {
        return Err(ReportError::invalid(format!(
            "field name '{}' must not start with '$'",
            field
        )));
    }
    if field.split('.').any(|part| part.is_empty()) {
        return Err(ReportError::invalid(format!(
            "field path '{}' has an empty segment",
            field
        )));
    }
    Ok(())
}
