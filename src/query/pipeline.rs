//! Aggregation pipelines.
//!
//! A [`Pipeline`] is an ordered list of [`PipelineStage`]s; the output of
//! stage n is the input of stage n+1. Only the stages and expression
//! primitives the report catalog needs are representable.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::filter::validate_field_name;
use super::spec::SortKey;
use crate::error::{ReportError, ReportResult};

/// Computed value inside `Project` and `Group` stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// `$field` reference.
    Field(String),
    Literal(Value),
    Divide(Box<Expr>, Box<Expr>),
    Multiply(Vec<Expr>),
    Floor(Box<Expr>),
}

impl Expr {
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn divide(self, divisor: Expr) -> Self {
        Expr::Divide(Box::new(self), Box::new(divisor))
    }

    pub fn multiply(self, factor: Expr) -> Self {
        match self {
            Expr::Multiply(mut factors) => {
                factors.push(factor);
                Expr::Multiply(factors)
            }
            other => Expr::Multiply(vec![other, factor]),
        }
    }

    pub fn floor(self) -> Self {
        Expr::Floor(Box::new(self))
    }

    fn validate(&self) -> ReportResult<()> {
        match self {
            Expr::Field(name) => validate_field_name(name),
            Expr::Literal(_) => Ok(()),
            Expr::Divide(a, b) => {
                a.validate()?;
                b.validate()
            }
            Expr::Multiply(factors) => {
                if factors.is_empty() {
                    return Err(ReportError::invalid("multiply needs at least one factor"));
                }
                factors.iter().try_for_each(|f| f.validate())
            }
            Expr::Floor(inner) => inner.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
}

impl Accumulator {
    /// `$sum: 1`
    pub fn count() -> Self {
        Accumulator::Sum(Expr::literal(1))
    }

    fn expr(&self) -> &Expr {
        match self {
            Accumulator::Sum(e) | Accumulator::Avg(e) => e,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectField {
    Include,
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineStage {
    Project(Vec<(String, ProjectField)>),
    /// Group by `key` (or everything into one group when `None`); the group
    /// key lands in `_id` of each output record.
    Group {
        key: Option<Expr>,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<SortKey>),
    Limit(u64),
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Project(_) => "$project",
            PipelineStage::Group { .. } => "$group",
            PipelineStage::Sort(_) => "$sort",
            PipelineStage::Limit(_) => "$limit",
        }
    }

    fn validate(&self) -> ReportResult<()> {
        match self {
            PipelineStage::Project(fields) => {
                if fields.is_empty() {
                    return Err(ReportError::invalid("$project needs at least one field"));
                }
                let mut seen = HashSet::new();
                for (name, field) in fields {
                    validate_field_name(name)?;
                    if !seen.insert(name.as_str()) {
                        return Err(ReportError::invalid(format!(
                            "$project field '{}' repeated",
                            name
                        )));
                    }
                    if let ProjectField::Computed(expr) = field {
                        expr.validate()?;
                    }
                }
                Ok(())
            }
            PipelineStage::Group { key, accumulators } => {
                if let Some(key) = key {
                    key.validate()?;
                }
                let mut seen = HashSet::new();
                for (name, acc) in accumulators {
                    if name == "_id" {
                        return Err(ReportError::invalid(
                            "$group output '_id' is reserved for the group key",
                        ));
                    }
                    validate_field_name(name)?;
                    if name.contains('.') {
                        return Err(ReportError::invalid(format!(
                            "$group output '{}' must not be a dotted path",
                            name
                        )));
                    }
                    if !seen.insert(name.as_str()) {
                        return Err(ReportError::invalid(format!(
                            "$group output '{}' repeated",
                            name
                        )));
                    }
                    acc.expr().validate()?;
                }
                Ok(())
            }
            PipelineStage::Sort(keys) => {
                if keys.is_empty() {
                    return Err(ReportError::invalid("$sort needs at least one key"));
                }
                let mut seen = HashSet::new();
                for key in keys {
                    validate_field_name(&key.field)?;
                    if !seen.insert(key.field.as_str()) {
                        return Err(ReportError::invalid(format!(
                            "$sort key '{}' repeated",
                            key.field
                        )));
                    }
                }
                Ok(())
            }
            PipelineStage::Limit(0) => Err(ReportError::invalid("$limit must be positive")),
            PipelineStage::Limit(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPipeline")]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

#[derive(Deserialize)]
struct RawPipeline {
    stages: Vec<PipelineStage>,
}

impl TryFrom<RawPipeline> for Pipeline {
    type Error = ReportError;

    fn try_from(raw: RawPipeline) -> ReportResult<Self> {
        PipelineBuilder { stages: raw.stages }.build()
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    stages: Vec<PipelineStage>,
}

impl PipelineBuilder {
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, ProjectField)>,
        S: Into<String>,
    {
        self.stages.push(PipelineStage::Project(
            fields.into_iter().map(|(n, f)| (n.into(), f)).collect(),
        ));
        self
    }

    pub fn group<I, S>(mut self, key: Option<Expr>, accumulators: I) -> Self
    where
        I: IntoIterator<Item = (S, Accumulator)>,
        S: Into<String>,
    {
        self.stages.push(PipelineStage::Group {
            key,
            accumulators: accumulators
                .into_iter()
                .map(|(n, a)| (n.into(), a))
                .collect(),
        });
        self
    }

    pub fn sort<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = SortKey>,
    {
        self.stages
            .push(PipelineStage::Sort(keys.into_iter().collect()));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.stages.push(PipelineStage::Limit(n));
        self
    }

    pub fn build(self) -> ReportResult<Pipeline> {
        if self.stages.is_empty() {
            return Err(ReportError::invalid("pipeline has no stages"));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate().map_err(|e| match e {
                ReportError::InvalidSpec(msg) => {
                    ReportError::InvalidSpec(format!("stage {} ({}): {}", i, stage.name(), msg))
                }
                other => other,
            })?;
        }
        Ok(Pipeline {
            stages: self.stages,
        })
    }
}
