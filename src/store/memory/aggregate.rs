use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use super::helpers::{
    compare_values, field_present, get_field_value, group_key, number_from_f64, set_field_value,
};
use crate::error::{ReportError, ReportResult};
use crate::query::{Accumulator, Expr, Pipeline, PipelineStage, ProjectField, SortDirection, SortKey};

pub fn run_pipeline(documents: Vec<Value>, pipeline: &Pipeline) -> ReportResult<Vec<Value>> {
    let mut rows = documents;
    for stage in pipeline.stages() {
        rows = match stage {
            PipelineStage::Project(fields) => rows
                .iter()
                .map(|row| project(row, fields))
                .collect::<ReportResult<Vec<_>>>()?,
            PipelineStage::Group { key, accumulators } => group(&rows, key.as_ref(), accumulators)?,
            PipelineStage::Sort(keys) => {
                sort_rows(&mut rows, keys);
                rows
            }
            PipelineStage::Limit(n) => {
                rows.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
                rows
            }
        };
    }
    Ok(rows)
}

/// Stable sort; rows with equal keys keep their input order.
pub fn sort_rows(rows: &mut [Value], keys: &[SortKey]) {
    rows.sort_by(|a, b| {
        for key in keys {
            let ord = compare_values(&get_field_value(a, &key.field), &get_field_value(b, &key.field));
            let ord = match key.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord.is_ne() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn project(row: &Value, fields: &[(String, ProjectField)]) -> ReportResult<Value> {
    let mut out = Map::new();
    // Identity key survives unless projected explicitly
    if let Some(id) = row.get("_id") {
        out.insert("_id".to_string(), id.clone());
    }
    for (name, field) in fields {
        match field {
            ProjectField::Include => {
                let value = get_field_value(row, name);
                if !value.is_null() || field_present(row, name) {
                    set_field_value(&mut out, name, value);
                }
            }
            ProjectField::Computed(expr) => {
                set_field_value(&mut out, name, evaluate(row, expr)?);
            }
        }
    }
    Ok(Value::Object(out))
}

/// Numeric value of an evaluated expression: `Ok(None)` for null/missing
/// operands, an error for non-numeric ones.
fn numeric(value: &Value, operator: &str) -> ReportResult<Option<Number>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n.clone())),
        other => Err(ReportError::StoreOperation(format!(
            "{} only supports numeric types, not {}",
            operator, other
        ))),
    }
}

pub fn evaluate(row: &Value, expr: &Expr) -> ReportResult<Value> {
    match expr {
        Expr::Field(name) => Ok(get_field_value(row, name)),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Divide(a, b) => {
            let a = numeric(&evaluate(row, a)?, "$divide")?;
            let b = numeric(&evaluate(row, b)?, "$divide")?;
            match (a, b) {
                (Some(a), Some(b)) => {
                    let divisor = b.as_f64().unwrap_or(0.0);
                    if divisor == 0.0 {
                        return Err(ReportError::StoreOperation("can't $divide by zero".to_string()));
                    }
                    Ok(Value::Number(number_from_f64(a.as_f64().unwrap_or(0.0) / divisor)))
                }
                _ => Ok(Value::Null),
            }
        }
        Expr::Multiply(factors) => {
            let mut int_product: Option<i64> = Some(1);
            let mut float_product = 1.0_f64;
            for factor in factors {
                let n = match numeric(&evaluate(row, factor)?, "$multiply")? {
                    Some(n) => n,
                    None => return Ok(Value::Null),
                };
                float_product *= n.as_f64().unwrap_or(0.0);
                int_product = match (int_product, n.as_i64()) {
                    (Some(p), Some(i)) => p.checked_mul(i),
                    _ => None,
                };
            }
            Ok(match int_product {
                Some(p) => Value::Number(p.into()),
                None => Value::Number(number_from_f64(float_product)),
            })
        }
        Expr::Floor(inner) => match numeric(&evaluate(row, inner)?, "$floor")? {
            None => Ok(Value::Null),
            Some(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
            Some(n) => Ok(Value::Number(number_from_f64(n.as_f64().unwrap_or(0.0).floor()))),
        },
    }
}

enum AccState {
    Sum { int: Option<i64>, float: f64 },
    Avg { total: f64, count: u64 },
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => AccState::Sum { int: Some(0), float: 0.0 },
            Accumulator::Avg(_) => AccState::Avg { total: 0.0, count: 0 },
        }
    }

    /// Non-numeric inputs are ignored, as the store does.
    fn add(&mut self, value: &Value) {
        let Value::Number(n) = value else {
            return;
        };
        match self {
            AccState::Sum { int, float } => {
                *float += n.as_f64().unwrap_or(0.0);
                *int = match (*int, n.as_i64()) {
                    (Some(acc), Some(i)) => acc.checked_add(i),
                    _ => None,
                };
            }
            AccState::Avg { total, count } => {
                *total += n.as_f64().unwrap_or(0.0);
                *count += 1;
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum { int: Some(i), .. } => Value::Number(i.into()),
            AccState::Sum { int: None, float } => Value::Number(number_from_f64(float)),
            AccState::Avg { count: 0, .. } => Value::Null,
            AccState::Avg { total, count } => Value::Number(number_from_f64(total / count as f64)),
        }
    }
}

/// Groups are emitted in first-seen order.
fn group(
    rows: &[Value],
    key: Option<&Expr>,
    accumulators: &[(String, Accumulator)],
) -> ReportResult<Vec<Value>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();

    for row in rows {
        let key_value = match key {
            Some(expr) => evaluate(row, expr)?,
            None => Value::Null,
        };
        let slot = *positions.entry(group_key(&key_value)).or_insert_with(|| {
            groups.push((
                key_value.clone(),
                accumulators.iter().map(|(_, acc)| AccState::new(acc)).collect(),
            ));
            groups.len() - 1
        });
        for ((_, acc), state) in accumulators.iter().zip(groups[slot].1.iter_mut()) {
            let input = match acc {
                Accumulator::Sum(expr) | Accumulator::Avg(expr) => evaluate(row, expr)?,
            };
            state.add(&input);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, states)| {
            let mut out = Map::new();
            out.insert("_id".to_string(), key);
            for ((name, _), state) in accumulators.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            Value::Object(out)
        })
        .collect())
}
