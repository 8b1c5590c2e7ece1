//! Encoding of typed specs into store commands and decoding of store
//! replies.

use mongodb::bson::{self, doc, Bson, Document};
use serde_json::Value;

use crate::error::{ReportError, ReportResult};
use crate::query::{
    Accumulator, CompareOp, ExecutionReport, Expr, FilterExpr, IndexInfo, IndexSpec, Pipeline,
    PipelineStage, ProjectField, Projection, ScanType, SetFields, SortDirection, SortKey,
    ID_INDEX_NAME,
};

pub fn encode_value(value: &Value) -> ReportResult<Bson> {
    Ok(bson::to_bson(value)?)
}

pub fn encode_filter(filter: &FilterExpr) -> ReportResult<Document> {
    match filter {
        FilterExpr::All => Ok(Document::new()),
        FilterExpr::Compare { field, op, value } => {
            let value = encode_value(value)?;
            Ok(match op {
                CompareOp::Eq => doc! { field.as_str(): value },
                other => doc! { field.as_str(): { other.operator(): value } },
            })
        }
        FilterExpr::And(terms) => {
            let encoded = terms
                .iter()
                .map(encode_filter)
                .collect::<ReportResult<Vec<_>>>()?;
            // Distinct top-level fields merge into one document; anything
            // else needs an explicit $and.
            let mut merged = Document::new();
            for part in &encoded {
                for (key, value) in part {
                    if merged.contains_key(key) {
                        let terms: Vec<Bson> = encoded.into_iter().map(Bson::Document).collect();
                        return Ok(doc! { "$and": terms });
                    }
                    merged.insert(key.clone(), value.clone());
                }
            }
            Ok(merged)
        }
    }
}

pub fn encode_projection(projection: &Projection) -> Document {
    let mut out = Document::new();
    if !projection.include_key {
        out.insert("_id", 0);
    }
    for field in &projection.fields {
        out.insert(field.clone(), 1);
    }
    out
}

pub fn encode_sort(keys: &[SortKey]) -> Document {
    keys.iter()
        .map(|k| (k.field.clone(), Bson::Int32(k.direction.as_i32())))
        .collect()
}

pub fn encode_set(set: &SetFields) -> ReportResult<Document> {
    let mut fields = Document::new();
    for (name, value) in set.fields() {
        fields.insert(name.clone(), encode_value(value)?);
    }
    Ok(doc! { "$set": fields })
}

pub fn encode_index_keys(spec: &IndexSpec) -> Document {
    encode_sort(spec.keys())
}

pub fn encode_expr(expr: &Expr) -> ReportResult<Bson> {
    Ok(match expr {
        Expr::Field(name) => Bson::String(format!("${}", name)),
        // Strings starting with '$' would be read as field paths
        Expr::Literal(Value::String(s)) if s.starts_with('$') => {
            Bson::Document(doc! { "$literal": s.as_str() })
        }
        Expr::Literal(value) => encode_value(value)?,
        Expr::Divide(a, b) => Bson::Document(doc! { "$divide": [encode_expr(a)?, encode_expr(b)?] }),
        Expr::Multiply(factors) => {
            let factors = factors
                .iter()
                .map(encode_expr)
                .collect::<ReportResult<Vec<_>>>()?;
            Bson::Document(doc! { "$multiply": factors })
        }
        Expr::Floor(inner) => Bson::Document(doc! { "$floor": encode_expr(inner)? }),
    })
}

pub fn encode_pipeline(pipeline: &Pipeline) -> ReportResult<Vec<Document>> {
    pipeline
        .stages()
        .iter()
        .map(|stage| {
            Ok(match stage {
                PipelineStage::Project(fields) => {
                    let mut body = Document::new();
                    for (name, field) in fields {
                        let value = match field {
                            ProjectField::Include => Bson::Int32(1),
                            ProjectField::Computed(expr) => encode_expr(expr)?,
                        };
                        body.insert(name.clone(), value);
                    }
                    doc! { "$project": body }
                }
                PipelineStage::Group { key, accumulators } => {
                    let mut body = Document::new();
                    let key = match key {
                        Some(expr) => encode_expr(expr)?,
                        None => Bson::Null,
                    };
                    body.insert("_id", key);
                    for (name, acc) in accumulators {
                        let acc = match acc {
                            Accumulator::Sum(e) => doc! { "$sum": encode_expr(e)? },
                            Accumulator::Avg(e) => doc! { "$avg": encode_expr(e)? },
                        };
                        body.insert(name.clone(), acc);
                    }
                    doc! { "$group": body }
                }
                PipelineStage::Sort(keys) => doc! { "$sort": encode_sort(keys) },
                PipelineStage::Limit(n) => {
                    let n = i64::try_from(*n)
                        .map_err(|_| ReportError::invalid("$limit exceeds i64 range"))?;
                    doc! { "$limit": n }
                }
            })
        })
        .collect()
}

/// Relaxed extended JSON: plain numbers for finite doubles and 32/64-bit
/// integers, `{"$oid": ..}` for object ids.
pub fn decode_document(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

fn bson_to_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

/// Converts a listed index; key patterns that are not plain +1/-1 (text,
/// hashed, geo) are reported as `None`.
pub fn decode_index(keys: &Document, name: Option<String>, unique: Option<bool>) -> Option<IndexInfo> {
    let mut sort_keys = Vec::with_capacity(keys.len());
    for (field, direction) in keys {
        let direction = SortDirection::from_i64(bson_to_i64(direction)?).ok()?;
        sort_keys.push(SortKey::new(field.clone(), direction));
    }
    let spec = if sort_keys.len() == 1 && sort_keys[0].field == "_id" {
        IndexSpec::identity()
    } else {
        IndexSpec::new(sort_keys).ok()?
    };
    let name = name.unwrap_or_else(|| {
        if spec == IndexSpec::identity() {
            ID_INDEX_NAME.to_string()
        } else {
            spec.default_name()
        }
    });
    Some(IndexInfo {
        name,
        keys: spec,
        unique: unique.unwrap_or(false),
    })
}

/// Builds the `explain` command for a find.
pub fn explain_command(
    collection: &str,
    filter: Document,
    projection: Option<Document>,
    sort: Option<Document>,
    skip: Option<u64>,
    limit: Option<i64>,
) -> ReportResult<Document> {
    let mut find = doc! { "find": collection, "filter": filter };
    if let Some(projection) = projection {
        find.insert("projection", projection);
    }
    if let Some(sort) = sort {
        find.insert("sort", sort);
    }
    if let Some(skip) = skip {
        let skip = i64::try_from(skip).map_err(|_| ReportError::invalid("skip exceeds i64 range"))?;
        find.insert("skip", skip);
    }
    if let Some(limit) = limit {
        find.insert("limit", limit);
    }
    Ok(doc! { "explain": find, "verbosity": "executionStats" })
}

fn stat(stats: &Document, key: &str) -> u64 {
    stats
        .get(key)
        .and_then(bson_to_i64)
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}

/// Reads the winning plan and execution counters out of an explain reply.
///
/// The plan tree is walked through `inputStage` / `inputStages`; newer
/// servers nest the tree under `winningPlan.queryPlan`.
/// Newer servers wrap the classic plan tree in `queryPlan`.
fn unwrap_query_plan(plan: &Document) -> &Document {
    plan.get_document("queryPlan").unwrap_or(plan)
}

fn first_document<'a>(stage: &'a Document, key: &str) -> Option<&'a Document> {
    stage
        .get_array(key)
        .ok()
        .and_then(|items| items.first())
        .and_then(Bson::as_document)
}

pub fn decode_explain(reply: &Document) -> ReportResult<ExecutionReport> {
    let planner = reply
        .get_document("queryPlanner")
        .map_err(|_| ReportError::Decode("explain reply has no queryPlanner".to_string()))?;
    let plan = planner
        .get_document("winningPlan")
        .map(unwrap_query_plan)
        .map_err(|_| ReportError::Decode("explain reply has no winningPlan".to_string()))?;

    let winning_stage = plan.get_str("stage").unwrap_or("UNKNOWN").to_string();
    let mut scan = ScanType::CollectionScan;
    let mut current = Some(plan);
    while let Some(stage) = current {
        let name = stage.get_str("stage").unwrap_or_default();
        if name == "IXSCAN" || name == "EXPRESS_IXSCAN" {
            let index_name = stage.get_str("indexName").unwrap_or_default().to_string();
            scan = ScanType::IndexScan { index_name };
            break;
        }
        if name == "IDHACK" || name == "EXPRESS_IDHACK" {
            scan = ScanType::IndexScan {
                index_name: ID_INDEX_NAME.to_string(),
            };
            break;
        }
        current = stage
            .get_document("inputStage")
            .ok()
            .or_else(|| first_document(stage, "inputStages"))
            .or_else(|| {
                // Sharded clusters nest one winning plan per shard
                first_document(stage, "shards")
                    .and_then(|shard| shard.get_document("winningPlan").ok())
                    .map(unwrap_query_plan)
            });
    }

    let stats = reply
        .get_document("executionStats")
        .map_err(|_| ReportError::Decode("explain reply has no executionStats".to_string()))?;

    Ok(ExecutionReport {
        scan,
        winning_stage,
        documents_examined: stat(stats, "totalDocsExamined"),
        keys_examined: stat(stats, "totalKeysExamined"),
        documents_returned: stat(stats, "nReturned"),
        execution_time_ms: stat(stats, "executionTimeMillis"),
    })
}
