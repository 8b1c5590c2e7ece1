//! In-process document store.
//!
//! Holds one collection in insertion order and evaluates the typed specs
//! with the same observable semantics as the real store for the operations
//! the report catalog uses. Used by the test suite and by `--memory` runs.

mod aggregate;
mod helpers;

use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use uuid::Uuid;

use self::aggregate::{run_pipeline, sort_rows};
use self::helpers::{
    field_present, get_field_value, matches_filter, matches_predicate, set_field_value,
};
use super::{DeleteResult, DocumentStore, UpdateResult};
use crate::error::{ReportError, ReportResult};
use crate::query::{
    CompareOp, ExecutionReport, FilterExpr, IndexInfo, IndexSpec, Pipeline, QuerySpec, ScanType,
    SetFields, ID_INDEX_NAME,
};

struct State {
    documents: Vec<Value>,
    indexes: Vec<IndexInfo>,
    closed: bool,
}

pub struct MemoryStore {
    collection: String,
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        let id_index = IndexInfo {
            name: ID_INDEX_NAME.to_string(),
            keys: IndexSpec::identity(),
            unique: false,
        };
        Self {
            collection: collection.into(),
            state: RwLock::new(State {
                documents: Vec::new(),
                indexes: vec![id_index],
                closed: false,
            }),
        }
    }

    /// Number of stored documents, without going through the trait.
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(state: &State) -> ReportResult<()> {
        if state.closed {
            return Err(ReportError::StoreUnavailable(
                "memory store has been closed".to_string(),
            ));
        }
        Ok(())
    }

    fn run_find(state: &State, spec: &QuerySpec) -> Vec<Value> {
        let mut rows: Vec<Value> = state
            .documents
            .iter()
            .filter(|doc| matches_filter(doc, spec.filter_expr()))
            .cloned()
            .collect();

        if !spec.sort().is_empty() {
            sort_rows(&mut rows, spec.sort());
        }

        if let Some(page) = spec.pagination() {
            let skip = usize::try_from(page.skip).unwrap_or(usize::MAX);
            rows = rows.into_iter().skip(skip).collect();
            // A limit of zero means no limit
            if page.limit > 0 {
                rows.truncate(usize::try_from(page.limit).unwrap_or(usize::MAX));
            }
        }

        match spec.projection() {
            None => rows,
            Some(projection) => rows
                .iter()
                .map(|row| {
                    let mut out = Map::new();
                    if projection.include_key {
                        if let Some(id) = row.get("_id") {
                            out.insert("_id".to_string(), id.clone());
                        }
                    }
                    for field in &projection.fields {
                        let value = get_field_value(row, field);
                        if !value.is_null() || field_present(row, field) {
                            set_field_value(&mut out, field, value);
                        }
                    }
                    Value::Object(out)
                })
                .collect(),
        }
    }

    /// Picks the first index whose leading field the filter constrains with
    /// a bounded predicate, preferring equality over ranges.
    fn choose_index<'a>(state: &'a State, filter: &FilterExpr) -> Option<&'a IndexInfo> {
        let predicates = bounded_predicates(filter);
        let leads_with = |index: &IndexInfo, want_eq: bool| {
            predicates.iter().any(|(field, op, _)| {
                index.keys.leading_field() == Some(*field) && ((*op == CompareOp::Eq) == want_eq)
            })
        };
        state
            .indexes
            .iter()
            .find(|index| leads_with(index, true))
            .or_else(|| state.indexes.iter().find(|index| leads_with(index, false)))
    }
}

/// Predicates an index scan can bound; `$ne` cannot.
fn bounded_predicates(filter: &FilterExpr) -> Vec<(&str, CompareOp, &Value)> {
    match filter {
        FilterExpr::All => Vec::new(),
        FilterExpr::Compare { field, op, value } if *op != CompareOp::Ne => {
            vec![(field.as_str(), *op, value)]
        }
        FilterExpr::Compare { .. } => Vec::new(),
        FilterExpr::And(terms) => terms.iter().flat_map(bounded_predicates).collect(),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn find(&self, spec: &QuerySpec) -> ReportResult<Vec<Value>> {
        let state = self.state.read();
        Self::check_open(&state)?;
        Ok(Self::run_find(&state, spec))
    }

    async fn update_one(
        &self,
        filter: &FilterExpr,
        set: &SetFields,
    ) -> ReportResult<UpdateResult> {
        let mut state = self.state.write();
        Self::check_open(&state)?;

        let Some(doc) = state
            .documents
            .iter_mut()
            .find(|doc| matches_filter(doc, filter))
        else {
            return Ok(UpdateResult {
                matched_count: 0,
                modified_count: 0,
            });
        };

        let mut modified = false;
        if let Value::Object(map) = doc {
            for (field, value) in set.fields() {
                // Setting an identical value matches without modifying
                if lookup_path(map, field) != Some(value) {
                    set_field_value(map, field, value.clone());
                    modified = true;
                }
            }
        }

        Ok(UpdateResult {
            matched_count: 1,
            modified_count: u64::from(modified),
        })
    }

    async fn delete_one(&self, filter: &FilterExpr) -> ReportResult<DeleteResult> {
        let mut state = self.state.write();
        Self::check_open(&state)?;

        let position = state
            .documents
            .iter()
            .position(|doc| matches_filter(doc, filter));
        let deleted_count = match position {
            Some(i) => {
                state.documents.remove(i);
                1
            }
            None => 0,
        };
        Ok(DeleteResult { deleted_count })
    }

    async fn insert_many(&self, documents: Vec<Value>) -> ReportResult<usize> {
        let mut state = self.state.write();
        Self::check_open(&state)?;

        let mut prepared = Vec::with_capacity(documents.len());
        for doc in documents {
            let Value::Object(mut map) = doc else {
                return Err(ReportError::StoreOperation(
                    "inserted documents must be objects".to_string(),
                ));
            };
            let id = map
                .remove("_id")
                .unwrap_or_else(|| Value::String(Uuid::now_v7().to_string()));
            let duplicate = state
                .documents
                .iter()
                .chain(prepared.iter())
                .any(|existing: &Value| matches_predicate(existing, "_id", CompareOp::Eq, &id));
            if duplicate {
                return Err(ReportError::StoreOperation(format!(
                    "duplicate key error: _id {}",
                    id
                )));
            }
            let mut with_id = Map::new();
            with_id.insert("_id".to_string(), id);
            with_id.extend(map);
            prepared.push(Value::Object(with_id));
        }

        let inserted = prepared.len();
        state.documents.extend(prepared);
        Ok(inserted)
    }

    async fn count_documents(&self, filter: &FilterExpr) -> ReportResult<u64> {
        let state = self.state.read();
        Self::check_open(&state)?;
        Ok(state
            .documents
            .iter()
            .filter(|doc| matches_filter(doc, filter))
            .count() as u64)
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> ReportResult<Vec<Value>> {
        let documents = {
            let state = self.state.read();
            Self::check_open(&state)?;
            state.documents.clone()
        };
        run_pipeline(documents, pipeline)
    }

    async fn create_index(&self, spec: &IndexSpec) -> ReportResult<String> {
        let mut state = self.state.write();
        Self::check_open(&state)?;

        if let Some(existing) = state.indexes.iter().find(|i| &i.keys == spec) {
            return Ok(existing.name.clone());
        }
        let name = spec.default_name();
        if state.indexes.iter().any(|i| i.name == name) {
            return Err(ReportError::StoreOperation(format!(
                "index '{}' already exists with a different key pattern",
                name
            )));
        }
        state.indexes.push(IndexInfo {
            name: name.clone(),
            keys: spec.clone(),
            unique: false,
        });
        Ok(name)
    }

    async fn list_indexes(&self) -> ReportResult<Vec<IndexInfo>> {
        let state = self.state.read();
        Self::check_open(&state)?;
        Ok(state.indexes.clone())
    }

    async fn explain_find(&self, spec: &QuerySpec) -> ReportResult<ExecutionReport> {
        let started = Instant::now();
        let state = self.state.read();
        Self::check_open(&state)?;

        let returned = Self::run_find(&state, spec).len() as u64;
        let report = match Self::choose_index(&state, spec.filter_expr()) {
            Some(index) => {
                let leading = index.keys.leading_field();
                let bounds: Vec<_> = bounded_predicates(spec.filter_expr())
                    .into_iter()
                    .filter(|(field, _, _)| leading == Some(*field))
                    .collect();
                let in_bounds = state
                    .documents
                    .iter()
                    .filter(|doc| {
                        bounds
                            .iter()
                            .all(|(field, op, value)| matches_predicate(doc, field, *op, value))
                    })
                    .count() as u64;
                ExecutionReport {
                    scan: ScanType::IndexScan {
                        index_name: index.name.clone(),
                    },
                    winning_stage: "FETCH".to_string(),
                    documents_examined: in_bounds,
                    keys_examined: in_bounds,
                    documents_returned: returned,
                    execution_time_ms: started.elapsed().as_millis() as u64,
                }
            }
            None => ExecutionReport {
                scan: ScanType::CollectionScan,
                winning_stage: "COLLSCAN".to_string(),
                documents_examined: state.documents.len() as u64,
                keys_examined: 0,
                documents_returned: returned,
                execution_time_ms: started.elapsed().as_millis() as u64,
            },
        };
        Ok(report)
    }

    async fn close(&self) -> ReportResult<()> {
        let mut state = self.state.write();
        state.closed = true;
        tracing::debug!("Closed memory store for collection {}", self.collection);
        Ok(())
    }
}

fn lookup_path<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Pagination, Projection, SortDirection, SortKey};
    use serde_json::json;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new("books");
        store
            .insert_many(vec![
                json!({"_id": 1, "title": "C", "price": 30.0, "published_year": 2001}),
                json!({"_id": 2, "title": "A", "price": 10.0, "published_year": 2016}),
                json!({"_id": 3, "title": "B", "price": 20.0, "published_year": 2015}),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_generates_ids_and_rejects_duplicates() {
        let store = seeded().await;
        store.insert_many(vec![json!({"title": "D"})]).await.unwrap();
        let rows = store
            .find(&QuerySpec::filter(FilterExpr::eq("title", "D")).unwrap())
            .await
            .unwrap();
        assert!(rows[0]["_id"].is_string());

        let err = store.insert_many(vec![json!({"_id": 1})]).await;
        assert!(matches!(err, Err(ReportError::StoreOperation(_))));
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_find_sort_skip_limit_project() {
        let store = seeded().await;
        let spec = QuerySpec::builder()
            .sort_by(SortKey::asc("title"))
            .paginate(Pagination::new(1, 1).unwrap())
            .projection(Projection::new(["title"]))
            .build()
            .unwrap();
        let rows = store.find(&spec).await.unwrap();
        assert_eq!(rows, vec![json!({"title": "B"})]);
    }

    #[tokio::test]
    async fn test_projection_keeps_explicit_nulls() {
        let store = MemoryStore::new("books");
        store
            .insert_many(vec![
                json!({"_id": 1, "title": "Draft", "price": null}),
                json!({"_id": 2, "title": "Unpriced"}),
            ])
            .await
            .unwrap();
        let spec = QuerySpec::builder()
            .projection(Projection::new(["title", "price"]))
            .build()
            .unwrap();
        let rows = store.find(&spec).await.unwrap();
        assert_eq!(
            rows,
            vec![
                json!({"title": "Draft", "price": null}),
                json!({"title": "Unpriced"}),
            ]
        );
    }

    #[tokio::test]
    async fn test_update_reports_unmodified_when_value_unchanged() {
        let store = seeded().await;
        let set = SetFields::single("price", 10.0).unwrap();
        let result = store
            .update_one(&FilterExpr::eq("title", "A"), &set)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 0 });

        let set = SetFields::single("price", 12.0).unwrap();
        let result = store
            .update_one(&FilterExpr::eq("title", "A"), &set)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1 });
    }

    #[tokio::test]
    async fn test_create_index_is_idempotent() {
        let store = seeded().await;
        let spec = IndexSpec::single("title", SortDirection::Ascending).unwrap();
        assert_eq!(store.create_index(&spec).await.unwrap(), "title_1");
        assert_eq!(store.create_index(&spec).await.unwrap(), "title_1");
        assert_eq!(store.list_indexes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_explain_prefers_equality_index() {
        let store = seeded().await;
        let spec = QuerySpec::filter(
            FilterExpr::gt("published_year", 2010).and(FilterExpr::eq("title", "A")),
        )
        .unwrap();

        let before = store.explain_find(&spec).await.unwrap();
        assert_eq!(before.scan, ScanType::CollectionScan);
        assert_eq!(before.documents_examined, 3);

        store
            .create_index(&IndexSpec::single("published_year", SortDirection::Ascending).unwrap())
            .await
            .unwrap();
        store
            .create_index(&IndexSpec::single("title", SortDirection::Ascending).unwrap())
            .await
            .unwrap();

        let after = store.explain_find(&spec).await.unwrap();
        assert_eq!(
            after.scan,
            ScanType::IndexScan { index_name: "title_1".to_string() }
        );
        assert_eq!(after.keys_examined, 1);
        assert_eq!(after.documents_returned, 1);
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let store = seeded().await;
        store.close().await.unwrap();
        let err = store.count_documents(&FilterExpr::All).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
