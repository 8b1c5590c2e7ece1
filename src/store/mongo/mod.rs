//! MongoDB-backed store.

mod codec;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection, Database, IndexModel};
use serde_json::Value;

use self::codec::{
    decode_document, decode_explain, decode_index, encode_filter, encode_index_keys,
    encode_pipeline, encode_projection, encode_set, encode_sort, explain_command,
};
use super::{DeleteResult, DocumentStore, UpdateResult};
use crate::config::Config;
use crate::error::{ReportError, ReportResult};
use crate::query::{ExecutionReport, FilterExpr, IndexInfo, IndexSpec, Pipeline, QuerySpec, SetFields};

pub struct MongoStore {
    client: Client,
    database: Database,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Opens a client and verifies the deployment answers a `ping`, so
    /// an unreachable server fails here rather than on the first report.
    pub async fn connect(config: &Config) -> ReportResult<Self> {
        let client = Client::with_uri_str(&config.uri).await?;
        let database = client.database(&config.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ReportError::StoreUnavailable(e.to_string()))?;
        let collection = database.collection::<Document>(&config.collection);
        tracing::info!(
            "Connected to {} ({}.{})",
            redact_uri(&config.uri),
            config.database,
            config.collection
        );
        Ok(Self {
            client,
            database,
            collection,
        })
    }
}

/// Drops credentials from a connection string before it is logged.
fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://").map(|i| i + 3) else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end..];
    // Credentials can only appear in the authority, before any path or query
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}***{}", &uri[..scheme_end], &rest[at..]),
        None => uri.to_string(),
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn collection_name(&self) -> &str {
        self.collection.name()
    }

    async fn find(&self, spec: &QuerySpec) -> ReportResult<Vec<Value>> {
        let mut action = self.collection.find(encode_filter(spec.filter_expr())?);
        if let Some(projection) = spec.projection() {
            action = action.projection(encode_projection(projection));
        }
        if !spec.sort().is_empty() {
            action = action.sort(encode_sort(spec.sort()));
        }
        if let Some(page) = spec.pagination() {
            action = action.skip(page.skip);
            if page.limit > 0 {
                let limit = i64::try_from(page.limit)
                    .map_err(|_| ReportError::invalid("limit exceeds i64 range"))?;
                action = action.limit(limit);
            }
        }
        let documents: Vec<Document> = action.await?.try_collect().await?;
        Ok(documents.into_iter().map(decode_document).collect())
    }

    async fn update_one(
        &self,
        filter: &FilterExpr,
        set: &SetFields,
    ) -> ReportResult<UpdateResult> {
        let result = self
            .collection
            .update_one(encode_filter(filter)?, encode_set(set)?)
            .await?;
        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete_one(&self, filter: &FilterExpr) -> ReportResult<DeleteResult> {
        let result = self.collection.delete_one(encode_filter(filter)?).await?;
        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn insert_many(&self, documents: Vec<Value>) -> ReportResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let documents = documents
            .iter()
            .map(|value| mongodb::bson::to_document(value).map_err(ReportError::from))
            .collect::<ReportResult<Vec<_>>>()?;
        let result = self.collection.insert_many(documents).await?;
        Ok(result.inserted_ids.len())
    }

    async fn count_documents(&self, filter: &FilterExpr) -> ReportResult<u64> {
        Ok(self.collection.count_documents(encode_filter(filter)?).await?)
    }

    async fn aggregate(&self, pipeline: &Pipeline) -> ReportResult<Vec<Value>> {
        let stages = encode_pipeline(pipeline)?;
        let documents: Vec<Document> = self.collection.aggregate(stages).await?.try_collect().await?;
        Ok(documents.into_iter().map(decode_document).collect())
    }

    async fn create_index(&self, spec: &IndexSpec) -> ReportResult<String> {
        let model = IndexModel::builder().keys(encode_index_keys(spec)).build();
        let result = self.collection.create_index(model).await?;
        tracing::info!(
            "Index {} ready on {}",
            result.index_name,
            self.collection.name()
        );
        Ok(result.index_name)
    }

    async fn list_indexes(&self) -> ReportResult<Vec<IndexInfo>> {
        let models: Vec<IndexModel> = self.collection.list_indexes().await?.try_collect().await?;
        let mut indexes = Vec::with_capacity(models.len());
        for model in models {
            let (name, unique) = match &model.options {
                Some(options) => (options.name.clone(), options.unique),
                None => (None, None),
            };
            match decode_index(&model.keys, name, unique) {
                Some(info) => indexes.push(info),
                None => tracing::warn!(
                    "Skipping index with unsupported key pattern {}",
                    model.keys
                ),
            }
        }
        Ok(indexes)
    }

    async fn explain_find(&self, spec: &QuerySpec) -> ReportResult<ExecutionReport> {
        let sort = (!spec.sort().is_empty()).then(|| encode_sort(spec.sort()));
        let (skip, limit) = match spec.pagination() {
            Some(page) => {
                let limit = (page.limit > 0)
                    .then(|| i64::try_from(page.limit))
                    .transpose()
                    .map_err(|_| ReportError::invalid("limit exceeds i64 range"))?;
                (Some(page.skip), limit)
            }
            None => (None, None),
        };
        let command = explain_command(
            self.collection.name(),
            encode_filter(spec.filter_expr())?,
            spec.projection().map(encode_projection),
            sort,
            skip,
            limit,
        )?;
        let reply = self.database.run_command(command).await?;
        decode_explain(&reply)
    }

    async fn close(&self) -> ReportResult<()> {
        self.client.clone().shutdown().await;
        tracing::info!("Closed connection for {}", self.collection.name());
        Ok(())
    }
}
