//! PostgreSQL storage provider
//!
//! Implements [`StorageProvider`] on a sqlx connection pool. Collection
//! lifecycle changes and batch upserts run inside a transaction that is
//! rolled back when dropped uncommitted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, FromRow};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use vecstore_core::{
    CollectionConfig, DatabaseConfig, DistanceType, FieldConfig, IndexType, MetadataValue,
    Result, SearchOptions, SearchResult, StorageProvider, Validator, VectorDocument, VectorError,
};

use crate::sql::{self, IndexTuning};
use crate::{classify, classify_create};

/// Storage provider backed by PostgreSQL with the pgvector extension
pub struct PostgresProvider {
    pool: PgPool,
    validator: Validator,
    schema: String,
    tuning: IndexTuning,
}

impl std::fmt::Debug for PostgresProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresProvider")
            .field("schema", &self.schema)
            .field("validator", &self.validator)
            .field("tuning", &self.tuning)
            .finish_non_exhaustive()
    }
}

impl PostgresProvider {
    /// Open a connection pool for `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        config.validate().map_err(|e| VectorError::InvalidConfig {
            message: "invalid database configuration".to_string(),
            source: Some(Box::new(e)),
        })?;

        let statement_timeout_ms = config.statement_timeout_ms;
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if let Some(ms) = statement_timeout_ms {
                        let stmt = format!("SET statement_timeout = {ms}");
                        conn.execute(stmt.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.connection_string)
            .await
            .map_err(|e| VectorError::connection_failed("PostgreSQL connection failed", e))?;

        tracing::info!(
            "Connected to PostgreSQL (schema {}, pool size {})",
            config.schema_name,
            config.pool_size
        );

        Self::from_pool(pool, config)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool, config: &DatabaseConfig) -> Result<Self> {
        sql::check_identifier(&config.schema_name)?;

        Ok(Self {
            pool,
            validator: Validator::new(config.max_dimension),
            schema: config.schema_name.clone(),
            tuning: IndexTuning::from(config),
        })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schema holding the registry and collection tables
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Stored configuration of `name`, or `CollectionNotFound`
    async fn resolve(&self, name: &str) -> Result<CollectionConfig> {
        let row: Option<CollectionRow> = sqlx::query_as(&sql::select_collection(&self.schema))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(e, format!("failed to load collection {name}")))?;

        row.ok_or_else(|| VectorError::CollectionNotFound(name.to_string()))?
            .into_config()
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct CollectionRow {
    name: String,
    dimension: i32,
    index_type: String,
    distance_type: String,
    custom_fields: Option<serde_json::Value>,
}

impl CollectionRow {
    fn into_config(self) -> Result<CollectionConfig> {
        let custom_fields: BTreeMap<String, FieldConfig> = match self.custom_fields {
            Some(value) if !value.is_null() => serde_json::from_value(value).map_err(|e| {
                VectorError::operation_failed(
                    format!("corrupt custom fields for collection {}", self.name),
                    e,
                )
            })?,
            _ => BTreeMap::new(),
        };

        let dimension = usize::try_from(self.dimension)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| VectorError::OperationFailed {
                message: format!(
                    "corrupt dimension {} for collection {}",
                    self.dimension, self.name
                ),
                source: None,
            })?;

        Ok(CollectionConfig {
            dimension,
            index_type: IndexType::parse_or_default(&self.index_type),
            distance_type: DistanceType::parse_or_default(&self.distance_type),
            custom_fields,
            name: self.name,
        })
    }
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    #[sqlx(default)]
    vector_text: Option<String>,
    content: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn into_document(self, config: &CollectionConfig) -> Result<VectorDocument> {
        let vector = match self.vector_text {
            Some(text) => sql::parse_vector(&text).map_err(|e| {
                VectorError::invalid_vector(format!("document {}: {e}", self.id))
            })?,
            None => Vec::new(),
        };

        let metadata: HashMap<String, MetadataValue> = serde_json::from_value(self.metadata)
            .map_err(|e| {
                VectorError::operation_failed(format!("corrupt metadata for document {}", self.id), e)
            })?;

        let mut doc = VectorDocument {
            id: self.id,
            vector,
            content: self.content,
            metadata,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        };
        doc.coerce_metadata(&config.custom_fields);

        Ok(doc)
    }
}

#[derive(Debug, FromRow)]
struct SearchRow {
    #[sqlx(flatten)]
    document: DocumentRow,
    distance: f64,
}

fn metadata_json(doc: &VectorDocument) -> serde_json::Value {
    serde_json::Value::Object(
        doc.metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

// ============================================================================
// StorageProvider
// ============================================================================

#[async_trait]
impl StorageProvider for PostgresProvider {
    async fn initialize(&self) -> Result<()> {
        sqlx::query(sql::CREATE_EXTENSION)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, "failed to create vector extension"))?;

        let present: bool = sqlx::query_scalar(sql::CHECK_EXTENSION)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(e, "failed to check vector extension"))?;
        if !present {
            return Err(VectorError::invalid_config(
                "pgvector extension is not installed",
            ));
        }

        sqlx::query(&sql::create_schema(&self.schema))
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, format!("failed to create schema {}", self.schema)))?;

        sqlx::query(&sql::create_metadata_table(&self.schema))
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, "failed to create collection registry"))?;

        tracing::debug!("Initialized pgvector storage in schema {}", self.schema);
        Ok(())
    }

    async fn create_collection(&self, config: &CollectionConfig) -> Result<()> {
        self.validator.validate_collection(config)?;
        sql::check_identifier(&config.name)?;

        let dimension = i32::try_from(config.dimension).map_err(|_| {
            VectorError::InvalidDimension(format!("dimension too large: {}", config.dimension))
        })?;
        let custom_fields = serde_json::to_value(&config.custom_fields)
            .map_err(|e| VectorError::operation_failed("failed to encode custom fields", e))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, "failed to begin transaction"))?;

        sqlx::query(&sql::create_collection_table(&self.schema, config))
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_create(e, &config.name))?;

        if let Some(index) = sql::build_index_query(&self.schema, config, &self.tuning) {
            sqlx::query(&index).execute(&mut *tx).await.map_err(|e| {
                classify(e, format!("failed to create vector index on {}", config.name))
            })?;
        }

        for index in sql::build_field_index_queries(&self.schema, config) {
            sqlx::query(&index).execute(&mut *tx).await.map_err(|e| {
                classify(e, format!("failed to create field index on {}", config.name))
            })?;
        }

        sqlx::query(&sql::insert_collection(&self.schema))
            .bind(&config.name)
            .bind(&self.schema)
            .bind(dimension)
            .bind(config.index_type.as_str())
            .bind(config.distance_type.as_str())
            .bind(custom_fields)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify_create(e, &config.name))?;

        tx.commit()
            .await
            .map_err(|e| classify_create(e, &config.name))?;

        tracing::info!(
            "Created collection {} (dimension {}, {} index, {} distance)",
            config.name,
            config.dimension,
            config.index_type,
            config.distance_type
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        // Such a name can never have been registered
        if sql::check_identifier(name).is_err() {
            return Err(VectorError::CollectionNotFound(name.to_string()));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, "failed to begin transaction"))?;

        let deleted = sqlx::query(&sql::delete_collection(&self.schema))
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, format!("failed to unregister collection {name}")))?
            .rows_affected();

        if deleted == 0 {
            tracing::warn!("Rolling back delete of unknown collection {}", name);
            return Err(VectorError::CollectionNotFound(name.to_string()));
        }

        sqlx::query(&sql::drop_collection_table(&self.schema, name))
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, format!("failed to drop collection {name}")))?;

        tx.commit()
            .await
            .map_err(|e| classify(e, format!("failed to delete collection {name}")))?;

        tracing::info!("Deleted collection {}", name);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(&sql::list_collections(&self.schema))
            .bind(&self.schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, "failed to list collections"))
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionConfig> {
        self.resolve(name).await
    }

    async fn upsert_document(&self, collection: &str, doc: &mut VectorDocument) -> Result<()> {
        self.upsert_documents(collection, std::slice::from_mut(doc))
            .await
    }

    async fn upsert_documents(
        &self,
        collection: &str,
        docs: &mut [VectorDocument],
    ) -> Result<()> {
        let config = self.resolve(collection).await?;

        for doc in docs.iter_mut() {
            self.validator.validate_document(doc, &config)?;
        }
        if docs.is_empty() {
            return Ok(());
        }

        let query = sql::upsert_document(&self.schema, &config.name);
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify(e, "failed to begin transaction"))?;

        for doc in docs.iter_mut() {
            doc.updated_at = Some(now);

            let created_at: DateTime<Utc> = sqlx::query_scalar(&query)
                .bind(&doc.id)
                .bind(sql::format_vector(&doc.vector))
                .bind(&doc.content)
                .bind(metadata_json(doc))
                .bind(doc.created_at)
                .bind(doc.updated_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| classify(e, format!("failed to upsert document {}", doc.id)))?;

            doc.created_at = Some(created_at);
        }

        tx.commit()
            .await
            .map_err(|e| classify(e, format!("failed to commit upsert into {collection}")))?;

        tracing::debug!("Upserted {} documents into {}", docs.len(), collection);
        Ok(())
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<VectorDocument> {
        let config = self.resolve(collection).await?;

        let row: Option<DocumentRow> =
            sqlx::query_as(&sql::select_document(&self.schema, &config.name))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| classify(e, format!("failed to get document {id}")))?;

        row.ok_or_else(|| VectorError::DocumentNotFound(id.to_string()))?
            .into_document(&config)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        let config = self.resolve(collection).await?;

        let deleted = sqlx::query(&sql::delete_document(&self.schema, &config.name))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| classify(e, format!("failed to delete document {id}")))?
            .rows_affected();

        if deleted == 0 {
            return Err(VectorError::DocumentNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        opts: Option<&SearchOptions>,
    ) -> Result<Vec<SearchResult>> {
        let config = self.resolve(collection).await?;
        self.validator.validate_vector(vector, config.dimension)?;

        let default_opts = SearchOptions::default();
        let opts = opts.unwrap_or(&default_opts);
        let query =
            sql::build_search_query(&self.schema, &config.name, config.distance_type, opts)?;

        let limit = i64::try_from(opts.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(opts.offset).unwrap_or(i64::MAX);

        let mut search = sqlx::query_as::<_, SearchRow>(&query).bind(sql::format_vector(vector));
        for value in opts.filter.values() {
            search = search.bind(value.to_json());
        }
        let rows = search
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(e, format!("failed to search {collection}")))?;

        tracing::debug!("Search on {} returned {} rows", collection, rows.len());

        rows.into_iter()
            .map(|row| {
                let mut doc = row.document.into_document(&config)?;
                if !opts.include_metadata {
                    doc.metadata.clear();
                }
                Ok(SearchResult::new(doc, row.distance as f32))
            })
            .collect()
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        tracing::debug!("Closed PostgreSQL pool");
        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
