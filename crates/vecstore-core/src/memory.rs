//! In-memory storage provider
//!
//! Implements the full [`StorageProvider`] contract without a database:
//! exact search over every document of a collection. Used as the test
//! double for code written against the contract, and usable as an
//! embedded store for small data sets.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::DEFAULT_MAX_DIMENSION;
use crate::provider::StorageProvider;
use crate::validator::{is_valid_field_name, Validator};
use crate::{
    CollectionConfig, DistanceType, Result, SearchOptions, SearchResult, VectorDocument,
    VectorError,
};

struct MemoryCollection {
    config: CollectionConfig,
    documents: HashMap<String, VectorDocument>,
}

/// Storage provider holding every collection in process memory
pub struct MemoryProvider {
    validator: Validator,
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryProvider")
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

impl MemoryProvider {
    pub fn new(max_dimension: usize) -> Self {
        Self {
            validator: Validator::new(max_dimension),
            collections: RwLock::new(HashMap::new()),
        }
    }
}

/// Distance between two vectors of equal length under `metric`.
///
/// Matches the pgvector operators: cosine distance (`<=>`), L2 distance
/// (`<->`) and negative inner product (`<#>`). A zero vector has cosine
/// distance 1.
pub fn distance(metric: DistanceType, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceType::Cosine => {
            let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
            for (x, y) in a.iter().zip(b) {
                let (x, y) = (f64::from(*x), f64::from(*y));
                dot += x * y;
                norm_a += x * x;
                norm_b += y * y;
            }
            let denom = norm_a.sqrt() * norm_b.sqrt();
            if denom == 0.0 {
                1.0
            } else {
                (1.0 - dot / denom) as f32
            }
        }
        DistanceType::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| {
                let d = f64::from(*x) - f64::from(*y);
                d * d
            })
            .sum::<f64>()
            .sqrt() as f32,
        DistanceType::DotProduct => -(a
            .iter()
            .zip(b)
            .map(|(x, y)| f64::from(*x) * f64::from(*y))
            .sum::<f64>() as f32),
    }
}

fn not_found(name: &str) -> VectorError {
    VectorError::CollectionNotFound(name.to_string())
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn create_collection(&self, config: &CollectionConfig) -> Result<()> {
        self.validator.validate_collection(config)?;

        let mut collections = self.collections.write().await;
        if collections.contains_key(&config.name) {
            return Err(VectorError::CollectionExists(config.name.clone()));
        }

        collections.insert(
            config.name.clone(),
            MemoryCollection {
                config: config.clone(),
                documents: HashMap::new(),
            },
        );
        tracing::info!("Created collection {} (dimension {})", config.name, config.dimension);

        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let removed = self.collections.write().await.remove(name);
        match removed {
            Some(collection) => {
                tracing::info!(
                    "Deleted collection {} with {} documents",
                    name,
                    collection.documents.len()
                );
                Ok(())
            }
            None => Err(not_found(name)),
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionConfig> {
        self.collections
            .read()
            .await
            .get(name)
            .map(|c| c.config.clone())
            .ok_or_else(|| not_found(name))
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
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;

        for doc in docs.iter_mut() {
            self.validator.validate_document(doc, &target.config)?;
        }

        let now = Utc::now();
        for doc in docs.iter_mut() {
            doc.updated_at = Some(now);
            if let Some(existing) = target.documents.get(&doc.id) {
                doc.created_at = existing.created_at;
            }
            target.documents.insert(doc.id.clone(), doc.clone());
        }
        tracing::debug!("Upserted {} documents into {}", docs.len(), collection);

        Ok(())
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<VectorDocument> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| not_found(collection))?;

        target
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| VectorError::DocumentNotFound(id.to_string()))
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| not_found(collection))?;

        target
            .documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| VectorError::DocumentNotFound(id.to_string()))
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        opts: Option<&SearchOptions>,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| not_found(collection))?;

        self.validator
            .validate_vector(vector, target.config.dimension)?;

        let default_opts = SearchOptions::default();
        let opts = opts.unwrap_or(&default_opts);

        if let Some(field) = opts.filter.keys().find(|k| !is_valid_field_name(k)) {
            return Err(VectorError::invalid_config(format!(
                "invalid filter field: {field}"
            )));
        }

        let metric = target.config.distance_type;
        let mut ranked: Vec<(f32, &VectorDocument)> = target
            .documents
            .values()
            .filter(|doc| {
                opts.filter
                    .iter()
                    .all(|(field, value)| doc.metadata.get(field) == Some(value))
            })
            .map(|doc| (distance(metric, &doc.vector, vector), doc))
            .collect();

        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

        let results = ranked
            .into_iter()
            .skip(opts.offset)
            .take(opts.limit)
            .map(|(dist, doc)| {
                let mut doc = doc.clone();
                if !opts.include_metadata {
                    doc.metadata.clear();
                }
                if !opts.include_vectors {
                    doc.vector.clear();
                }
                SearchResult::new(doc, dist)
            })
            .collect();

        Ok(results)
    }

    async fn close(&self) -> Result<()> {
        self.collections.write().await.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
