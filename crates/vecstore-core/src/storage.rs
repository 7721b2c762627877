//! Storage facade
//!
//! [`VectorStorage`] owns a provider, initializes it once and forwards
//! every call.

use std::sync::Arc;

use crate::provider::StorageProvider;
use crate::{CollectionConfig, Result, SearchOptions, SearchResult, VectorDocument};

/// High-level entry point for vector storage operations
#[derive(Clone)]
pub struct VectorStorage {
    provider: Arc<dyn StorageProvider>,
}

impl std::fmt::Debug for VectorStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStorage")
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl VectorStorage {
    /// Initialize `provider` and wrap it
    pub async fn new(provider: Arc<dyn StorageProvider>) -> Result<Self> {
        provider.initialize().await?;
        tracing::debug!("Vector storage ready on {} provider", provider.name());

        Ok(Self { provider })
    }

    /// Underlying provider
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    pub async fn create_collection(&self, config: &CollectionConfig) -> Result<()> {
        self.provider.create_collection(config).await
    }

    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.provider.delete_collection(name).await
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.provider.list_collections().await
    }

    pub async fn get_collection(&self, name: &str) -> Result<CollectionConfig> {
        self.provider.get_collection(name).await
    }

    pub async fn upsert_document(&self, collection: &str, doc: &mut VectorDocument) -> Result<()> {
        self.provider.upsert_document(collection, doc).await
    }

    pub async fn upsert_documents(
        &self,
        collection: &str,
        docs: &mut [VectorDocument],
    ) -> Result<()> {
        self.provider.upsert_documents(collection, docs).await
    }

    pub async fn get_document(&self, collection: &str, id: &str) -> Result<VectorDocument> {
        self.provider.get_document(collection, id).await
    }

    pub async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        self.provider.delete_document(collection, id).await
    }

    pub async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        opts: Option<&SearchOptions>,
    ) -> Result<Vec<SearchResult>> {
        self.provider.search_by_vector(collection, vector, opts).await
    }

    pub async fn search_by_id(
        &self,
        collection: &str,
        id: &str,
        opts: Option<&SearchOptions>,
    ) -> Result<Vec<SearchResult>> {
        self.provider.search_by_id(collection, id, opts).await
    }

    /// Close the underlying provider
    pub async fn close(&self) -> Result<()> {
        self.provider.close().await
    }
}
