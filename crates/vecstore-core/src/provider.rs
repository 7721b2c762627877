//! Storage provider contract
//!
//! Every backend implements [`StorageProvider`]. Collections and documents
//! are addressed by plain string names, never by backend handles, so a
//! provider can be swapped for another (or for [`crate::MemoryProvider`]
//! in tests) without touching callers.

use async_trait::async_trait;

use crate::{CollectionConfig, Result, SearchOptions, SearchResult, VectorDocument};

/// Capability set a vector storage backend must expose
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// One-time setup (extensions, schemas, metadata tables).
    ///
    /// Must be idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Register a collection and build its storage.
    ///
    /// Fails with `InvalidConfig`/`InvalidDimension` for a bad config and
    /// `CollectionExists` when the name is already registered.
    async fn create_collection(&self, config: &CollectionConfig) -> Result<()>;

    /// Remove a collection and all of its documents
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Names of all registered collections
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Stored schema of a collection
    async fn get_collection(&self, name: &str) -> Result<CollectionConfig>;

    /// Insert or replace a document by id.
    ///
    /// On return `doc` carries the stored timestamps: `created_at` from
    /// the first insert, `updated_at` from this write.
    async fn upsert_document(&self, collection: &str, doc: &mut VectorDocument) -> Result<()>;

    /// Insert or replace a batch of documents.
    ///
    /// Every document is validated before any is written; the batch is
    /// applied all-or-nothing.
    async fn upsert_documents(&self, collection: &str, docs: &mut [VectorDocument])
        -> Result<()>;

    /// Fetch a document by id
    async fn get_document(&self, collection: &str, id: &str) -> Result<VectorDocument>;

    /// Delete a document by id
    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;

    /// Rank documents by distance to `vector`.
    ///
    /// `None` options mean [`SearchOptions::default`].
    async fn search_by_vector(
        &self,
        collection: &str,
        vector: &[f32],
        opts: Option<&SearchOptions>,
    ) -> Result<Vec<SearchResult>>;

    /// Rank documents by distance to the vector of document `id`.
    ///
    /// The query document itself is not excluded and ranks first at
    /// distance 0 unless filtered out.
    async fn search_by_id(
        &self,
        collection: &str,
        id: &str,
        opts: Option<&SearchOptions>,
    ) -> Result<Vec<SearchResult>> {
        let doc = self.get_document(collection, id).await?;
        self.search_by_vector(collection, &doc.vector, opts).await
    }

    /// Release backend resources
    async fn close(&self) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
