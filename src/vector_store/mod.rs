//! Vector store abstraction.
//!
//! The [`VectorStore`] trait covers the two operations the pipeline needs:
//! making sure an index exists, and upserting batches of
//! [`VectorRecord`]s into it.
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | [`PineconeStore`] | Pinecone serverless indexes over the REST API |
//! | [`InMemoryVectorStore`] | Tests and embedding in other programs |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod pinecone;

pub use memory::InMemoryVectorStore;
pub use pinecone::PineconeStore;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::models::VectorRecord;

/// Abstract vector index backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_index`](VectorStore::ensure_index) | Create the index if missing |
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite records by id |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend name for logs (e.g. `"pinecone"`).
    fn name(&self) -> &str;

    /// Make sure `index` exists.
    ///
    /// An existing index is reused as-is; its dimensionality is not checked
    /// here, so a mismatch surfaces as an [`upsert`](VectorStore::upsert)
    /// error. A missing index is created with `dims` and the cosine metric.
    async fn ensure_index(&self, index: &str, dims: usize) -> Result<()>;

    /// Insert or overwrite `records` in `index`.
    ///
    /// `namespace = None` writes to the index's default namespace.
    async fn upsert(
        &self,
        index: &str,
        namespace: Option<&str>,
        records: &[VectorRecord],
    ) -> Result<()>;
}

#[async_trait]
impl<T: VectorStore + ?Sized> VectorStore for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn ensure_index(&self, index: &str, dims: usize) -> Result<()> {
        (**self).ensure_index(index, dims).await
    }

    async fn upsert(
        &self,
        index: &str,
        namespace: Option<&str>,
        records: &[VectorRecord],
    ) -> Result<()> {
        (**self).upsert(index, namespace, records).await
    }
}
