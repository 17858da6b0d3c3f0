//! In-memory [`VectorStore`] implementation for testing.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Unlike a hosted store it
//! checks every upserted vector against the index's dimensionality, so a
//! mismatch fails loudly instead of corrupting the index.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::VectorStore;
use crate::models::VectorRecord;

/// Pinecone's name for the namespace used when none is given.
const DEFAULT_NAMESPACE: &str = "";

struct StoredIndex {
    dims: usize,
    namespaces: HashMap<String, HashMap<String, VectorRecord>>,
}

/// In-memory vector store.
pub struct InMemoryVectorStore {
    indexes: RwLock<HashMap<String, StoredIndex>>,
    upsert_calls: AtomicUsize,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
            upsert_calls: AtomicUsize::new(0),
        }
    }

    /// Dimensionality of `index`, if it exists.
    pub fn index_dims(&self, index: &str) -> Option<usize> {
        self.indexes.read().unwrap().get(index).map(|i| i.dims)
    }

    /// Number of records in `index`/`namespace`.
    pub fn len(&self, index: &str, namespace: Option<&str>) -> usize {
        self.with_namespace(index, namespace, |records| records.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, index: &str, namespace: Option<&str>) -> bool {
        self.len(index, namespace) == 0
    }

    /// All record ids in `index`/`namespace`, sorted.
    pub fn ids(&self, index: &str, namespace: Option<&str>) -> BTreeSet<String> {
        self.with_namespace(index, namespace, |records| records.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up a single record.
    pub fn get(&self, index: &str, namespace: Option<&str>, id: &str) -> Option<VectorRecord> {
        self.with_namespace(index, namespace, |records| records.get(id).cloned())
            .flatten()
    }

    /// How many times [`upsert`](VectorStore::upsert) has succeeded.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    fn with_namespace<R>(
        &self,
        index: &str,
        namespace: Option<&str>,
        f: impl FnOnce(&HashMap<String, VectorRecord>) -> R,
    ) -> Option<R> {
        let indexes = self.indexes.read().unwrap();
        indexes
            .get(index)
            .and_then(|i| i.namespaces.get(namespace.unwrap_or(DEFAULT_NAMESPACE)))
            .map(f)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_index(&self, index: &str, dims: usize) -> Result<()> {
        let mut indexes = self.indexes.write().unwrap();
        indexes
            .entry(index.to_string())
            .or_insert_with(|| StoredIndex {
                dims,
                namespaces: HashMap::new(),
            });
        Ok(())
    }

    async fn upsert(
        &self,
        index: &str,
        namespace: Option<&str>,
        records: &[VectorRecord],
    ) -> Result<()> {
        let mut indexes = self.indexes.write().unwrap();
        let stored = match indexes.get_mut(index) {
            Some(s) => s,
            None => bail!("index '{}' does not exist", index),
        };

        if let Some(bad) = records.iter().find(|r| r.values.len() != stored.dims) {
            bail!(
                "vector dimension {} does not match index '{}' dimension {} (id {})",
                bad.values.len(),
                index,
                stored.dims,
                bad.id
            );
        }

        let ns = stored
            .namespaces
            .entry(namespace.unwrap_or(DEFAULT_NAMESPACE).to_string())
            .or_default();
        for record in records {
            ns.insert(record.id.clone(), record.clone());
        }

        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
