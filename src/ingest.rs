//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: load → chunk → embed → upsert. A dry run stops
//! after chunking; no backend is constructed and no network I/O happens.
//!
//! Backends are obtained through a [`BackendFactory`] so construction is lazy
//! (a dry run never pays for model loading) and tests can inject fakes.
//!
//! Batches run sequentially. The first failing batch aborts the run; batches
//! already upserted stay in the index, and a re-run overwrites them by id.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::chunk;
use crate::config::{Config, EmbeddingConfig, PineconeConfig};
use crate::embedding::{self, EmbeddingBackend};
use crate::error::ConfigError;
use crate::loader;
use crate::models::{IngestReport, VectorRecord};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};
use crate::vector_store::{PineconeStore, VectorStore};

/// Parameters for a single ingestion run.
#[derive(Clone)]
pub struct IngestOptions {
    /// File or directory to ingest.
    pub source_path: PathBuf,
    /// Target index. Required unless `dry_run`.
    pub index_name: Option<String>,
    /// `None` writes to the index's default namespace.
    pub namespace: Option<String>,
    /// Words per chunk; `<= 0` keeps each document whole.
    pub chunk_size: i64,
    pub overlap: usize,
    /// Chunks per embed/upsert batch.
    pub batch_size: usize,
    pub embedding_model: String,
    /// Placement for a newly created index.
    pub cloud: String,
    pub region: String,
    pub dry_run: bool,
    /// Vector store credential. Required unless `dry_run`.
    pub api_key: Option<String>,
}

impl IngestOptions {
    /// Options for ingesting `source_path` with the settings in `config`.
    pub fn from_config(config: &Config, source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            index_name: config.pinecone.index.clone(),
            namespace: config.pinecone.namespace.clone(),
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            batch_size: config.embedding.batch_size,
            embedding_model: config.embedding.model.clone(),
            cloud: config.pinecone.cloud.clone(),
            region: config.pinecone.region.clone(),
            dry_run: config.dry_run,
            api_key: config.pinecone.api_key.clone(),
        }
    }

    /// Check everything that can be checked before touching the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.dry_run {
            if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(ConfigError::MissingCredential);
            }
            if self
                .index_name
                .as_deref()
                .map_or(true, |i| i.trim().is_empty())
            {
                return Err(ConfigError::MissingIndexName);
            }
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        chunk::validate_params(self.chunk_size, self.overlap)
    }
}

impl std::fmt::Debug for IngestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestOptions")
            .field("source_path", &self.source_path)
            .field("index_name", &self.index_name)
            .field("namespace", &self.namespace)
            .field("chunk_size", &self.chunk_size)
            .field("overlap", &self.overlap)
            .field("batch_size", &self.batch_size)
            .field("embedding_model", &self.embedding_model)
            .field("cloud", &self.cloud)
            .field("region", &self.region)
            .field("dry_run", &self.dry_run)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Constructs the backends a non-dry run needs.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn embedding_backend(&self, options: &IngestOptions)
        -> Result<Box<dyn EmbeddingBackend>>;

    async fn vector_store(&self, options: &IngestOptions) -> Result<Box<dyn VectorStore>>;
}

/// The configured embedding provider and Pinecone.
pub struct DefaultBackends {
    embedding: EmbeddingConfig,
    pinecone: PineconeConfig,
}

impl DefaultBackends {
    pub fn from_config(config: &Config) -> Self {
        Self {
            embedding: config.embedding.clone(),
            pinecone: config.pinecone.clone(),
        }
    }
}

#[async_trait]
impl BackendFactory for DefaultBackends {
    async fn embedding_backend(
        &self,
        options: &IngestOptions,
    ) -> Result<Box<dyn EmbeddingBackend>> {
        let mut config = self.embedding.clone();
        config.batch_size = options.batch_size;
        embedding::create_backend(&config, &options.embedding_model).await
    }

    async fn vector_store(&self, options: &IngestOptions) -> Result<Box<dyn VectorStore>> {
        let api_key = options
            .api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential)?;
        let store = PineconeStore::new(api_key, &self.pinecone, &options.cloud, &options.region)?;
        Ok(Box::new(store))
    }
}

/// Run the pipeline with backends built from `config`.
pub async fn run_ingest(
    config: &Config,
    options: &IngestOptions,
    progress: &dyn IngestProgressReporter,
) -> Result<IngestReport> {
    let backends = DefaultBackends::from_config(config);
    ingest(options, &backends, progress).await
}

/// Load, chunk, embed, and upsert everything under `options.source_path`.
pub async fn ingest(
    options: &IngestOptions,
    backends: &dyn BackendFactory,
    progress: &dyn IngestProgressReporter,
) -> Result<IngestReport> {
    options.validate()?;

    let mut report = IngestReport {
        dry_run: options.dry_run,
        ..Default::default()
    };

    progress.report(IngestProgressEvent::Loading {
        path: options.source_path.display().to_string(),
    });
    let source_path = options.source_path.clone();
    let documents = tokio::task::spawn_blocking(move || loader::load_documents(&source_path))
        .await
        .context("document loader task failed")??;
    if documents.is_empty() {
        tracing::warn!(path = %options.source_path.display(), "no documents found");
        progress.report(IngestProgressEvent::Completed {
            vectors: 0,
            dry_run: options.dry_run,
        });
        return Ok(report);
    }
    report.documents = documents.len();

    let chunks = chunk::chunk_documents(&documents, options.chunk_size, options.overlap)?;
    report.chunks = chunks.len();
    tracing::info!(
        documents = report.documents,
        chunks = report.chunks,
        "prepared chunks"
    );
    progress.report(IngestProgressEvent::Chunked {
        documents: report.documents as u64,
        chunks: report.chunks as u64,
    });

    if options.dry_run {
        tracing::info!("dry run: skipping embedding and upsert");
        progress.report(IngestProgressEvent::Completed {
            vectors: 0,
            dry_run: true,
        });
        return Ok(report);
    }

    // validate() guarantees an index name outside dry runs
    let index = options.index_name.as_deref().unwrap_or_default();
    let namespace = options.namespace.as_deref().filter(|ns| !ns.is_empty());

    let embedder = backends
        .embedding_backend(options)
        .await
        .with_context(|| {
            format!(
                "failed to initialize embedding model '{}'",
                options.embedding_model
            )
        })?;
    let dims = embedder.dims();

    let store = backends
        .vector_store(options)
        .await
        .context("failed to initialize vector store")?;
    store
        .ensure_index(index, dims)
        .await
        .with_context(|| format!("failed to prepare index '{}'", index))?;

    let total_batches = chunks.len().div_ceil(options.batch_size);
    tracing::info!(
        model = embedder.model_name(),
        dims,
        store = store.name(),
        index,
        batches = total_batches,
        "embedding and upserting"
    );

    for (i, batch) in chunks.chunks(options.batch_size).enumerate() {
        let n = i + 1;
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("embedding batch {}/{} failed", n, total_batches))?;

        if vectors.len() != batch.len() {
            bail!(
                "embedding batch {}/{}: expected {} vectors, got {}",
                n,
                total_batches,
                batch.len(),
                vectors.len()
            );
        }

        let mut records = Vec::with_capacity(batch.len());
        for (chunk, values) in batch.iter().zip(vectors) {
            if values.len() != dims {
                bail!(
                    "embedding for chunk {} has {} dimensions, expected {}",
                    chunk.id,
                    values.len(),
                    dims
                );
            }
            records.push(VectorRecord {
                id: chunk.id.clone(),
                values,
                metadata: chunk.metadata.clone(),
            });
        }

        store
            .upsert(index, namespace, &records)
            .await
            .with_context(|| format!("upsert of batch {}/{} failed", n, total_batches))?;

        report.batches += 1;
        report.vectors_upserted += records.len();
        tracing::debug!(batch = n, total = total_batches, "batch upserted");
        progress.report(IngestProgressEvent::Upserted {
            batch: n as u64,
            total: total_batches as u64,
            vectors: report.vectors_upserted as u64,
        });
    }

    progress.report(IngestProgressEvent::Completed {
        vectors: report.vectors_upserted as u64,
        dry_run: false,
    });
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> IngestOptions {
        IngestOptions::from_config(&Config::default(), "docs")
    }

    #[test]
    fn test_from_config_copies_settings() {
        let mut config = Config::default();
        config.pinecone.index = Some("handbook".to_string());
        config.pinecone.api_key = Some("key".to_string());
        config.chunking.chunk_size = 50;
        config.chunking.overlap = 5;
        config.embedding.batch_size = 8;

        let opts = IngestOptions::from_config(&config, "/tmp/docs");
        assert_eq!(opts.index_name.as_deref(), Some("handbook"));
        assert_eq!(opts.chunk_size, 50);
        assert_eq!(opts.overlap, 5);
        assert_eq!(opts.batch_size, 8);
        assert_eq!(opts.embedding_model, "all-MiniLM-L6-v2");
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_credential_then_index() {
        let mut opts = options();
        assert_eq!(opts.validate(), Err(ConfigError::MissingCredential));

        opts.api_key = Some("key".to_string());
        assert_eq!(opts.validate(), Err(ConfigError::MissingIndexName));

        opts.index_name = Some("docs".to_string());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_dry_run_needs_no_credentials() {
        let mut opts = options();
        opts.dry_run = true;
        assert!(opts.validate().is_ok());

        opts.batch_size = 0;
        assert_eq!(opts.validate(), Err(ConfigError::InvalidBatchSize));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut opts = options();
        opts.api_key = Some("pcsk_secret".to_string());
        let dbg = format!("{:?}", opts);
        assert!(!dbg.contains("pcsk_secret"));
    }
}
