//! fastembed-based local embedding backend.
//!
//! The ONNX model is downloaded from Hugging Face on first use and cached;
//! afterwards embeddings run entirely offline. Loading and inference both run
//! in `spawn_blocking`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{l2_normalize, EmbeddingBackend};

/// Embedding backend for local inference via fastembed.
pub struct LocalBackend {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

impl LocalBackend {
    /// Load `model` once. Fails for unknown model names or when the model
    /// cannot be downloaded or initialized.
    pub async fn new(model: &str, batch_size: usize) -> Result<Self> {
        let (fastembed_model, dims) = resolve_local_model(model)?;

        tracing::info!(model, dims, "loading local embedding model");
        let loaded = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))
        })
        .await??;

        Ok(Self {
            model_name: model.to_string(),
            dims,
            batch_size,
            model: Arc::new(Mutex::new(loaded)),
        })
    }
}

#[async_trait]
impl EmbeddingBackend for LocalBackend {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            let mut embeddings = model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))?;
            for v in embeddings.iter_mut() {
                l2_normalize(v);
            }
            Ok(embeddings)
        })
        .await?
    }
}

/// Canonical lowercase key for a model name, without an org prefix.
fn model_key(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    lower
        .strip_prefix("sentence-transformers/")
        .or_else(|| lower.strip_prefix("baai/"))
        .or_else(|| lower.strip_prefix("nomic-ai/"))
        .or_else(|| lower.strip_prefix("intfloat/"))
        .unwrap_or(&lower)
        .to_string()
}

fn resolve_local_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    use fastembed::EmbeddingModel as M;

    match model_key(name).as_str() {
        "all-minilm-l6-v2" => Ok((M::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((M::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((M::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((M::BGELargeENV15, 1024)),
        "nomic-embed-text-v1" => Ok((M::NomicEmbedTextV1, 768)),
        "nomic-embed-text-v1.5" => Ok((M::NomicEmbedTextV15, 768)),
        "multilingual-e5-small" => Ok((M::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((M::MultilingualE5Base, 768)),
        "multilingual-e5-large" => Ok((M::MultilingualE5Large, 1024)),
        _ => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            name
        ),
    }
}
