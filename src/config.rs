//! Configuration: TOML file, then environment overrides.
//!
//! Every section is optional; an empty file (or no file at all) yields the
//! defaults below. Environment variables override the file, and CLI flags
//! override both (see `main.rs`).
//!
//! ```toml
//! dry_run = false
//!
//! [chunking]
//! chunk_size = 800
//! overlap = 100
//!
//! [embedding]
//! provider = "local"
//! model = "all-MiniLM-L6-v2"
//! batch_size = 64
//!
//! [pinecone]
//! index = "docs"
//! cloud = "aws"
//! region = "us-east-1"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::chunk;
use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Words per chunk. `<= 0` keeps each document whole.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: i64,
    /// Words shared between consecutive chunks.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> i64 {
    800
}
fn default_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Required for the HTTP providers; derived from the model for `local`.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: None,
            batch_size: default_batch_size(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Clone, Deserialize)]
pub struct PineconeConfig {
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Only ever read from `PINECONE_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// How many times to poll (one second apart) for a new index to become ready.
    #[serde(default = "default_ready_poll_attempts")]
    pub ready_poll_attempts: u32,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            index: None,
            namespace: None,
            cloud: default_cloud(),
            region: default_region(),
            api_key: None,
            api_base: default_api_base(),
            api_version: default_api_version(),
            ready_poll_attempts: default_ready_poll_attempts(),
        }
    }
}

impl std::fmt::Debug for PineconeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeConfig")
            .field("index", &self.index)
            .field("namespace", &self.namespace)
            .field("cloud", &self.cloud)
            .field("region", &self.region)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field("ready_poll_attempts", &self.ready_poll_attempts)
            .finish()
    }
}

fn default_cloud() -> String {
    "aws".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_api_base() -> String {
    "https://api.pinecone.io".to_string()
}
fn default_api_version() -> String {
    "2024-07".to_string()
}
fn default_ready_poll_attempts() -> u32 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024
}

impl Config {
    /// Load configuration for a run.
    ///
    /// Reads `path` if it exists (a missing file means "all defaults"), then
    /// applies process environment overrides. Call [`Config::validate`] once
    /// every layer, command-line flags included, has been merged.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            load_config(path)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay environment values on top of the current settings.
    ///
    /// `lookup` is usually `std::env::var`; tests pass a map instead.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PINECONE_API_KEY") {
            self.pinecone.api_key = Some(v);
        }
        if let Some(v) = get("PINECONE_INDEX") {
            self.pinecone.index = Some(v);
        }
        if let Some(v) = get("PINECONE_NAMESPACE") {
            self.pinecone.namespace = Some(v);
        }
        if let Some(v) = get("PINECONE_CLOUD") {
            self.pinecone.cloud = v;
        }
        if let Some(v) = get("PINECONE_REGION") {
            self.pinecone.region = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("EMBEDDING_PROVIDER") {
            self.embedding.provider = v;
        }
        // The INGEST_* names are the primary ones; the short forms are aliases.
        if let Some((key, v)) = first_of(&get, &["INGEST_CHUNK_SIZE", "CHUNK_SIZE"]) {
            self.chunking.chunk_size = parse_env(key, &v)?;
        }
        if let Some((key, v)) = first_of(&get, &["INGEST_OVERLAP", "CHUNK_OVERLAP"]) {
            self.chunking.overlap = parse_env(key, &v)?;
        }
        if let Some((key, v)) = first_of(&get, &["INGEST_BATCH_SIZE", "BATCH_SIZE"]) {
            self.embedding.batch_size = parse_env(key, &v)?;
        }
        if let Some(v) = get("INGEST_DRY_RUN") {
            self.dry_run = parse_bool("INGEST_DRY_RUN", &v)?;
        }
        Ok(())
    }

    /// Check settings that do not depend on the run's mode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        chunk::validate_params(self.chunking.chunk_size, self.chunking.overlap)?;
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        match self.embedding.provider.as_str() {
            "local" | "ollama" | "openai" => Ok(()),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Parse a TOML configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    Ok(config)
}

fn first_of<'k, F>(get: &F, keys: &[&'k str]) -> Option<(&'k str, String)>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| get(key).map(|v| (*key, v)))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
