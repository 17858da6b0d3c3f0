//! Configuration error type.
//!
//! Everything else in the crate reports failures through `anyhow` with
//! `.context(...)` naming the operation. Configuration mistakes get their own
//! type so callers can tell them apart from backend failures:
//!
//! ```rust
//! use docs_ingest::error::ConfigError;
//!
//! let err: anyhow::Error = ConfigError::MissingIndexName.into();
//! assert!(err.downcast_ref::<ConfigError>().is_some());
//! ```

use thiserror::Error;

/// A configuration problem detected before any I/O takes place.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("PINECONE_API_KEY is required (or use --dry-run)")]
    MissingCredential,

    #[error("--index or PINECONE_INDEX is required")]
    MissingIndexName,

    #[error("batch size must be > 0")]
    InvalidBatchSize,

    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: i64, overlap: usize },

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("unknown embedding provider: '{0}'. Must be local, ollama, or openai")]
    UnknownProvider(String),
}

/// Returns `true` if `err` (or anything in its context chain) is a [`ConfigError`].
pub fn is_config_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<ConfigError>().is_some())
}
