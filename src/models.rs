//! Core data models that flow through the ingestion pipeline.
//!
//! Documents come out of the [`loader`](crate::loader), chunks out of the
//! [`chunk`](crate::chunk) module, and vector records go into a
//! [`VectorStore`](crate::vector_store::VectorStore).

use serde::Serialize;
use std::collections::BTreeMap;

/// String metadata attached to documents, chunks, and stored vectors.
///
/// A `BTreeMap` so serialized payloads have a stable key order.
pub type Metadata = BTreeMap<String, String>;

/// A text document discovered on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Hex SHA-256 of the document's source path.
    pub id: String,
    /// Decoded, trimmed file contents. Never empty.
    pub text: String,
    /// `source_path` and `file_name`.
    pub metadata: Metadata,
}

/// A word-window segment of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `"{document_id}:{chunk_index}"`.
    pub id: String,
    pub text: String,
    /// Parent metadata plus `chunk_index` and `doc_id`.
    pub metadata: Metadata,
}

/// An (id, vector, metadata) triple sent to a vector store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub batches: usize,
    pub vectors_upserted: usize,
    pub dry_run: bool,
}
