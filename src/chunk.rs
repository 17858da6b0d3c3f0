//! Word-window text chunker.
//!
//! Splits document text into overlapping windows of whitespace-delimited
//! words. Counting words instead of bytes keeps the split locale-agnostic
//! and never cuts a multi-byte character in half.
//!
//! Each chunk's id is `"{document_id}:{chunk_index}"`, so the same document
//! chunked with the same parameters always yields the same ids.

use anyhow::Result;

use crate::error::ConfigError;
use crate::models::{Chunk, Document};

/// Check the `overlap < chunk_size` precondition.
///
/// A non-positive `chunk_size` disables splitting, so any overlap is accepted.
pub fn validate_params(chunk_size: i64, overlap: usize) -> Result<(), ConfigError> {
    if chunk_size > 0 && overlap as u64 >= chunk_size as u64 {
        return Err(ConfigError::OverlapTooLarge {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

/// Split text into windows of `chunk_size` words sharing `overlap` words.
///
/// - No words ⇒ no chunks.
/// - `chunk_size <= 0` ⇒ the whole text as a single chunk.
/// - Otherwise words are re-joined with single spaces.
pub fn split_into_chunks(text: &str, chunk_size: i64, overlap: usize) -> Result<Vec<String>> {
    validate_params(chunk_size, overlap)?;

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }
    if chunk_size <= 0 {
        return Ok(vec![text.trim().to_string()]);
    }

    let size = chunk_size as usize;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        // overlap < size, so this always moves forward
        start = end.saturating_sub(overlap);
    }

    Ok(chunks)
}

/// Chunk every document, attaching ids and inherited metadata.
pub fn chunk_documents(docs: &[Document], chunk_size: i64, overlap: usize) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for doc in docs {
        for (index, text) in split_into_chunks(&doc.text, chunk_size, overlap)?
            .into_iter()
            .enumerate()
        {
            chunks.push(make_chunk(doc, index, text));
        }
    }
    Ok(chunks)
}

fn make_chunk(doc: &Document, index: usize, text: String) -> Chunk {
    let mut metadata = doc.metadata.clone();
    metadata.insert("chunk_index".to_string(), index.to_string());
    metadata.insert("doc_id".to_string(), doc.id.clone());

    Chunk {
        id: format!("{}:{}", doc.id, index),
        text,
        metadata,
    }
}
