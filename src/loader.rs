//! Filesystem document loader.
//!
//! Walks a file or directory, keeps plain-text-like files (`.md`,
//! `.markdown`, `.txt`, `.rst`), and turns each non-empty one into a
//! [`Document`] whose id is derived from its path, not its contents, so
//! re-ingesting the same tree overwrites rather than duplicates.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::{Document, Metadata};

/// Lowercase extensions picked up when walking a directory.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "rst"];

/// Load every eligible document under `path`.
///
/// A directly named file is always read; directories are walked recursively
/// and filtered by [`SUPPORTED_EXTENSIONS`]. Files whose trimmed text is empty
/// are skipped. Results are sorted by source path.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let root = std::fs::canonicalize(path)
        .with_context(|| format!("missing or invalid source path: {}", path.display()))?;

    let mut docs = Vec::new();
    for file in candidate_files(&root)? {
        let text = read_text(&file)?;
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!(path = %file.display(), "skipping empty document");
            continue;
        }
        docs.push(make_document(&file, text));
    }

    docs.sort_by(|a, b| a.metadata["source_path"].cmp(&b.metadata["source_path"]));
    Ok(docs)
}

/// Returns `true` if the file's extension is one of [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Deterministic document id for a path: hex SHA-256 of its string form.
pub fn document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn candidate_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        // Follows symlinked files; dangling links fail `is_file` and are skipped.
        if entry.path().is_file() && is_supported(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Read a file as UTF-8, dropping byte sequences that are not valid UTF-8.
fn read_text(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(decode_utf8_ignoring_invalid(&bytes))
}

fn decode_utf8_ignoring_invalid(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

fn make_document(path: &Path, text: &str) -> Document {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut metadata = Metadata::new();
    metadata.insert("source_path".to_string(), path.display().to_string());
    metadata.insert("file_name".to_string(), file_name);

    Document {
        id: document_id(path),
        text: text.to_string(),
        metadata,
    }
}
