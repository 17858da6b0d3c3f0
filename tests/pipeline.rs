//! End-to-end pipeline tests with in-process backends.
//!
//! The embedding backend is a deterministic fake and the vector store is
//! `InMemoryVectorStore`, so these run offline.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use docs_ingest::config::Config;
use docs_ingest::embedding::EmbeddingBackend;
use docs_ingest::error::{is_config_error, ConfigError};
use docs_ingest::ingest::{ingest, BackendFactory, IngestOptions};
use docs_ingest::loader::document_id;
use docs_ingest::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress};
use docs_ingest::vector_store::{InMemoryVectorStore, VectorStore};

const INDEX: &str = "docs";

/// Hashes word lengths into a fixed-size vector.
struct FakeEmbedder {
    dims: usize,
    calls: Arc<AtomicUsize>,
    /// 1-based batch number that fails, if any.
    fail_on_call: Option<usize>,
}

#[async_trait]
impl EmbeddingBackend for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            bail!("embedding service unavailable");
        }
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0; self.dims];
                for (i, word) in text.split_whitespace().enumerate() {
                    v[i % self.dims] += word.len() as f32;
                }
                v
            })
            .collect())
    }
}

struct FakeBackends {
    store: Arc<InMemoryVectorStore>,
    dims: usize,
    fail_on_call: Option<usize>,
    embedder_builds: AtomicUsize,
    store_builds: AtomicUsize,
    embed_calls: Arc<AtomicUsize>,
}

impl FakeBackends {
    fn new(dims: usize) -> Self {
        Self::sharing(Arc::new(InMemoryVectorStore::new()), dims)
    }

    fn sharing(store: Arc<InMemoryVectorStore>, dims: usize) -> Self {
        Self {
            store,
            dims,
            fail_on_call: None,
            embedder_builds: AtomicUsize::new(0),
            store_builds: AtomicUsize::new(0),
            embed_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn builds(&self) -> usize {
        self.embedder_builds.load(Ordering::SeqCst) + self.store_builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendFactory for FakeBackends {
    async fn embedding_backend(
        &self,
        _options: &IngestOptions,
    ) -> Result<Box<dyn EmbeddingBackend>> {
        self.embedder_builds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEmbedder {
            dims: self.dims,
            calls: Arc::clone(&self.embed_calls),
            fail_on_call: self.fail_on_call,
        }))
    }

    async fn vector_store(&self, _options: &IngestOptions) -> Result<Box<dyn VectorStore>> {
        self.store_builds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Arc::clone(&self.store)))
    }
}

/// Records every event it sees.
#[derive(Default)]
struct RecordingProgress {
    events: std::sync::Mutex<Vec<IngestProgressEvent>>,
}

impl IngestProgressReporter for RecordingProgress {
    fn report(&self, event: IngestProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn options_for(path: &Path) -> IngestOptions {
    let mut opts = IngestOptions::from_config(&Config::default(), path);
    opts.index_name = Some(INDEX.to_string());
    opts.api_key = Some("test-key".to_string());
    opts
}

fn words(n: usize, prefix: &str) -> String {
    (0..n)
        .map(|i| format!("{}{}", prefix, i))
        .collect::<Vec<_>>()
        .join(" ")
}

fn docs_dir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("guide.md"), words(120, "g")).unwrap();
    fs::write(tmp.path().join("notes.txt"), words(45, "n")).unwrap();
    fs::create_dir_all(tmp.path().join("sub")).unwrap();
    fs::write(tmp.path().join("sub/api.rst"), words(30, "a")).unwrap();
    fs::write(tmp.path().join("logo.png"), [0x89u8, 0x50, 0x4e, 0x47]).unwrap();
    tmp
}

#[tokio::test]
async fn test_ingest_upserts_every_chunk() {
    let tmp = docs_dir();
    let backends = FakeBackends::new(8);
    let mut opts = options_for(tmp.path());
    opts.chunk_size = 50;
    opts.overlap = 10;
    opts.batch_size = 3;

    let report = ingest(&opts, &backends, &NoProgress).await.unwrap();

    // guide: 120 words -> starts 0, 40, 80 -> 3 chunks; notes: 1; api: 1
    assert_eq!(report.documents, 3);
    assert_eq!(report.chunks, 5);
    assert_eq!(report.batches, 2);
    assert_eq!(report.vectors_upserted, 5);
    assert!(!report.dry_run);

    assert_eq!(backends.store.index_dims(INDEX), Some(8));
    assert_eq!(backends.store.len(INDEX, None), 5);
    assert_eq!(backends.store.upsert_calls(), 2);
    assert_eq!(backends.embedder_builds.load(Ordering::SeqCst), 1);

    let guide = tmp.path().canonicalize().unwrap().join("guide.md");
    let first = backends
        .store
        .get(INDEX, None, &format!("{}:0", document_id(&guide)))
        .unwrap();
    assert_eq!(first.metadata["chunk_index"], "0");
    assert_eq!(first.metadata["file_name"], "guide.md");
    assert_eq!(first.values.len(), 8);
}

#[tokio::test]
async fn test_dry_run_never_builds_backends() {
    let tmp = docs_dir();
    let backends = FakeBackends::new(8);
    let mut opts = options_for(tmp.path());
    opts.dry_run = true;
    // Credentials present or not, nothing is constructed.
    for api_key in [Some("test-key".to_string()), None] {
        opts.api_key = api_key;
        let report = ingest(&opts, &backends, &NoProgress).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.documents, 3);
        assert!(report.chunks > 0);
        assert_eq!(report.vectors_upserted, 0);
    }

    assert_eq!(backends.builds(), 0);
    assert_eq!(backends.embed_calls.load(Ordering::SeqCst), 0);
    assert!(backends.store.index_dims(INDEX).is_none());
}

#[tokio::test]
async fn test_rerun_overwrites_same_ids() {
    let tmp = docs_dir();
    let store = Arc::new(InMemoryVectorStore::new());
    let mut opts = options_for(tmp.path());
    opts.chunk_size = 40;
    opts.overlap = 5;

    let first = FakeBackends::sharing(Arc::clone(&store), 4);
    ingest(&opts, &first, &NoProgress).await.unwrap();
    let ids_after_first = store.ids(INDEX, None);

    let second = FakeBackends::sharing(Arc::clone(&store), 4);
    let report = ingest(&opts, &second, &NoProgress).await.unwrap();
    let ids_after_second = store.ids(INDEX, None);

    assert_eq!(ids_after_first, ids_after_second);
    assert_eq!(store.len(INDEX, None), report.chunks);
}

#[tokio::test]
async fn test_namespace_is_passed_through() {
    let tmp = docs_dir();
    let backends = FakeBackends::new(4);
    let mut opts = options_for(tmp.path());
    opts.namespace = Some("team-a".to_string());

    let report = ingest(&opts, &backends, &NoProgress).await.unwrap();
    assert_eq!(backends.store.len(INDEX, Some("team-a")), report.chunks);
    assert!(backends.store.is_empty(INDEX, None));
}

#[tokio::test]
async fn test_dimension_mismatch_with_existing_index_fails() {
    let tmp = docs_dir();
    let store = Arc::new(InMemoryVectorStore::new());
    store.ensure_index(INDEX, 16).await.unwrap();

    let backends = FakeBackends::sharing(Arc::clone(&store), 8);
    let err = ingest(&options_for(tmp.path()), &backends, &NoProgress)
        .await
        .unwrap_err();

    let msg = format!("{:#}", err);
    assert!(msg.contains("batch 1/"), "{}", msg);
    assert!(msg.contains("does not match"), "{}", msg);
    assert!(!is_config_error(&err));
    assert!(store.is_empty(INDEX, None));
}

#[tokio::test]
async fn test_failed_batch_aborts_and_keeps_earlier_batches() {
    let tmp = docs_dir();
    let mut backends = FakeBackends::new(4);
    backends.fail_on_call = Some(2);
    let mut opts = options_for(tmp.path());
    opts.chunk_size = 50;
    opts.overlap = 10;
    opts.batch_size = 2;

    let err = ingest(&opts, &backends, &NoProgress).await.unwrap_err();

    let msg = format!("{:#}", err);
    assert!(msg.contains("embedding batch 2/3 failed"), "{}", msg);
    assert!(msg.contains("embedding service unavailable"), "{}", msg);
    // First batch stays committed; nothing after the failure is attempted.
    assert_eq!(backends.store.len(INDEX, None), 2);
    assert_eq!(backends.store.upsert_calls(), 1);
    assert_eq!(backends.embed_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_credential_is_config_error() {
    let tmp = docs_dir();
    let backends = FakeBackends::new(4);
    let mut opts = options_for(tmp.path());
    opts.api_key = None;

    let err = ingest(&opts, &backends, &NoProgress).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::MissingCredential)
    );
    assert_eq!(backends.builds(), 0);
}

#[tokio::test]
async fn test_overlap_not_smaller_than_chunk_size_rejected() {
    let tmp = docs_dir();
    let backends = FakeBackends::new(4);
    let mut opts = options_for(tmp.path());
    opts.chunk_size = 10;
    opts.overlap = 10;

    let err = ingest(&opts, &backends, &NoProgress).await.unwrap_err();
    assert!(is_config_error(&err));
}

#[tokio::test]
async fn test_missing_source_path_fails() {
    let tmp = TempDir::new().unwrap();
    let backends = FakeBackends::new(4);
    let opts = options_for(&tmp.path().join("nope"));

    let err = ingest(&opts, &backends, &NoProgress).await.unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("missing or invalid source path"), "{}", message);
    assert!(message.contains("nope"));
    assert_eq!(backends.builds(), 0);
}

#[tokio::test]
async fn test_no_documents_is_empty_success() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("data.json"), "{}").unwrap();
    fs::write(tmp.path().join("empty.md"), "   \n").unwrap();
    let backends = FakeBackends::new(4);

    let report = ingest(&options_for(tmp.path()), &backends, &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.documents, 0);
    assert_eq!(report.chunks, 0);
    assert_eq!(backends.builds(), 0);
}

#[tokio::test]
async fn test_thousand_words_make_two_chunks() {
    let tmp = TempDir::new().unwrap();
    let text = words(1000, "w");
    fs::write(tmp.path().join("notes.md"), &text).unwrap();
    let backends = FakeBackends::new(4);
    let mut opts = options_for(tmp.path());
    opts.chunk_size = 800;
    opts.overlap = 100;

    let report = ingest(&opts, &backends, &NoProgress).await.unwrap();
    assert_eq!(report.chunks, 2);

    let doc_id = document_id(&tmp.path().canonicalize().unwrap().join("notes.md"));
    let c0 = backends
        .store
        .get(INDEX, None, &format!("{}:0", doc_id))
        .unwrap();
    let c1 = backends
        .store
        .get(INDEX, None, &format!("{}:1", doc_id))
        .unwrap();
    assert_eq!(c0.metadata["doc_id"], doc_id);
    assert_eq!(c0.metadata["chunk_index"], "0");
    assert_eq!(c1.metadata["chunk_index"], "1");
    assert_eq!(backends.store.ids(INDEX, None).len(), 2);
}

#[tokio::test]
async fn test_empty_file_skipped_readme_kept() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("empty.txt"), "").unwrap();
    fs::write(tmp.path().join("readme.rst"), "hello world").unwrap();
    let backends = FakeBackends::new(4);
    let mut opts = options_for(tmp.path());
    opts.dry_run = true;

    let report = ingest(&opts, &backends, &NoProgress).await.unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, 1);
}

#[tokio::test]
async fn test_progress_events_in_order() {
    let tmp = docs_dir();
    let backends = FakeBackends::new(4);
    let progress = RecordingProgress::default();
    let mut opts = options_for(tmp.path());
    opts.batch_size = 2;

    let report = ingest(&opts, &backends, &progress).await.unwrap();
    let events = progress.events.lock().unwrap();

    assert!(matches!(events[0], IngestProgressEvent::Loading { .. }));
    assert_eq!(
        events[1],
        IngestProgressEvent::Chunked {
            documents: 3,
            chunks: 3
        }
    );
    assert_eq!(
        events.last(),
        Some(&IngestProgressEvent::Completed {
            vectors: report.vectors_upserted as u64,
            dry_run: false
        })
    );
    let upserts = events
        .iter()
        .filter(|e| matches!(e, IngestProgressEvent::Upserted { .. }))
        .count();
    assert_eq!(upserts, report.batches);
}
