//! # docs-ingest
//!
//! Batch ingestion of plain-text documentation into a vector index.
//!
//! Documents are read from disk, split into overlapping word windows,
//! embedded in batches, and upserted into a Pinecone index so a retrieval
//! service can query them later. Ids are derived from file paths and chunk
//! positions, so re-running over the same files overwrites instead of
//! duplicating.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌──────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedding │──▶│ Vector store │
//! │ md/txt.. │   │  words  │   │  backend  │   │   Pinecone   │
//! └──────────┘   └─────────┘   └───────────┘   └──────────────┘
//!        ▲                                             ▲
//!        └──────────── ingest (CLI / HTTP) ────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Configuration error type |
//! | [`models`] | Core data types |
//! | [`loader`] | Document discovery and decoding |
//! | [`chunk`] | Word-window chunking |
//! | [`embedding`] | Embedding backend abstraction |
//! | [`vector_store`] | Vector index abstraction |
//! | [`ingest`] | Pipeline orchestration |
//! | [`progress`] | Progress reporting on stderr |
//! | [`server`] | HTTP upload server |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod progress;
pub mod server;
pub mod vector_store;
