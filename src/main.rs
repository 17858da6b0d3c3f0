//! # docs-ingest CLI
//!
//! Loads text documents, chunks them, embeds the chunks, and upserts the
//! vectors into a Pinecone index. Also serves the same pipeline over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! docs-ingest --config ./config/docs-ingest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docs-ingest ingest <path>` | Ingest a file or directory |
//! | `docs-ingest serve` | Start the HTTP upload server |
//!
//! ## Examples
//!
//! ```bash
//! # Count documents and chunks without touching Pinecone
//! docs-ingest ingest ./docs --dry-run
//!
//! # Ingest into an index namespace
//! PINECONE_API_KEY=... docs-ingest ingest ./docs --index handbook --namespace eng
//! ```
//!
//! Settings come from the config file, then environment variables, then the
//! flags below; later sources win.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docs_ingest::config::Config;
use docs_ingest::ingest::{run_ingest, IngestOptions};
use docs_ingest::models::IngestReport;
use docs_ingest::progress::ProgressMode;
use docs_ingest::server;

/// docs-ingest — push plain-text documentation into a vector index.
#[derive(Parser)]
#[command(
    name = "docs-ingest",
    about = "Chunk, embed, and upsert text documents into a Pinecone index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Optional; a missing file means defaults.
    #[arg(long, global = true, default_value = "./config/docs-ingest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file or directory.
    ///
    /// Directories are walked recursively; only `.md`, `.markdown`, `.txt`
    /// and `.rst` files are read. A file named directly is read regardless
    /// of its extension.
    Ingest(IngestArgs),

    /// Start the HTTP upload server on `[server].bind`.
    Serve,
}

#[derive(clap::Args)]
struct IngestArgs {
    /// File or directory to ingest.
    path: PathBuf,

    /// Target index name (env: PINECONE_INDEX).
    #[arg(long)]
    index: Option<String>,

    /// Index namespace (env: PINECONE_NAMESPACE).
    #[arg(long)]
    namespace: Option<String>,

    /// Words per chunk; zero or negative keeps documents whole.
    #[arg(long, allow_negative_numbers = true)]
    chunk_size: Option<i64>,

    /// Words shared between consecutive chunks.
    #[arg(long)]
    overlap: Option<usize>,

    /// Chunks per embedding and upsert batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Embedding model name (env: EMBEDDING_MODEL).
    #[arg(long)]
    embedding_model: Option<String>,

    /// Cloud for a newly created index.
    #[arg(long)]
    cloud: Option<String>,

    /// Region for a newly created index.
    #[arg(long)]
    region: Option<String>,

    /// Load and chunk only; skip embedding and upsert.
    #[arg(long)]
    dry_run: bool,

    /// Progress on stderr. Defaults to human when stderr is a terminal.
    #[arg(long, value_enum)]
    progress: Option<ProgressArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

impl IngestArgs {
    /// Apply command-line overrides on top of file and environment settings.
    fn apply(&self, cfg: &mut Config) {
        if let Some(index) = &self.index {
            cfg.pinecone.index = Some(index.clone());
        }
        if let Some(namespace) = &self.namespace {
            cfg.pinecone.namespace = Some(namespace.clone());
        }
        if let Some(chunk_size) = self.chunk_size {
            cfg.chunking.chunk_size = chunk_size;
        }
        if let Some(overlap) = self.overlap {
            cfg.chunking.overlap = overlap;
        }
        if let Some(batch_size) = self.batch_size {
            cfg.embedding.batch_size = batch_size;
        }
        if let Some(model) = &self.embedding_model {
            cfg.embedding.model = model.clone();
        }
        if let Some(cloud) = &self.cloud {
            cfg.pinecone.cloud = cloud.clone();
        }
        if let Some(region) = &self.region {
            cfg.pinecone.region = region.clone();
        }
        if self.dry_run {
            cfg.dry_run = true;
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docs_ingest=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(path: &std::path::Path, report: &IngestReport) {
    println!("ingest {}", path.display());
    println!("  documents: {}", report.documents);
    println!("  chunks: {}", report.chunks);
    if report.dry_run {
        println!("  dry run: skipped embedding and upsert");
    } else {
        println!("  vectors upserted: {}", report.vectors_upserted);
    }
    println!("ok");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut cfg = Config::load(&cli.config)?;

    match cli.command {
        Commands::Ingest(args) => {
            args.apply(&mut cfg);
            cfg.validate()?;

            if !cfg.dry_run && cfg.pinecone.index.as_deref().map_or(true, str::is_empty) {
                eprintln!("Error: --index or PINECONE_INDEX is required.");
                std::process::exit(2);
            }

            let progress = args
                .progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();
            let options = IngestOptions::from_config(&cfg, &args.path);
            let report = run_ingest(&cfg, &options, progress.as_ref()).await?;
            print_summary(&args.path, &report);
        }
        Commands::Serve => {
            cfg.validate()?;
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
