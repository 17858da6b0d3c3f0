//! Ingest progress reporting.
//!
//! Reports what the pipeline is doing (loading, chunking, embedding batches)
//! so users can see how much work is left. Progress is emitted on **stderr**
//! so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event from the ingest pipeline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IngestProgressEvent {
    /// Walking the source path. Total unknown.
    Loading { path: String },
    /// Documents were split into chunks.
    Chunked { documents: u64, chunks: u64 },
    /// Batch `batch` of `total` was embedded and upserted.
    Upserted { batch: u64, total: u64, vectors: u64 },
    /// The run finished.
    Completed { vectors: u64, dry_run: bool },
}

/// Reports ingest progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the ingest pipeline.
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  upserting  3 / 12 batches (192 vectors)".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Loading { path } => format!("ingest {}  loading...\n", path),
            IngestProgressEvent::Chunked { documents, chunks } => format!(
                "ingest  chunked  {} documents into {} chunks\n",
                format_number(*documents),
                format_number(*chunks)
            ),
            IngestProgressEvent::Upserted {
                batch,
                total,
                vectors,
            } => format!(
                "ingest  upserting  {} / {} batches ({} vectors)\n",
                format_number(*batch),
                format_number(*total),
                format_number(*vectors)
            ),
            IngestProgressEvent::Completed { vectors, dry_run } => {
                if *dry_run {
                    "ingest  done (dry run)\n".to_string()
                } else {
                    format!("ingest  done  {} vectors\n", format_number(*vectors))
                }
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &IngestProgressEvent) -> serde_json::Value {
    match event {
        IngestProgressEvent::Loading { path } => serde_json::json!({
            "event": "progress",
            "phase": "loading",
            "path": path
        }),
        IngestProgressEvent::Chunked { documents, chunks } => serde_json::json!({
            "event": "progress",
            "phase": "chunked",
            "documents": documents,
            "chunks": chunks
        }),
        IngestProgressEvent::Upserted {
            batch,
            total,
            vectors,
        } => serde_json::json!({
            "event": "progress",
            "phase": "upserting",
            "n": batch,
            "total": total,
            "vectors": vectors
        }),
        IngestProgressEvent::Completed { vectors, dry_run } => serde_json::json!({
            "event": "done",
            "vectors": vectors,
            "dry_run": dry_run
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn json_events_carry_phase() {
        let v = event_json(&IngestProgressEvent::Upserted {
            batch: 2,
            total: 5,
            vectors: 128,
        });
        assert_eq!(v["phase"], "upserting");
        assert_eq!(v["n"], 2);
        assert_eq!(v["total"], 5);

        let done = event_json(&IngestProgressEvent::Completed {
            vectors: 0,
            dry_run: true,
        });
        assert_eq!(done["event"], "done");
        assert_eq!(done["dry_run"], true);
    }
}
