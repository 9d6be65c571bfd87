//! Ingestion progress reporting.
//!
//! Embedding a course's chunks is slow (one throttled API call per chunk),
//! so `campus ingest` reports each step. Progress goes to **stderr** so
//! stdout stays parseable for scripts.

use std::io::Write;

/// A single progress event emitted by the ingestor.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Chunk store loaded; `total` records will be embedded.
    Loading { chunks: String, total: u64 },
    /// About to embed record `n` of `total`.
    Embedding { n: u64, total: u64, label: String },
    /// A batch of vectors was added to the index.
    Flushed { total: u64 },
}

/// Reports ingest progress. Implementations write to stderr (human or JSON).
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "Embedding 12/1,234: algebra.txt p3".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Loading { chunks, total } => {
                format!("Found {} chunks in {}\n", format_number(*total), chunks)
            }
            IngestProgressEvent::Embedding { n, total, label } => format!(
                "Embedding {}/{}: {}\n",
                format_number(*n),
                format_number(*total),
                label
            ),
            IngestProgressEvent::Flushed { total } => {
                format!("Added batch to index. Total embedded so far: {}\n", format_number(*total))
            }
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Loading { chunks, total } => serde_json::json!({
                "event": "progress",
                "phase": "loading",
                "chunks": chunks,
                "total": total
            }),
            IngestProgressEvent::Embedding { n, total, label } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total,
                "label": label
            }),
            IngestProgressEvent::Flushed { total } => serde_json::json!({
                "event": "progress",
                "phase": "flushed",
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
