//! Index health overview.
//!
//! `campus inspect` shows what a scope's index holds and whether it still
//! lines up with the chunk store, so a stale index is caught before it
//! serves misaligned sources.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::chunk_store::load_chunks;
use crate::config::Config;
use crate::index::FlatL2Index;
use crate::layout::ScopePaths;
use crate::models::Scope;
use crate::retriever::fingerprint_matches;

/// What `campus inspect` reports for one scope.
#[derive(Debug, Clone)]
pub struct IndexSummary {
    pub paths: ScopePaths,
    pub index_bytes: Option<u64>,
    pub dims: Option<usize>,
    pub vectors: Option<usize>,
    pub built_at: Option<DateTime<Utc>>,
    pub chunks: Option<usize>,
    pub fingerprint_ok: Option<bool>,
}

impl IndexSummary {
    /// True when both files exist and agree.
    pub fn is_consistent(&self) -> bool {
        self.vectors.is_some()
            && self.vectors == self.chunks
            && self.fingerprint_ok.unwrap_or(false)
    }
}

/// Read whichever of the scope's files exist. Unreadable files are errors.
pub fn summarize(paths: &ScopePaths) -> Result<IndexSummary> {
    let index = if paths.index.exists() {
        Some(
            FlatL2Index::load(&paths.index)
                .with_context(|| format!("Failed to load index: {}", paths.index.display()))?,
        )
    } else {
        None
    };
    let chunks = if paths.chunks.exists() {
        Some(load_chunks(&paths.chunks)?)
    } else {
        None
    };

    let fingerprint_ok = match (&index, &chunks) {
        (Some(index), Some(chunks)) => Some(fingerprint_matches(index, chunks)),
        _ => None,
    };

    Ok(IndexSummary {
        paths: paths.clone(),
        index_bytes: std::fs::metadata(&paths.index).map(|m| m.len()).ok(),
        dims: index.as_ref().map(FlatL2Index::dims),
        vectors: index.as_ref().map(FlatL2Index::len),
        built_at: index.as_ref().and_then(FlatL2Index::built_at),
        chunks: chunks.as_ref().map(Vec::len),
        fingerprint_ok,
    })
}

pub fn run_inspect(config: &Config, scope: Option<&Scope>) -> Result<()> {
    let paths = ScopePaths::for_scope(config, scope);
    let summary = summarize(&paths)?;
    let label = scope.map(|s| s.to_string()).unwrap_or_else(|| "default".to_string());

    println!("Campus QA — Index {}", label);
    println!("================================");
    println!();
    println!("  Chunk store: {}", paths.chunks.display());
    match summary.chunks {
        Some(n) => println!("  Chunks:      {}", n),
        None => println!("  Chunks:      (missing)"),
    }
    println!();
    println!("  Index:       {}", paths.index.display());
    match (summary.vectors, summary.dims) {
        (Some(vectors), Some(dims)) => {
            println!(
                "  Size:        {}",
                format_bytes(summary.index_bytes.unwrap_or(0))
            );
            println!("  Vectors:     {}", vectors);
            println!("  Dimensions:  {}", dims);
            println!(
                "  Built:       {}",
                summary
                    .built_at
                    .map(format_built_at)
                    .unwrap_or_else(|| "unknown".to_string())
            );
        }
        _ => println!("  Vectors:     (missing)"),
    }

    if let Some(ok) = summary.fingerprint_ok {
        println!();
        let status = if summary.is_consistent() {
            "ok"
        } else if ok {
            "partial (index built with a limit)"
        } else {
            "STALE (re-run ingest)"
        };
        println!("  Status:      {}", status);
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Absolute time plus a relative hint, e.g. "2026-05-01 10:30 UTC (3 days ago)".
fn format_built_at(at: DateTime<Utc>) -> String {
    let delta = (Utc::now() - at).num_seconds();
    let relative = if delta < 0 {
        None
    } else if delta < 60 {
        Some("just now".to_string())
    } else if delta < 3600 {
        Some(plural(delta / 60, "min"))
    } else if delta < 86400 {
        Some(plural(delta / 3600, "hour"))
    } else {
        Some(plural(delta / 86400, "day"))
    };
    let absolute = at.format("%Y-%m-%d %H:%M UTC").to_string();
    match relative {
        Some(rel) => format!("{} ({})", absolute, rel),
        None => absolute,
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_store::ChunkWriter;
    use crate::index;
    use crate::models::ChunkRecord;
    use serde_json::Map;
    use tempfile::TempDir;

    fn record(text: &str) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            doc_name: None,
            page: None,
            source_path: None,
            metadata: Map::new(),
        }
    }

    #[test]
    fn summary_of_consistent_scope() {
        let tmp = TempDir::new().unwrap();
        let paths = ScopePaths {
            chunks: tmp.path().join("c.jsonl"),
            index: tmp.path().join("v.index"),
        };
        let records = vec![record("a"), record("b")];
        let mut writer = ChunkWriter::create(&paths.chunks).unwrap();
        for r in &records {
            writer.write(r).unwrap();
        }
        writer.finish().unwrap();
        let mut idx = FlatL2Index::new(3);
        idx.add(&[vec![0.0; 3], vec![1.0; 3]]).unwrap();
        idx.seal(index::fingerprint(&records));
        idx.save(&paths.index).unwrap();

        let summary = summarize(&paths).unwrap();
        assert_eq!(summary.dims, Some(3));
        assert_eq!(summary.vectors, Some(2));
        assert_eq!(summary.chunks, Some(2));
        assert!(summary.built_at.is_some());
        assert!(summary.is_consistent());
    }

    #[test]
    fn missing_files_are_reported_not_errors() {
        let tmp = TempDir::new().unwrap();
        let paths = ScopePaths {
            chunks: tmp.path().join("c.jsonl"),
            index: tmp.path().join("v.index"),
        };
        let summary = summarize(&paths).unwrap();
        assert_eq!(summary.vectors, None);
        assert_eq!(summary.fingerprint_ok, None);
        assert!(!summary.is_consistent());
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
