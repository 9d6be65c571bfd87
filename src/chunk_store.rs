//! JSON-lines chunk store.
//!
//! One [`ChunkRecord`] per line. Records with empty text are dropped when
//! loading, so the ingestor and the retriever always agree on positions.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::models::ChunkRecord;

/// Load every usable record. An invalid line fails the whole load.
pub fn load_chunks(path: &Path) -> Result<Vec<ChunkRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open chunk store: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ChunkRecord = serde_json::from_str(line).with_context(|| {
            format!("Invalid JSONL in {} at line {}", path.display(), line_num + 1)
        })?;
        if record.text.trim().is_empty() {
            continue;
        }
        records.push(record);
    }
    Ok(records)
}

/// Number of usable records, i.e. `load_chunks(path)?.len()`.
pub fn count_records(path: &Path) -> Result<usize> {
    Ok(load_chunks(path)?.len())
}

/// Streams records to a fresh chunk store file.
pub struct ChunkWriter {
    path: PathBuf,
    out: BufWriter<File>,
    written: u64,
}

impl ChunkWriter {
    /// Create (or truncate) the file, creating parent directories as needed.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create chunk store: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write(&mut self, record: &ChunkRecord) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Flush and return the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        self.out
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tempfile::TempDir;

    fn record(text: &str, page: Option<u32>) -> ChunkRecord {
        let mut metadata = Map::new();
        metadata.insert("course".into(), "FY".into());
        ChunkRecord {
            text: text.to_string(),
            doc_name: Some("notes.txt".into()),
            page,
            source_path: Some("/docs/notes.txt".into()),
            metadata,
        }
    }

    #[test]
    fn written_records_load_back_in_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out/chunks.jsonl");

        let mut writer = ChunkWriter::create(&path).unwrap();
        writer.write(&record("first chunk — naïve café", Some(1))).unwrap();
        writer.write(&record("second chunk", None)).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("naïve café"), "non-ASCII text must be kept verbatim");

        let loaded = load_chunks(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], record("first chunk — naïve café", Some(1)));
        assert_eq!(loaded[1].page, None);
    }

    #[test]
    fn blank_lines_and_textless_records_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chunks.jsonl");
        std::fs::write(
            &path,
            "{\"text\":\"a\"}\n\n{\"text\":\"\"}\n{\"doc_name\":\"x\"}\n{\"text\":\"b\"}\n",
        )
        .unwrap();

        assert_eq!(count_records(&path).unwrap(), 2);
        let loaded = load_chunks(&path).unwrap();
        let texts: Vec<&str> = loaded.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn invalid_line_reports_line_number() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chunks.jsonl");
        std::fs::write(&path, "{\"text\":\"a\"}\n{not json\n").unwrap();

        let err = load_chunks(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(load_chunks(&tmp.path().join("nope.jsonl")).is_err());
    }
}
