//! `campus chunk`: turn course documents into a chunk store.

use anyhow::Result;
use std::path::PathBuf;

use crate::chunk::{chunk_words, clean_text};
use crate::chunk_store::ChunkWriter;
use crate::config::Config;
use crate::corpus::{self, SourceDocument};
use crate::layout::ScopePaths;
use crate::models::{ChunkRecord, Scope};

/// Counters reported at the end of a chunking run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunkStats {
    pub documents: u64,
    pub pages: u64,
    pub skipped_pages: u64,
    pub unreadable: u64,
    pub chunks: u64,
}

/// Chunk every page of every document, in discovery order.
pub fn build_chunks(
    config: &Config,
    docs: &[SourceDocument],
) -> (Vec<ChunkRecord>, ChunkStats) {
    let mut stats = ChunkStats::default();
    let mut records = Vec::new();

    for doc in docs {
        let body = match corpus::read_document(doc) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", doc.relative, e);
                stats.unreadable += 1;
                continue;
            }
        };
        stats.documents += 1;

        for page in corpus::split_pages(&body) {
            stats.pages += 1;
            let cleaned = clean_text(&page.text);
            if cleaned.chars().count() < config.chunking.min_text_chars {
                match page.number {
                    Some(n) => tracing::warn!("No usable text in {} page {}", doc.relative, n),
                    None => tracing::warn!("No usable text in {}", doc.relative),
                }
                stats.skipped_pages += 1;
                continue;
            }

            for text in chunk_words(
                &cleaned,
                config.chunking.chunk_words,
                config.chunking.overlap_words,
            ) {
                records.push(page_record(doc, page.number, text));
            }
        }
    }

    stats.chunks = records.len() as u64;
    (records, stats)
}

fn page_record(doc: &SourceDocument, page: Option<u32>, text: String) -> ChunkRecord {
    let mut metadata = doc.metadata.clone();
    // fixed fields win over folder metadata with the same key
    for key in ["text", "doc_name", "page", "source_path"] {
        metadata.remove(key);
    }
    ChunkRecord {
        text,
        doc_name: Some(doc.doc_name.clone()),
        page,
        source_path: Some(doc.path.to_string_lossy().to_string()),
        metadata,
    }
}

/// Run the chunker for one scope (or the whole corpus into the default store).
pub fn run_chunk(
    config: &Config,
    scope: Option<&Scope>,
    output: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let docs = corpus::discover(config, scope)?;
    let (records, stats) = build_chunks(config, &docs);
    let label = scope.map(|s| s.to_string()).unwrap_or_else(|| "all".to_string());

    if dry_run {
        println!("chunk {} (dry-run)", label);
        print_stats(&stats);
        return Ok(());
    }

    let out = output.unwrap_or_else(|| ScopePaths::for_scope(config, scope).chunks);
    let mut writer = ChunkWriter::create(&out)?;
    for record in &records {
        writer.write(record)?;
    }
    let written = writer.finish()?;

    println!("chunk {}", label);
    print_stats(&stats);
    println!("  chunks written: {}", written);
    println!("  output: {}", out.display());
    println!("ok");
    Ok(())
}

fn print_stats(stats: &ChunkStats) {
    println!("  documents: {}", stats.documents);
    println!("  pages: {}", stats.pages);
    println!("  skipped pages: {}", stats.skipped_pages);
    if stats.unreadable > 0 {
        println!("  unreadable files: {}", stats.unreadable);
    }
    println!("  chunks: {}", stats.chunks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(root: &Path, chunk_words: usize, overlap: usize) -> Config {
        parse_config(&format!(
            "[corpus]\ndocs_dir = \"{}\"\nindex_dir = \"{}\"\n\n[chunking]\nchunk_words = {}\noverlap_words = {}\nmin_text_chars = 10\n",
            root.join("docs").display(),
            root.join("data").display(),
            chunk_words,
            overlap
        ))
        .unwrap()
    }

    fn words(prefix: &str, n: usize) -> String {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn pages_become_windows_with_metadata() {
        let tmp = TempDir::new().unwrap();
        let cfg = setup(tmp.path(), 10, 2);
        let subject = tmp.path().join("docs/FY/Sem-1/Maths");
        std::fs::create_dir_all(&subject).unwrap();
        std::fs::write(subject.join("metadata.json"), r#"{"teacher": "Prof. Rao"}"#).unwrap();
        let body = format!("{}\x0cshort\x0c{}", words("a", 12), words("c", 5));
        std::fs::write(subject.join("unit1.txt"), body).unwrap();

        let docs = corpus::discover(&cfg, None).unwrap();
        let (records, stats) = build_chunks(&cfg, &docs);

        assert_eq!(stats.documents, 1);
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.skipped_pages, 1);
        assert_eq!(stats.chunks, 3);

        // 12 words, window 10, stride 8: [0..10], [8..12]
        assert_eq!(records[0].page, Some(1));
        assert_eq!(records[1].text, "a8 a9 a10 a11");
        assert_eq!(records[2].page, Some(3));
        assert_eq!(records[2].meta_str("teacher"), Some("Prof. Rao"));
        assert_eq!(records[2].meta_str("subject"), Some("Maths"));
        assert_eq!(records[2].doc_name.as_deref(), Some("unit1.txt"));
    }

    #[test]
    fn run_chunk_writes_scope_store() {
        let tmp = TempDir::new().unwrap();
        let cfg = setup(tmp.path(), 50, 5);
        let subject = tmp.path().join("docs/FY/Sem-1/Physics");
        std::fs::create_dir_all(&subject).unwrap();
        std::fs::write(subject.join("optics.md"), words("w", 20)).unwrap();

        let scope = Scope::new("FY", "Sem-1");
        run_chunk(&cfg, Some(&scope), None, false).unwrap();

        let store = tmp.path().join("data/FY/Sem-1/FY_Sem-1_chunks.jsonl");
        let loaded = crate::chunk_store::load_chunks(&store).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].page, None);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let cfg = setup(tmp.path(), 50, 5);
        let subject = tmp.path().join("docs/FY/Sem-1/Physics");
        std::fs::create_dir_all(&subject).unwrap();
        std::fs::write(subject.join("optics.md"), words("w", 20)).unwrap();

        run_chunk(&cfg, None, None, true).unwrap();
        assert!(!tmp.path().join("data").exists());
    }
}
