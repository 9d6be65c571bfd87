//! Top-k chunk retrieval for a scope.
//!
//! A scope's index and chunk store are loaded once and cached by their
//! resolved paths for the life of the [`Retriever`]. Missing or unreadable
//! files are logged and yield no results; only embedding and search
//! failures are errors.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::chunk_store::load_chunks;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::index::{self, FlatL2Index};
use crate::layout::ScopePaths;
use crate::models::{ChunkRecord, RetrievedChunk, Scope};
use crate::retry::{with_retry, RetryPolicy};

/// An index and the chunk store it was built from.
#[derive(Debug)]
pub struct LoadedScope {
    pub index: FlatL2Index,
    pub chunks: Vec<ChunkRecord>,
}

impl LoadedScope {
    /// Read both files, logging any disagreement between them.
    pub fn load(paths: &ScopePaths) -> Result<Self> {
        let index = FlatL2Index::load(&paths.index)
            .with_context(|| format!("Failed to load index: {}", paths.index.display()))?;
        let chunks = load_chunks(&paths.chunks)?;

        if index.len() != chunks.len() {
            tracing::warn!(
                "Index {} holds {} vectors but {} has {} chunks",
                paths.index.display(),
                index.len(),
                paths.chunks.display(),
                chunks.len()
            );
        }
        if !fingerprint_matches(&index, &chunks) {
            tracing::warn!(
                "Chunk store {} changed since the index was built; re-run ingest",
                paths.chunks.display()
            );
        }
        Ok(Self { index, chunks })
    }
}

/// Whether the index fingerprint matches the chunks it covers.
///
/// Only the first `index.len()` chunks are compared, so an index built
/// with an ingest limit still matches its store. Unsealed indexes match.
pub fn fingerprint_matches(index: &FlatL2Index, chunks: &[ChunkRecord]) -> bool {
    match index.fingerprint() {
        Some(expected) => {
            let covered = &chunks[..index.len().min(chunks.len())];
            index::fingerprint(covered) == expected
        }
        None => true,
    }
}

pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    config: Config,
    policy: RetryPolicy,
    cache: RwLock<HashMap<ScopePaths, Arc<LoadedScope>>>,
}

impl Retriever {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: Config) -> Self {
        let policy = RetryPolicy::from_config(&config.embedding);
        Self {
            provider,
            config,
            policy,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load a scope through the cache. Failed loads are logged and not cached.
    pub async fn load(&self, paths: &ScopePaths) -> Option<Arc<LoadedScope>> {
        if let Some(hit) = self.cache.read().await.get(paths) {
            return Some(hit.clone());
        }

        if !paths.index.exists() || !paths.chunks.exists() {
            tracing::warn!(
                "No index for this scope (looked for {} and {})",
                paths.index.display(),
                paths.chunks.display()
            );
            return None;
        }

        let loaded = match LoadedScope::load(paths) {
            Ok(loaded) => Arc::new(loaded),
            Err(e) => {
                tracing::warn!("{:#}", e);
                return None;
            }
        };
        tracing::info!(
            "Loaded {} vectors from {}",
            loaded.index.len(),
            paths.index.display()
        );

        let mut cache = self.cache.write().await;
        Some(cache.entry(paths.clone()).or_insert(loaded).clone())
    }

    /// The `top_k` chunks nearest to `query`, nearest first.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        scope: Option<&Scope>,
    ) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let paths = ScopePaths::for_scope(&self.config, scope);
        let Some(loaded) = self.load(&paths).await else {
            return Ok(Vec::new());
        };

        let what = format!("{} query embedding", self.provider.model_name());
        let vector = with_retry(&self.policy, &what, || {
            embedding::embed_query(self.provider.as_ref(), query)
        })
        .await
        .context("Failed to embed query")?;

        let hits = loaded.index.search(&vector, top_k).with_context(|| {
            format!(
                "Query embedding does not fit {} (was it built with another model?)",
                paths.index.display()
            )
        })?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                loaded.chunks.get(hit.position).map(|chunk| RetrievedChunk {
                    chunk: chunk.clone(),
                    relevance: index::distance_to_relevance(hit.distance),
                })
            })
            .collect())
    }
}

/// Run a retrieval and print the hits.
pub async fn run_retrieve(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    scope: Option<&Scope>,
    json: bool,
) -> Result<()> {
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);
    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let retriever = Retriever::new(provider, config.clone());
    let hits = retriever.retrieve(query, top_k, scope).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, hit.relevance, hit.chunk.label());
        if let Some(subject) = hit.chunk.meta_str("subject") {
            println!("    subject: {}", subject);
        }
        println!("    excerpt: \"{}\"", excerpt(&hit.chunk.text, 200));
        println!();
    }
    Ok(())
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_store::ChunkWriter;
    use crate::config::parse_config;
    use crate::error::ApiError;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Maps a text to a fixed 2-d point by keyword.
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("exam") {
                        vec![0.0, 0.0]
                    } else if t.contains("library") {
                        vec![10.0, 0.0]
                    } else {
                        vec![0.0, 10.0]
                    }
                })
                .collect())
        }
    }

    fn record(text: &str) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            doc_name: Some("handbook.txt".into()),
            page: Some(1),
            source_path: None,
            metadata: Map::new(),
        }
    }

    fn config_for(root: &Path) -> Config {
        parse_config(&format!(
            "[corpus]\ndocs_dir = \"{}\"\nindex_dir = \"{}\"\n",
            root.join("docs").display(),
            root.join("data").display()
        ))
        .unwrap()
    }

    fn write_scope(paths: &ScopePaths, texts: &[&str], vectors: &[Vec<f32>]) {
        let records: Vec<ChunkRecord> = texts.iter().map(|t| record(t)).collect();
        let mut writer = ChunkWriter::create(&paths.chunks).unwrap();
        for r in &records {
            writer.write(r).unwrap();
        }
        writer.finish().unwrap();

        let mut index = FlatL2Index::new(2);
        index.add(vectors).unwrap();
        index.seal(index::fingerprint(&records));
        index.save(&paths.index).unwrap();
    }

    #[tokio::test]
    async fn returns_nearest_chunks_with_relevance() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(tmp.path());
        let scope = Scope::new("FY", "Sem-1");
        let paths = ScopePaths::for_scope(&cfg, Some(&scope));
        write_scope(
            &paths,
            &["exam timetable", "library hours", "canteen menu"],
            &[vec![0.0, 0.0], vec![10.0, 0.0], vec![0.0, 10.0]],
        );

        let embedder = Arc::new(KeywordEmbedder { calls: AtomicUsize::new(0) });
        let retriever = Retriever::new(embedder.clone(), cfg);

        let hits = retriever
            .retrieve("when is the exam?", 2, Some(&scope))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "exam timetable");
        assert_eq!(hits[0].relevance, 1.0);
        // squared distance 100 -> 1/101
        assert!((hits[1].relevance - 1.0 / 101.0).abs() < 1e-9);

        // second query is served from the cache
        retriever.retrieve("library", 1, Some(&scope)).await.unwrap();
        assert_eq!(retriever.cache.read().await.len(), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_scope_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(tmp.path());
        let retriever = Retriever::new(
            Arc::new(KeywordEmbedder { calls: AtomicUsize::new(0) }),
            cfg,
        );

        let hits = retriever
            .retrieve("exam", 3, Some(&Scope::new("TY", "Sem-6")))
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert!(retriever.cache.read().await.is_empty());
    }

    #[tokio::test]
    async fn empty_query_does_not_embed() {
        let tmp = TempDir::new().unwrap();
        let embedder = Arc::new(KeywordEmbedder { calls: AtomicUsize::new(0) });
        let retriever = Retriever::new(embedder.clone(), config_for(tmp.path()));

        assert!(retriever.retrieve("   ", 3, None).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn positions_beyond_chunk_store_are_dropped() {
        let tmp = TempDir::new().unwrap();
        let cfg = config_for(tmp.path());
        let paths = ScopePaths::for_scope(&cfg, None);
        write_scope(
            &paths,
            &["exam timetable", "library hours"],
            &[vec![0.0, 0.0], vec![10.0, 0.0]],
        );
        // store shrinks after the index was built
        let mut writer = ChunkWriter::create(&paths.chunks).unwrap();
        writer.write(&record("library hours")).unwrap();
        writer.finish().unwrap();

        let retriever = Retriever::new(
            Arc::new(KeywordEmbedder { calls: AtomicUsize::new(0) }),
            cfg,
        );
        let hits = retriever.retrieve("exam", 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn fingerprint_covers_indexed_prefix_only() {
        let records = vec![record("a"), record("b"), record("c")];
        let mut index = FlatL2Index::new(1);
        index.add(&[vec![0.0], vec![1.0]]).unwrap();
        index.seal(index::fingerprint(&records[..2]));

        assert!(fingerprint_matches(&index, &records));
        assert!(!fingerprint_matches(&index, &[record("x"), record("b")]));
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("héllo world", 5), "héllo...");
        assert_eq!(excerpt("short", 10), "short");
    }
}
