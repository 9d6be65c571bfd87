//! Index building.
//!
//! Reads a scope's chunk store, embeds every record in order and writes a
//! [`FlatL2Index`] whose position `i` is the vector of record `i`. Calls are
//! throttled to `embedding.requests_per_second` and retried per
//! [`RetryPolicy`].

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use crate::chunk_store::load_chunks;
use crate::config::{Config, EmbeddingConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::index::{self, FlatL2Index};
use crate::layout::ScopePaths;
use crate::models::{ChunkRecord, Scope};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress, ProgressMode};
use crate::retry::{embed_with_retry, RetryPolicy};

/// Outcome of one ingest run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub embedded: usize,
    pub chunks_path: PathBuf,
    pub index_path: PathBuf,
}

pub struct Ingestor<'a> {
    provider: &'a dyn EmbeddingProvider,
    policy: RetryPolicy,
    min_interval: Option<Duration>,
    batch_size: usize,
    limit: usize,
    progress: &'a dyn IngestProgressReporter,
}

impl<'a> Ingestor<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider, config: &EmbeddingConfig) -> Self {
        let min_interval = (config.requests_per_second > 0.0)
            .then(|| Duration::try_from_secs_f64(1.0 / config.requests_per_second).ok())
            .flatten();
        Self {
            provider,
            policy: RetryPolicy::from_config(config),
            min_interval,
            batch_size: config.batch_size.max(1),
            limit: 0,
            progress: &NoProgress,
        }
    }

    /// Embed at most `limit` records; `0` means all.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn IngestProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Embed `records` into a sealed index. Returns `None` when there is nothing to embed.
    pub async fn build(&self, records: &[ChunkRecord]) -> Result<Option<FlatL2Index>> {
        let records = if self.limit > 0 && self.limit < records.len() {
            &records[..self.limit]
        } else {
            records
        };
        if records.is_empty() {
            return Ok(None);
        }

        let total = records.len() as u64;
        let mut index: Option<FlatL2Index> = None;
        let mut pending: Vec<Vec<f32>> = Vec::with_capacity(self.batch_size);
        let mut last_call: Option<Instant> = None;
        let mut added = 0u64;

        for (i, record) in records.iter().enumerate() {
            self.progress.report(IngestProgressEvent::Embedding {
                n: i as u64 + 1,
                total,
                label: record.label(),
            });

            if let (Some(interval), Some(last)) = (self.min_interval, last_call) {
                tokio::time::sleep_until(last + interval).await;
            }
            last_call = Some(Instant::now());

            let vector = embed_with_retry(self.provider, &[record.text.clone()], &self.policy)
                .await
                .with_context(|| format!("Failed to embed {}", record.label()))?
                .into_iter()
                .next()
                .with_context(|| format!("No embedding returned for {}", record.label()))?;
            pending.push(vector);

            if pending.len() >= self.batch_size {
                added += flush(&mut index, &mut pending)?;
                self.progress
                    .report(IngestProgressEvent::Flushed { total: added });
            }
        }
        if !pending.is_empty() {
            added += flush(&mut index, &mut pending)?;
            self.progress
                .report(IngestProgressEvent::Flushed { total: added });
        }

        let mut index = match index {
            Some(index) => index,
            None => return Ok(None),
        };
        index.seal(index::fingerprint(records));
        Ok(Some(index))
    }

    /// Build and save the index for the chunk store at `paths.chunks`.
    pub async fn ingest(&self, paths: &ScopePaths) -> Result<IngestReport> {
        let records = load_chunks(&paths.chunks)?;
        self.progress.report(IngestProgressEvent::Loading {
            chunks: paths.chunks.display().to_string(),
            total: records.len() as u64,
        });

        let embedded = match self.build(&records).await? {
            Some(index) => {
                index
                    .save(&paths.index)
                    .with_context(|| format!("Failed to write index: {}", paths.index.display()))?;
                tracing::info!(
                    "Wrote {} vectors ({} dims) to {}",
                    index.len(),
                    index.dims(),
                    paths.index.display()
                );
                index.len()
            }
            None => {
                tracing::warn!("No chunks to embed in {}", paths.chunks.display());
                0
            }
        };

        Ok(IngestReport {
            embedded,
            chunks_path: paths.chunks.clone(),
            index_path: paths.index.clone(),
        })
    }
}

/// Move buffered vectors into the index, creating it on first use.
fn flush(index: &mut Option<FlatL2Index>, pending: &mut Vec<Vec<f32>>) -> Result<u64> {
    let Some(dims) = pending.first().map(Vec::len) else {
        return Ok(0);
    };
    let index = index.get_or_insert_with(|| FlatL2Index::new(dims));
    index.add(pending.as_slice())?;
    let n = pending.len() as u64;
    pending.clear();
    Ok(n)
}

/// `--limit`, else `INGEST_LIMIT`, else `0` (all).
pub fn resolve_limit(flag: Option<usize>) -> usize {
    match flag {
        Some(limit) => limit,
        None => std::env::var("INGEST_LIMIT")
            .map(|raw| parse_limit(&raw))
            .unwrap_or(0),
    }
}

/// An unparseable limit ingests everything.
fn parse_limit(raw: &str) -> usize {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!("Ignoring INGEST_LIMIT '{}': not a non-negative integer", raw);
        0
    })
}

pub async fn run_ingest(
    config: &Config,
    scope: Option<&Scope>,
    limit: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let limit = resolve_limit(limit);
    let reporter = progress.reporter();
    let paths = ScopePaths::for_scope(config, scope);

    let report = Ingestor::new(provider.as_ref(), &config.embedding)
        .with_limit(limit)
        .with_progress(reporter.as_ref())
        .ingest(&paths)
        .await?;

    let label = scope.map(|s| s.to_string()).unwrap_or_else(|| "default".to_string());
    println!("ingest {}", label);
    println!("  model: {}", provider.model_name());
    println!("  chunks embedded: {}", report.embedded);
    println!("  chunk store: {}", report.chunks_path.display());
    if report.embedded > 0 {
        println!("  index: {}", report.index_path.display());
    }
    println!("ok");
    Ok(())
}
