//! Retry handling for provider calls.
//!
//! Rate-limited calls sleep for the provider's retry hint (or a configured
//! default); transient failures back off exponentially. Both share one
//! attempt budget. Fatal errors are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::ApiError;

/// Longest backoff exponent for transient failures (2^5 = 32 × base).
const MAX_BACKOFF_SHIFT: u32 = 5;
const DEFAULT_WAIT: Duration = Duration::from_secs(12);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Sleep for a rate-limited call without a retry hint.
    pub default_wait: Duration,
    /// First transient backoff; doubles on each further retry.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            default_wait: Duration::try_from_secs_f64(config.default_retry_secs)
                .unwrap_or(DEFAULT_WAIT),
            backoff_base: Duration::from_secs(1),
        }
    }

    fn wait_for(&self, err: &ApiError, retries_done: u32) -> Duration {
        match err {
            ApiError::RateLimited { retry_after, .. } => retry_after.unwrap_or(self.default_wait),
            _ => self.backoff_base * (1u32 << retries_done.min(MAX_BACKOFF_SHIFT)),
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or the retry budget is spent.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut retries_done = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retries_done < policy.max_retries => {
                let wait = policy.wait_for(&err, retries_done);
                retries_done += 1;
                tracing::warn!(
                    "{} failed ({}); attempt {}/{}, sleeping {:.1}s",
                    what,
                    err,
                    retries_done,
                    policy.max_retries,
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Embed a batch through `provider`, retrying per `policy`.
pub async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    policy: &RetryPolicy,
) -> Result<Vec<Vec<f32>>, ApiError> {
    let what = format!("{} embedding", provider.model_name());
    with_retry(policy, &what, || provider.embed(texts)).await
}

/// Heuristic for quota/rate-limit errors reported only as text.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    message.contains("429")
        || message.contains("RESOURCE_EXHAUSTED")
        || (lower.contains("rate") && lower.contains("limit"))
        || (lower.contains("quota") && lower.contains("exceed"))
}

/// Longest provider retry hint honoured.
const MAX_RETRY_HINT: Duration = Duration::from_secs(3600);

/// Extract a retry hint from an error message.
///
/// Understands the free-text form `"Please retry in 10.150251921s."` and the
/// structured `"retryDelay": "10s"` detail some providers attach.
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    parse_after_marker(message, "retry in ")
        .or_else(|| parse_retry_delay_field(message))
        .filter(|secs| !secs.is_nan())
        .and_then(|secs| Duration::try_from_secs_f64(secs.min(MAX_RETRY_HINT.as_secs_f64())).ok())
}

fn parse_after_marker(message: &str, marker: &str) -> Option<f64> {
    let idx = message.find(marker)?;
    let tail = &message[idx + marker.len()..];
    let mut num = String::new();
    for ch in tail.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            num.push(ch);
        } else if ch.eq_ignore_ascii_case(&'s') || !num.is_empty() {
            break;
        }
    }
    num.parse().ok()
}

fn parse_retry_delay_field(message: &str) -> Option<f64> {
    let idx = message.find("\"retryDelay\"")?;
    let tail = &message[idx + "\"retryDelay\"".len()..];
    let open = tail.find('"')?;
    let value = &tail[open + 1..];
    let close = value.find('"')?;
    value[..close].trim().trim_end_matches('s').parse().ok()
}
