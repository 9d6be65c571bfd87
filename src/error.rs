//! Error type shared by the embedding and LLM clients.
//!
//! Providers make a single request per call and report failures as an
//! [`ApiError`]; the variant tells the caller whether retrying can help.

use std::time::Duration;

use reqwest::StatusCode;

use crate::retry::{is_rate_limit_message, parse_retry_after};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Quota or rate limit hit. `retry_after` is the provider's hint, when it gave one.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    /// Server-side or network failure that may succeed on a later attempt.
    #[error("transient API error: {0}")]
    Transient(String),
    /// Request can never succeed as sent (bad key, bad model, malformed response).
    #[error("API error: {0}")]
    Fatal(String),
    #[error("{0} provider is disabled")]
    Disabled(&'static str),
}

impl ApiError {
    /// Classify a non-success HTTP response from a provider.
    pub fn from_status(provider: &str, status: StatusCode, body: &str) -> Self {
        let message = format!("{} API error {}: {}", provider, status, body);
        if status == StatusCode::TOO_MANY_REQUESTS || is_rate_limit_message(body) {
            return ApiError::RateLimited {
                retry_after: parse_retry_after(body),
                message,
            };
        }
        if status.is_server_error() {
            return ApiError::Transient(message);
        }
        ApiError::Fatal(message)
    }

    /// Classify a transport-level failure (connect, timeout, body read).
    pub fn from_transport(provider: &str, err: reqwest::Error) -> Self {
        ApiError::Transient(format!("{} request failed: {}", provider, err))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. } | ApiError::Transient(_))
    }
}
