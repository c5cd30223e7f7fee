use thiserror::Error;

/// Failure classes the dispatch loop and backoff controller match on.
///
/// Only `RateLimited` is retryable; everything else is either a per-record
/// permanent failure (logged, counted, run continues) or a setup-time fatal
/// that aborts the run before dispatch starts.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// HTTP 429 from an identity API, with the Retry-After hint if one was sent.
    #[error("{service} rate limited (retry-after: {retry_after_secs:?}s)")]
    RateLimited {
        service: &'static str,
        retry_after_secs: Option<u64>,
    },

    /// Non-throttle API rejection (4xx/5xx). Body is truncated for logging.
    #[error("{service} request failed: {status} {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl MigrateError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MigrateError::RateLimited { .. })
    }
}

/// A single unparseable input line. Scoped to that line only; the stream
/// continues past it.
#[derive(Debug, Error)]
#[error("record {index}: {message}")]
pub struct ParseError {
    pub index: usize,
    pub message: String,
}
