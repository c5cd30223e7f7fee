pub mod auth0;
pub mod workos;

use crate::error::MigrateError;
use crate::util::truncate_for_log;

/// Parse the Retry-After header (seconds form) from a throttled response.
pub(crate) fn retry_after_secs(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get("Retry-After")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Classify a non-success response: 429 becomes `RateLimited`, anything else
/// an `Api` rejection with a truncated body.
pub(crate) async fn classify_failure(
    service: &'static str,
    resp: reqwest::Response,
) -> MigrateError {
    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after_secs = retry_after_secs(&resp);
        return MigrateError::RateLimited {
            service,
            retry_after_secs,
        };
    }
    let body = truncate_for_log(resp.text().await.unwrap_or_default(), 2000);
    MigrateError::Api {
        service,
        status: status.as_u16(),
        body,
    }
}
