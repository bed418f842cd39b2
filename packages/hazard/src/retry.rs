//! HTTP retry helper for forecast requests.
//!
//! Forecast calls go through [`send_json`] rather than
//! `reqwest::RequestBuilder::send()` so transient failures (timeouts,
//! connection resets, HTTP 429, HTTP 5xx) are retried with exponential
//! backoff. Client errors other than 429 are permanent and returned
//! immediately.

use std::time::Duration;

use crate::HazardError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends an HTTP request and parses the response body as JSON.
///
/// `build_request` is called once per attempt since builders are consumed
/// by `.send()`. Backoff is 1s, 2s, 4s, ...
///
/// # Errors
///
/// Returns [`HazardError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body is not valid JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    build_request: F,
    max_retries: u32,
) -> Result<serde_json::Value, HazardError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, max_retries).await?;
    let url = response.url().to_string();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::warn!(
            "JSON parse failed\n  \
             url: {url}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        HazardError::Json(e)
    })
}

/// What to do with a response status on a given attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Accept,
    Retry,
    Fail,
}

/// 429 and 5xx are retried while attempts remain; any other 4xx/5xx fails.
fn classify(status: reqwest::StatusCode, attempt: u32, max_retries: u32) -> Verdict {
    let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
    if retryable && attempt < max_retries {
        Verdict::Retry
    } else if status.is_client_error() || status.is_server_error() {
        Verdict::Fail
    } else {
        Verdict::Accept
    }
}

/// Delay before retry number `attempt` (1-based), capped at 64s.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(6))
}

/// Core retry loop. Returns the first 2xx/3xx response.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    max_retries: u32,
) -> Result<reqwest::Response, HazardError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = backoff(attempt);
            log::debug!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::debug!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(HazardError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                match classify(status, attempt, max_retries) {
                    Verdict::Retry => {
                        log::debug!("  HTTP {status}, retrying");
                        attempt += 1;
                    }
                    Verdict::Fail => {
                        return Err(HazardError::Status {
                            status: status.as_u16(),
                        });
                    }
                    Verdict::Accept => return Ok(response),
                }
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
