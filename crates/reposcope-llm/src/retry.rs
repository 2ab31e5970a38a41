use std::future::Future;
use std::time::Duration;

use crate::error::LlmError;
use crate::rate_limit::RateLimiter;

const BASE_BACKOFF_SECS: u64 = 1;

/// Parse the `Retry-After` header value as seconds.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let val = response.headers().get("retry-after")?;
    let secs = val.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(BASE_BACKOFF_SECS << attempt.min(16))
}

/// Run `f` under a rate-limiter permit, retrying up to `max_retries` times on
/// `LlmError::RateLimited`.
///
/// Every attempt, including retries, acquires its own permit from `limiter`.
///
/// # Errors
///
/// Returns the last error produced by `f` once retries are exhausted, or the
/// first non rate-limit error.
pub(crate) async fn with_rate_limit<T, F, Fut>(
    limiter: &RateLimiter,
    max_retries: u32,
    caller: &str,
    mut f: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0u32;
    loop {
        let result = {
            let _permit = limiter.acquire().await;
            f().await
        };

        match result {
            Err(LlmError::RateLimited { retry_after }) if attempt < max_retries => {
                let delay = retry_after.unwrap_or_else(|| backoff(attempt));
                tracing::warn!(
                    "{caller} rate limited, retrying in {}s ({}/{max_retries})",
                    delay.as_secs(),
                    attempt + 1,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
