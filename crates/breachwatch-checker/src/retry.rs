//! Retry with backoff for backend requests.
//!
//! Transient failures (timeouts, connection errors, 408/429/5xx) are retried
//! `checking.max_retries` times after the first attempt. Rate limits use a longer backoff, or the
//! server's `Retry-After` when it sends one. Any other non-success status is
//! run-fatal for the backend.

use crate::error::{CheckError, Result};
use crate::transport::{HttpResponse, HttpTransport};
use breachwatch_core::{BreachSource, CheckingConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry settings for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, at least 1
    pub max_attempts: u32,
    /// Base delay between attempts
    pub base_delay: Duration,
    /// Backoff multiplier after a rate-limit response
    pub rate_limit_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CheckingConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy from configuration.
    #[must_use]
    pub fn from_config(config: &CheckingConfig) -> Self {
        Self {
            max_attempts: config.max_retries.saturating_add(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
            rate_limit_multiplier: u32::try_from(config.rate_limit_backoff_multiplier.max(1))
                .unwrap_or(u32::MAX),
        }
    }

    /// Delay before the attempt following `attempt` (zero-based).
    ///
    /// Grows linearly with the attempt number; rate limits multiply it, and a
    /// server-provided `Retry-After` wins when it is longer.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, rate_limited: bool, retry_after: Option<Duration>) -> Duration {
        let multiplier = if rate_limited {
            self.rate_limit_multiplier
        } else {
            1
        };
        let computed = self
            .base_delay
            .saturating_mul(multiplier)
            .saturating_mul(attempt.saturating_add(1));

        match retry_after {
            Some(server) if server > computed => server,
            _ => computed,
        }
    }
}

/// GET `url`, retrying transient failures.
///
/// Returns the successful response, `TransientNetworkFailure` when attempts
/// run out, `BackendFailure` for a non-retryable status, or `Cancelled` when
/// `cancel` fires before or between attempts.
pub async fn get_with_retry(
    transport: &dyn HttpTransport,
    url: &str,
    backend: BreachSource,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<HttpResponse> {
    let mut last_reason = String::new();

    for attempt in 0..policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(CheckError::cancelled());
        }

        let (rate_limited, retry_after) = match transport.get(url).await {
            Ok(response) if response.is_success() => return Ok(response),
            Ok(response) if response.is_retryable() => {
                last_reason = format!("HTTP {}", response.status);
                if response.is_rate_limited() {
                    tracing::warn!("Rate limited by {}, using longer backoff", backend);
                }
                (response.is_rate_limited(), response.retry_after)
            }
            Ok(response) => {
                return Err(CheckError::backend_failure(
                    backend,
                    format!("HTTP {}: {}", response.status, snippet(&response.body)),
                ));
            }
            Err(e) => {
                last_reason = e.to_string();
                (false, None)
            }
        };

        if attempt + 1 < policy.max_attempts {
            let delay = policy.delay_for(attempt, rate_limited, retry_after);
            tracing::warn!(
                "Request to {} failed: {} (attempt {}/{}), retrying in {:?}...",
                backend,
                last_reason,
                attempt + 1,
                policy.max_attempts,
                delay
            );

            tokio::select! {
                () = cancel.cancelled() => return Err(CheckError::cancelled()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    Err(CheckError::TransientNetworkFailure {
        backend,
        reason: format!("{last_reason} after {} attempts", policy.max_attempts),
    })
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(120) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
