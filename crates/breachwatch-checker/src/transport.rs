//! Shared HTTP transport used by every backend.
//!
//! Backends only see the [`HttpTransport`] trait so they can be driven by a
//! fake in tests. The production implementation wraps one long-lived
//! `reqwest::Client` that is never reconfigured after construction.

use crate::error::TransportError;
use async_trait::async_trait;
use breachwatch_core::HttpConfig;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::{tls, Client};
use std::time::Duration;

/// Longest server-requested wait that is honoured.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(5 * 60);

/// A fully-read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed `Retry-After` header, at most [`MAX_RETRY_AFTER`]
    pub retry_after: Option<Duration>,
    /// Response body as text
    pub body: String,
}

impl HttpResponse {
    /// Convenience constructor for a response without `Retry-After`.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    /// 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// HTTP 429.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Statuses worth retrying: 408, 429 and 5xx.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.status == 408 || self.is_rate_limited() || (500..600).contains(&self.status)
    }
}

/// Outbound GET requests, safe for concurrent use.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request and read the whole body.
    ///
    /// Non-2xx statuses are returned as responses, not errors; only
    /// transport-level failures (timeout, connection, body read) are errors.
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Build the shared HTTP client.
///
/// Accepts TLS 1.0 through 1.2 (for the legacy breach API), sends the
/// configured user agent and `Accept` header, and caps every request at
/// `timeout_secs`.
pub fn build_http_client(config: &HttpConfig) -> Result<Client, TransportError> {
    let mut headers = HeaderMap::new();
    let accept = HeaderValue::from_str(&config.accept)
        .map_err(|e| TransportError::Build(format!("invalid Accept header: {e}")))?;
    headers.insert(ACCEPT, accept);

    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .min_tls_version(tls::Version::TLS_1_0)
        .max_tls_version(tls::Version::TLS_1_2)
        .build()
        .map_err(|e| TransportError::Build(e.to_string()))
}

/// [`HttpTransport`] backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build the transport from configuration.
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

}

/// Parse a `Retry-After` value given as delay-seconds or as an HTTP-date.
///
/// Dates in the past yield zero. The result is capped at [`MAX_RETRY_AFTER`].
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    let delay = if let Ok(secs) = value.parse::<u64>() {
        Duration::from_secs(secs)
    } else {
        let at = DateTime::parse_from_rfc2822(value).ok()?;
        (at.with_timezone(&Utc) - now).to_std().unwrap_or(Duration::ZERO)
    };
    Some(delay.min(MAX_RETRY_AFTER))
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| parse_retry_after(s, Utc::now()));
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}
