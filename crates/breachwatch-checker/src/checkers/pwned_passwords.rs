//! Pwned Passwords range lookup.
//!
//! Each password is SHA-1 hashed locally and only the first five hex
//! characters of the hash are sent (k-anonymity). The response lists every
//! known hash suffix under that prefix with its occurrence count.

use crate::checker::{BreachChecker, BreachEvidence, BreachedEntry, CheckOptions};
use crate::entry::Entry;
use crate::error::{CheckError, Result};
use crate::filter::filter_entries;
use crate::progress::ProgressSink;
use crate::retry::{get_with_retry, RetryPolicy};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use breachwatch_core::BreachSource;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use sha1::{Digest, Sha1};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SOURCE: BreachSource = BreachSource::PwnedPasswords;

const PREFIX_LEN: usize = 5;

/// Uppercase hex SHA-1 of `password`, split into the five-character prefix
/// that is sent and the suffix that never leaves the process.
fn hash_parts(password: &str) -> (String, String) {
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    let digest = hex::encode_upper(hasher.finalize());
    let (prefix, suffix) = digest.split_at(PREFIX_LEN);
    (prefix.to_string(), suffix.to_string())
}

/// Occurrence count for `suffix` in a range response, if present.
///
/// Padding rows carry a count of zero and are treated as absent.
fn find_suffix(body: &str, suffix: &str) -> Option<u64> {
    body.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(suffix))
        .and_then(|(_, count)| count.trim().parse::<u64>().ok())
        .filter(|count| *count > 0)
}

/// Backend for the Pwned Passwords range API.
pub struct PwnedPasswordsChecker {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    retry: RetryPolicy,
    max_age_days: u32,
    max_concurrent: usize,
}

impl PwnedPasswordsChecker {
    /// Create the backend. No request is made until a check runs.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, api_url: String, retry: RetryPolicy) -> Self {
        Self {
            transport,
            api_url,
            retry,
            max_age_days: 365,
            max_concurrent: 5,
        }
    }

    /// Passwords unchanged for longer than this are "old".
    #[must_use]
    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    /// Set the maximum number of lookups in flight.
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    fn is_stale(&self, entry: &Entry) -> bool {
        Utc::now() - entry.last_modified > chrono::Duration::days(i64::from(self.max_age_days))
    }

    async fn lookup(&self, entry: &Entry, cancel: &CancellationToken) -> Result<Option<u64>> {
        let (prefix, suffix) = hash_parts(&entry.password);
        let url = format!("{}/range/{}", self.api_url.trim_end_matches('/'), prefix);
        let response =
            get_with_retry(self.transport.as_ref(), &url, SOURCE, &self.retry, cancel).await?;
        Ok(find_suffix(&response.body, &suffix))
    }
}

#[async_trait]
impl BreachChecker for PwnedPasswordsChecker {
    fn source(&self) -> BreachSource {
        SOURCE
    }

    async fn check_database(
        &self,
        entries: &[Entry],
        options: &CheckOptions,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<BreachedEntry>> {
        let eligible: Vec<&Entry> = filter_entries(entries, options, |e| self.is_stale(e))
            .into_iter()
            .filter(|e| !e.password.is_empty())
            .collect();
        let total = eligible.len();
        if total == 0 {
            progress.entries_processed(0, 0, "No entries to check");
            return Ok(Vec::new());
        }

        // `buffered` yields in entry order, so progress never regresses even
        // though up to `max_concurrent` lookups are in flight.
        let eligible = &eligible;
        let mut lookups = stream::iter(0..total)
            .map(move |index| {
                let entry = eligible[index];
                async move {
                    if cancel.is_cancelled() {
                        return (index, Err(CheckError::cancelled()));
                    }
                    (index, self.lookup(entry, cancel).await)
                }
            })
            .buffered(self.max_concurrent);

        let mut found = Vec::new();
        let mut processed = 0;
        while let Some((index, outcome)) = lookups.next().await {
            let entry = eligible[index];
            match outcome {
                Ok(Some(occurrences)) => {
                    tracing::debug!(entry = %entry.id, occurrences, "exposed password");
                    found.push(BreachedEntry::new(
                        entry,
                        SOURCE,
                        BreachEvidence::PasswordExposure { occurrences },
                        options.expire_breached_entries,
                    ));
                }
                Ok(None) => {}
                Err(CheckError::TransientNetworkFailure { reason, .. }) => {
                    tracing::warn!(entry = %entry.id, "Skipping entry, password could not be verified: {}", reason);
                }
                Err(e) => return Err(e.with_found(found)),
            }

            processed += 1;
            progress.entries_processed(
                processed,
                total,
                format!("Checked {processed} of {total} passwords"),
            );

            // Lookups already answered are kept; nothing new starts after this.
            if cancel.is_cancelled() {
                return Err(CheckError::Cancelled { found });
            }
        }

        tracing::info!(checked = total, breached = found.len(), "password check finished");
        Ok(found)
    }
}
