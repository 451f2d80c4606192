//! Cloudbleed: sites served through Cloudflare during the February 2017
//! memory leak.

use super::domain_candidates;
use crate::checker::{BreachChecker, BreachEvidence, BreachedEntry, CheckOptions};
use crate::entry::Entry;
use crate::error::{CheckError, Result};
use crate::filter::filter_entries;
use crate::progress::ProgressSink;
use crate::retry::{get_with_retry, RetryPolicy};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use breachwatch_core::BreachSource;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SOURCE: BreachSource = BreachSource::Cloudbleed;

/// Public disclosure of the leak; credentials changed since are considered safe.
fn disclosure() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 2, 17, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn parse_domain_list(body: &str) -> HashSet<String> {
    body.lines()
        .map(|line| line.trim().trim_end_matches('.').to_ascii_lowercase())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

/// Backend for the Cloudbleed affected-domain list.
pub struct CloudbleedChecker {
    transport: Arc<dyn HttpTransport>,
    list_url: String,
    retry: RetryPolicy,
}

impl CloudbleedChecker {
    /// Create the backend. No request is made until a check runs.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, list_url: String, retry: RetryPolicy) -> Self {
        Self {
            transport,
            list_url,
            retry,
        }
    }
}

#[async_trait]
impl BreachChecker for CloudbleedChecker {
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
        let cutoff = disclosure();
        let eligible = filter_entries(entries, options, |e| e.last_modified < cutoff);
        let total = eligible.len();
        if total == 0 {
            progress.entries_processed(0, 0, "No entries to check");
            return Ok(Vec::new());
        }

        progress.report(0.0, "Downloading Cloudbleed domain list");
        let response =
            get_with_retry(self.transport.as_ref(), &self.list_url, SOURCE, &self.retry, cancel)
                .await
                .map_err(|e| match e {
                    CheckError::TransientNetworkFailure { reason, .. } => {
                        CheckError::backend_failure(SOURCE, format!("domain list unavailable: {reason}"))
                    }
                    other => other,
                })?;
        let domains = parse_domain_list(&response.body);
        tracing::info!(domains = domains.len(), "loaded Cloudbleed domain list");

        let mut found = Vec::new();
        for (index, entry) in eligible.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CheckError::Cancelled { found });
            }

            if let Some(host) = entry.domain() {
                if let Some(matched) = domain_candidates(&host)
                    .into_iter()
                    .find(|candidate| domains.contains(*candidate))
                {
                    tracing::debug!(entry = %entry.id, domain = matched, "Cloudbleed match");
                    found.push(BreachedEntry::new(
                        entry,
                        SOURCE,
                        BreachEvidence::CloudflareLeak {
                            domain: matched.to_string(),
                        },
                        options.expire_breached_entries,
                    ));
                }
            }

            progress.entries_processed(
                index + 1,
                total,
                format!("Checked {} of {} entries against {}", index + 1, total, SOURCE),
            );
        }

        tracing::info!(checked = total, breached = found.len(), "Cloudbleed check finished");
        Ok(found)
    }
}
