//! Have I Been Pwned site-breach catalogue.
//!
//! Downloads the public breach list once per run and flags entries whose URL
//! domain (or a parent domain) appears in it. With "old entries only", an
//! entry counts only for breaches that happened after its last change.
//!
//! Staleness is only known once the catalogue is loaded. With "old entries
//! only", the catalogue is therefore downloaded whenever any entry survives
//! the recycle-bin rule, even if no entry turns out to be stale. That single
//! request is the one case where an empty eligible set still costs a call.

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
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SOURCE: BreachSource = BreachSource::HaveIBeenPwned;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HibpBreach {
    name: String,
    title: String,
    #[serde(default)]
    domain: String,
    breach_date: NaiveDate,
    #[serde(default)]
    added_date: Option<DateTime<Utc>>,
    #[serde(default)]
    data_classes: Vec<String>,
    #[serde(default)]
    is_verified: bool,
}

impl HibpBreach {
    fn evidence(&self) -> BreachEvidence {
        BreachEvidence::SiteBreach {
            name: self.name.clone(),
            title: self.title.clone(),
            domain: self.domain.clone(),
            breach_date: self.breach_date,
            added_date: self.added_date,
            data_classes: self.data_classes.clone(),
            is_verified: self.is_verified,
        }
    }

    fn postdates(&self, entry: &Entry) -> bool {
        entry.last_modified.date_naive() < self.breach_date
    }
}

/// Breaches indexed by lowercase domain.
struct Catalogue {
    by_domain: HashMap<String, Vec<HibpBreach>>,
}

impl Catalogue {
    fn parse(body: &str) -> Result<Self> {
        let breaches: Vec<HibpBreach> = serde_json::from_str(body).map_err(|e| {
            CheckError::backend_failure(SOURCE, format!("unexpected breach list format: {e}"))
        })?;

        let mut by_domain: HashMap<String, Vec<HibpBreach>> = HashMap::new();
        for breach in breaches {
            let domain = breach.domain.trim().to_ascii_lowercase();
            if !domain.is_empty() {
                by_domain.entry(domain).or_default().push(breach);
            }
        }
        Ok(Self { by_domain })
    }

    fn breaches_for<'a>(&'a self, entry: &Entry) -> Vec<&'a HibpBreach> {
        let Some(host) = entry.domain() else {
            return Vec::new();
        };
        domain_candidates(&host)
            .into_iter()
            .filter_map(|candidate| self.by_domain.get(candidate))
            .flatten()
            .collect()
    }

    /// An entry is stale if some breach on its domain happened after its last change.
    fn is_stale(&self, entry: &Entry) -> bool {
        self.breaches_for(entry)
            .into_iter()
            .any(|breach| breach.postdates(entry))
    }
}

/// Backend for the Have I Been Pwned breach catalogue.
pub struct HibpChecker {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    retry: RetryPolicy,
}

impl HibpChecker {
    /// Create the backend. No request is made until a check runs.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, api_url: String, retry: RetryPolicy) -> Self {
        Self {
            transport,
            api_url,
            retry,
        }
    }

    async fn fetch_catalogue(&self, cancel: &CancellationToken) -> Result<Catalogue> {
        let url = format!("{}/breaches", self.api_url.trim_end_matches('/'));
        let response = get_with_retry(self.transport.as_ref(), &url, SOURCE, &self.retry, cancel)
            .await
            .map_err(|e| match e {
                CheckError::TransientNetworkFailure { reason, .. } => {
                    CheckError::backend_failure(SOURCE, format!("breach list unavailable: {reason}"))
                }
                other => other,
            })?;

        let catalogue = Catalogue::parse(&response.body)?;
        tracing::info!(domains = catalogue.by_domain.len(), "loaded breach catalogue");
        Ok(catalogue)
    }
}

#[async_trait]
impl BreachChecker for HibpChecker {
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
        // Skip the download only when nothing survives the non-age filters.
        let without_age = CheckOptions {
            only_check_old_entries: false,
            ..*options
        };
        if filter_entries(entries, &without_age, |_| true).is_empty() {
            progress.entries_processed(0, 0, "No entries to check");
            return Ok(Vec::new());
        }

        progress.report(0.0, "Downloading breach list");
        let catalogue = self.fetch_catalogue(cancel).await?;
        let eligible = filter_entries(entries, options, |e| catalogue.is_stale(e));
        let total = eligible.len();

        let mut found = Vec::new();
        for (index, entry) in eligible.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(CheckError::Cancelled { found });
            }

            for breach in catalogue.breaches_for(entry) {
                if options.only_check_old_entries && !breach.postdates(entry) {
                    continue;
                }
                tracing::debug!(entry = %entry.id, breach = %breach.name, "site breach match");
                found.push(BreachedEntry::new(
                    entry,
                    SOURCE,
                    breach.evidence(),
                    options.expire_breached_entries,
                ));
            }

            progress.entries_processed(
                index + 1,
                total,
                format!("Checked {} of {} entries against {}", index + 1, total, SOURCE),
            );
        }

        if total == 0 {
            progress.entries_processed(0, 0, "No entries to check");
        }

        tracing::info!(checked = total, breached = found.len(), "site breach check finished");
        Ok(found)
    }
}
