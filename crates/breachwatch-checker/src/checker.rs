//! The backend contract every breach source implements, and the records it
//! produces.

use crate::entry::Entry;
use crate::error::Result;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use breachwatch_core::{BreachSource, EntryId, SessionConfig};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Options applied to every backend in a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct CheckOptions {
    /// Copied into each record; expiry itself is left to the presentation layer
    pub expire_breached_entries: bool,
    /// Only check entries the backend considers stale
    pub only_check_old_entries: bool,
    /// Skip recycle-bin entries
    pub ignore_deleted_entries: bool,
}

impl From<&SessionConfig> for CheckOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            expire_breached_entries: config.expire_entries,
            only_check_old_entries: config.only_check_old_entries,
            ignore_deleted_entries: config.ignore_deleted_entries,
        }
    }
}

/// Backend-specific proof that an entry is compromised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreachEvidence {
    /// The entry's site appears in a published breach.
    SiteBreach {
        /// Breach identifier
        name: String,
        /// Breach title
        title: String,
        /// Breached domain
        domain: String,
        /// Date the breach happened
        breach_date: NaiveDate,
        /// Date the breach was added to the catalogue
        added_date: Option<DateTime<Utc>>,
        /// Kinds of data exposed
        data_classes: Vec<String>,
        /// Whether the breach is verified
        is_verified: bool,
    },
    /// The entry's site was served through Cloudflare during Cloudbleed.
    CloudflareLeak {
        /// Matched domain from the affected-site list
        domain: String,
    },
    /// The entry's password appears in the exposed-password corpus.
    PasswordExposure {
        /// Times the password was seen in breaches
        occurrences: u64,
    },
}

/// One entry flagged by one backend.
///
/// The same entry may be flagged by several backends; records are not merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachedEntry {
    /// Entry the record refers to
    pub entry_id: EntryId,
    /// Entry title at check time
    pub title: String,
    /// Entry username at check time
    pub username: String,
    /// Group path of the entry at check time
    #[serde(default)]
    pub group: String,
    /// Backend that flagged the entry
    pub source: BreachSource,
    /// Backend-specific evidence
    pub evidence: BreachEvidence,
    /// Whether the user asked for breached entries to be expired
    pub expire: bool,
}

impl BreachedEntry {
    /// Build a record for `entry`.
    #[must_use]
    pub fn new(entry: &Entry, source: BreachSource, evidence: BreachEvidence, expire: bool) -> Self {
        Self {
            entry_id: entry.id.clone(),
            title: entry.title.clone(),
            username: entry.username.clone(),
            group: entry.group_path(),
            source,
            evidence,
            expire,
        }
    }
}

/// A breach-intelligence backend.
///
/// Constructors must not perform I/O; all network traffic happens inside
/// [`BreachChecker::check_database`].
#[async_trait]
pub trait BreachChecker: Send + Sync {
    /// Which source this backend queries.
    fn source(&self) -> BreachSource;

    /// Check `entries` and return the breached ones.
    ///
    /// Implementations apply the entry filter themselves, report per-entry
    /// progress to `progress`, stop at the next entry once `cancel` fires,
    /// skip entries whose requests keep failing transiently, and abort with
    /// `BackendFailure` on non-retryable failures.
    async fn check_database(
        &self,
        entries: &[Entry],
        options: &CheckOptions,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<BreachedEntry>>;
}

/// Builds the backend for a source.
pub trait CheckerFactory: Send + Sync {
    /// Construct the backend for `source`. Must not perform I/O.
    fn create(&self, source: BreachSource) -> Box<dyn BreachChecker>;
}
