//! Credential entries and the database collaborator the checker reads them from.
//!
//! The checker never writes to the database. Entries are read once at the
//! start of a session and treated as immutable snapshots.

use breachwatch_core::{BreachwatchError, EntryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One stored credential record.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Identifier assigned by the database
    pub id: EntryId,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Account name
    #[serde(default)]
    pub username: String,
    /// Secret, never logged
    #[serde(default)]
    pub password: String,
    /// Site URL, used by domain-matching sources
    #[serde(default)]
    pub url: String,
    /// Last time any field of the entry changed
    pub last_modified: DateTime<Utc>,
    /// Expiry time, when the entry has one
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    /// Whether the entry currently sits in the recycle bin
    #[serde(default)]
    pub in_recycle_bin: bool,
    /// Group names from the root group down to the entry's parent
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Entry {
    /// Registrable host of the entry URL, lowercased and without a leading `www.`.
    ///
    /// URLs without a scheme are treated as `https://`. Returns `None` when no
    /// host can be parsed.
    #[must_use]
    pub fn domain(&self) -> Option<String> {
        let raw = self.url.trim();
        if raw.is_empty() {
            return None;
        }

        let parsed = url::Url::parse(raw)
            .ok()
            .filter(|u| u.host_str().is_some())
            .or_else(|| url::Url::parse(&format!("https://{raw}")).ok())?;

        let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
        if host.is_empty() {
            None
        } else {
            Some(host)
        }
    }

    /// Slash-separated group path for display.
    #[must_use]
    pub fn group_path(&self) -> String {
        self.groups.join("/")
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("url", &self.url)
            .field("last_modified", &self.last_modified)
            .field("expires", &self.expires)
            .field("in_recycle_bin", &self.in_recycle_bin)
            .field("groups", &self.groups)
            .finish()
    }
}

/// Read-only view of the credential database.
pub trait EntryDatabase: Send + Sync {
    /// Whether a database is currently loaded.
    fn is_open(&self) -> bool;

    /// Snapshot of every entry, including recycle-bin entries.
    fn entries(&self) -> Vec<Entry>;
}

#[derive(Debug, Deserialize, Serialize)]
struct EntryExport {
    entries: Vec<Entry>,
}

/// In-memory database, loadable from a JSON export of the form
/// `{ "entries": [ ... ] }`.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    entries: Vec<Entry>,
    open: bool,
}

impl MemoryDatabase {
    /// An open database holding `entries`.
    #[must_use]
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            open: true,
        }
    }

    /// A database handle with nothing loaded.
    #[must_use]
    pub fn closed() -> Self {
        Self::default()
    }

    /// Parse a JSON export.
    pub fn from_json_str(json: &str) -> Result<Self, BreachwatchError> {
        let export: EntryExport = serde_json::from_str(json)
            .map_err(|e| BreachwatchError::Database(format!("invalid entry export: {e}")))?;
        Ok(Self::new(export.entries))
    }

    /// Load a JSON export from disk.
    pub fn load_json(path: &Path) -> Result<Self, BreachwatchError> {
        tracing::debug!("Loading entry export from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let db = Self::from_json_str(&contents)?;
        tracing::info!(count = db.entries.len(), "loaded entry export");
        Ok(db)
    }
}

impl EntryDatabase for MemoryDatabase {
    fn is_open(&self) -> bool {
        self.open
    }

    fn entries(&self) -> Vec<Entry> {
        self.entries.clone()
    }
}
