#![allow(clippy::must_use_candidate)]

use crate::checker::CheckOptions;
use crate::entry::Entry;
use serde::{Deserialize, Serialize};

/// Eligibility policy for one backend run.
///
/// The staleness rule is owned by each backend, so it is passed in as a
/// predicate rather than stored here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFilter {
    pub ignore_deleted: bool,
    pub only_old: bool,
}

impl EntryFilter {
    pub fn from_options(options: &CheckOptions) -> Self {
        Self {
            ignore_deleted: options.ignore_deleted_entries,
            only_old: options.only_check_old_entries,
        }
    }

    pub fn matches(&self, entry: &Entry, is_stale: impl Fn(&Entry) -> bool) -> bool {
        if self.ignore_deleted && entry.in_recycle_bin {
            return false;
        }
        if self.only_old && !is_stale(entry) {
            return false;
        }
        true
    }
}

/// Select the entries a backend should check, preserving input order.
///
/// Never fails; an empty result is a valid outcome.
pub fn filter_entries<'a>(
    entries: &'a [Entry],
    options: &CheckOptions,
    is_stale: impl Fn(&Entry) -> bool,
) -> Vec<&'a Entry> {
    let filter = EntryFilter::from_options(options);
    entries
        .iter()
        .filter(|entry| filter.matches(entry, &is_stale))
        .collect()
}
