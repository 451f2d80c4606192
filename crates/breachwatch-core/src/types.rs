//! Shared types used across breachwatch.
//!
//! This module defines common newtypes and enums that provide type safety
//! and clear domain modeling.

use crate::error::BreachwatchError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Newtype for credential entry identifiers with validation.
///
/// Entry IDs are opaque to the checker; they must be 1-128 characters of
/// ASCII alphanumerics, hyphens or underscores (KeePass UUIDs in hex or
/// dashed form both qualify).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId(String);

impl EntryId {
    /// Create a new `EntryId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID is empty, too long, or contains other characters.
    pub fn new(id: impl Into<String>) -> Result<Self, BreachwatchError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), BreachwatchError> {
        static ENTRY_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            ENTRY_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid regex"));

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(BreachwatchError::Validation(format!(
                "invalid entry ID: expected 1-128 alphanumeric, '-' or '_' characters, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EntryId {
    type Error = BreachwatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.0
    }
}

/// External breach-intelligence sources supported by the checker.
///
/// The set is closed. Declaration order is the order in which backends run
/// when a session checks every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreachSource {
    /// Have I Been Pwned site breach catalogue, matched by entry domain
    HaveIBeenPwned,
    /// Cloudflare "Cloudbleed" memory leak, matched by entry domain
    Cloudbleed,
    /// Pwned Passwords k-anonymity range lookup, matched by password hash
    PwnedPasswords,
}

impl BreachSource {
    /// Every source, in run order.
    pub const ALL: [BreachSource; 3] = [
        BreachSource::HaveIBeenPwned,
        BreachSource::Cloudbleed,
        BreachSource::PwnedPasswords,
    ];

    /// Stable identifier used in configuration files and on the command line.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HaveIBeenPwned => "have-i-been-pwned",
            Self::Cloudbleed => "cloudbleed",
            Self::PwnedPasswords => "pwned-passwords",
        }
    }

    /// Human-readable name for progress text and reports.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::HaveIBeenPwned => "Have I Been Pwned",
            Self::Cloudbleed => "Cloudbleed",
            Self::PwnedPasswords => "Pwned Passwords",
        }
    }
}

impl fmt::Display for BreachSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for BreachSource {
    type Err = BreachwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| {
                BreachwatchError::Validation(format!(
                    "unknown breach source '{s}', expected one of: have-i-been-pwned, cloudbleed, pwned-passwords"
                ))
            })
    }
}
