use crate::checker::BreachedEntry;
use breachwatch_core::BreachSource;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("no database is open")]
    NoOpenDatabase,

    #[error("transient network failure for {backend}: {reason}")]
    TransientNetworkFailure {
        backend: BreachSource,
        reason: String,
    },

    /// Run-fatal failure. `found` holds the records the backend produced
    /// before it stopped.
    #[error("{backend} check failed: {reason}")]
    BackendFailure {
        backend: BreachSource,
        reason: String,
        found: Vec<BreachedEntry>,
    },

    /// Cancelled at an entry boundary. `found` holds the records the
    /// backend produced before it stopped.
    #[error("check cancelled")]
    Cancelled { found: Vec<BreachedEntry> },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("checking session aborted: {0}")]
    SessionAborted(String),
}

impl CheckError {
    pub fn backend_failure(backend: BreachSource, reason: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            reason: reason.into(),
            found: Vec::new(),
        }
    }

    pub fn cancelled() -> Self {
        Self::Cancelled { found: Vec::new() }
    }

    /// Attach the records found so far to a `BackendFailure` or `Cancelled`;
    /// other variants are returned unchanged.
    #[must_use]
    pub fn with_found(self, records: Vec<BreachedEntry>) -> Self {
        match self {
            Self::BackendFailure {
                backend,
                reason,
                mut found,
            } => {
                found.extend(records);
                Self::BackendFailure {
                    backend,
                    reason,
                    found,
                }
            }
            Self::Cancelled { mut found } => {
                found.extend(records);
                Self::Cancelled { found }
            }
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckError>;
