//! Breachwatch Checker - breach-checking orchestration.
//!
//! This crate checks the entries of a credential database against one or more
//! breach-intelligence sources. Each source is a [`BreachChecker`]; the
//! [`CheckOrchestrator`] runs the selected ones sequentially, merges their
//! results and folds their progress into a single session-wide percentage.
//!
//! # Features
//!
//! - Pluggable backends behind a shared async trait
//! - Entry filtering (recycle bin, stale entries) applied uniformly
//! - Retry with backoff for transient failures, longer backoff on rate limits
//! - Monotonic, session-wide progress reporting over a channel
//! - Cooperative cancellation between entries
//!
//! # Example
//!
//! ```rust,ignore
//! use breachwatch_checker::{CheckOrchestrator, MemoryDatabase};
//! use breachwatch_core::{AppConfig, SessionConfig};
//! use std::sync::Arc;
//!
//! let config = AppConfig::load_with_env()?;
//! let orchestrator = CheckOrchestrator::from_config(&config)?;
//! let database = Arc::new(MemoryDatabase::load_json(path)?);
//!
//! let mut handle = orchestrator.start(database, SessionConfig::default())?;
//! while let Some(update) = handle.next_progress().await {
//!     println!("{:.0}% {}", update.percent, update.text);
//! }
//! let outcome = handle.outcome().await?;
//! println!("{}", outcome.summary());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod checker;
pub mod checkers;
pub mod entry;
#[allow(missing_docs)]
pub mod error;
#[allow(missing_docs)]
pub mod filter;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod transport;

// Re-export commonly used types
pub use checker::{BreachChecker, BreachEvidence, BreachedEntry, CheckOptions, CheckerFactory};
pub use checkers::{BackendTable, CloudbleedChecker, HibpChecker, PwnedPasswordsChecker};
pub use entry::{Entry, EntryDatabase, MemoryDatabase};
pub use error::{CheckError, Result, TransportError};
pub use filter::{filter_entries, EntryFilter};
pub use orchestrator::{CheckOrchestrator, SessionHandle, SessionOutcome, SessionState};
pub use progress::{ProgressAggregator, ProgressItem, ProgressSink, ProgressState, ProgressUpdate};
pub use retry::{get_with_retry, RetryPolicy};
pub use transport::{build_http_client, HttpResponse, HttpTransport, ReqwestTransport};
