//! Checking orchestrator.
//!
//! This module provides the `CheckOrchestrator` which runs a checking
//! session: the selected backends run one after another in declaration
//! order, their records are merged into one result list, and progress is
//! aggregated onto a single session-wide scale.

use crate::checker::{BreachedEntry, CheckOptions, CheckerFactory};
use crate::checkers::BackendTable;
use crate::entry::{Entry, EntryDatabase};
use crate::error::{CheckError, Result};
use crate::progress::{ProgressAggregator, ProgressSink, ProgressUpdate};
use crate::transport::ReqwestTransport;
use breachwatch_core::{AppConfig, BreachSource, SessionConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lifecycle of a checking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no backend started yet
    Idle,
    /// Backends are running
    Running,
    /// Every selected backend finished
    Completed,
    /// A backend failed; later backends were not run
    Failed,
    /// The session was cancelled
    Cancelled,
}

impl SessionState {
    /// Completed, Failed and Cancelled are final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Terminal result of a session, handed to the presentation layer.
#[derive(Debug)]
pub enum SessionOutcome {
    /// All selected backends ran. `results` may be empty.
    Completed {
        /// Breached entries from every backend, in run order
        results: Vec<BreachedEntry>,
    },
    /// A backend hit a run-fatal error.
    Failed {
        /// Backend that failed
        backend: BreachSource,
        /// Failure description
        reason: String,
        /// Records found before the failure
        results: Vec<BreachedEntry>,
    },
    /// The session was cancelled.
    Cancelled {
        /// Records found before cancellation
        results: Vec<BreachedEntry>,
    },
}

impl SessionOutcome {
    /// Terminal state this outcome represents.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match self {
            Self::Completed { .. } => SessionState::Completed,
            Self::Failed { .. } => SessionState::Failed,
            Self::Cancelled { .. } => SessionState::Cancelled,
        }
    }

    /// Records collected by the session.
    #[must_use]
    pub fn results(&self) -> &[BreachedEntry] {
        match self {
            Self::Completed { results }
            | Self::Failed { results, .. }
            | Self::Cancelled { results } => results,
        }
    }

    /// One-line message for the user.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Completed { results } if results.is_empty() => {
                "No breached entries found.".to_string()
            }
            Self::Completed { results } => format!("Found {} breached entries.", results.len()),
            Self::Failed {
                backend, reason, ..
            } => format!("Checking {backend} failed: {reason}"),
            Self::Cancelled { results } => {
                format!("Check cancelled after finding {} breached entries.", results.len())
            }
        }
    }
}

/// State and accumulated results of one session.
struct CheckingSession {
    state: SessionState,
    results: Vec<BreachedEntry>,
}

impl CheckingSession {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            results: Vec::new(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(!self.state.is_terminal(), "session already finished");
        tracing::debug!(from = ?self.state, to = ?next, "session state change");
        self.state = next;
    }

    fn complete(mut self) -> SessionOutcome {
        self.transition(SessionState::Completed);
        SessionOutcome::Completed {
            results: self.results,
        }
    }

    fn fail(mut self, backend: BreachSource, reason: String) -> SessionOutcome {
        self.transition(SessionState::Failed);
        SessionOutcome::Failed {
            backend,
            reason,
            results: self.results,
        }
    }

    fn cancel(mut self) -> SessionOutcome {
        self.transition(SessionState::Cancelled);
        SessionOutcome::Cancelled {
            results: self.results,
        }
    }
}

/// Runs checking sessions over a set of backends.
#[derive(Clone)]
pub struct CheckOrchestrator {
    factory: Arc<dyn CheckerFactory>,
}

impl CheckOrchestrator {
    /// Create an orchestrator that builds backends with `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn CheckerFactory>) -> Self {
        Self { factory }
    }

    /// Create an orchestrator with the production backends and one shared
    /// reqwest transport.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config.http)?);
        Ok(Self::new(Arc::new(BackendTable::new(transport, config))))
    }

    /// Start a session in the background.
    ///
    /// Returns immediately with a handle for progress, cancellation and the
    /// final outcome. Fails with `NoOpenDatabase` before anything runs if no
    /// database is loaded. Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        database: Arc<dyn EntryDatabase>,
        config: SessionConfig,
    ) -> Result<SessionHandle> {
        if !database.is_open() {
            return Err(CheckError::NoOpenDatabase);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let orchestrator = self.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            orchestrator
                .run_session(database.as_ref(), &config, tx, &task_cancel)
                .await
        });

        Ok(SessionHandle {
            progress: rx,
            cancel,
            task,
        })
    }

    /// Run one session to completion.
    ///
    /// The progress surface behind `progress` is always closed before this
    /// returns, whatever the outcome.
    pub async fn run_session(
        &self,
        database: &dyn EntryDatabase,
        config: &SessionConfig,
        progress: mpsc::UnboundedSender<ProgressUpdate>,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome> {
        if !database.is_open() {
            return Err(CheckError::NoOpenDatabase);
        }

        let sources = config.selected_sources();
        let options = CheckOptions::from(config);
        let entries = database.entries();
        let aggregator = Arc::new(ProgressAggregator::new(sources.len(), progress));

        info!(
            backends = sources.len(),
            entries = entries.len(),
            "Starting breach check session"
        );

        let outcome = self
            .drive(&sources, &entries, &options, &aggregator, cancel)
            .await;
        aggregator.close();

        match &outcome {
            SessionOutcome::Completed { results } => {
                info!(breached = results.len(), "Breach check session completed");
            }
            SessionOutcome::Failed {
                backend, reason, ..
            } => warn!("Breach check session failed in {}: {}", backend, reason),
            SessionOutcome::Cancelled { .. } => info!("Breach check session cancelled"),
        }

        Ok(outcome)
    }

    async fn drive(
        &self,
        sources: &[BreachSource],
        entries: &[Entry],
        options: &CheckOptions,
        aggregator: &Arc<ProgressAggregator>,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        let mut session = CheckingSession::new();
        session.transition(SessionState::Running);

        for (index, &source) in sources.iter().enumerate() {
            if cancel.is_cancelled() {
                return session.cancel();
            }

            let checker = self.factory.create(source);
            aggregator.begin_backend(index, format!("Checking {source}"));
            let sink = ProgressSink::new(Arc::clone(aggregator));

            info!(backend = %source, position = index + 1, of = sources.len(), "Running backend");
            match checker.check_database(entries, options, &sink, cancel).await {
                Ok(found) => {
                    info!(backend = %source, breached = found.len(), "Backend finished");
                    session.results.extend(found);
                }
                Err(CheckError::Cancelled { found }) => {
                    session.results.extend(found);
                    return session.cancel();
                }
                Err(CheckError::BackendFailure {
                    backend,
                    reason,
                    found,
                }) => {
                    session.results.extend(found);
                    return session.fail(backend, reason);
                }
                Err(e) => return session.fail(source, e.to_string()),
            }
        }

        aggregator.finish("Check complete");
        session.complete()
    }
}

/// Handle to a session running in the background.
pub struct SessionHandle {
    progress: mpsc::UnboundedReceiver<ProgressUpdate>,
    cancel: CancellationToken,
    task: JoinHandle<Result<SessionOutcome>>,
}

impl SessionHandle {
    /// Next progress update; `None` once the session closed its progress surface.
    pub async fn next_progress(&mut self) -> Option<ProgressUpdate> {
        self.progress.recv().await
    }

    /// Ask the session to stop at the next entry boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this session when triggered.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the session to finish.
    pub async fn outcome(self) -> Result<SessionOutcome> {
        self.task
            .await
            .map_err(|e| CheckError::SessionAborted(e.to_string()))?
    }
}
