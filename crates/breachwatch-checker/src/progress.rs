//! Progress aggregation across sequential backend runs.
//!
//! Backends report progress for their own run through a [`ProgressSink`].
//! The session-owned [`ProgressAggregator`] folds that into a single 0-100
//! scale using the backend's position among the selected backends and
//! forwards it to whoever subscribed to the session.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Progress of a single backend run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressItem {
    /// Completion of this backend's run, 0-100
    pub progress: f64,
    /// Status text for display
    pub text: String,
}

impl ProgressItem {
    /// Create a progress item.
    #[must_use]
    pub fn new(progress: f64, text: impl Into<String>) -> Self {
        Self {
            progress,
            text: text.into(),
        }
    }
}

/// Position of the running backend within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    /// Number of backends selected for the session
    pub total_breaches: usize,
    /// Zero-based index of the backend currently running
    pub current_breach: usize,
}

impl ProgressState {
    /// Create state for a session running `total_breaches` backends.
    #[must_use]
    pub fn new(total_breaches: usize) -> Self {
        Self {
            total_breaches: total_breaches.max(1),
            current_breach: 0,
        }
    }

    /// Map a backend-local percentage to the session-wide scale.
    ///
    /// `progress` is clamped to 0-100, so the result always lies in
    /// `[100 * i / T, 100 * (i + 1) / T]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn global_percent(&self, progress: f64) -> f64 {
        let total = self.total_breaches as f64;
        let current = self.current_breach.min(self.total_breaches) as f64;
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 100.0)
        };
        ((100.0 / total) * current + progress / total).min(100.0)
    }
}

/// Session-wide progress delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Global completion, 0-100
    pub percent: f64,
    /// Status text from the running backend
    pub text: String,
}

struct AggregatorInner {
    state: ProgressState,
    last_percent: f64,
    sender: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

/// Session-owned progress surface.
///
/// Closing the surface (explicitly, or by dropping the receiver) turns every
/// later update into a no-op.
pub struct ProgressAggregator {
    inner: Mutex<AggregatorInner>,
}

impl ProgressAggregator {
    /// Create an aggregator for `total_breaches` backends publishing to `sender`.
    #[must_use]
    pub fn new(total_breaches: usize, sender: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        Self {
            inner: Mutex::new(AggregatorInner {
                state: ProgressState::new(total_breaches),
                last_percent: 0.0,
                sender: Some(sender),
            }),
        }
    }

    /// Move to the backend at `index` and announce it.
    pub fn begin_backend(&self, index: usize, text: impl Into<String>) {
        {
            let mut inner = self.inner.lock().expect("acquire progress lock");
            inner.state.current_breach = index;
        }
        self.report(&ProgressItem::new(0.0, text));
    }

    /// Forward one backend progress item.
    ///
    /// Percentages never move backwards within a session.
    pub fn report(&self, item: &ProgressItem) {
        let mut inner = self.inner.lock().expect("acquire progress lock");
        let Some(sender) = inner.sender.as_ref() else {
            return;
        };

        let percent = inner.state.global_percent(item.progress).max(inner.last_percent);
        let update = ProgressUpdate {
            percent,
            text: item.text.clone(),
        };

        if sender.send(update).is_err() {
            tracing::debug!("progress subscriber went away, closing progress surface");
            inner.sender = None;
            return;
        }
        inner.last_percent = percent;
    }

    /// Report completion of the whole session.
    pub fn finish(&self, text: impl Into<String>) {
        {
            let mut inner = self.inner.lock().expect("acquire progress lock");
            inner.state.current_breach = inner.state.total_breaches;
        }
        self.report(&ProgressItem::new(100.0, text));
    }

    /// Close the progress surface. Subscribers see the channel end.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("acquire progress lock");
        inner.sender = None;
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.inner.lock().expect("acquire progress lock").sender.is_none()
    }
}

/// Handle a backend writes its own progress to.
#[derive(Clone, Default)]
pub struct ProgressSink {
    aggregator: Option<Arc<ProgressAggregator>>,
}

impl ProgressSink {
    /// Sink forwarding into `aggregator`.
    #[must_use]
    pub fn new(aggregator: Arc<ProgressAggregator>) -> Self {
        Self {
            aggregator: Some(aggregator),
        }
    }

    /// Sink that drops every update.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Report an arbitrary backend-local percentage.
    pub fn report(&self, progress: f64, text: impl Into<String>) {
        if let Some(aggregator) = &self.aggregator {
            aggregator.report(&ProgressItem::new(progress, text));
        }
    }

    /// Report that `processed` of `total` eligible entries are done.
    #[allow(clippy::cast_precision_loss)]
    pub fn entries_processed(&self, processed: usize, total: usize, text: impl Into<String>) {
        let progress = if total == 0 {
            100.0
        } else {
            processed as f64 / total as f64 * 100.0
        };
        self.report(progress, text);
    }
}
