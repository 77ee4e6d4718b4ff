//! Progress reporting and cooperative cancellation for long-running work.
//!
//! A [`Progress`] handle is owned by its command and handed to the work for
//! the duration of one run. The work reports through
//! [`update_progress`](Progress::update_progress) and
//! [`update_status`](Progress::update_status), and polls
//! [`is_canceled`](Progress::is_canceled) at natural yield points (loop
//! iterations, before I/O). Nothing ever interrupts the work: cancellation is
//! a flag.
//!
//! # Invariants
//!
//! 1. `progress` is always within `[0.0, 1.0]`.
//! 2. `is_canceled` only goes from `false` to `true`, except through
//!    [`reset`](Progress::reset), which the command calls right before every
//!    run.

use sortie_reactive::Observable;

/// Progress, status and cancellation of one execution, each independently
/// observable.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone, Debug)]
pub struct Progress {
    progress: Observable<f64>,
    status: Observable<Option<String>>,
    canceled: Observable<bool>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    /// Zero progress, no status, not canceled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            progress: Observable::new(0.0),
            status: Observable::new(None),
            canceled: Observable::new(false),
        }
    }

    // ── Work side ────────────────────────────────────────────────────

    /// Report progress as a fraction.
    ///
    /// # Panics
    ///
    /// Panics unless `0.0 <= fraction <= 1.0`. The stored value is left
    /// unchanged.
    pub fn update_progress(&self, fraction: f64) {
        assert!(
            (0.0..=1.0).contains(&fraction),
            "progress must be within [0.0, 1.0], got {fraction}"
        );
        self.progress.set(fraction);
    }

    /// Report a human-readable status line.
    pub fn update_status(&self, message: impl Into<String>) {
        self.status.set(Some(message.into()));
    }

    /// Remove the status line.
    pub fn clear_status(&self) {
        self.status.set(None);
    }

    /// Whether cancellation was requested.
    #[inline]
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.get()
    }

    /// Current progress fraction.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.progress.get()
    }

    /// Current status line.
    #[must_use]
    pub fn status(&self) -> Option<String> {
        self.status.get()
    }

    // ── Owner side ───────────────────────────────────────────────────

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.canceled.get() {
            tracing::debug!("progress canceled");
        }
        self.canceled.set(true);
    }

    /// Restore progress, status and the cancellation flag.
    ///
    /// # Panics
    ///
    /// Panics unless `0.0 <= fraction <= 1.0`.
    pub fn reset(&self, fraction: f64, status: Option<String>) {
        assert!(
            (0.0..=1.0).contains(&fraction),
            "progress must be within [0.0, 1.0], got {fraction}"
        );
        self.progress.set(fraction);
        self.status.set(status);
        self.canceled.set(false);
    }

    /// The progress cell.
    #[must_use]
    pub fn progress_cell(&self) -> &Observable<f64> {
        &self.progress
    }

    /// The status cell.
    #[must_use]
    pub fn status_cell(&self) -> &Observable<Option<String>> {
        &self.status
    }

    /// The cancellation cell.
    #[must_use]
    pub fn canceled_cell(&self) -> &Observable<bool> {
        &self.canceled
    }

    pub(crate) fn dispose(&self) {
        self.progress.dispose();
        self.status.dispose();
        self.canceled.dispose();
    }
}
