//! Coalescing of rapid URL edits.
//!
//! [`Debouncer`] is the bookkeeping: it only knows the time of the last edit
//! and answers "is the quiet window over?" for a given `now`. [`DebounceTimer`]
//! is the live side, a delayed task that is rescheduled on every edit and
//! aborted when dropped.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    last_edit: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_edit: None,
        }
    }

    /// Arms the window, or restarts it if already armed.
    pub fn record_edit(&mut self, now: Instant) {
        self.last_edit = Some(now);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.last_edit.map(|edit| edit + self.delay)
    }

    pub fn is_armed(&self) -> bool {
        self.last_edit.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Disarms and returns true if the window has elapsed at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.last_edit = None;
            true
        } else {
            false
        }
    }

    pub fn cancel(&mut self) {
        self.last_edit = None;
    }
}

/// A single pending delayed callback.
#[derive(Default)]
pub struct DebounceTimer {
    handle: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any pending callback with `on_fire` at `deadline`.
    pub fn schedule<F>(&mut self, deadline: Instant, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
