// Autosave scheduling.
//
// Watches the tuple (debounced draft revision, dirty, saving). Every change of
// that tuple re-evaluates the timer: dirty and idle arms it one interval out,
// anything else disarms it. A burst of edits therefore produces one save, one
// interval after the burst settles.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::AutosaveConfig;
use crate::debounce::Debounced;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Watched {
    revision: u64,
    dirty: bool,
    saving: bool,
}

#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    enabled: bool,
    interval: Duration,
    snapshot: Debounced<u64>,
    watched: Option<Watched>,
    deadline: Option<Instant>,
}

impl AutosaveScheduler {
    pub fn new(config: &AutosaveConfig) -> Self {
        Self {
            enabled: config.enabled,
            interval: config.interval(),
            snapshot: Debounced::new(config.snapshot_debounce()),
            watched: None,
            deadline: None,
        }
    }

    /// Record that the draft changed to `revision`.
    pub fn note_revision(&mut self, revision: u64, now: Instant) {
        self.snapshot.push_at(revision, now);
    }

    /// Re-evaluate the timer against the current draft state.
    pub fn observe(&mut self, dirty: bool, saving: bool, now: Instant) {
        let revision = match self.snapshot.poll_at(now) {
            Some(revision) => revision,
            None => self.snapshot.settled().copied().unwrap_or_default(),
        };

        let tuple = Watched { revision, dirty, saving };
        if self.watched == Some(tuple) {
            return;
        }
        self.watched = Some(tuple);

        if self.enabled && dirty && !saving {
            // An interval past the clock's range never comes due.
            self.deadline = now.checked_add(self.interval);
            debug!(revision, deadline = ?self.deadline, "autosave armed");
        } else if self.deadline.take().is_some() {
            debug!(revision, dirty, saving, "autosave disarmed");
        }
    }

    /// True once per armed deadline, when it has passed.
    pub fn poll_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Earliest instant at which `observe` or `poll_at` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.snapshot.next_deadline(), self.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Forget the draft history: `revision` becomes the settled snapshot and
    /// the timer is disarmed. Used when a post is loaded or reset.
    pub fn rebase(&mut self, revision: u64) {
        self.snapshot.seed(revision);
        self.watched = None;
        self.deadline = None;
    }

    pub fn cancel(&mut self) {
        self.snapshot.cancel();
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }
}
