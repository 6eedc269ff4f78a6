// Value debouncer for the editing session.
//
// Holds back a rapidly changing value until it has been stable for a
// configurable window. Only the newest value propagates; intermediate values
// are dropped, never queued. A value equal to the last propagated one does not
// propagate again.

use std::time::{Duration, Instant};

/// Configuration for a debounced value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl DebounceConfig {
    pub fn with_millis(ms: u64) -> Self {
        Self { window: Duration::from_millis(ms) }
    }
}

/// Newest value still inside its quiet window.
#[derive(Debug, Clone)]
struct Pending<T> {
    value: T,
    last_seen: Instant,
}

/// Debounces a single value.
///
/// Call `push()` on every change, then `poll()` periodically (or at
/// `next_deadline()`) to collect the value once it has settled.
#[derive(Debug, Clone)]
pub struct Debounced<T> {
    config: DebounceConfig,
    pending: Option<Pending<T>>,
    settled: Option<T>,
}

impl<T: Clone + PartialEq> Debounced<T> {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, pending: None, settled: None }
    }

    /// Record a new value. Replaces any pending value and restarts the window.
    pub fn push(&mut self, value: T) {
        self.push_at(value, Instant::now());
    }

    /// Like `push` but with a specific timestamp.
    pub fn push_at(&mut self, value: T, now: Instant) {
        self.pending = Some(Pending { value, last_seen: now });
    }

    /// Take the pending value if its window has elapsed and it differs from
    /// the last propagated value.
    pub fn poll(&mut self) -> Option<T> {
        self.poll_at(Instant::now())
    }

    /// Like `poll` but with a specific timestamp.
    pub fn poll_at(&mut self, now: Instant) -> Option<T> {
        let ready = self
            .pending
            .as_ref()
            .is_some_and(|pending| now.duration_since(pending.last_seen) >= self.config.window);
        if !ready {
            return None;
        }

        let pending = self.pending.take()?;
        if self.settled.as_ref() == Some(&pending.value) {
            return None;
        }
        self.settled = Some(pending.value.clone());
        Some(pending.value)
    }

    /// When the pending value becomes ready. None if nothing is pending or
    /// the window reaches past the clock's range.
    pub fn next_deadline(&self) -> Option<Instant> {
        let pending = self.pending.as_ref()?;
        pending.last_seen.checked_add(self.config.window)
    }

    /// Drop any pending value and make `value` the propagated baseline.
    pub fn seed(&mut self, value: T) {
        self.pending = None;
        self.settled = Some(value);
    }

    /// Make `value` the propagated baseline but keep a pending value waiting.
    pub fn rebase(&mut self, value: T) {
        self.settled = Some(value);
    }

    /// Drop any pending value.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Last value that propagated (or was seeded).
    pub fn settled(&self) -> Option<&T> {
        self.settled.as_ref()
    }

    pub fn window(&self) -> Duration {
        self.config.window
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn debouncer() -> Debounced<String> {
        Debounced::new(DebounceConfig::with_millis(300))
    }

    // ── Single value lifecycle ─────────────────────────────────────

    #[test]
    fn not_ready_before_window() {
        let mut title = debouncer();
        let now = Instant::now();

        title.push_at("a".into(), now);

        assert_eq!(title.poll_at(now + Duration::from_millis(299)), None);
        assert!(title.is_pending());
    }

    #[test]
    fn ready_after_window() {
        let mut title = debouncer();
        let now = Instant::now();

        title.push_at("a".into(), now);

        assert_eq!(title.poll_at(now + Duration::from_millis(300)).as_deref(), Some("a"));
        assert!(!title.is_pending());
        assert_eq!(title.settled().map(String::as_str), Some("a"));
    }

    // ── Coalescing ─────────────────────────────────────────────────

    #[test]
    fn rapid_values_coalesce_last_wins() {
        let mut title = debouncer();
        let now = Instant::now();

        title.push_at("H".into(), now);
        title.push_at("He".into(), now + Duration::from_millis(100));
        title.push_at("Hel".into(), now + Duration::from_millis(200));

        // 200ms since the last push: still quiet-window.
        assert_eq!(title.poll_at(now + Duration::from_millis(400)), None);

        assert_eq!(title.poll_at(now + Duration::from_millis(500)).as_deref(), Some("Hel"));
        // Drained: the earlier values never propagate.
        assert_eq!(title.poll_at(now + Duration::from_secs(5)), None);
    }

    #[test]
    fn unchanged_value_does_not_repropagate() {
        let mut title = debouncer();
        let now = Instant::now();

        title.push_at("same".into(), now);
        assert!(title.poll_at(now + Duration::from_millis(300)).is_some());

        title.push_at("same".into(), now + Duration::from_millis(400));
        assert_eq!(title.poll_at(now + Duration::from_millis(800)), None);
        assert!(!title.is_pending());
    }

    // ── Baselines ──────────────────────────────────────────────────

    #[test]
    fn seed_drops_pending_and_sets_baseline() {
        let mut title = debouncer();
        let now = Instant::now();

        title.push_at("typed".into(), now);
        title.seed("loaded".into());

        assert!(!title.is_pending());
        assert_eq!(title.next_deadline(), None);

        title.push_at("loaded".into(), now);
        assert_eq!(title.poll_at(now + Duration::from_secs(1)), None);
    }

    #[test]
    fn rebase_keeps_pending_value() {
        let mut title = debouncer();
        let now = Instant::now();

        title.push_at("typed".into(), now);
        title.rebase("canonical".into());

        assert_eq!(title.poll_at(now + Duration::from_millis(300)).as_deref(), Some("typed"));
    }

    #[test]
    fn cancel_drops_pending() {
        let mut title = debouncer();
        let now = Instant::now();

        title.push_at("a".into(), now);
        title.cancel();

        assert_eq!(title.poll_at(now + Duration::from_secs(1)), None);
    }

    // ── next_deadline ──────────────────────────────────────────────

    #[test]
    fn next_deadline_tracks_last_push() {
        let mut title = debouncer();
        let now = Instant::now();
        assert!(title.next_deadline().is_none());

        title.push_at("a".into(), now);
        title.push_at("b".into(), now + Duration::from_millis(50));

        assert_eq!(title.next_deadline(), Some(now + Duration::from_millis(350)));
    }

    #[test]
    fn window_past_clock_range_has_no_deadline() {
        let mut title = Debounced::new(DebounceConfig { window: Duration::MAX });
        let now = Instant::now();

        title.push_at("a".to_string(), now);

        assert!(title.is_pending());
        assert_eq!(title.next_deadline(), None);
        assert_eq!(title.poll_at(now + Duration::from_secs(3600)), None);
    }

    #[test]
    fn wall_clock_poll_on_empty_returns_none() {
        let mut title = debouncer();
        assert_eq!(title.poll(), None);
        title.push("x".into());
        assert_eq!(title.window(), Duration::from_millis(300));
    }
}
