#![forbid(unsafe_code)]

//! Cancellable debounce timers.
//!
//! [`Debouncer`] is a deadline, not a thread: `schedule_at(now)` cancels any
//! pending deadline and sets a new one `delay` later, and `poll_at(now)`
//! fires exactly once when the deadline has passed. [`Debounced<T>`] pairs
//! the timer with the latest pending value so callers receive only the last
//! input of a burst.
//!
//! # Invariants
//! 1. At most one pending deadline.
//! 2. `poll_at` returns `true` at most once per scheduled burst.
//! 3. A burst of N schedules inside the quiet window yields one firing.

use std::time::Duration;

use web_time::Instant;

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebounceStats {
    /// Calls to `schedule_at`.
    pub scheduled: u64,
    /// Pending deadlines replaced by a newer schedule.
    pub coalesced: u64,
    /// Deadlines that fired.
    pub fired: u64,
    /// Pending deadlines cancelled explicitly.
    pub cancelled: u64,
}

/// A resettable quiet-period timer.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
    stats: DebounceStats,
}

impl Debouncer {
    /// Create an idle debouncer.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            stats: DebounceStats::default(),
        }
    }

    /// Quiet period.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Change the quiet period. Applies to the next schedule.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Whether a deadline is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Pending deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel any pending deadline and schedule a new one.
    pub fn schedule(&mut self) {
        self.schedule_at(Instant::now());
    }

    /// Cancel any pending deadline and schedule one `delay` after `now`.
    pub fn schedule_at(&mut self, now: Instant) {
        self.stats.scheduled += 1;
        if self.deadline.is_some() {
            self.stats.coalesced += 1;
        }
        self.deadline = Some(now + self.delay);
    }

    /// Drop the pending deadline without firing.
    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            self.stats.cancelled += 1;
        }
    }

    /// Fire if the deadline passed.
    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    /// Fire if the deadline is at or before `now`.
    pub fn poll_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.stats.fired += 1;
                true
            }
            _ => false,
        }
    }

    /// Time left until firing, if pending.
    #[must_use]
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Counters since construction.
    #[must_use]
    pub fn stats(&self) -> DebounceStats {
        self.stats
    }
}

/// A debouncer carrying the latest pending value.
#[derive(Debug, Clone)]
pub struct Debounced<T> {
    timer: Debouncer,
    pending: Option<T>,
}

impl<T> Debounced<T> {
    /// Create with the given quiet period.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            timer: Debouncer::new(delay),
            pending: None,
        }
    }

    /// Replace the pending value and restart the quiet period.
    pub fn push_at(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        self.timer.schedule_at(now);
    }

    /// Take the value when the quiet period elapsed.
    pub fn poll_at(&mut self, now: Instant) -> Option<T> {
        if self.timer.poll_at(now) {
            self.pending.take()
        } else {
            None
        }
    }

    /// Drop the pending value.
    pub fn cancel(&mut self) -> Option<T> {
        self.timer.cancel();
        self.pending.take()
    }

    /// Pending value, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    /// Underlying timer.
    #[must_use]
    pub fn timer(&self) -> &Debouncer {
        &self.timer
    }

    /// Mutable access to the underlying timer.
    pub fn timer_mut(&mut self) -> &mut Debouncer {
        &mut self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn fires_once_after_quiet_period() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(100 * MS);
        d.schedule_at(t0);
        assert!(!d.poll_at(t0 + 99 * MS));
        assert!(d.poll_at(t0 + 100 * MS));
        assert!(!d.poll_at(t0 + 500 * MS));
        assert_eq!(d.stats().fired, 1);
    }

    #[test]
    fn reschedule_pushes_deadline() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(100 * MS);
        d.schedule_at(t0);
        d.schedule_at(t0 + 80 * MS);
        assert!(!d.poll_at(t0 + 150 * MS));
        assert!(d.poll_at(t0 + 180 * MS));
        assert_eq!(d.stats().coalesced, 1);
    }

    #[test]
    fn cancel_prevents_firing() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(10 * MS);
        d.schedule_at(t0);
        d.cancel();
        assert!(!d.is_pending());
        assert!(!d.poll_at(t0 + 20 * MS));
        assert_eq!(d.stats().cancelled, 1);
    }

    #[test]
    fn cancel_when_idle_is_not_counted() {
        let mut d = Debouncer::new(10 * MS);
        d.cancel();
        assert_eq!(d.stats().cancelled, 0);
    }

    #[test]
    fn remaining_reports_time_left() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(100 * MS);
        assert_eq!(d.remaining_at(t0), None);
        d.schedule_at(t0);
        assert_eq!(d.remaining_at(t0 + 40 * MS), Some(60 * MS));
        assert_eq!(d.remaining_at(t0 + 400 * MS), Some(Duration::ZERO));
    }

    #[test]
    fn debounced_delivers_last_value() {
        let t0 = Instant::now();
        let mut d = Debounced::new(100 * MS);
        for (i, v) in ["a", "ab", "abc"].into_iter().enumerate() {
            d.push_at(v, t0 + (i as u32 * 10) * MS);
        }
        assert_eq!(d.poll_at(t0 + 50 * MS), None);
        assert_eq!(d.poll_at(t0 + 120 * MS), Some("abc"));
        assert_eq!(d.poll_at(t0 + 300 * MS), None);
    }

    #[test]
    fn debounced_cancel_returns_pending() {
        let t0 = Instant::now();
        let mut d = Debounced::new(100 * MS);
        d.push_at(5, t0);
        assert_eq!(d.cancel(), Some(5));
        assert_eq!(d.poll_at(t0 + 200 * MS), None);
    }

    proptest::proptest! {
        #[test]
        fn burst_inside_window_fires_once_with_last_value(
            gaps in proptest::collection::vec(0u64..100, 1..20),
        ) {
            let t0 = Instant::now();
            let mut d = Debounced::new(100 * MS);
            let mut now = t0;
            for (i, gap) in gaps.iter().enumerate() {
                d.push_at(i, now);
                now += Duration::from_millis(*gap);
                proptest::prop_assert_eq!(d.poll_at(now), None);
            }
            proptest::prop_assert_eq!(d.poll_at(now + 100 * MS), Some(gaps.len() - 1));
            proptest::prop_assert_eq!(d.timer().stats().fired, 1);
        }
    }
}
