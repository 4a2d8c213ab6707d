use std::time::Duration;

use tokio::time::Instant;

/// Append-only record of the restart timestamps of a single container.
///
/// Timestamps are taken from the monotonic clock, so insertion order is
/// chronological order and the sequence is never re-sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimeLog {
    triggers: Vec<Instant>,
    last_violation: Option<Instant>,
}

impl TimeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a trigger at the current time.
    pub fn append_now(&mut self) {
        self.append_at(Instant::now());
    }

    pub(crate) fn append_at(&mut self, at: Instant) {
        debug_assert!(self.triggers.last().is_none_or(|last| *last <= at));
        self.triggers.push(at);
    }

    /// Returns the number of triggers recorded strictly after `now - lookback`.
    ///
    /// A zero lookback places the cutoff at the current instant and therefore
    /// counts nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use creo_restart_watch::tracker::TimeLog;
    /// let mut log = TimeLog::new();
    /// log.append_now();
    /// assert_eq!(log.events_in_past(Duration::from_secs(60)), 1);
    /// ```
    pub fn events_in_past(&self, lookback: Duration) -> usize {
        self.events_in_past_at(lookback, Instant::now())
    }

    pub(crate) fn events_in_past_at(&self, lookback: Duration, now: Instant) -> usize {
        match now.checked_sub(lookback) {
            // Sorted, so everything after the partition point is inside the window.
            Some(cutoff) => self.triggers.len() - self.triggers.partition_point(|t| *t <= cutoff),
            // The window reaches back past the clock's origin.
            None => self.triggers.len(),
        }
    }

    /// Returns `true` if more than `debounce` has passed since the last violation,
    /// or if no violation was ever raised.
    pub(crate) fn debounce_elapsed(&self, debounce: Duration, now: Instant) -> bool {
        match self.last_violation {
            None => true,
            Some(last) => now.saturating_duration_since(last) > debounce,
        }
    }

    pub(crate) fn record_violation(&mut self, at: Instant) {
        debug_assert!(self.last_violation.is_none_or(|last| last <= at));
        self.last_violation = Some(at);
    }

    pub fn triggers(&self) -> &[Instant] {
        &self.triggers
    }

    /// The instant of the last raised violation, `None` if there never was one.
    pub fn last_violation(&self) -> Option<Instant> {
        self.last_violation
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_events_in_past_counts_only_window() {
        let mut log = TimeLog::new();
        log.append_now();
        tokio::time::advance(2 * MINUTE).await;
        log.append_now();
        tokio::time::advance(2 * MINUTE).await;
        log.append_now();

        assert_eq!(log.events_in_past(5 * MINUTE), 3);
        assert_eq!(log.events_in_past(3 * MINUTE), 2);
        assert_eq!(log.events_in_past(MINUTE), 1);

        tokio::time::advance(10 * MINUTE).await;
        assert_eq!(log.events_in_past(5 * MINUTE), 0);
        assert_eq!(log.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_in_past_cutoff_is_exclusive() {
        let mut log = TimeLog::new();
        log.append_now();
        tokio::time::advance(5 * MINUTE).await;

        // The trigger sits exactly on the cutoff and is not counted.
        assert_eq!(log.events_in_past(5 * MINUTE), 0);
        assert_eq!(log.events_in_past(5 * MINUTE + Duration::from_nanos(1)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_in_past_zero_lookback() {
        let mut log = TimeLog::new();
        log.append_now();
        assert_eq!(log.events_in_past(Duration::ZERO), 0);
    }

    #[test]
    fn test_events_in_past_window_before_clock_origin() {
        let mut log = TimeLog::new();
        log.append_now();
        assert_eq!(log.events_in_past(Duration::MAX), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_are_non_decreasing() {
        let mut log = TimeLog::new();
        for step in [0, 1, 0, 3, 7] {
            tokio::time::advance(Duration::from_secs(step)).await;
            log.append_now();
        }
        assert_eq!(log.len(), 5);
        assert!(log.triggers().windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_elapsed() {
        let mut log = TimeLog::new();
        let debounce = 60 * MINUTE;
        assert!(log.last_violation().is_none());
        assert!(log.debounce_elapsed(debounce, Instant::now()));

        let violated_at = Instant::now();
        log.record_violation(violated_at);
        assert_eq!(log.last_violation(), Some(violated_at));
        assert!(!log.debounce_elapsed(debounce, violated_at + MINUTE));
        assert!(!log.debounce_elapsed(debounce, violated_at + debounce));
        assert!(log.debounce_elapsed(debounce, violated_at + debounce + Duration::from_nanos(1)));
    }
}
