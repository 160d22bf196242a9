//! Fixed-window counter.

use std::time::{Duration, Instant};

/// A count of calls attributed to one key within a fixed window.
///
/// The counter is not synchronized itself; the owning store keeps it behind
/// a per-key exclusive section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowCounter {
    count: u64,
    window_start: Instant,
    window_end: Instant,
}

/// Counter state observed right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Count including the increment that produced this snapshot
    pub count: u64,
    /// Time left until the window resets
    pub reset_after: Duration,
}

impl WindowCounter {
    /// Create an empty counter whose window opens at `now`.
    pub fn new(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            window_end: window_end(now, window),
        }
    }

    /// Count one call, opening a new window first if the current one ended.
    pub fn increment(&mut self, now: Instant, window: Duration) -> CounterSnapshot {
        if self.is_expired(now) {
            self.count = 0;
            self.window_start = now;
            self.window_end = window_end(now, window);
        }

        self.count = self.count.saturating_add(1);

        CounterSnapshot {
            count: self.count,
            reset_after: self.window_end.saturating_duration_since(now),
        }
    }

    /// Whether the window has ended at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_end
    }

    /// Calls counted in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the current window opened.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// When the current window ends.
    pub fn window_end(&self) -> Instant {
        self.window_end
    }
}

/// End of a window opening at `now`, clamped to an instant the platform can represent.
fn window_end(now: Instant, window: Duration) -> Instant {
    let mut window = window;
    loop {
        match now.checked_add(window) {
            Some(end) => return end,
            None => window /= 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_increment_within_window() {
        let start = Instant::now();
        let mut counter = WindowCounter::new(start, WINDOW);

        let snapshot = counter.increment(start, WINDOW);
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.reset_after, WINDOW);

        let snapshot = counter.increment(start + Duration::from_secs(20), WINDOW);
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.reset_after, Duration::from_secs(40));
    }

    #[test]
    fn test_expired_window_resets_on_increment() {
        let start = Instant::now();
        let mut counter = WindowCounter::new(start, WINDOW);
        for _ in 0..5 {
            counter.increment(start, WINDOW);
        }

        let later = start + Duration::from_secs(90);
        assert!(counter.is_expired(later));

        let snapshot = counter.increment(later, WINDOW);
        assert_eq!(snapshot.count, 1);
        assert_eq!(counter.window_start(), later);
        assert_eq!(counter.window_end(), later + WINDOW);
    }

    #[test]
    fn test_window_end_is_exclusive() {
        let start = Instant::now();
        let counter = WindowCounter::new(start, WINDOW);

        assert!(!counter.is_expired(start + WINDOW - Duration::from_millis(1)));
        assert!(counter.is_expired(start + WINDOW));
    }

    #[test]
    fn test_oversized_window_is_clamped() {
        let start = Instant::now();
        let mut counter = WindowCounter::new(start, Duration::MAX);
        assert!(counter.window_end() > start);

        let snapshot = counter.increment(start + WINDOW, Duration::MAX);
        assert_eq!(snapshot.count, 1);
        assert!(snapshot.reset_after > WINDOW);
        assert!(!counter.is_expired(start + Duration::from_secs(365 * 24 * 3600)));
    }
}
