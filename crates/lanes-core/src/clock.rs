//! Monotonic microsecond timestamps for `*_at_us` columns.

use std::sync::atomic::{AtomicI64, Ordering};

fn system_time_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Wall clock that never hands out the same or an earlier value twice.
///
/// "Recently changed" queries sort on `updated_at_us`, so two writes in the
/// same microsecond must still be distinguishable.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Next timestamp: `max(now, last + 1)`.
    pub fn now(&self) -> i64 {
        self.after(0)
    }

    /// Next timestamp that is also strictly greater than `previous`.
    ///
    /// Used when touching a row written by another process whose clock
    /// state this instance never saw.
    pub fn after(&self, previous: i64) -> i64 {
        let now = system_time_us();
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1).max(previous + 1);
            match self
                .last
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MonotonicClock;

    #[test]
    fn successive_reads_strictly_increase() {
        let clock = MonotonicClock::new();
        let mut previous = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn after_respects_future_rows() {
        let clock = MonotonicClock::new();
        let far_future = clock.now() + 60_000_000;
        assert_eq!(clock.after(far_future), far_future + 1);
        assert!(clock.now() > far_future);
    }
}
