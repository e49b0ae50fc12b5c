//! Time source for the lock loop.
//!
//! Polling measures elapsed time on a monotonic clock and blocks the calling
//! thread between reads. Tests swap in [`ManualClock`], whose sleeps advance
//! time instantly.

use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use time::OffsetDateTime;

pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary origin fixed for the clock.
    fn elapsed(&self) -> Duration;

    fn sleep(&self, duration: Duration);

    /// Wall-clock time in UTC, used for build timestamps and cache
    /// invalidation references.
    fn wall_clock(&self) -> OffsetDateTime;
}

#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn wall_clock(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Simulated clock: `sleep` adds to the elapsed time and returns at once.
#[derive(Debug)]
pub struct ManualClock {
    start: OffsetDateTime,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            start,
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += by;
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // give simulated peers on other threads a chance to run
        thread::yield_now();
    }

    fn wall_clock(&self) -> OffsetDateTime {
        self.start + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new(datetime!(2024-03-01 12:00:00 UTC));
        assert_eq!(clock.elapsed(), Duration::ZERO);
        clock.sleep(Duration::from_secs(90));
        assert_eq!(clock.elapsed(), Duration::from_secs(90));
        assert_eq!(clock.wall_clock(), datetime!(2024-03-01 12:01:30 UTC));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.elapsed();
        clock.sleep(Duration::from_millis(1));
        assert!(clock.elapsed() > first);
    }
}
