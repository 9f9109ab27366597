//! Microsecond time sources.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::taxonomy::TimeUs;

/// Source of the deterministic microsecond time base.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> TimeUs;
}

/// Wall clock, microseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> TimeUs {
        // Pre-epoch clocks clamp to zero.
        u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0)
    }
}

/// Manually driven clock for tests and simulation.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: TimeUs) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, delta_us: u64) {
        self.now.fetch_add(delta_us, Ordering::SeqCst);
    }

    pub fn set(&self, now: TimeUs) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> TimeUs {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_us(), 100);
        clock.advance(50);
        assert_eq!(clock.now_us(), 150);
        clock.set(7);
        assert_eq!(clock.now_us(), 7);
    }

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z in microseconds.
        assert!(SystemClock.now_us() > 1_577_836_800_000_000);
    }
}
