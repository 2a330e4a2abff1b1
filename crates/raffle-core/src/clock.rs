//! Time handling and the expiry oracle.
//!
//! The whole crate uses exactly one time representation: [`TimestampMs`],
//! milliseconds since the Unix epoch. The original system derived expiry
//! from locale-formatted strings in several independent places and drifted
//! between "looks expired" and "is expired"; here timestamps are fixed once
//! at the write boundary and never re-parsed on a read path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// An instant as milliseconds since the Unix epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TimestampMs(pub i64);

impl TimestampMs {
    /// Offset by a signed number of milliseconds, saturating at the range
    /// bounds.
    pub fn plus_ms(self, ms: i64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    pub fn plus_secs(self, secs: i64) -> Self {
        self.plus_ms(secs.saturating_mul(1_000))
    }

    pub fn plus_minutes(self, minutes: i64) -> Self {
        self.plus_secs(minutes.saturating_mul(60))
    }
}

impl fmt::Display for TimestampMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Expiry oracle: pure and total. A lottery is expired once `now` reaches
/// its end instant.
pub fn is_expired(end_at: TimestampMs, now: TimestampMs) -> bool {
    now >= end_at
}

/// Source of the current instant.
///
/// The core takes `now` as an explicit argument on every operation; the
/// clock trait exists for the components that run unattended (the sweep
/// runner) and for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> TimestampMs;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimestampMs {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        TimestampMs(ms)
    }
}

/// Settable clock for tests and demos.
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now: TimestampMs) -> Self {
        Self {
            now_ms: AtomicI64::new(now.0),
        }
    }

    pub fn set(&self, now: TimestampMs) {
        self.now_ms.store(now.0, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TimestampMs {
        TimestampMs(self.now_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive_at_the_boundary() {
        let end = TimestampMs(10_000);
        assert!(!is_expired(end, TimestampMs(9_999)));
        assert!(is_expired(end, TimestampMs(10_000)));
        assert!(is_expired(end, TimestampMs(10_001)));
    }

    #[test]
    fn offsets_saturate() {
        let t = TimestampMs(i64::MAX - 1);
        assert_eq!(t.plus_ms(100), TimestampMs(i64::MAX));
        let t = TimestampMs(0);
        assert_eq!(t.plus_minutes(15), TimestampMs(15 * 60 * 1_000));
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(TimestampMs(1_000));
        assert_eq!(clock.now(), TimestampMs(1_000));
        clock.advance_ms(500);
        assert_eq!(clock.now(), TimestampMs(1_500));
        clock.set(TimestampMs(42));
        assert_eq!(clock.now(), TimestampMs(42));
    }

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a.0 > 0);
    }
}
