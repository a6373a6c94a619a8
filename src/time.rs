//! Monotonic time types used throughout the core.
//!
//! The core never reads the wall clock itself; the core thread samples
//! [`Instant::now`] once per loop iteration and threads that single value
//! through IP dispatch, the transport engines, and the timer wheel. This
//! keeps every decision in one poll reproducible from a single timestamp.

use core::fmt;
use core::ops;

/// A point in monotonic time, in milliseconds since an arbitrary epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    millis: i64,
}

impl Instant {
    pub const ZERO: Instant = Instant { millis: 0 };

    pub const fn from_millis(millis: i64) -> Instant {
        Instant { millis }
    }

    pub const fn from_secs(secs: i64) -> Instant {
        Instant {
            millis: secs * 1000,
        }
    }

    pub const fn total_millis(&self) -> i64 {
        self.millis
    }

    pub const fn total_secs(&self) -> i64 {
        self.millis / 1000
    }

    /// Sample the system monotonic clock.
    pub fn now() -> Instant {
        use std::sync::OnceLock;
        use std::time::Instant as StdInstant;
        static START: OnceLock<StdInstant> = OnceLock::new();
        let start = START.get_or_init(StdInstant::now);
        Instant::from_millis(start.elapsed().as_millis() as i64)
    }

    pub fn checked_sub(&self, rhs: Duration) -> Option<Instant> {
        self.millis
            .checked_sub(rhs.millis as i64)
            .map(Instant::from_millis)
    }

    pub fn checked_add(&self, rhs: Duration) -> Option<Instant> {
        self.millis
            .checked_add(rhs.millis as i64)
            .map(Instant::from_millis)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.total_secs(), self.millis % 1000)
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;
    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis + rhs.millis as i64)
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;
    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis - rhs.millis as i64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;
    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_millis((self.millis - rhs.millis).max(0) as u64)
    }
}

/// A length of time, in milliseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration {
    millis: u64,
}

impl Duration {
    pub const ZERO: Duration = Duration { millis: 0 };

    pub const fn from_millis(millis: u64) -> Duration {
        Duration { millis }
    }

    pub const fn from_secs(secs: u64) -> Duration {
        Duration {
            millis: secs * 1000,
        }
    }

    pub const fn total_millis(&self) -> u64 {
        self.millis
    }

    pub const fn total_secs(&self) -> u64 {
        self.millis / 1000
    }

    pub fn min(self, other: Duration) -> Duration {
        Duration::from_millis(self.millis.min(other.millis))
    }

    pub fn max(self, other: Duration) -> Duration {
        Duration::from_millis(self.millis.max(other.millis))
    }
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Duration {
        Duration::from_millis(value.as_millis() as u64)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(value: Duration) -> std::time::Duration {
        std::time::Duration::from_millis(value.millis)
    }
}

impl ops::Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration::from_millis(self.millis + rhs.millis)
    }
}

impl ops::Mul<u32> for Duration {
    type Output = Duration;
    fn mul(self, rhs: u32) -> Duration {
        Duration::from_millis(self.millis * rhs as u64)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.total_secs(), self.millis % 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_duration_arith() {
        let a = Instant::from_millis(1000);
        let b = a + Duration::from_millis(500);
        assert_eq!(b.total_millis(), 1500);
        assert_eq!((b - a).total_millis(), 500);
    }

    #[test]
    fn duration_saturates_when_time_runs_backwards() {
        let a = Instant::from_millis(500);
        let b = Instant::from_millis(100);
        assert_eq!((b - a).total_millis(), 0);
    }
}
