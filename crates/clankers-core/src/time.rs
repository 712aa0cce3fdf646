use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn secs_to_nanos(secs: f64) -> u64 {
    (secs.max(0.0) * NANOS_PER_SEC).round() as u64
}

// ---------------------------------------------------------------------------
// ControlTime
// ---------------------------------------------------------------------------

/// Integer-nanosecond controller clock.
///
/// Elapsed-state timers are differences of these values, so a state that has
/// run for `k` ticks reports exactly `k * dt` regardless of how long the
/// controller has been up.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ControlTime {
    nanos: u64,
}

impl ControlTime {
    pub const ZERO: Self = Self { nanos: 0 };

    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Create from seconds, rounded to the nearest nanosecond. Negative
    /// inputs clamp to zero.
    #[must_use]
    pub fn from_secs(secs: f64) -> Self {
        Self {
            nanos: secs_to_nanos(secs),
        }
    }

    #[must_use]
    pub const fn nanos(&self) -> u64 {
        self.nanos
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC
    }

    /// Seconds elapsed since `earlier`. Zero if `earlier` is ahead.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn secs_since(&self, earlier: Self) -> f64 {
        self.nanos.saturating_sub(earlier.nanos) as f64 / NANOS_PER_SEC
    }
}

impl Add<u64> for ControlTime {
    type Output = Self;

    fn add(self, rhs_nanos: u64) -> Self {
        Self {
            nanos: self.nanos.saturating_add(rhs_nanos),
        }
    }
}

impl Sub for ControlTime {
    type Output = f64;

    /// Saturating difference in seconds.
    fn sub(self, rhs: Self) -> f64 {
        self.secs_since(rhs)
    }
}

impl fmt::Display for ControlTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.nanos / 1_000_000_000;
        let remaining_nanos = self.nanos % 1_000_000_000;
        let millis = remaining_nanos / 1_000_000;
        let micros = (remaining_nanos % 1_000_000) / 1_000;
        write!(f, "{total_secs}.{millis:03}{micros:03}s")
    }
}

// ---------------------------------------------------------------------------
// ControlClock
// ---------------------------------------------------------------------------

/// Fixed-period tick clock owned by each foot controller.
#[derive(Debug, Clone)]
pub struct ControlClock {
    now: ControlTime,
    period_nanos: u64,
    period_secs: f64,
    ticks: u64,
}

impl ControlClock {
    /// Create a clock at zero with the given period in seconds.
    #[must_use]
    pub fn new(period_secs: f64) -> Self {
        Self {
            now: ControlTime::ZERO,
            period_nanos: secs_to_nanos(period_secs),
            period_secs,
            ticks: 0,
        }
    }

    /// Advance by one period.
    pub fn advance(&mut self) {
        self.now = self.now + self.period_nanos;
        self.ticks += 1;
    }

    #[must_use]
    pub const fn now(&self) -> ControlTime {
        self.now
    }

    #[must_use]
    pub const fn period(&self) -> f64 {
        self.period_secs
    }

    /// Number of completed ticks.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn reset(&mut self) {
        self.now = ControlTime::ZERO;
        self.ticks = 0;
    }
}

// ---------------------------------------------------------------------------
// StateTimer
// ---------------------------------------------------------------------------

/// Elapsed time since a state was entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateTimer {
    entered_at: ControlTime,
}

impl StateTimer {
    pub fn restart(&mut self, now: ControlTime) {
        self.entered_at = now;
    }

    #[must_use]
    pub fn elapsed(&self, now: ControlTime) -> f64 {
        now - self.entered_at
    }

    #[must_use]
    pub const fn entered_at(&self) -> ControlTime {
        self.entered_at
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
