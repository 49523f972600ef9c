//! Time-of-day clock sources.
//!
//! All engine times are milliseconds since the local day boundary. The engine
//! only depends on the [`Clock`] capability, so the source can be swapped at
//! startup (system wall clock, a corrected clock, or an externally driven one).

use chrono::{Local, Timelike};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Milliseconds in one day.
pub const DAY_TO_MS: i64 = 86_400_000;

/// A source of the current time of day.
pub trait Clock: Send + Sync {
    /// Milliseconds since the local day boundary, in `0..DAY_TO_MS`.
    fn now(&self) -> i64;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "clock"
    }
}

/// Local wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        let now = Local::now();
        i64::from(now.num_seconds_from_midnight()) * 1000
            + i64::from(now.nanosecond() / 1_000_000).min(999)
    }

    fn name(&self) -> &str {
        "system"
    }
}

/// A clock whose value is set from outside.
///
/// Clones share the same value. Used by tests and by external feeds
/// (timecode, remote masters) that push their own notion of time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    value: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a manual clock at the given time of day.
    pub fn new(value: i64) -> Self {
        Self {
            value: Arc::new(AtomicI64::new(wrap_day(value))),
        }
    }

    /// Set the current time of day.
    pub fn set(&self, value: i64) {
        self.value.store(wrap_day(value), Ordering::SeqCst);
    }

    /// Move the clock forward, wrapping at midnight.
    pub fn advance(&self, ms: i64) {
        let current = self.value.load(Ordering::SeqCst);
        self.value.store(wrap_day(current + ms), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "manual"
    }
}

/// Wraps another clock and applies a fixed correction.
#[derive(Clone, Debug)]
pub struct OffsetClock<C> {
    inner: C,
    offset_ms: i64,
}

impl<C: Clock> OffsetClock<C> {
    pub fn new(inner: C, offset_ms: i64) -> Self {
        Self { inner, offset_ms }
    }
}

impl<C: Clock> Clock for OffsetClock<C> {
    fn now(&self) -> i64 {
        wrap_day(self.inner.now() + self.offset_ms)
    }

    fn name(&self) -> &str {
        "offset"
    }
}

/// Bring any millisecond value into `0..DAY_TO_MS`.
pub fn wrap_day(value: i64) -> i64 {
    value.rem_euclid(DAY_TO_MS)
}

/// Signed difference `a - b` between two times of day, taking the shortest
/// way around midnight.
pub fn day_delta(a: i64, b: i64) -> i64 {
    let delta = wrap_day(a - b);
    if delta > DAY_TO_MS / 2 {
        delta - DAY_TO_MS
    } else {
        delta
    }
}

/// Format milliseconds as `[-]hh:mm:ss`.
pub fn format_hms(ms: i64) -> String {
    let sign = if ms < 0 { "-" } else { "" };
    let total = ms.unsigned_abs() / 1000;
    format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        total / 3600,
        (total / 60) % 60,
        total % 60
    )
}
