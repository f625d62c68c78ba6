//! Injectable wall clock
//!
//! Cooldowns, detection timestamps and quest stall timers all read time
//! through [`Clock`] so tests can drive them without real waiting.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Real UTC clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock shared between clones
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Create a clock frozen at the current UTC time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    /// Move the clock forward by whole seconds
    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    /// Jump to an absolute time
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Longest duration config may express, in seconds
pub const MAX_DURATION_SECS: f64 = 1.0e7;

/// Convert fractional seconds from config into a chrono duration
///
/// Clamped to `[0, MAX_DURATION_SECS]`; NaN maps to zero.
pub fn secs_to_duration(secs: f64) -> Duration {
    let secs = if secs.is_nan() { 0.0 } else { secs.clamp(0.0, MAX_DURATION_SECS) };
    Duration::milliseconds((secs * 1000.0).round() as i64)
}

/// Convert a chrono duration into fractional seconds
pub fn duration_to_secs(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance_is_shared() {
        let clock = ManualClock::starting_now();
        let other = clock.clone();
        let start = clock.now();

        other.advance_secs(30);
        assert_eq!(clock.now() - start, Duration::seconds(30));
    }

    #[test]
    fn test_secs_round_trip() {
        let d = secs_to_duration(7.5);
        assert_eq!(d, Duration::milliseconds(7500));
        assert!((duration_to_secs(d) - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_negative_secs_clamped() {
        assert_eq!(secs_to_duration(-3.0), Duration::zero());
    }

    #[test]
    fn test_huge_secs_clamped() {
        assert_eq!(secs_to_duration(1e20), Duration::seconds(MAX_DURATION_SECS as i64));
        assert_eq!(secs_to_duration(f64::INFINITY), Duration::seconds(MAX_DURATION_SECS as i64));
        assert_eq!(secs_to_duration(f64::NAN), Duration::zero());
    }
}
