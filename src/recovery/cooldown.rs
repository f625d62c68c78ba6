//! Per-action cooldowns with multiplicative failure backoff
//!
//! Success cooldowns are flat (scaled by disruption in config). Failure
//! cooldowns grow by `multiplier` for each failure of the same action inside
//! the rolling backoff window, capped at `max_cooldown`.

use crate::config::RecoveryConfig;
use crate::clock::secs_to_duration;
use crate::recovery::types::RecoveryAction;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Cooldown and backoff bookkeeping
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    until: HashMap<RecoveryAction, DateTime<Utc>>,
    failures: HashMap<RecoveryAction, VecDeque<DateTime<Utc>>>,
    multiplier: f64,
    max_cooldown: Duration,
    backoff_window: Duration,
}

impl CooldownTracker {
    /// Create tracker from recovery config
    pub fn new(config: &RecoveryConfig) -> Self {
        Self {
            until: HashMap::new(),
            failures: HashMap::new(),
            multiplier: config.recovery_cooldown_multiplier,
            max_cooldown: secs_to_duration(config.max_cooldown_secs),
            backoff_window: secs_to_duration(config.backoff_window_secs),
        }
    }

    /// Whether the action may be selected at `now`
    pub fn is_ready(&self, action: RecoveryAction, now: DateTime<Utc>) -> bool {
        self.until.get(&action).map_or(true, |until| now >= *until)
    }

    /// Next-eligible time, if a cooldown was ever set
    pub fn cooldown_until(&self, action: RecoveryAction) -> Option<DateTime<Utc>> {
        self.until.get(&action).copied()
    }

    /// Start the success cooldown and forget the failure streak
    pub fn record_success(
        &mut self,
        action: RecoveryAction,
        now: DateTime<Utc>,
        base: Duration,
    ) -> DateTime<Utc> {
        self.failures.remove(&action);
        let until = later(now, base.min(self.max_cooldown));
        self.until.insert(action, until);
        until
    }

    /// Start a backed-off failure cooldown
    pub fn record_failure(
        &mut self,
        action: RecoveryAction,
        now: DateTime<Utc>,
        base: Duration,
    ) -> DateTime<Utc> {
        let window_start = earlier(now, self.backoff_window);
        let streak = self.failures.entry(action).or_default();
        while streak.front().map_or(false, |t| *t < window_start) {
            streak.pop_front();
        }
        streak.push_back(now);
        let failures = streak.len();

        let cooldown = self.backoff(base, failures);
        let until = later(now, cooldown);
        self.until.insert(action, until);
        until
    }

    /// Failures of an action still inside the backoff window
    pub fn recent_failures(&self, action: RecoveryAction, now: DateTime<Utc>) -> usize {
        let window_start = earlier(now, self.backoff_window);
        self.failures
            .get(&action)
            .map_or(0, |s| s.iter().filter(|t| **t >= window_start).count())
    }

    /// Cooldown for the n-th failure (1-based) in the window
    pub fn backoff(&self, base: Duration, failures: usize) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as usize) as i32;
        let scaled_ms = base.num_milliseconds() as f64 * self.multiplier.powi(exponent);
        let capped_ms = scaled_ms.min(self.max_cooldown.num_milliseconds() as f64);
        Duration::milliseconds(capped_ms as i64)
    }

    /// Cooldowns still running at `now`
    pub fn active(&self, now: DateTime<Utc>) -> BTreeMap<RecoveryAction, DateTime<Utc>> {
        self.until
            .iter()
            .filter(|(_, until)| **until > now)
            .map(|(action, until)| (*action, *until))
            .collect()
    }

    /// Forget all cooldowns and streaks
    pub fn clear(&mut self) {
        self.until.clear();
        self.failures.clear();
    }
}

fn later(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn earlier(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_sub_signed(d).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
