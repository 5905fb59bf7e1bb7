//! Rollout computation.
//!
//! A rollout is either static (a fixed percentage) or gradual, ramping
//! linearly from 0 at `start_date` to `percentage` at `end_date`. When the end
//! is unset a gradual rollout lasts seven days.

use crate::models::RolloutConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a gradual rollout with no explicit end.
pub const DEFAULT_ROLLOUT_DURATION: Duration = Duration::days(7);

/// How users are sampled against the effective percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    /// A fresh random draw per call. The same user may flip between calls.
    #[default]
    Random,
    /// A stable bucket derived from the flag key and user id. Anonymous
    /// callers fall back to a random draw.
    StableHash,
}

impl RolloutStrategy {
    /// Returns the strategy as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::StableHash => "stable_hash",
        }
    }

    /// Parses a strategy name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "random" => Some(Self::Random),
            "stable_hash" | "stable-hash" | "hash" => Some(Self::StableHash),
            _ => None,
        }
    }

    /// Draws a sample in `[0, 100)` for `user_id` on flag `key`.
    #[must_use]
    pub fn sample(&self, key: &str, user_id: Option<&str>) -> f64 {
        match (self, user_id) {
            (Self::StableHash, Some(user_id)) => stable_bucket(key, user_id),
            _ => rand::random::<f64>() * 100.0,
        }
    }
}

impl fmt::Display for RolloutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a rollout stands relative to its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RolloutStatus {
    /// The rollout has not started.
    Pending,
    /// The rollout is under way.
    Active {
        /// Elapsed share of the schedule (0-100).
        progress: f64,
    },
    /// The rollout reached its end.
    Completed,
}

impl RolloutStatus {
    /// Returns the status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active { .. } => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for RolloutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active { progress } => write!(f, "active ({progress:.1}%)"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Returns the end of the rollout window.
#[must_use]
pub fn rollout_end(rollout: &RolloutConfig) -> DateTime<Utc> {
    rollout
        .end_date
        .unwrap_or(rollout.start_date + DEFAULT_ROLLOUT_DURATION)
}

/// Computes the effective percentage of `rollout` at `now`.
///
/// Static rollouts return `percentage`. Gradual rollouts return 0 before the
/// start, `percentage` from the end onwards, and the rounded linear ramp in
/// between, never exceeding `percentage`.
#[must_use]
pub fn calculate_rollout_percentage(rollout: &RolloutConfig, now: DateTime<Utc>) -> f64 {
    if !rollout.gradual_rollout {
        return rollout.percentage;
    }

    let start = rollout.start_date;
    let end = rollout_end(rollout);
    if now < start {
        return 0.0;
    }
    if now >= end {
        return rollout.percentage;
    }

    let progress = fraction(now - start, end - start);
    (rollout.percentage * progress).round().min(rollout.percentage)
}

/// Reports where `rollout` stands at `now`.
#[must_use]
pub fn rollout_status(rollout: &RolloutConfig, now: DateTime<Utc>) -> RolloutStatus {
    let start = rollout.start_date;
    let end = rollout_end(rollout);
    if now < start {
        RolloutStatus::Pending
    } else if now >= end {
        RolloutStatus::Completed
    } else {
        RolloutStatus::Active {
            progress: fraction(now - start, end - start) * 100.0,
        }
    }
}

/// Decides whether `user_id` is inside `rollout` at `now`.
///
/// A non-empty target list with a known user is a pure membership test.
/// Otherwise a sample from `strategy` is compared against the effective
/// percentage.
#[must_use]
pub fn is_user_in_rollout(
    rollout: &RolloutConfig,
    key: &str,
    user_id: Option<&str>,
    now: DateTime<Utc>,
    strategy: RolloutStrategy,
) -> bool {
    if let Some(user_id) = user_id.filter(|_| !rollout.target_users.is_empty()) {
        return rollout.target_users.iter().any(|u| u == user_id);
    }

    let percentage = calculate_rollout_percentage(rollout, now);
    if percentage <= 0.0 {
        return false;
    }
    strategy.sample(key, user_id) < percentage
}

/// Maps `key:user_id` to a stable bucket in `[0, 100)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn stable_bucket(key: &str, user_id: &str) -> f64 {
    let digest = Sha256::digest(format!("{key}:{user_id}").as_bytes());
    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(prefix) % 10_000;
    value as f64 / 100.0
}

#[allow(clippy::cast_precision_loss)]
fn fraction(elapsed: Duration, total: Duration) -> f64 {
    let total = total.num_milliseconds();
    if total <= 0 {
        return 1.0;
    }
    (elapsed.num_milliseconds() as f64 / total as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn gradual(percentage: f64, days: i64) -> RolloutConfig {
        RolloutConfig::new(percentage, start()).gradual_until(start() + Duration::days(days))
    }

    #[test]
    fn test_gradual_ramp() {
        let rollout = gradual(50.0, 10);
        assert!((calculate_rollout_percentage(&rollout, start())).abs() < f64::EPSILON);
        assert!((calculate_rollout_percentage(&rollout, start() + Duration::days(5)) - 25.0).abs() < 1.0);
        assert!((calculate_rollout_percentage(&rollout, start() + Duration::days(10)) - 50.0).abs() < f64::EPSILON);
        assert!((calculate_rollout_percentage(&rollout, start() + Duration::days(20)) - 50.0).abs() < f64::EPSILON);
        assert!(calculate_rollout_percentage(&rollout, start() - Duration::days(1)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_static_rollout_ignores_dates() {
        let rollout = RolloutConfig::new(30.0, start());
        let before = start() - Duration::days(30);
        assert!((calculate_rollout_percentage(&rollout, before) - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_window_is_seven_days() {
        let mut rollout = RolloutConfig::new(70.0, start());
        rollout.gradual_rollout = true;
        assert_eq!(rollout_end(&rollout), start() + Duration::days(7));
        let half = calculate_rollout_percentage(&rollout, start() + Duration::hours(84));
        assert!((half - 35.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rounding_never_overshoots() {
        let rollout = gradual(33.3, 3);
        let almost = start() + Duration::days(3) - Duration::seconds(1);
        assert!(calculate_rollout_percentage(&rollout, almost) <= 33.3);
    }

    #[test]
    fn test_rollout_status() {
        let rollout = gradual(50.0, 10);
        assert_eq!(rollout_status(&rollout, start() - Duration::hours(1)), RolloutStatus::Pending);
        assert_eq!(rollout_status(&rollout, start() + Duration::days(11)), RolloutStatus::Completed);
        let status = rollout_status(&rollout, start() + Duration::days(4));
        assert!(
            matches!(status, RolloutStatus::Active { progress } if (progress - 40.0).abs() < 1e-9),
            "{status:?}"
        );
    }

    #[test]
    fn test_target_users_replace_percentage() {
        let rollout = RolloutConfig::new(100.0, start()).with_target_users(["alice"]);
        let now = start();
        assert!(is_user_in_rollout(&rollout, "f", Some("alice"), now, RolloutStrategy::Random));
        assert!(!is_user_in_rollout(&rollout, "f", Some("bob"), now, RolloutStrategy::Random));
        assert!(is_user_in_rollout(&rollout, "f", None, now, RolloutStrategy::Random));
    }

    #[test]
    fn test_zero_and_full_percentages() {
        let now = start();
        let off = RolloutConfig::new(0.0, start());
        let full = RolloutConfig::new(100.0, start());
        for _ in 0..50 {
            assert!(!is_user_in_rollout(&off, "f", Some("u"), now, RolloutStrategy::Random));
            assert!(is_user_in_rollout(&full, "f", Some("u"), now, RolloutStrategy::Random));
        }
    }

    #[test]
    fn test_stable_hash_is_deterministic() {
        let rollout = RolloutConfig::new(50.0, start());
        let first = is_user_in_rollout(&rollout, "widget", Some("user-42"), start(), RolloutStrategy::StableHash);
        for _ in 0..20 {
            assert_eq!(
                is_user_in_rollout(&rollout, "widget", Some("user-42"), start(), RolloutStrategy::StableHash),
                first
            );
        }
        let bucket = stable_bucket("widget", "user-42");
        assert!((0.0..100.0).contains(&bucket));
    }

    #[test]
    fn test_stable_hash_spreads_users() {
        let inside = (0..1000)
            .filter(|i| stable_bucket("widget", &format!("user-{i}")) < 50.0)
            .count();
        assert!((350..650).contains(&inside), "inside = {inside}");
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!(RolloutStrategy::parse("stable-hash"), Some(RolloutStrategy::StableHash));
        assert_eq!(RolloutStrategy::parse("RANDOM"), Some(RolloutStrategy::Random));
        assert_eq!(RolloutStrategy::parse("sticky"), None);
    }
}
