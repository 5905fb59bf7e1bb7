//! Health and performance scoring.
//!
//! Two health formulas coexist. [`calculate_health_score`] scores a single
//! health check; [`aggregate_health_score`] scores a feature from its buffered
//! performance metrics. They weight their inputs differently and are kept
//! apart on purpose.

use crate::models::{HealthInput, PerformanceMetric};

/// Score returned when a feature has no performance data.
pub const NO_DATA_SCORE: f64 = 100.0;

/// Load-time score used by both health formulas: 20 points per second.
fn health_load_score(load_time_ms: f64) -> f64 {
    (100.0 - (load_time_ms / 1000.0) * 20.0).max(0.0)
}

/// 10 points per error.
fn error_score(error_count: u32) -> f64 {
    (100.0 - f64::from(error_count) * 10.0).max(0.0)
}

/// Scores a one-off health check.
///
/// `0.3 * load + 0.3 * errors + 0.3 * success + 0.1 * satisfaction`, where a
/// missing satisfaction counts as 100.
#[must_use]
pub fn calculate_health_score(input: &HealthInput) -> f64 {
    let satisfaction = input.user_satisfaction.unwrap_or(100.0);
    health_load_score(input.load_time) * 0.3
        + error_score(input.error_count) * 0.3
        + input.success_rate * 100.0 * 0.3
        + satisfaction * 0.1
}

/// Mean performance score over `metrics`, or [`NO_DATA_SCORE`] when empty.
///
/// Each metric scores `(max(0, 100 - load/1000) + errors) / 2`; load time
/// costs one point per second here.
#[must_use]
pub fn performance_score<'a, I>(metrics: I) -> f64
where
    I: IntoIterator<Item = &'a PerformanceMetric>,
{
    mean(metrics.into_iter().map(|m| {
        let load = (100.0 - m.load_time / 1000.0).max(0.0);
        (load + error_score(m.error_count)) / 2.0
    }))
    .unwrap_or(NO_DATA_SCORE)
}

/// Mean aggregate health over `metrics`, or [`NO_DATA_SCORE`] when empty.
///
/// Each metric scores `0.4 * load + 0.4 * errors + 0.2 * success`, where
/// success is `(1 - errors / max(total_views, 1)) * 100`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_health_score<'a, I>(metrics: I, total_views: usize) -> f64
where
    I: IntoIterator<Item = &'a PerformanceMetric>,
{
    let views = total_views.max(1) as f64;
    mean(metrics.into_iter().map(|m| {
        let success = (1.0 - f64::from(m.error_count) / views) * 100.0;
        health_load_score(m.load_time) * 0.4 + error_score(m.error_count) * 0.4 + success * 0.2
    }))
    .unwrap_or(NO_DATA_SCORE)
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use test_case::test_case;

    fn metric(load_time: f64, error_count: u32) -> PerformanceMetric {
        PerformanceMetric {
            feature_name: "f".to_string(),
            load_time,
            render_time: load_time,
            memory_usage: 0,
            error_count,
            timestamp: Utc::now(),
        }
    }

    #[test_case(0.0, 0, 1.0, None => 100.0; "perfect")]
    #[test_case(1000.0, 0, 1.0, None => 94.0; "one second load")]
    #[test_case(0.0, 2, 1.0, None => 94.0; "two errors")]
    #[test_case(0.0, 0, 0.5, Some(50.0) => 80.0; "half success low satisfaction")]
    #[test_case(10_000.0, 20, 0.0, Some(0.0) => 0.0; "everything floored")]
    fn test_calculate_health_score(load_time: f64, error_count: u32, success_rate: f64, sat: Option<f64>) -> f64 {
        let score = calculate_health_score(&HealthInput {
            load_time,
            error_count,
            success_rate,
            user_satisfaction: sat,
        });
        (score * 1000.0).round() / 1000.0
    }

    #[test]
    fn test_scores_default_without_data() {
        assert!((performance_score(&[]) - NO_DATA_SCORE).abs() < f64::EPSILON);
        assert!((aggregate_health_score(&[], 0) - NO_DATA_SCORE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_performance_score() {
        // load: 100 - 2 = 98, errors: 90 -> 94
        let score = performance_score(&[metric(2000.0, 1)]);
        assert!((score - 94.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_health_score_uses_views() {
        // load 100, errors 80, success (1 - 2/4) * 100 = 50
        let score = aggregate_health_score(&[metric(0.0, 2)], 4);
        assert!((score - (40.0 + 32.0 + 10.0)).abs() < 1e-9);

        // zero views behave as one view
        let score = aggregate_health_score(&[metric(0.0, 0)], 0);
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_formulas_differ() {
        let input = HealthInput {
            load_time: 2000.0,
            error_count: 1,
            success_rate: 1.0,
            user_satisfaction: None,
        };
        let one_off = calculate_health_score(&input);
        let aggregate = aggregate_health_score(&[metric(2000.0, 1)], 1);
        assert!((one_off - aggregate).abs() > 1.0);
    }
}
