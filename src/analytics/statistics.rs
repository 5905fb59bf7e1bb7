//! Pure aggregation over analytics buffers.

use super::health::{aggregate_health_score, mean, performance_score};
use crate::models::{
    AnalyticsEvent, AnalyticsSummary, EngagementMetric, EventType, FeaturePerformance,
    PerformanceMetric, UsageStatistics,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct FeatureGroup<'a> {
    views: Vec<&'a AnalyticsEvent>,
    interactions: Vec<&'a AnalyticsEvent>,
    errors: usize,
    performance: Vec<&'a PerformanceMetric>,
    engagement: Vec<&'a EngagementMetric>,
}

/// Groups everything by feature and derives per-feature statistics.
///
/// A feature appears once it has any event, performance metric, or
/// engagement metric. Results are ordered by feature name.
#[must_use]
pub fn compute_usage_statistics(
    events: &[AnalyticsEvent],
    performance: &[PerformanceMetric],
    engagement: &[EngagementMetric],
    now: DateTime<Utc>,
) -> Vec<UsageStatistics> {
    let mut groups: BTreeMap<&str, FeatureGroup<'_>> = BTreeMap::new();

    for event in events {
        let group = groups.entry(event.feature_name.as_str()).or_default();
        match event.event_type {
            EventType::FeatureView => group.views.push(event),
            EventType::FeatureInteraction => group.interactions.push(event),
            EventType::FeatureError => group.errors += 1,
            EventType::PerformanceMetric | EventType::AbTest => {},
        }
    }
    for metric in performance {
        groups
            .entry(metric.feature_name.as_str())
            .or_default()
            .performance
            .push(metric);
    }
    for metric in engagement {
        groups
            .entry(metric.feature_name.as_str())
            .or_default()
            .engagement
            .push(metric);
    }

    groups
        .into_iter()
        .map(|(feature, group)| group.into_statistics(feature, now))
        .collect()
}

impl FeatureGroup<'_> {
    #[allow(clippy::cast_precision_loss)]
    fn into_statistics(self, feature: &str, now: DateTime<Utc>) -> UsageStatistics {
        let total_views = self.views.len();
        let unique_users: BTreeSet<&str> = self
            .views
            .iter()
            .chain(&self.interactions)
            .filter_map(|e| e.user_id.as_deref())
            .collect();

        let mut variants: BTreeMap<String, usize> = BTreeMap::new();
        for variant in self.views.iter().filter_map(|e| e.variant.as_ref()) {
            *variants.entry(variant.clone()).or_insert(0) += 1;
        }

        UsageStatistics {
            feature_name: feature.to_string(),
            total_views,
            total_interactions: self.interactions.len(),
            unique_users: unique_users.len(),
            average_session_duration: mean(self.engagement.iter().map(|e| e.session_duration))
                .unwrap_or(0.0),
            error_rate: if total_views == 0 {
                0.0
            } else {
                self.errors as f64 / total_views as f64 * 100.0
            },
            performance_score: performance_score(self.performance.iter().copied()),
            health_score: aggregate_health_score(self.performance.iter().copied(), total_views),
            variants: (!variants.is_empty()).then_some(variants),
            last_updated: now,
        }
    }
}

/// Buffer-level overview: counts plus the mean performance score across
/// `statistics` (0 when there are none).
#[must_use]
pub fn summarize(
    events: &[AnalyticsEvent],
    performance: &[PerformanceMetric],
    engagement: &[EngagementMetric],
    statistics: &[UsageStatistics],
    now: DateTime<Utc>,
) -> AnalyticsSummary {
    AnalyticsSummary {
        total_events: events.len(),
        total_performance_metrics: performance.len(),
        total_engagement_metrics: engagement.len(),
        average_performance_score: mean(statistics.iter().map(|s| s.performance_score))
            .unwrap_or(0.0),
        features_tracked: statistics.len(),
        last_updated: now,
    }
}

/// Aggregates the performance metrics of one feature.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn feature_performance(performance: &[PerformanceMetric], feature: &str) -> FeaturePerformance {
    let metrics: Vec<&PerformanceMetric> = performance
        .iter()
        .filter(|m| m.feature_name == feature)
        .collect();

    FeaturePerformance {
        avg_load_time: mean(metrics.iter().map(|m| m.load_time)).unwrap_or(0.0),
        avg_memory_usage: mean(metrics.iter().map(|m| m.memory_usage as f64)).unwrap_or(0.0),
        total_errors: metrics.iter().map(|m| u64::from(m.error_count)).sum(),
        metric_count: metrics.len(),
        last_updated: metrics.iter().map(|m| m.timestamp).max(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn event(feature: &str, event_type: EventType, user: Option<&str>, variant: Option<&str>) -> AnalyticsEvent {
        AnalyticsEvent {
            id: uuid::Uuid::new_v4().to_string(),
            feature_name: feature.to_string(),
            event_type,
            timestamp: now(),
            user_id: user.map(str::to_string),
            session_id: None,
            metadata: Metadata::new(),
            environment: "testing".to_string(),
            version: "1.0.0".to_string(),
            variant: variant.map(str::to_string),
        }
    }

    fn perf(feature: &str, load_time: f64, error_count: u32) -> PerformanceMetric {
        PerformanceMetric {
            feature_name: feature.to_string(),
            load_time,
            render_time: load_time,
            memory_usage: 2048,
            error_count,
            timestamp: now(),
        }
    }

    fn engagement(feature: &str, duration: f64) -> EngagementMetric {
        EngagementMetric {
            feature_name: feature.to_string(),
            user_id: None,
            session_duration: duration,
            interaction_count: 1,
            last_interaction: now(),
            feature_enabled: true,
        }
    }

    #[test]
    fn test_empty_buffers() {
        assert!(compute_usage_statistics(&[], &[], &[], now()).is_empty());
        let summary = summarize(&[], &[], &[], &[], now());
        assert_eq!(summary.features_tracked, 0);
        assert!(summary.average_performance_score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_view_defaults() {
        let stats = compute_usage_statistics(&[event("X", EventType::FeatureView, None, None)], &[], &[], now());
        assert_eq!(stats.len(), 1);
        let x = &stats[0];
        assert_eq!(x.total_views, 1);
        assert!(x.error_rate.abs() < f64::EPSILON);
        assert!((x.performance_score - 100.0).abs() < f64::EPSILON);
        assert!((x.health_score - 100.0).abs() < f64::EPSILON);
        assert!(x.variants.is_none());
    }

    #[test]
    fn test_counts_users_and_error_rate() {
        let events = vec![
            event("X", EventType::FeatureView, Some("a"), None),
            event("X", EventType::FeatureView, Some("b"), None),
            event("X", EventType::FeatureView, None, None),
            event("X", EventType::FeatureView, Some("a"), None),
            event("X", EventType::FeatureInteraction, Some("c"), None),
            event("X", EventType::FeatureError, Some("d"), None),
        ];
        let stats = compute_usage_statistics(&events, &[], &[], now());
        let x = &stats[0];
        assert_eq!(x.total_views, 4);
        assert_eq!(x.total_interactions, 1);
        assert_eq!(x.unique_users, 3);
        assert!((x.error_rate - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_errors_without_views_have_zero_rate() {
        let stats = compute_usage_statistics(&[event("X", EventType::FeatureError, None, None)], &[], &[], now());
        assert!(stats[0].error_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_variants_come_from_views() {
        let events = vec![
            event("X", EventType::FeatureView, None, Some("A")),
            event("X", EventType::FeatureView, None, Some("A")),
            event("X", EventType::FeatureView, None, Some("B")),
            event("X", EventType::AbTest, None, Some("B")),
        ];
        let stats = compute_usage_statistics(&events, &[], &[], now());
        let variants = stats[0].variants.as_ref().unwrap();
        assert_eq!(variants.get("A"), Some(&2));
        assert_eq!(variants.get("B"), Some(&1));
    }

    #[test]
    fn test_groups_across_buffers() {
        let stats = compute_usage_statistics(
            &[event("b", EventType::FeatureView, None, None)],
            &[perf("a", 0.0, 0)],
            &[engagement("c", 1000.0), engagement("c", 3000.0)],
            now(),
        );
        let names: Vec<&str> = stats.iter().map(|s| s.feature_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!((stats[2].average_session_duration - 2000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_averages_performance() {
        let performance = vec![perf("a", 0.0, 0), perf("b", 0.0, 10)];
        let stats = compute_usage_statistics(&[], &performance, &[], now());
        let summary = summarize(&[], &performance, &[], &stats, now());
        assert_eq!(summary.features_tracked, 2);
        assert_eq!(summary.total_performance_metrics, 2);
        // a: 100, b: (100 + 0) / 2 = 50
        assert!((summary.average_performance_score - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_feature_performance() {
        let later = now() + chrono::Duration::minutes(1);
        let mut second = perf("a", 300.0, 2);
        second.timestamp = later;
        let performance = vec![perf("a", 100.0, 1), second, perf("b", 5000.0, 9)];

        let a = feature_performance(&performance, "a");
        assert_eq!(a.metric_count, 2);
        assert!((a.avg_load_time - 200.0).abs() < f64::EPSILON);
        assert!((a.avg_memory_usage - 2048.0).abs() < f64::EPSILON);
        assert_eq!(a.total_errors, 3);
        assert_eq!(a.last_updated, Some(later));

        let missing = feature_performance(&performance, "zzz");
        assert_eq!(missing.metric_count, 0);
        assert!(missing.last_updated.is_none());
    }
}
