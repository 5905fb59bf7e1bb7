//! Analytics event and statistics records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form event metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Kinds of analytics events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A feature was displayed.
    FeatureView,
    /// A user interacted with a feature.
    FeatureInteraction,
    /// A feature raised an error.
    FeatureError,
    /// A performance or health sample.
    PerformanceMetric,
    /// An A/B test observation.
    AbTest,
}

impl EventType {
    /// Returns the wire name of the event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FeatureView => "feature_view",
            Self::FeatureInteraction => "feature_interaction",
            Self::FeatureError => "feature_error",
            Self::PerformanceMetric => "performance_metric",
            Self::AbTest => "ab_test",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, recorded usage event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    /// Unique event identifier.
    pub id: String,
    /// Feature the event belongs to.
    pub feature_name: String,
    /// Event kind.
    pub event_type: EventType,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// User that triggered the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Browsing session identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Environment the event was recorded in.
    pub environment: String,
    /// Version of the recording component.
    pub version: String,
    /// A/B bucket, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// A performance sample for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    /// Feature the sample belongs to.
    pub feature_name: String,
    /// Load time in milliseconds.
    pub load_time: f64,
    /// Render time in milliseconds.
    pub render_time: f64,
    /// Memory usage in bytes.
    pub memory_usage: u64,
    /// Number of errors observed.
    pub error_count: u32,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

/// Performance values supplied by callers; the aggregator stamps the rest.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    /// Load time in milliseconds.
    pub load_time: f64,
    /// Render time in milliseconds.
    pub render_time: f64,
    /// Memory usage in bytes.
    pub memory_usage: u64,
    /// Number of errors observed.
    pub error_count: u32,
}

/// A user engagement sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementMetric {
    /// Feature the sample belongs to.
    pub feature_name: String,
    /// Engaged user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Session duration in milliseconds.
    pub session_duration: f64,
    /// Number of interactions in the session.
    pub interaction_count: u32,
    /// When the last interaction happened.
    pub last_interaction: DateTime<Utc>,
    /// Whether the feature was enabled for the user.
    pub feature_enabled: bool,
}

/// Engagement values supplied by callers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSample {
    /// Engaged user.
    pub user_id: Option<String>,
    /// Session duration in milliseconds.
    pub session_duration: f64,
    /// Number of interactions in the session.
    pub interaction_count: u32,
    /// Whether the feature was enabled for the user.
    pub feature_enabled: bool,
}

/// Inputs to a one-off health check.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInput {
    /// Load time in milliseconds.
    pub load_time: f64,
    /// Number of errors observed.
    pub error_count: u32,
    /// Fraction of successful operations (0.0-1.0).
    pub success_rate: f64,
    /// User satisfaction score (0-100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_satisfaction: Option<f64>,
}

/// Derived per-feature usage statistics. Recomputed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatistics {
    /// Feature the statistics describe.
    pub feature_name: String,
    /// Number of `feature_view` events.
    pub total_views: usize,
    /// Number of `feature_interaction` events.
    pub total_interactions: usize,
    /// Distinct users across views and interactions.
    pub unique_users: usize,
    /// Mean engagement session duration in milliseconds.
    pub average_session_duration: f64,
    /// Errors per hundred views.
    pub error_rate: f64,
    /// Performance score (0-100).
    pub performance_score: f64,
    /// Health score (0-100).
    pub health_score: f64,
    /// View counts per A/B variant, omitted when there are none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<BTreeMap<String, usize>>,
    /// When the statistics were computed.
    pub last_updated: DateTime<Utc>,
}

/// Buffer-level overview of the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    /// Buffered events.
    pub total_events: usize,
    /// Buffered performance metrics.
    pub total_performance_metrics: usize,
    /// Buffered engagement metrics.
    pub total_engagement_metrics: usize,
    /// Mean performance score across tracked features, 0 when none.
    pub average_performance_score: f64,
    /// Number of features with any data.
    pub features_tracked: usize,
    /// When the summary was computed.
    pub last_updated: DateTime<Utc>,
}

/// Performance aggregate for a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturePerformance {
    /// Mean load time in milliseconds.
    pub avg_load_time: f64,
    /// Mean memory usage in bytes.
    pub avg_memory_usage: f64,
    /// Sum of error counts.
    pub total_errors: u64,
    /// Number of samples.
    pub metric_count: usize,
    /// Timestamp of the most recent sample.
    pub last_updated: Option<DateTime<Utc>>,
}
