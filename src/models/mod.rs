//! Data models for flagwise.
//!
//! Flag definitions, analytics records, and change events.

mod analytics;
mod events;
mod flag;

pub use analytics::{
    AnalyticsEvent, AnalyticsSummary, EngagementMetric, EngagementSample, EventType,
    FeaturePerformance, HealthInput, Metadata, PerformanceMetric, PerformanceSample,
    UsageStatistics,
};
pub use events::{ConfigEvent, EventMeta};
pub use flag::{
    AdminConfig, AnalyticsSettings, Category, DependencyConfig, Environment, EnvironmentConfig,
    FeatureFlag, FeatureMap, FlagPatch, INITIAL_VERSION, Priority, RolloutConfig,
    has_flags_changed, increment_version,
};
