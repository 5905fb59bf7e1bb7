//! Usage analytics.
//!
//! The [`AnalyticsAggregator`] buffers views, interactions, errors, A/B
//! observations, health checks, performance and engagement samples, derives
//! per-feature [`UsageStatistics`](crate::models::UsageStatistics) on demand,
//! and ships batches to an [`AnalyticsSink`]. [`AutoFlush`] drives flushing on
//! a tokio runtime.

mod aggregator;
mod auto_flush;
pub mod health;
mod sink;
pub mod statistics;

pub use aggregator::{AnalyticsAggregator, AnalyticsExport, ExportedSettings, PerformanceTimer};
pub use auto_flush::AutoFlush;
pub use health::{aggregate_health_score, calculate_health_score, performance_score};
pub use sink::{AnalyticsSink, FlushOutcome, FlushPayload, HttpAnalyticsSink, parse_endpoint};
pub use statistics::{compute_usage_statistics, feature_performance, summarize};
