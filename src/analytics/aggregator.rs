//! The analytics aggregator.
//!
//! Record operations append to in-memory buffers and never touch the sink.
//! [`AnalyticsAggregator::flush`] swaps the event and performance buffers out
//! under the lock, sends them, and puts them back in front of anything
//! recorded meanwhile if the sink fails. Engagement metrics ride along with
//! every flush and are never cleared.

use super::health::calculate_health_score;
use super::sink::{AnalyticsSink, FlushOutcome, FlushPayload, HttpAnalyticsSink};
use super::statistics::{compute_usage_statistics, feature_performance, summarize};
use crate::clock::{Clock, SystemClock};
use crate::config::AggregatorConfig;
use crate::models::{
    AnalyticsEvent, AnalyticsSummary, EngagementMetric, EngagementSample, EventType,
    FeaturePerformance, HealthInput, Metadata, PerformanceMetric, PerformanceSample,
    UsageStatistics,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Buffers {
    events: Vec<AnalyticsEvent>,
    performance: Vec<PerformanceMetric>,
    engagement: Vec<EngagementMetric>,
}

/// Buffers usage events and flushes them to an [`AnalyticsSink`].
pub struct AnalyticsAggregator {
    config: AggregatorConfig,
    session_id: String,
    buffers: Mutex<Buffers>,
    sink: Arc<dyn AnalyticsSink>,
    clock: Arc<dyn Clock>,
    flush_due: Arc<Notify>,
}

impl std::fmt::Debug for AnalyticsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsAggregator")
            .field("session_id", &self.session_id)
            .field("endpoint", &self.config.endpoint)
            .field("buffered_events", &self.buffered_events())
            .finish_non_exhaustive()
    }
}

impl AnalyticsAggregator {
    /// Creates an aggregator posting to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] unless the endpoint is an
    /// absolute `http(s)` URL.
    pub fn new(config: AggregatorConfig) -> crate::Result<Self> {
        let sink = Arc::new(HttpAnalyticsSink::from_config(&config)?);
        Ok(Self::with_sink(config, sink))
    }

    /// Creates an aggregator sending batches to `sink`.
    #[must_use]
    pub fn with_sink(config: AggregatorConfig, sink: Arc<dyn AnalyticsSink>) -> Self {
        Self {
            config,
            session_id: Uuid::new_v4().to_string(),
            buffers: Mutex::new(Buffers::default()),
            sink,
            clock: Arc::new(SystemClock),
            flush_due: Arc::new(Notify::new()),
        }
    }

    /// Reads time from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Aggregator settings.
    #[must_use]
    pub const fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Session identifier stamped on every event.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Notified when the event buffer reaches `batch_size`.
    #[must_use]
    pub fn flush_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.flush_due)
    }

    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn event(
        &self,
        feature: &str,
        event_type: EventType,
        user_id: Option<&str>,
        metadata: Metadata,
        variant: Option<&str>,
    ) -> AnalyticsEvent {
        AnalyticsEvent {
            id: Uuid::now_v7().to_string(),
            feature_name: feature.to_string(),
            event_type,
            timestamp: self.clock.now(),
            user_id: user_id.map(str::to_string),
            session_id: Some(self.session_id.clone()),
            metadata,
            environment: self.config.environment.as_str().to_string(),
            version: self.config.version.clone(),
            variant: variant.map(str::to_string),
        }
    }

    fn push_event(&self, event: AnalyticsEvent) {
        let event_type = event.event_type.as_str();
        let buffered = {
            let mut buffers = self.lock();
            buffers.events.push(event);
            buffers.events.len()
        };

        metrics::counter!("analytics_events_recorded_total", "type" => event_type).increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("analytics_buffer_events").set(buffered as f64);

        if self.config.batch_size > 0 && buffered >= self.config.batch_size {
            tracing::debug!(buffered, "Analytics batch full");
            self.flush_due.notify_one();
        }
    }

    /// Records that `feature` was shown.
    pub fn record_view(&self, feature: &str, user_id: Option<&str>, metadata: Metadata) -> bool {
        if !(self.config.enabled && self.config.track_page_views) {
            return false;
        }
        self.push_event(self.event(feature, EventType::FeatureView, user_id, metadata, None));
        true
    }

    /// Records a view of one A/B variant of `feature`.
    pub fn record_variant_view(
        &self,
        feature: &str,
        variant: &str,
        user_id: Option<&str>,
        metadata: Metadata,
    ) -> bool {
        if !(self.config.enabled && self.config.track_page_views) {
            return false;
        }
        self.push_event(self.event(feature, EventType::FeatureView, user_id, metadata, Some(variant)));
        true
    }

    /// Records an interaction of kind `interaction_type`.
    pub fn record_interaction(
        &self,
        feature: &str,
        interaction_type: &str,
        user_id: Option<&str>,
        metadata: Metadata,
    ) -> bool {
        if !(self.config.enabled && self.config.track_interactions) {
            return false;
        }
        let metadata = with_base(
            [("interactionType", Value::from(interaction_type))],
            metadata,
        );
        self.push_event(self.event(feature, EventType::FeatureInteraction, user_id, metadata, None));
        true
    }

    /// Records an error raised by `feature`.
    pub fn record_error(
        &self,
        feature: &str,
        error: &dyn std::error::Error,
        user_id: Option<&str>,
        metadata: Metadata,
    ) -> bool {
        if !(self.config.enabled && self.config.track_errors) {
            return false;
        }
        let mut base = vec![("errorMessage", Value::from(error.to_string()))];
        if let Some(source) = error.source() {
            base.push(("errorSource", Value::from(source.to_string())));
        }
        let metadata = with_base(base, metadata);
        self.push_event(self.event(feature, EventType::FeatureError, user_id, metadata, None));
        true
    }

    /// Records an A/B test observation for `variant`.
    pub fn record_ab_test(
        &self,
        feature: &str,
        variant: &str,
        event_type: &str,
        user_id: Option<&str>,
        metadata: Metadata,
    ) -> bool {
        if !(self.config.enabled && self.config.track_ab_testing) {
            return false;
        }
        let metadata = with_base(
            [
                ("variant", Value::from(variant)),
                ("eventType", Value::from(event_type)),
            ],
            metadata,
        );
        self.push_event(self.event(feature, EventType::AbTest, user_id, metadata, Some(variant)));
        true
    }

    /// Scores a health check and records it as a `performance_metric` event.
    ///
    /// Returns the score, or `None` when health tracking is off.
    pub fn record_health(&self, feature: &str, input: HealthInput) -> Option<f64> {
        if !(self.config.enabled && self.config.track_health_metrics) {
            return None;
        }
        let score = calculate_health_score(&input);
        let mut metadata = Metadata::new();
        metadata.insert("loadTime".into(), json!(input.load_time));
        metadata.insert("errorCount".into(), json!(input.error_count));
        metadata.insert("successRate".into(), json!(input.success_rate));
        if let Some(satisfaction) = input.user_satisfaction {
            metadata.insert("userSatisfaction".into(), json!(satisfaction));
        }
        metadata.insert("healthScore".into(), json!(score));
        metadata.insert("type".into(), json!("health_check"));

        self.push_event(self.event(feature, EventType::PerformanceMetric, None, metadata, None));
        Some(score)
    }

    /// Records a performance sample.
    pub fn record_performance(&self, feature: &str, sample: PerformanceSample) -> bool {
        if !(self.config.enabled && self.config.track_performance) {
            return false;
        }
        let metric = PerformanceMetric {
            feature_name: feature.to_string(),
            load_time: sample.load_time,
            render_time: sample.render_time,
            memory_usage: sample.memory_usage,
            error_count: sample.error_count,
            timestamp: self.clock.now(),
        };
        self.lock().performance.push(metric);
        metrics::counter!("analytics_events_recorded_total", "type" => "performance").increment(1);
        true
    }

    /// Records an engagement sample.
    pub fn record_engagement(&self, feature: &str, sample: EngagementSample) -> bool {
        if !(self.config.enabled && self.config.track_user_engagement) {
            return false;
        }
        let metric = EngagementMetric {
            feature_name: feature.to_string(),
            user_id: sample.user_id,
            session_duration: sample.session_duration,
            interaction_count: sample.interaction_count,
            last_interaction: self.clock.now(),
            feature_enabled: sample.feature_enabled,
        };
        self.lock().engagement.push(metric);
        metrics::counter!("analytics_events_recorded_total", "type" => "engagement").increment(1);
        true
    }

    /// Starts timing `feature`; finishing the timer records a performance sample.
    #[must_use]
    pub fn start_timer(&self, feature: impl Into<String>) -> PerformanceTimer<'_> {
        PerformanceTimer {
            aggregator: self,
            feature: feature.into(),
            started: Instant::now(),
        }
    }

    /// Number of buffered events.
    #[must_use]
    pub fn buffered_events(&self) -> usize {
        self.lock().events.len()
    }

    /// Returns true once the event buffer holds at least `batch_size` events.
    #[must_use]
    pub fn is_flush_due(&self) -> bool {
        self.config.batch_size > 0 && self.buffered_events() >= self.config.batch_size
    }

    /// Sends buffered data to the sink.
    ///
    /// Does nothing when there are no events and no performance metrics. On
    /// failure the batch is restored and the error is logged, not returned.
    /// Blocks on the sink; call it off the async runtime.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub fn flush(&self) -> FlushOutcome {
        let payload = {
            let mut buffers = self.lock();
            if buffers.events.is_empty() && buffers.performance.is_empty() {
                return FlushOutcome::Skipped;
            }
            FlushPayload {
                events: std::mem::take(&mut buffers.events),
                performance: std::mem::take(&mut buffers.performance),
                engagement: buffers.engagement.clone(),
                timestamp: self.clock.now(),
            }
        };

        let outcome = match self.sink.send(&payload) {
            Ok(()) => {
                tracing::info!(
                    events = payload.events.len(),
                    performance = payload.performance.len(),
                    engagement = payload.engagement.len(),
                    "Flushed analytics"
                );
                FlushOutcome::Delivered {
                    events: payload.events.len(),
                    performance: payload.performance.len(),
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, events = payload.events.len(), "Failed to flush analytics");
                let error = e.to_string();
                self.restore(payload);
                FlushOutcome::Failed { error }
            },
        };

        metrics::counter!("analytics_flush_total", "outcome" => outcome.as_str()).increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("analytics_buffer_events").set(self.buffered_events() as f64);
        outcome
    }

    fn restore(&self, payload: FlushPayload) {
        let FlushPayload {
            mut events,
            mut performance,
            ..
        } = payload;
        let mut buffers = self.lock();
        events.append(&mut buffers.events);
        performance.append(&mut buffers.performance);
        buffers.events = events;
        buffers.performance = performance;
    }

    /// Per-feature usage statistics over the current buffers.
    #[must_use]
    pub fn statistics(&self) -> Vec<UsageStatistics> {
        let buffers = self.lock();
        compute_usage_statistics(
            &buffers.events,
            &buffers.performance,
            &buffers.engagement,
            self.clock.now(),
        )
    }

    /// Buffer counts and mean performance score.
    #[must_use]
    pub fn summary(&self) -> AnalyticsSummary {
        let now = self.clock.now();
        let buffers = self.lock();
        let statistics =
            compute_usage_statistics(&buffers.events, &buffers.performance, &buffers.engagement, now);
        summarize(
            &buffers.events,
            &buffers.performance,
            &buffers.engagement,
            &statistics,
            now,
        )
    }

    /// Performance aggregate for `feature`.
    #[must_use]
    pub fn feature_performance(&self, feature: &str) -> FeaturePerformance {
        feature_performance(&self.lock().performance, feature)
    }

    /// Snapshot of buffers, statistics, and settings.
    #[must_use]
    pub fn export_data(&self) -> AnalyticsExport {
        let now = self.clock.now();
        let buffers = self.lock();
        AnalyticsExport {
            statistics: compute_usage_statistics(
                &buffers.events,
                &buffers.performance,
                &buffers.engagement,
                now,
            ),
            events: buffers.events.clone(),
            performance: buffers.performance.clone(),
            engagement: buffers.engagement.clone(),
            config: ExportedSettings::from(&self.config),
            exported_at: now,
        }
    }
}

/// Puts `base` first and lets caller metadata override it.
fn with_base<'k>(base: impl IntoIterator<Item = (&'k str, Value)>, metadata: Metadata) -> Metadata {
    let mut merged: Metadata = base.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    merged.extend(metadata);
    merged
}

/// Times a feature until [`PerformanceTimer::finish`] is called.
#[derive(Debug)]
pub struct PerformanceTimer<'a> {
    aggregator: &'a AnalyticsAggregator,
    feature: String,
    started: Instant,
}

impl PerformanceTimer<'_> {
    /// Records the elapsed time as load and render time and returns it in
    /// milliseconds.
    pub fn finish(self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64() * 1000.0;
        self.aggregator.record_performance(
            &self.feature,
            PerformanceSample {
                load_time: elapsed,
                render_time: elapsed,
                memory_usage: 0,
                error_count: 0,
            },
        );
        elapsed
    }
}

/// Aggregator settings as exported; the API key is reduced to a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSettings {
    /// Master switch.
    pub enabled: bool,
    /// Batch size.
    pub batch_size: usize,
    /// Flush interval in milliseconds.
    pub flush_interval_ms: u64,
    /// Ingestion endpoint.
    pub endpoint: String,
    /// Whether an API key is configured.
    pub has_api_key: bool,
    /// Environment stamped on events.
    pub environment: String,
}

impl From<&AggregatorConfig> for ExportedSettings {
    fn from(config: &AggregatorConfig) -> Self {
        Self {
            enabled: config.enabled,
            batch_size: config.batch_size,
            flush_interval_ms: duration_ms(config.flush_interval),
            endpoint: config.endpoint.clone(),
            has_api_key: config.api_key.is_some(),
            environment: config.environment.as_str().to_string(),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Everything the aggregator holds, for debugging and offline analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsExport {
    /// Buffered events.
    pub events: Vec<AnalyticsEvent>,
    /// Buffered performance metrics.
    pub performance: Vec<PerformanceMetric>,
    /// Engagement metrics.
    pub engagement: Vec<EngagementMetric>,
    /// Statistics over the buffers.
    pub statistics: Vec<UsageStatistics>,
    /// Aggregator settings.
    pub config: ExportedSettings,
    /// When the export was taken.
    pub exported_at: DateTime<Utc>,
}
