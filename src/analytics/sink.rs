//! Analytics sink trait and HTTP implementation.
//!
//! A sink receives one [`FlushPayload`] per flush and either acknowledges it
//! or fails. Sinks do not retry; a failed batch stays buffered and goes out
//! again with the next flush.

use crate::config::AggregatorConfig;
use crate::models::{AnalyticsEvent, EngagementMetric, PerformanceMetric};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// The batch sent by a single flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushPayload {
    /// Buffered events.
    pub events: Vec<AnalyticsEvent>,
    /// Buffered performance metrics.
    pub performance: Vec<PerformanceMetric>,
    /// Every engagement metric recorded so far.
    pub engagement: Vec<EngagementMetric>,
    /// When the flush was taken.
    pub timestamp: DateTime<Utc>,
}

/// Result of [`crate::AnalyticsAggregator::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing to send.
    Skipped,
    /// The sink acknowledged the batch.
    Delivered {
        /// Events sent.
        events: usize,
        /// Performance metrics sent.
        performance: usize,
    },
    /// The sink failed; the batch was put back.
    Failed {
        /// Why the sink failed.
        error: String,
    },
}

impl FlushOutcome {
    /// Label used for the `analytics_flush_total` metric.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Delivered { .. } => "delivered",
            Self::Failed { .. } => "failed",
        }
    }

    /// Returns true unless the sink failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Destination for flushed analytics batches.
pub trait AnalyticsSink: Send + Sync {
    /// Sends one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch was not acknowledged.
    fn send(&self, payload: &FlushPayload) -> Result<()>;
}

/// Posts batches as JSON to an ingestion endpoint.
///
/// The blocking client is built per request. Inside a tokio runtime the
/// request runs on its own thread, since a blocking client must not be
/// created or dropped on a runtime thread.
pub struct HttpAnalyticsSink {
    endpoint: Url,
    timeout: Duration,
    api_key: Option<SecretString>,
}

impl HttpAnalyticsSink {
    /// Creates a sink posting to `endpoint` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error unless `endpoint` is an absolute `http` or `https` URL.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint)?,
            timeout,
            api_key: None,
        })
    }

    /// Creates a sink from the aggregator settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured endpoint is not an absolute URL.
    pub fn from_config(config: &AggregatorConfig) -> Result<Self> {
        let sink = Self::new(&config.endpoint, config.request_timeout)?;
        Ok(match &config.api_key {
            Some(key) => sink.with_api_key(key.clone()),
            None => sink,
        })
    }

    /// Sends `key` as a bearer token.
    #[must_use]
    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Returns the endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

/// Parses an ingestion endpoint, accepting only absolute `http(s)` URLs.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for relative or non-HTTP endpoints.
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::InvalidInput(format!("analytics endpoint {endpoint:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::InvalidInput(format!(
            "analytics endpoint {endpoint:?}: unsupported scheme {scheme}"
        ))),
    }
}

impl std::fmt::Debug for HttpAnalyticsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAnalyticsSink")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl AnalyticsSink for HttpAnalyticsSink {
    fn send(&self, payload: &FlushPayload) -> Result<()> {
        let body = serde_json::to_vec(payload).map_err(|e| Error::OperationFailed {
            operation: "serialize_flush_payload".to_string(),
            cause: e.to_string(),
        })?;
        let request = BatchRequest {
            endpoint: self.endpoint.clone(),
            timeout: self.timeout,
            bearer: self.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            body,
        };

        if tokio::runtime::Handle::try_current().is_err() {
            return request.post();
        }
        thread::Builder::new()
            .name("flagwise-analytics-flush".to_string())
            .spawn(move || request.post())
            .map_err(|e| Error::Transport(format!("failed to start flush thread: {e}")))?
            .join()
            .map_err(|_| Error::Transport("flush thread panicked".to_string()))?
    }
}

/// One owned POST, movable onto a plain thread.
struct BatchRequest {
    endpoint: Url,
    timeout: Duration,
    bearer: Option<String>,
    body: Vec<u8>,
}

impl BatchRequest {
    fn post(self) -> Result<()> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("flagwise/{}", env!("CARGO_PKG_VERSION")))
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Transport(format!("HTTP client init failed: {e}")))?;

        let mut request = client
            .post(self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(self.body);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .map_err(|e| Error::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Transport(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("response")
            )))
        }
    }
}

/// Sink that records batches and replays queued responses.
#[cfg(test)]
pub struct MockSink {
    responses: std::sync::Mutex<Vec<Result<()>>>,
    /// Batches received.
    pub sent: std::sync::Mutex<Vec<FlushPayload>>,
}

#[cfg(test)]
impl MockSink {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(Vec::new()),
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Queues the response for an upcoming send; unqueued sends succeed.
    pub fn queue_response(&self, result: Result<()>) {
        self.responses.lock().expect("lock").insert(0, result);
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().expect("lock").len()
    }

    pub fn last(&self) -> Option<FlushPayload> {
        self.sent.lock().expect("lock").last().cloned()
    }
}

#[cfg(test)]
impl AnalyticsSink for MockSink {
    fn send(&self, payload: &FlushPayload) -> Result<()> {
        self.sent.lock().expect("lock").push(payload.clone());
        self.responses.lock().expect("lock").pop().unwrap_or(Ok(()))
    }
}
