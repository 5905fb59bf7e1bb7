//! Configuration management.
//!
//! Settings come from an optional TOML file, then environment variables
//! prefixed with `FLAGWISE_`. Anything left unset keeps its default.

use crate::analytics::parse_endpoint;
use crate::models::Environment;
use crate::observability::{LogFormat, LoggingConfig, MetricsConfig};
use crate::services::RolloutStrategy;
use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of buffered events that makes a flush due.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default auto-flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Default analytics ingestion path.
///
/// Relative, so it must be replaced with an absolute URL before an
/// [`crate::AnalyticsAggregator`] can deliver to it.
pub const DEFAULT_ENDPOINT: &str = "/api/analytics";

/// Default timeout for a single flush request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Main configuration for flagwise.
#[derive(Debug, Clone, Default)]
pub struct FlagwiseConfig {
    /// Environment the process runs in.
    pub environment: Environment,
    /// How `is_rolled_out` samples users.
    pub rollout_strategy: RolloutStrategy,
    /// Analytics aggregator settings.
    pub aggregator: AggregatorConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Metrics settings.
    pub metrics: MetricsConfig,
}

/// Analytics aggregator settings.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Master switch; when false every record operation is a no-op and
    /// auto-flush never starts.
    pub enabled: bool,
    /// Record `feature_view` events.
    pub track_page_views: bool,
    /// Record `feature_interaction` events.
    pub track_interactions: bool,
    /// Record performance metrics.
    pub track_performance: bool,
    /// Record `feature_error` events.
    pub track_errors: bool,
    /// Record engagement metrics.
    pub track_user_engagement: bool,
    /// Record A/B test events.
    pub track_ab_testing: bool,
    /// Record health checks.
    pub track_health_metrics: bool,
    /// Buffered events at which a flush becomes due.
    pub batch_size: usize,
    /// Auto-flush period; zero disables auto-flush.
    pub flush_interval: Duration,
    /// Ingestion endpoint.
    pub endpoint: String,
    /// Bearer token sent with each flush.
    pub api_key: Option<SecretString>,
    /// Timeout for a single flush request.
    pub request_timeout: Duration,
    /// Environment stamped on recorded events.
    pub environment: Environment,
    /// Version stamped on recorded events.
    pub version: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            track_page_views: true,
            track_interactions: true,
            track_performance: true,
            track_errors: true,
            track_user_engagement: true,
            track_ab_testing: true,
            track_health_metrics: true,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            environment: Environment::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl AggregatorConfig {
    /// Returns true when the periodic flush task should run.
    #[must_use]
    pub const fn auto_flush_enabled(&self) -> bool {
        self.enabled && !self.flush_interval.is_zero()
    }

    /// Sets the ingestion endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the auto-flush interval.
    #[must_use]
    pub const fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Environment name.
    pub environment: Option<String>,
    /// Rollout strategy name.
    pub rollout_strategy: Option<String>,
    /// Analytics section.
    pub analytics: Option<ConfigFileAnalytics>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Analytics section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileAnalytics {
    /// Master switch.
    pub enabled: Option<bool>,
    /// Record views.
    pub track_page_views: Option<bool>,
    /// Record interactions.
    pub track_interactions: Option<bool>,
    /// Record performance.
    pub track_performance: Option<bool>,
    /// Record errors.
    pub track_errors: Option<bool>,
    /// Record engagement.
    pub track_user_engagement: Option<bool>,
    /// Record A/B tests.
    pub track_ab_testing: Option<bool>,
    /// Record health checks.
    pub track_health_metrics: Option<bool>,
    /// Batch size.
    pub batch_size: Option<usize>,
    /// Auto-flush period in seconds.
    pub flush_interval_secs: Option<u64>,
    /// Ingestion endpoint.
    pub endpoint: Option<String>,
    /// Bearer token.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `flagwise=debug`.
    pub level: Option<String>,
    /// Log file path; stderr when unset.
    pub file: Option<String>,
}

/// Metrics section in config file.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Whether to install the Prometheus recorder.
    pub enabled: Option<bool>,
    /// Port for the scrape endpoint; no listener when unset.
    pub port: Option<u16>,
}

impl FlagwiseConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown environment or rollout strategy.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        let mut config = Self::from_config_file(file)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from the default location.
    ///
    /// Looks for `flagwise/config.toml` in the platform config dir, then in
    /// `~/.config`. Falls back to defaults (plus env overrides) when no file
    /// is found or the file is unusable.
    #[must_use]
    pub fn load_default() -> Self {
        Self::default_paths()
            .into_iter()
            .filter(|path| path.exists())
            .find_map(|path| match Self::load_from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unusable config file");
                    None
                },
            })
            .unwrap_or_else(|| {
                let mut config = Self::default();
                config.apply_env_overrides();
                config
            })
    }

    fn default_paths() -> Vec<PathBuf> {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Vec::new();
        };
        vec![
            base_dirs.config_dir().join("flagwise").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("flagwise")
                .join("config.toml"),
        ]
    }

    /// Converts a `ConfigFile` to `FlagwiseConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown environment or rollout strategy, or
    /// an analytics endpoint that is not an absolute URL.
    pub fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(environment) = file.environment {
            config.set_environment(parse_environment(&environment)?);
        }
        if let Some(strategy) = file.rollout_strategy {
            config.rollout_strategy = parse_strategy(&strategy)?;
        }
        if let Some(analytics) = file.analytics {
            apply_analytics_section(&mut config.aggregator, analytics)?;
        }
        config.logging = LoggingConfig::from_settings(file.logging.as_ref());
        config.metrics = MetricsConfig::from_settings(file.metrics.as_ref());

        Ok(config)
    }

    /// Sets the environment, keeping the aggregator's event stamp in sync.
    pub const fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
        self.aggregator.environment = environment;
    }

    /// Applies `FLAGWISE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides using `lookup` to read variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = lookup("FLAGWISE_ENVIRONMENT") {
            match parse_environment(&value) {
                Ok(environment) => self.set_environment(environment),
                Err(e) => tracing::warn!(error = %e, "Ignoring FLAGWISE_ENVIRONMENT"),
            }
        }
        if let Some(value) = lookup("FLAGWISE_ROLLOUT_STRATEGY") {
            match parse_strategy(&value) {
                Ok(strategy) => self.rollout_strategy = strategy,
                Err(e) => tracing::warn!(error = %e, "Ignoring FLAGWISE_ROLLOUT_STRATEGY"),
            }
        }
        if let Some(endpoint) = lookup("FLAGWISE_ANALYTICS_ENDPOINT") {
            match parse_endpoint(&endpoint) {
                Ok(_) => self.aggregator.endpoint = endpoint,
                Err(e) => tracing::warn!(error = %e, "Ignoring FLAGWISE_ANALYTICS_ENDPOINT"),
            }
        }
        if let Some(api_key) = lookup("FLAGWISE_ANALYTICS_API_KEY") {
            self.aggregator.api_key = Some(SecretString::from(api_key));
        }
        if let Some(value) = lookup("FLAGWISE_FLUSH_INTERVAL_SECS") {
            match value.parse::<u64>() {
                Ok(secs) => self.aggregator.flush_interval = Duration::from_secs(secs),
                Err(e) => tracing::warn!(value = %value, error = %e, "Ignoring FLAGWISE_FLUSH_INTERVAL_SECS"),
            }
        }
        if let Some(value) = lookup("FLAGWISE_METRICS_ENABLED") {
            self.metrics.enabled = matches!(value.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Some(value) = lookup("FLAGWISE_METRICS_PORT") {
            match value.parse::<u16>() {
                Ok(port) => self.metrics.set_port(port),
                Err(e) => tracing::warn!(value = %value, error = %e, "Ignoring FLAGWISE_METRICS_PORT"),
            }
        }
        if let Some(value) = lookup("FLAGWISE_LOG_FORMAT") {
            match LogFormat::parse(&value) {
                Some(format) => self.logging.format = format,
                None => tracing::warn!(value = %value, "Ignoring FLAGWISE_LOG_FORMAT"),
            }
        }
    }
}

fn apply_analytics_section(
    aggregator: &mut AggregatorConfig,
    section: ConfigFileAnalytics,
) -> Result<()> {
    let switches = [
        (section.enabled, &mut aggregator.enabled),
        (section.track_page_views, &mut aggregator.track_page_views),
        (section.track_interactions, &mut aggregator.track_interactions),
        (section.track_performance, &mut aggregator.track_performance),
        (section.track_errors, &mut aggregator.track_errors),
        (section.track_user_engagement, &mut aggregator.track_user_engagement),
        (section.track_ab_testing, &mut aggregator.track_ab_testing),
        (section.track_health_metrics, &mut aggregator.track_health_metrics),
    ];
    for (value, target) in switches {
        if let Some(value) = value {
            *target = value;
        }
    }

    if let Some(batch_size) = section.batch_size {
        aggregator.batch_size = batch_size;
    }
    if let Some(secs) = section.flush_interval_secs {
        aggregator.flush_interval = Duration::from_secs(secs);
    }
    if let Some(endpoint) = section.endpoint {
        parse_endpoint(&endpoint)?;
        aggregator.endpoint = endpoint;
    }
    if let Some(api_key) = section.api_key {
        aggregator.api_key = Some(SecretString::from(api_key));
    }
    if let Some(secs) = section.request_timeout_secs {
        aggregator.request_timeout = Duration::from_secs(secs);
    }
    Ok(())
}

fn parse_environment(value: &str) -> Result<Environment> {
    Environment::parse(value)
        .ok_or_else(|| Error::InvalidInput(format!("unknown environment: {value}")))
}

fn parse_strategy(value: &str) -> Result<RolloutStrategy> {
    RolloutStrategy::parse(value)
        .ok_or_else(|| Error::InvalidInput(format!("unknown rollout strategy: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FlagwiseConfig::new();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.rollout_strategy, RolloutStrategy::Random);
        assert!(config.aggregator.enabled);
        assert!(config.aggregator.track_ab_testing);
        assert_eq!(config.aggregator.batch_size, 10);
        assert_eq!(config.aggregator.flush_interval, Duration::from_secs(30));
        assert_eq!(config.aggregator.endpoint, "/api/analytics");
        assert!(config.aggregator.auto_flush_enabled());
    }

    #[test]
    fn test_zero_interval_disables_auto_flush() {
        let aggregator = AggregatorConfig::default().with_flush_interval(Duration::ZERO);
        assert!(!aggregator.auto_flush_enabled());

        let aggregator = AggregatorConfig {
            enabled: false,
            ..AggregatorConfig::default()
        };
        assert!(!aggregator.auto_flush_enabled());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
environment = "prod"
rollout_strategy = "stable_hash"

[analytics]
track_errors = false
batch_size = 25
flush_interval_secs = 5
endpoint = "https://collector.example.com/ingest"
api_key = "secret-token"

[logging]
format = "json"
level = "flagwise=debug"

[metrics]
enabled = true
"#
        )
        .unwrap();

        let config = FlagwiseConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.aggregator.environment, Environment::Production);
        assert_eq!(config.rollout_strategy, RolloutStrategy::StableHash);
        assert!(!config.aggregator.track_errors);
        assert!(config.aggregator.track_page_views);
        assert_eq!(config.aggregator.batch_size, 25);
        assert_eq!(config.aggregator.flush_interval, Duration::from_secs(5));
        assert_eq!(
            config.aggregator.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("secret-token".to_string())
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        let file = ConfigFile {
            environment: Some("qa".to_string()),
            ..ConfigFile::default()
        };
        let err = FlagwiseConfig::from_config_file(file).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "environment = [").unwrap();
        let err = FlagwiseConfig::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse_config_file"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLAGWISE_ENVIRONMENT", "staging"),
            ("FLAGWISE_ANALYTICS_ENDPOINT", "https://example.com/a"),
            ("FLAGWISE_FLUSH_INTERVAL_SECS", "0"),
            ("FLAGWISE_ROLLOUT_STRATEGY", "nonsense"),
            ("FLAGWISE_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = FlagwiseConfig::new();
        config.apply_overrides_from(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.aggregator.environment, Environment::Staging);
        assert_eq!(config.aggregator.endpoint, "https://example.com/a");
        assert!(!config.aggregator.auto_flush_enabled());
        assert_eq!(config.rollout_strategy, RolloutStrategy::Random);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_metrics_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FLAGWISE_METRICS_ENABLED", "yes"),
            ("FLAGWISE_METRICS_PORT", "9464"),
        ]
        .into_iter()
        .collect();

        let mut config = FlagwiseConfig::new();
        assert!(!config.metrics.enabled);
        config.apply_overrides_from(|key| vars.get(key).map(ToString::to_string));

        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen_addr.map(|addr| addr.port()), Some(9464));

        let mut config = FlagwiseConfig::new();
        config.apply_overrides_from(|key| (key == "FLAGWISE_METRICS_PORT").then(|| "http".to_string()));
        assert!(config.metrics.listen_addr.is_none());
    }

    #[test]
    fn test_relative_endpoint_is_rejected() {
        let file = ConfigFile {
            analytics: Some(ConfigFileAnalytics {
                endpoint: Some("/api/analytics".to_string()),
                ..ConfigFileAnalytics::default()
            }),
            ..ConfigFile::default()
        };
        let err = FlagwiseConfig::from_config_file(file).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let mut config = FlagwiseConfig::new();
        config.aggregator.endpoint = "https://collector.example.com/ingest".to_string();
        config.apply_overrides_from(|key| {
            (key == "FLAGWISE_ANALYTICS_ENDPOINT").then(|| "ingest".to_string())
        });
        assert_eq!(config.aggregator.endpoint, "https://collector.example.com/ingest");
    }

    #[test]
    fn test_default_endpoint_needs_a_base_url() {
        assert!(parse_endpoint(DEFAULT_ENDPOINT).is_err());
        let err = crate::AnalyticsAggregator::new(AggregatorConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let configured =
            AggregatorConfig::default().with_endpoint("https://collector.example.com/api/analytics");
        assert!(crate::AnalyticsAggregator::new(configured).is_ok());
    }
}
