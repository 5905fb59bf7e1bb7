//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter directive when nothing else is configured.
const DEFAULT_DIRECTIVE: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive from the config file.
    pub directive: Option<String>,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from config file settings.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>) -> Self {
        let Some(settings) = settings else {
            return Self::default();
        };
        Self {
            format: settings
                .format
                .as_deref()
                .and_then(LogFormat::parse)
                .unwrap_or_default(),
            directive: settings.level.clone(),
            file: settings.file.as_ref().map(PathBuf::from),
        }
    }

    /// Builds the event filter.
    ///
    /// `FLAGWISE_LOG` wins over `RUST_LOG`, which wins over the configured
    /// directive. Unparseable directives fall back to `info`.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let directive = std::env::var("FLAGWISE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
            .or_else(|| self.directive.clone())
            .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());

        EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            tracing::warn!(directive = %directive, error = %e, "Invalid log filter, using default");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        })
    }
}
