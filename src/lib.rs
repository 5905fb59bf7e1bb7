//! # Flagwise
//!
//! Feature-flag configuration, validation, rollout, and usage analytics engine.
//!
//! Flagwise owns the canonical map of feature flags for a process, validates
//! every mutation against declarative schemas and the dependency graph, decides
//! whether a user falls inside a (gradual) rollout, and aggregates raw usage and
//! performance events into per-feature statistics that are periodically flushed
//! to an ingestion endpoint.
//!
//! ## Components
//!
//! - Schema validator (`validation::schema`) for field-level checks
//! - Dependency graph analyzer (`validation::graph`) for cycle detection
//! - Configuration manager (`services::ConfigurationManager`) for versioned updates
//! - Analytics aggregator (`analytics::AnalyticsAggregator`) for usage statistics
//!
//! ## Example
//!
//! ```rust,ignore
//! use flagwise::{ConfigurationManager, FlagPatch, Category};
//!
//! let manager = ConfigurationManager::new();
//! manager.update("darkPoolWidget", FlagPatch::new()
//!     .name("Dark Pool Widget")
//!     .category(Category::Widget)
//!     .enabled(true)
//!     .default_value(true)
//!     .created_by("admin"));
//! assert!(manager.validation().is_valid);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod analytics;
pub mod clock;
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod validation;

pub use analytics::{AnalyticsAggregator, AnalyticsSink, AutoFlush, FlushOutcome, HttpAnalyticsSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AggregatorConfig, FlagwiseConfig};
pub use models::{
    AnalyticsEvent, Category, ConfigEvent, DependencyConfig, Environment, EventType, FeatureFlag,
    FeatureMap, FlagPatch, RolloutConfig, UsageStatistics,
};
pub use services::{ConfigurationManager, RolloutStrategy};
pub use validation::{ErrorCode, Severity, ValidationError, ValidationResult, WarningCode};

/// Error type for flagwise operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed JSON, unparseable config values |
/// | `OperationFailed` | I/O errors, logging/metrics initialization failures |
/// | `InvalidConfiguration` | An import is rejected because validation failed |
/// | `NotFound` | An operation targets a flag key that does not exist |
/// | `Transport` | The analytics sink rejected or failed a batch |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A configuration was rejected by validation.
    ///
    /// Only raised by imports; updates never fail on validation.
    #[error("invalid configuration: {}", summarize_errors(.errors))]
    InvalidConfiguration {
        /// The blocking validation errors.
        errors: Vec<ValidationError>,
    },

    /// No flag exists for the given key.
    #[error("feature not found: {0}")]
    NotFound(String),

    /// The analytics sink failed to accept a batch.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for flagwise operations.
pub type Result<T> = std::result::Result<T, Error>;

fn summarize_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("bad json".to_string());
        assert_eq!(err.to_string(), "invalid input: bad json");

        let err = Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: "missing".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'read_config_file' failed: missing"
        );

        let err = Error::NotFound("widget".to_string());
        assert_eq!(err.to_string(), "feature not found: widget");
    }

    #[test]
    fn test_invalid_configuration_lists_fields() {
        let err = Error::InvalidConfiguration {
            errors: vec![ValidationError::new(
                "a.name",
                "Required field \"name\" is missing",
                ErrorCode::RequiredFieldMissing,
            )],
        };
        let display = err.to_string();
        assert!(display.starts_with("invalid configuration"));
        assert!(display.contains("a.name"));
    }
}
