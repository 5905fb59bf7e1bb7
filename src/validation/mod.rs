//! Configuration validation.
//!
//! Validation is layered:
//!
//! - [`schema`]: declarative field schemas checked against JSON values
//! - [`rules`]: per-flag business rules and cross-flag checks
//! - [`graph`]: dependency graph analysis (cycles, missing or conflicting features)
//!
//! Validation never fails with an `Err`; problems are returned as data in a
//! [`ValidationResult`] so callers decide whether to block.

pub mod graph;
pub mod rules;
pub mod schema;

pub use graph::{check_dependencies, find_circular_dependencies};
pub use rules::{
    validate_configuration, validate_document, validate_environment_constraints,
    validate_feature_flag, validate_flag_document,
};
pub use schema::{FieldKind, FieldSchema, validate_field};

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Severity of a blocking validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The configuration is invalid.
    Error,
    /// The configuration cannot be resolved at all.
    Critical,
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A required field is absent or null.
    RequiredFieldMissing,
    /// A field has the wrong JSON type.
    InvalidType,
    /// A string is shorter than allowed.
    MinLengthViolation,
    /// A string is longer than allowed.
    MaxLengthViolation,
    /// A string does not match its pattern.
    PatternViolation,
    /// A string is not one of the allowed values.
    EnumViolation,
    /// A number is below its minimum.
    MinValueViolation,
    /// A number is above its maximum.
    MaxValueViolation,
    /// A rollout starts on or after its end.
    InvalidDateRange,
    /// Two flags share a display name.
    DuplicateNames,
    /// Required-feature edges form a cycle.
    CircularDependencies,
    /// A required feature does not exist.
    MissingDependency,
    /// A required feature exists but is disabled.
    DependencyDisabled,
    /// A conflicting feature is enabled.
    DependencyConflict,
}

impl ErrorCode {
    /// Returns the wire name of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequiredFieldMissing => "REQUIRED_FIELD_MISSING",
            Self::InvalidType => "INVALID_TYPE",
            Self::MinLengthViolation => "MIN_LENGTH_VIOLATION",
            Self::MaxLengthViolation => "MAX_LENGTH_VIOLATION",
            Self::PatternViolation => "PATTERN_VIOLATION",
            Self::EnumViolation => "ENUM_VIOLATION",
            Self::MinValueViolation => "MIN_VALUE_VIOLATION",
            Self::MaxValueViolation => "MAX_VALUE_VIOLATION",
            Self::InvalidDateRange => "INVALID_DATE_RANGE",
            Self::DuplicateNames => "DUPLICATE_NAMES",
            Self::CircularDependencies => "CIRCULAR_DEPENDENCIES",
            Self::MissingDependency => "MISSING_DEPENDENCY",
            Self::DependencyDisabled => "DEPENDENCY_DISABLED",
            Self::DependencyConflict => "DEPENDENCY_CONFLICT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable warning codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    /// Rollout at 0% with no target users.
    RolloutDisabled,
    /// Dependency block declares no required or optional features.
    NoDependencies,
    /// The flag is switched off for the evaluated environment.
    EnvironmentDisabled,
}

impl WarningCode {
    /// Returns the wire name of the code.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RolloutDisabled => "ROLLOUT_DISABLED",
            Self::NoDependencies => "NO_DEPENDENCIES",
            Self::EnvironmentDisabled => "ENVIRONMENT_DISABLED",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A blocking validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Machine-readable code.
    pub code: ErrorCode,
    /// Severity.
    pub severity: Severity,
}

impl ValidationError {
    /// Creates an error with `Severity::Error`.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
            severity: Severity::Error,
        }
    }

    /// Creates an error with `Severity::Critical`.
    #[must_use]
    pub fn critical(field: impl Into<String>, message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            severity: Severity::Critical,
            ..Self::new(field, message, code)
        }
    }

    /// Prepends `prefix.` to the field path.
    #[must_use]
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.field = join_path(prefix, &self.field);
        self
    }
}

/// An advisory, non-blocking validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Dotted path of the field concerned.
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Machine-readable code.
    pub code: WarningCode,
    /// Suggested remedy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationWarning {
    /// Creates a warning.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: WarningCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
            suggestion: None,
        }
    }

    /// Attaches a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Prepends `prefix.` to the field path.
    #[must_use]
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.field = join_path(prefix, &self.field);
        self
    }
}

/// Outcome of validating a flag or a configuration.
///
/// `is_valid` is true iff `errors` is empty; warnings never block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Whether there are no blocking errors.
    pub is_valid: bool,
    /// Blocking errors.
    pub errors: Vec<ValidationError>,
    /// Advisory warnings.
    pub warnings: Vec<ValidationWarning>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

impl ValidationResult {
    /// Creates an empty, valid result.
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Builds a result from its parts, deriving `is_valid`.
    #[must_use]
    pub fn from_parts(errors: Vec<ValidationError>, warnings: Vec<ValidationWarning>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Returns true if any error is critical.
    #[must_use]
    pub fn has_critical(&self) -> bool {
        self.critical_count() > 0
    }

    /// Number of critical errors.
    #[must_use]
    pub fn critical_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.severity == Severity::Critical)
            .count()
    }

    /// Returns true if any error carries `code`.
    #[must_use]
    pub fn has_error(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    /// Returns true if any warning carries `code`.
    #[must_use]
    pub fn has_warning(&self, code: WarningCode) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    /// Appends another result's findings, re-deriving validity.
    pub fn merge(&mut self, other: Self) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.is_valid = self.errors.is_empty();
    }

    /// Renders a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut report = String::from("Feature Configuration Validation Report\n");
        report.push_str("=======================================\n\n");

        if self.is_valid {
            report.push_str("Configuration is valid\n\n");
        } else {
            report.push_str("Configuration has errors\n\n");
        }

        if !self.errors.is_empty() {
            report.push_str("Errors:\n");
            for error in &self.errors {
                let _ = writeln!(
                    report,
                    "  - {}: {} ({})",
                    error.field, error.message, error.code
                );
            }
            report.push('\n');
        }

        if !self.warnings.is_empty() {
            report.push_str("Warnings:\n");
            for warning in &self.warnings {
                let _ = writeln!(
                    report,
                    "  - {}: {} ({})",
                    warning.field, warning.message, warning.code
                );
                if let Some(suggestion) = &warning.suggestion {
                    let _ = writeln!(report, "    Suggestion: {suggestion}");
                }
            }
            report.push('\n');
        }

        report
    }
}

/// Joins two dotted path segments, skipping empty ones.
pub(crate) fn join_path(prefix: &str, field: &str) -> String {
    match (prefix.is_empty(), field.is_empty()) {
        (true, _) => field.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}.{field}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_ignores_warnings() {
        let result = ValidationResult::from_parts(
            Vec::new(),
            vec![ValidationWarning::new(
                "rollout",
                "disabled",
                WarningCode::RolloutDisabled,
            )],
        );
        assert!(result.is_valid);
        assert!(result.has_warning(WarningCode::RolloutDisabled));
    }

    #[test]
    fn test_merge_rederives_validity() {
        let mut result = ValidationResult::valid();
        result.merge(ValidationResult::from_parts(
            vec![ValidationError::critical(
                "dependencies",
                "cycle",
                ErrorCode::CircularDependencies,
            )],
            Vec::new(),
        ));
        assert!(!result.is_valid);
        assert!(result.has_critical());
        assert_eq!(result.critical_count(), 1);
    }

    #[test]
    fn test_prefixed_paths() {
        let err = ValidationError::new("name", "missing", ErrorCode::RequiredFieldMissing)
            .prefixed("widget");
        assert_eq!(err.field, "widget.name");

        let err = ValidationError::new("", "bad", ErrorCode::InvalidType).prefixed("widget");
        assert_eq!(err.field, "widget");
    }

    #[test]
    fn test_report_lists_errors_and_suggestions() {
        let result = ValidationResult::from_parts(
            vec![ValidationError::new(
                "a.name",
                "Required field \"name\" is missing",
                ErrorCode::RequiredFieldMissing,
            )],
            vec![
                ValidationWarning::new("a.rollout", "off", WarningCode::RolloutDisabled)
                    .with_suggestion("Raise the percentage"),
            ],
        );
        let report = result.report();
        assert!(report.contains("Configuration has errors"));
        assert!(report.contains("a.name: Required field \"name\" is missing (REQUIRED_FIELD_MISSING)"));
        assert!(report.contains("(ROLLOUT_DISABLED)"));
        assert!(report.contains("Suggestion: Raise the percentage"));
    }

    #[test]
    fn test_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::CircularDependencies).unwrap();
        assert_eq!(json, "\"CIRCULAR_DEPENDENCIES\"");
        let json = serde_json::to_string(&WarningCode::NoDependencies).unwrap();
        assert_eq!(json, "\"NO_DEPENDENCIES\"");
    }
}
