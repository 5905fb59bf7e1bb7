//! Flag-level business rules and cross-flag checks.

use super::graph::find_circular_dependencies;
use super::schema::{FEATURE_FLAG_SCHEMA, validate_object};
use super::{ErrorCode, ValidationError, ValidationResult, ValidationWarning, WarningCode};
use crate::models::{Environment, FeatureFlag, FeatureMap};
use serde_json::Value;
use std::collections::BTreeMap;

/// Validates a typed flag: schema shape plus business rules.
#[must_use]
pub fn validate_feature_flag(flag: &FeatureFlag) -> ValidationResult {
    let document = serde_json::to_value(flag).unwrap_or_default();
    let mut errors = validate_object(&document, &FEATURE_FLAG_SCHEMA, "");
    let (rule_errors, warnings) = business_rules(flag);
    errors.extend(rule_errors);
    ValidationResult::from_parts(errors, warnings)
}

/// Validates an untyped flag document.
///
/// Schema problems (missing fields, wrong types) are reported from the raw
/// JSON. Business rules only run once the document deserializes cleanly.
#[must_use]
pub fn validate_flag_document(document: &Value) -> ValidationResult {
    let errors = validate_object(document, &FEATURE_FLAG_SCHEMA, "");
    if !errors.is_empty() {
        return ValidationResult::from_parts(errors, Vec::new());
    }

    match serde_json::from_value::<FeatureFlag>(document.clone()) {
        Ok(flag) => {
            let (errors, warnings) = business_rules(&flag);
            ValidationResult::from_parts(errors, warnings)
        },
        Err(e) => ValidationResult::from_parts(
            vec![ValidationError::new(
                "",
                format!("Document is not a valid feature flag: {e}"),
                ErrorCode::InvalidType,
            )],
            Vec::new(),
        ),
    }
}

/// Validates an untyped configuration document (an object of key to flag).
///
/// Cross-flag checks run when every flag deserializes.
#[must_use]
pub fn validate_document(document: &Value) -> ValidationResult {
    let Some(flags) = document.as_object() else {
        return ValidationResult::from_parts(
            vec![ValidationError::new(
                "configuration",
                "Configuration must be an object of feature flags",
                ErrorCode::InvalidType,
            )],
            Vec::new(),
        );
    };

    let mut result = ValidationResult::valid();
    for (key, flag) in flags {
        result.merge(prefixed(validate_flag_document(flag), key));
    }

    if let Ok(map) = serde_json::from_value::<FeatureMap>(document.clone()) {
        result.errors.extend(cross_flag_errors(&map));
        result.is_valid = result.errors.is_empty();
    }
    result
}

/// Validates every flag in `config` and the relationships between them.
///
/// Per-flag findings are prefixed with the flag key. Duplicate display names
/// are an error; dependency cycles are critical.
#[must_use]
pub fn validate_configuration(config: &FeatureMap) -> ValidationResult {
    let mut result = ValidationResult::valid();
    for (key, flag) in config {
        result.merge(prefixed(validate_feature_flag(flag), key));
    }
    result.errors.extend(cross_flag_errors(config));
    result.is_valid = result.errors.is_empty();
    result
}

/// Warns about each flag whose environment map disables `environment`.
#[must_use]
pub fn validate_environment_constraints(
    config: &FeatureMap,
    environment: Environment,
) -> ValidationResult {
    let warnings = config
        .iter()
        .filter(|(_, flag)| {
            flag.environment
                .as_ref()
                .is_some_and(|env| !env.allows(environment))
        })
        .map(|(key, flag)| {
            ValidationWarning::new(
                format!("{key}.environment"),
                format!(
                    "Feature \"{}\" is not enabled for environment \"{environment}\"",
                    flag.name
                ),
                WarningCode::EnvironmentDisabled,
            )
            .with_suggestion("Consider enabling this feature for the current environment")
        })
        .collect();
    ValidationResult::from_parts(Vec::new(), warnings)
}

fn prefixed(result: ValidationResult, key: &str) -> ValidationResult {
    ValidationResult::from_parts(
        result.errors.into_iter().map(|e| e.prefixed(key)).collect(),
        result.warnings.into_iter().map(|w| w.prefixed(key)).collect(),
    )
}

fn business_rules(flag: &FeatureFlag) -> (Vec<ValidationError>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if let Some(rollout) = &flag.rollout {
        if rollout.end_date.is_some_and(|end| rollout.start_date >= end) {
            errors.push(ValidationError::new(
                "rollout.dateRange",
                "Rollout start date must be before end date",
                ErrorCode::InvalidDateRange,
            ));
        }

        if rollout.percentage.abs() < f64::EPSILON && rollout.target_users.is_empty() {
            warnings.push(
                ValidationWarning::new(
                    "rollout",
                    "Rollout is set to 0% with no target users - feature will be disabled",
                    WarningCode::RolloutDisabled,
                )
                .with_suggestion("Consider setting a rollout percentage or adding target users"),
            );
        }
    }

    if let Some(deps) = &flag.dependencies
        && deps.required_features.is_empty()
        && deps.optional_features.is_empty()
    {
        warnings.push(
            ValidationWarning::new(
                "dependencies",
                "No dependencies defined - consider adding required or optional features",
                WarningCode::NoDependencies,
            )
            .with_suggestion("Add required or optional feature dependencies for better organization"),
        );
    }

    (errors, warnings)
}

fn cross_flag_errors(config: &FeatureMap) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut name_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for flag in config.values() {
        *name_counts.entry(flag.name.as_str()).or_default() += 1;
    }
    let duplicates: Vec<&str> = name_counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect();
    if !duplicates.is_empty() {
        errors.push(ValidationError::new(
            "configuration",
            format!("Duplicate feature names found: {}", duplicates.join(", ")),
            ErrorCode::DuplicateNames,
        ));
    }

    let cycles = find_circular_dependencies(config);
    if !cycles.is_empty() {
        errors.push(ValidationError::critical(
            "dependencies",
            format!("Circular dependencies detected: {}", cycles.join(", ")),
            ErrorCode::CircularDependencies,
        ));
    }

    errors
}
