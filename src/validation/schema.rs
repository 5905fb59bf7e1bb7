//! Declarative field schemas.
//!
//! Each [`FieldSchema`] names a field, whether it is required, and a
//! [`FieldKind`] carrying only the constraints that make sense for that type.
//! Values are checked as `serde_json::Value` so that raw documents (imports)
//! and typed flags (serialized on the fly) share one validator.
//!
//! Rules, in order, per field:
//!
//! 1. required and absent (missing or `null`): `REQUIRED_FIELD_MISSING`, stop
//! 2. optional and absent: nothing to check
//! 3. wrong JSON type: `INVALID_TYPE`, stop
//! 4. type-specific constraints, all reported independently

use super::{ErrorCode, ValidationError, join_path};
use crate::models::Category;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Type and constraints of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// A string with optional length, pattern, and allowed-value constraints.
    String {
        /// Minimum length in characters.
        min_len: Option<usize>,
        /// Maximum length in characters.
        max_len: Option<usize>,
        /// Pattern the whole string must match.
        pattern: Option<Regex>,
        /// Allowed values.
        allowed: Option<Vec<&'static str>>,
    },
    /// A number with optional bounds.
    Number {
        /// Inclusive minimum.
        min: Option<f64>,
        /// Inclusive maximum.
        max: Option<f64>,
    },
    /// A boolean.
    Boolean,
    /// An array whose elements optionally match `items`.
    Array {
        /// Schema applied to every element.
        items: Option<Box<FieldSchema>>,
    },
    /// An object whose properties are checked against `fields`.
    Object {
        /// Property schemas.
        fields: Vec<FieldSchema>,
    },
}

impl FieldKind {
    /// Unconstrained string.
    #[must_use]
    pub const fn string() -> Self {
        Self::String {
            min_len: None,
            max_len: None,
            pattern: None,
            allowed: None,
        }
    }

    /// Unconstrained number.
    #[must_use]
    pub const fn number() -> Self {
        Self::Number {
            min: None,
            max: None,
        }
    }

    const fn type_name(&self) -> &'static str {
        match self {
            Self::String { .. } => "a string",
            Self::Number { .. } => "a number",
            Self::Boolean => "a boolean",
            Self::Array { .. } => "an array",
            Self::Object { .. } => "an object",
        }
    }

    const fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::String { .. }, Value::String(_))
                | (Self::Number { .. }, Value::Number(_))
                | (Self::Boolean, Value::Bool(_))
                | (Self::Array { .. }, Value::Array(_))
                | (Self::Object { .. }, Value::Object(_))
        )
    }
}

/// Schema for a single named field.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// Field name (JSON property).
    pub name: &'static str,
    /// Whether the field must be present and non-null.
    pub required: bool,
    /// Type and constraints.
    pub kind: FieldKind,
}

impl FieldSchema {
    /// A required field.
    #[must_use]
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            required: true,
            kind,
        }
    }

    /// An optional field.
    #[must_use]
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            required: false,
            kind,
        }
    }

    /// Sets length bounds (string fields only).
    #[must_use]
    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        if let FieldKind::String {
            min_len, max_len, ..
        } = &mut self.kind
        {
            *min_len = min;
            *max_len = max;
        }
        self
    }

    /// Sets a pattern (string fields only).
    #[must_use]
    pub fn pattern(mut self, regex: &Regex) -> Self {
        if let FieldKind::String { pattern, .. } = &mut self.kind {
            *pattern = Some(regex.clone());
        }
        self
    }

    /// Sets the allowed values (string fields only).
    #[must_use]
    pub fn one_of(mut self, values: &[&'static str]) -> Self {
        if let FieldKind::String { allowed, .. } = &mut self.kind {
            *allowed = Some(values.to_vec());
        }
        self
    }

    /// Sets numeric bounds (number fields only).
    #[must_use]
    pub fn range(mut self, lower: f64, upper: f64) -> Self {
        if let FieldKind::Number { min, max } = &mut self.kind {
            *min = Some(lower);
            *max = Some(upper);
        }
        self
    }
}

/// Validates `value` against `schema`, reporting paths under `path`.
///
/// `value` is `None` when the property is missing from its parent.
#[must_use]
pub fn validate_field(value: Option<&Value>, schema: &FieldSchema, path: &str) -> Vec<ValidationError> {
    check_value(value, schema, &join_path(path, schema.name))
}

fn check_value(value: Option<&Value>, schema: &FieldSchema, full_path: &str) -> Vec<ValidationError> {
    let name = schema.name;
    let value = match value {
        Some(Value::Null) | None if schema.required => {
            return vec![ValidationError::new(
                full_path,
                format!("Required field \"{name}\" is missing"),
                ErrorCode::RequiredFieldMissing,
            )];
        },
        Some(Value::Null) | None => return Vec::new(),
        Some(value) => value,
    };

    if !schema.kind.matches(value) {
        return vec![ValidationError::new(
            full_path,
            format!("Field \"{name}\" must be {}", schema.kind.type_name()),
            ErrorCode::InvalidType,
        )];
    }

    let mut errors = Vec::new();
    match (&schema.kind, value) {
        (
            FieldKind::String {
                min_len,
                max_len,
                pattern,
                allowed,
            },
            Value::String(s),
        ) => {
            let len = s.chars().count();
            if let Some(min) = min_len.filter(|min| len < *min) {
                errors.push(ValidationError::new(
                    full_path,
                    format!("Field \"{name}\" must be at least {min} characters long"),
                    ErrorCode::MinLengthViolation,
                ));
            }
            if let Some(max) = max_len.filter(|max| len > *max) {
                errors.push(ValidationError::new(
                    full_path,
                    format!("Field \"{name}\" must be no more than {max} characters long"),
                    ErrorCode::MaxLengthViolation,
                ));
            }
            if pattern.as_ref().is_some_and(|re| !re.is_match(s)) {
                errors.push(ValidationError::new(
                    full_path,
                    format!("Field \"{name}\" does not match required pattern"),
                    ErrorCode::PatternViolation,
                ));
            }
            if let Some(values) = allowed
                .as_ref()
                .filter(|values| !values.iter().any(|allowed| *allowed == s.as_str()))
            {
                errors.push(ValidationError::new(
                    full_path,
                    format!("Field \"{name}\" must be one of: {}", values.join(", ")),
                    ErrorCode::EnumViolation,
                ));
            }
        },
        (FieldKind::Number { min, max }, Value::Number(n)) => {
            let n = n.as_f64().unwrap_or_default();
            if let Some(min) = min.filter(|min| n < *min) {
                errors.push(ValidationError::new(
                    full_path,
                    format!("Field \"{name}\" must be at least {min}"),
                    ErrorCode::MinValueViolation,
                ));
            }
            if let Some(max) = max.filter(|max| n > *max) {
                errors.push(ValidationError::new(
                    full_path,
                    format!("Field \"{name}\" must be no more than {max}"),
                    ErrorCode::MaxValueViolation,
                ));
            }
        },
        (FieldKind::Array { items: Some(items) }, Value::Array(elements)) => {
            for (index, element) in elements.iter().enumerate() {
                errors.extend(check_value(
                    Some(element),
                    items,
                    &format!("{full_path}[{index}]"),
                ));
            }
        },
        (FieldKind::Object { fields }, Value::Object(properties)) => {
            for field in fields {
                errors.extend(validate_field(properties.get(field.name), field, full_path));
            }
        },
        _ => {},
    }
    errors
}

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap_or_else(|_| unreachable!()));

fn string_list(name: &'static str) -> FieldSchema {
    FieldSchema::optional(
        name,
        FieldKind::Array {
            items: Some(Box::new(
                FieldSchema::required("item", FieldKind::string()).length(Some(1), None),
            )),
        },
    )
}

/// Schema of a rollout block.
pub static ROLLOUT_SCHEMA: LazyLock<Vec<FieldSchema>> = LazyLock::new(|| {
    vec![
        FieldSchema::required("percentage", FieldKind::number()).range(0.0, 100.0),
        FieldSchema::required("startDate", FieldKind::string()),
        FieldSchema::optional("endDate", FieldKind::string()),
        string_list("targetUsers"),
        FieldSchema::required("gradualRollout", FieldKind::Boolean),
    ]
});

/// Schema of an admin block.
pub static ADMIN_SCHEMA: LazyLock<Vec<FieldSchema>> = LazyLock::new(|| {
    vec![
        FieldSchema::required("adminOverride", FieldKind::Boolean),
        FieldSchema::optional("adminUserId", FieldKind::string()).length(Some(1), None),
        string_list("adminPermissions"),
        FieldSchema::required("auditLog", FieldKind::Boolean),
    ]
});

/// Schema of a dependency block.
pub static DEPENDENCY_SCHEMA: LazyLock<Vec<FieldSchema>> = LazyLock::new(|| {
    vec![
        string_list("requiredFeatures"),
        string_list("optionalFeatures"),
        string_list("conflicts"),
        FieldSchema::required("priority", FieldKind::string())
            .one_of(&["low", "medium", "high", "critical"]),
    ]
});

/// Schema of an analytics block.
pub static ANALYTICS_SCHEMA: LazyLock<Vec<FieldSchema>> = LazyLock::new(|| {
    vec![
        FieldSchema::required("trackUsage", FieldKind::Boolean),
        FieldSchema::required("trackPerformance", FieldKind::Boolean),
        FieldSchema::required("trackErrors", FieldKind::Boolean),
        string_list("customMetrics"),
    ]
});

/// Schema of an environment block.
pub static ENVIRONMENT_SCHEMA: LazyLock<Vec<FieldSchema>> = LazyLock::new(|| {
    vec![
        FieldSchema::required("development", FieldKind::Boolean),
        FieldSchema::required("production", FieldKind::Boolean),
        FieldSchema::required("staging", FieldKind::Boolean),
        FieldSchema::required("testing", FieldKind::Boolean),
    ]
});

/// Schema of a whole feature flag, sub-blocks included.
pub static FEATURE_FLAG_SCHEMA: LazyLock<Vec<FieldSchema>> = LazyLock::new(|| {
    fn block(name: &'static str, fields: &[FieldSchema]) -> FieldSchema {
        FieldSchema::optional(
            name,
            FieldKind::Object {
                fields: fields.to_vec(),
            },
        )
    }

    let categories: Vec<&'static str> = Category::all().iter().map(Category::as_str).collect();

    vec![
        FieldSchema::required("name", FieldKind::string()).length(Some(1), Some(100)),
        FieldSchema::required("enabled", FieldKind::Boolean),
        FieldSchema::required("category", FieldKind::string()).one_of(&categories),
        FieldSchema::required("defaultValue", FieldKind::Boolean),
        FieldSchema::optional("description", FieldKind::string()).length(None, Some(500)),
        FieldSchema::optional("userOverride", FieldKind::Boolean),
        FieldSchema::required("version", FieldKind::string()).pattern(&VERSION_PATTERN),
        FieldSchema::required("lastModified", FieldKind::string()),
        FieldSchema::required("createdBy", FieldKind::string()).length(Some(1), None),
        block("rollout", &ROLLOUT_SCHEMA),
        block("admin", &ADMIN_SCHEMA),
        block("dependencies", &DEPENDENCY_SCHEMA),
        block("analytics", &ANALYTICS_SCHEMA),
        block("environment", &ENVIRONMENT_SCHEMA),
    ]
});

/// Validates every property of `value` against `schema`.
#[must_use]
pub fn validate_object(value: &Value, schema: &[FieldSchema], path: &str) -> Vec<ValidationError> {
    let Some(properties) = value.as_object() else {
        return vec![ValidationError::new(
            path,
            "Value must be an object",
            ErrorCode::InvalidType,
        )];
    };
    schema
        .iter()
        .flat_map(|field| validate_field(properties.get(field.name), field, path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn codes(errors: &[ValidationError]) -> Vec<ErrorCode> {
        errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_required_missing_short_circuits() {
        let schema = FieldSchema::required("name", FieldKind::string()).length(Some(1), None);
        let errors = validate_field(None, &schema, "");
        assert_eq!(codes(&errors), vec![ErrorCode::RequiredFieldMissing]);
        assert_eq!(errors[0].field, "name");

        let errors = validate_field(Some(&Value::Null), &schema, "flag");
        assert_eq!(codes(&errors), vec![ErrorCode::RequiredFieldMissing]);
        assert_eq!(errors[0].field, "flag.name");
    }

    #[test]
    fn test_optional_absent_is_fine() {
        let schema = FieldSchema::optional("description", FieldKind::string()).length(None, Some(5));
        assert!(validate_field(None, &schema, "").is_empty());
    }

    #[test_case(json!(1), "string" ; "number for string")]
    #[test_case(json!("x"), "boolean" ; "string for boolean")]
    #[test_case(json!([]), "object" ; "array for object")]
    #[test_case(json!({}), "array" ; "object for array")]
    #[test_case(json!(true), "number" ; "bool for number")]
    fn test_type_mismatch(value: Value, kind: &str) {
        let kind = match kind {
            "string" => FieldKind::string(),
            "boolean" => FieldKind::Boolean,
            "object" => FieldKind::Object { fields: Vec::new() },
            "array" => FieldKind::Array { items: None },
            _ => FieldKind::number(),
        };
        let schema = FieldSchema::required("field", kind);
        let errors = validate_field(Some(&value), &schema, "");
        assert_eq!(codes(&errors), vec![ErrorCode::InvalidType]);
    }

    #[test]
    fn test_string_constraints_all_reported() {
        let schema = FieldSchema::required("code", FieldKind::string())
            .length(Some(5), Some(10))
            .pattern(&VERSION_PATTERN)
            .one_of(&["1.0.0.0"]);
        let errors = validate_field(Some(&json!("abc")), &schema, "");
        assert_eq!(
            codes(&errors),
            vec![
                ErrorCode::MinLengthViolation,
                ErrorCode::PatternViolation,
                ErrorCode::EnumViolation,
            ]
        );
    }

    #[test]
    fn test_number_bounds() {
        let schema = FieldSchema::required("percentage", FieldKind::number()).range(0.0, 100.0);
        assert!(validate_field(Some(&json!(0)), &schema, "").is_empty());
        assert!(validate_field(Some(&json!(100)), &schema, "").is_empty());
        assert_eq!(
            codes(&validate_field(Some(&json!(-1)), &schema, "")),
            vec![ErrorCode::MinValueViolation]
        );
        assert_eq!(
            codes(&validate_field(Some(&json!(100.5)), &schema, "")),
            vec![ErrorCode::MaxValueViolation]
        );
    }

    #[test]
    fn test_array_items_use_index_paths() {
        let errors = validate_field(
            Some(&json!(["a", 3, ""])),
            &string_list("targetUsers"),
            "rollout",
        );
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "rollout.targetUsers[1]");
        assert_eq!(errors[0].code, ErrorCode::InvalidType);
        assert_eq!(errors[1].field, "rollout.targetUsers[2]");
        assert_eq!(errors[1].code, ErrorCode::MinLengthViolation);
    }

    #[test]
    fn test_nested_object_paths() {
        let schema = FieldSchema::optional(
            "rollout",
            FieldKind::Object {
                fields: ROLLOUT_SCHEMA.clone(),
            },
        );
        let errors = validate_field(
            Some(&json!({"percentage": 150, "startDate": "2025-01-01T00:00:00Z"})),
            &schema,
            "",
        );
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["rollout.percentage", "rollout.gradualRollout"]);
    }

    #[test]
    fn test_version_pattern() {
        assert!(VERSION_PATTERN.is_match("1.0.12"));
        assert!(!VERSION_PATTERN.is_match("1.0"));
        assert!(!VERSION_PATTERN.is_match("v1.0.0"));
    }

    #[test]
    fn test_validate_object_requires_object() {
        let errors = validate_object(&json!("flag"), &FEATURE_FLAG_SCHEMA, "widget");
        assert_eq!(codes(&errors), vec![ErrorCode::InvalidType]);
        assert_eq!(errors[0].field, "widget");
    }
}
