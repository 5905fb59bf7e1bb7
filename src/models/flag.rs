//! Feature flag definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Version assigned to a flag on its first write.
pub const INITIAL_VERSION: &str = "1.0.0";

/// Canonical mapping of flag key to flag definition.
///
/// Ordered so that exports, reports, and cycle paths are stable.
pub type FeatureMap = BTreeMap<String, FeatureFlag>;

/// Feature categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Whole dashboard sections.
    Dashboard,
    /// Individual dashboard widgets.
    Widget,
    /// User-triggered actions.
    Action,
    /// News feeds.
    News,
    /// Shared UI components.
    #[default]
    Component,
}

impl Category {
    /// Returns all category variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Dashboard,
            Self::Widget,
            Self::Action,
            Self::News,
            Self::Component,
        ]
    }

    /// Returns the category as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dashboard => "dashboard",
            Self::Widget => "widget",
            Self::Action => "action",
            Self::News => "news",
            Self::Component => "component",
        }
    }

    /// Parses a category from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dashboard" => Some(Self::Dashboard),
            "widget" => Some(Self::Widget),
            "action" => Some(Self::Action),
            "news" => Some(Self::News),
            "component" => Some(Self::Component),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environments a flag can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Production.
    Production,
    /// Pre-production staging.
    Staging,
    /// Automated testing.
    Testing,
}

impl Environment {
    /// Returns the environment as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Testing => "testing",
        }
    }

    /// Parses an environment name, accepting common short forms.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            "staging" | "stage" => Some(Self::Staging),
            "testing" | "test" => Some(Self::Testing),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-environment enable map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Enabled in development.
    pub development: bool,
    /// Enabled in production.
    pub production: bool,
    /// Enabled in staging.
    pub staging: bool,
    /// Enabled in testing.
    pub testing: bool,
}

impl EnvironmentConfig {
    /// Returns whether the flag is enabled for `environment`.
    #[must_use]
    pub const fn allows(&self, environment: Environment) -> bool {
        match environment {
            Environment::Development => self.development,
            Environment::Production => self.production,
            Environment::Staging => self.staging,
            Environment::Testing => self.testing,
        }
    }
}

/// Time- or membership-based partial enablement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutConfig {
    /// Target percentage of users (0-100).
    pub percentage: f64,
    /// When the rollout begins.
    pub start_date: DateTime<Utc>,
    /// When a gradual rollout reaches its target; defaults to start + 7 days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Explicit user list; when non-empty, membership replaces the percentage.
    #[serde(default)]
    pub target_users: Vec<String>,
    /// Whether the percentage ramps linearly between start and end.
    pub gradual_rollout: bool,
}

impl RolloutConfig {
    /// Creates an immediate rollout at `percentage` starting at `start_date`.
    #[must_use]
    pub const fn new(percentage: f64, start_date: DateTime<Utc>) -> Self {
        Self {
            percentage,
            start_date,
            end_date: None,
            target_users: Vec::new(),
            gradual_rollout: false,
        }
    }

    /// Makes the rollout ramp linearly until `end_date`.
    #[must_use]
    pub const fn gradual_until(mut self, end_date: DateTime<Utc>) -> Self {
        self.gradual_rollout = true;
        self.end_date = Some(end_date);
        self
    }

    /// Restricts the rollout to an explicit user list.
    #[must_use]
    pub fn with_target_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_users = users.into_iter().map(Into::into).collect();
        self
    }
}

/// Administrative override settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    /// Whether an administrator has forced the flag.
    pub admin_override: bool,
    /// The administrator who set the override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_user_id: Option<String>,
    /// Permissions required to change the flag.
    #[serde(default)]
    pub admin_permissions: Vec<String>,
    /// Whether changes are audit-logged.
    pub audit_log: bool,
}

/// Dependency priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    #[default]
    Medium,
    /// High priority.
    High,
    /// Critical priority.
    Critical,
}

impl Priority {
    /// Returns the priority as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Dependencies between flags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyConfig {
    /// Flags that must exist and be enabled. These form the dependency graph.
    #[serde(default)]
    pub required_features: Vec<String>,
    /// Flags that are used when present. Not checked.
    #[serde(default)]
    pub optional_features: Vec<String>,
    /// Flags that must not be enabled alongside this one.
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// Priority of the dependency declaration.
    pub priority: Priority,
}

impl DependencyConfig {
    /// Creates a declaration requiring the given flags.
    #[must_use]
    pub fn requires<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_features: required.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Per-flag analytics tracking switches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSettings {
    /// Track views and interactions.
    pub track_usage: bool,
    /// Track performance metrics.
    pub track_performance: bool,
    /// Track errors.
    pub track_errors: bool,
    /// Names of additional metrics.
    #[serde(default)]
    pub custom_metrics: Vec<String>,
}

/// A named boolean-gated feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    /// Human-readable label (1-100 characters).
    pub name: String,
    /// Effective state absent a user override.
    pub enabled: bool,
    /// Feature category.
    pub category: Category,
    /// State restored by a reset.
    pub default_value: bool,
    /// Optional description (at most 500 characters).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Per-user override; takes precedence over `enabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_override: Option<bool>,
    /// Semantic version, bumped on every update.
    pub version: String,
    /// When the flag was last written.
    pub last_modified: DateTime<Utc>,
    /// Author of the flag.
    pub created_by: String,
    /// Rollout settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout: Option<RolloutConfig>,
    /// Administrative settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminConfig>,
    /// Dependency declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencyConfig>,
    /// Analytics tracking switches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsSettings>,
    /// Environment scoping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentConfig>,
}

impl FeatureFlag {
    /// Creates a flag with the required fields and no optional settings.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        category: Category,
        enabled: bool,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            enabled,
            category,
            default_value: enabled,
            description: None,
            user_override: None,
            version: INITIAL_VERSION.to_string(),
            last_modified: now,
            created_by: created_by.into(),
            rollout: None,
            admin: None,
            dependencies: None,
            analytics: None,
            environment: None,
        }
    }

    /// Placeholder used when an update creates a flag that did not exist.
    ///
    /// Required text fields start empty so validation reports what the
    /// caller left out.
    fn blank(now: DateTime<Utc>) -> Self {
        Self::new(String::new(), Category::default(), false, String::new(), now)
    }

    /// Returns the effective state: the user override when set, else `enabled`.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.user_override.unwrap_or(self.enabled)
    }

    /// Returns the keys this flag requires, or nothing.
    #[must_use]
    pub fn required_features(&self) -> &[String] {
        self.dependencies
            .as_ref()
            .map_or(&[], |deps| deps.required_features.as_slice())
    }

    /// Restores `enabled` to `default_value` and clears any user override.
    pub fn reset(&mut self) {
        self.enabled = self.default_value;
        self.user_override = None;
    }
}

/// A partial flag merged over the existing definition by an update.
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagPatch {
    /// New label.
    pub name: Option<String>,
    /// New enabled state.
    pub enabled: Option<bool>,
    /// New category.
    pub category: Option<Category>,
    /// New default value.
    pub default_value: Option<bool>,
    /// New description.
    pub description: Option<String>,
    /// New user override.
    pub user_override: Option<bool>,
    /// New author.
    pub created_by: Option<String>,
    /// New rollout settings.
    pub rollout: Option<RolloutConfig>,
    /// New administrative settings.
    pub admin: Option<AdminConfig>,
    /// New dependency declaration.
    pub dependencies: Option<DependencyConfig>,
    /// New analytics switches.
    pub analytics: Option<AnalyticsSettings>,
    /// New environment scoping.
    pub environment: Option<EnvironmentConfig>,
}

impl FlagPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a patch that carries every field of `flag`.
    #[must_use]
    pub fn from_flag(flag: FeatureFlag) -> Self {
        Self {
            name: Some(flag.name),
            enabled: Some(flag.enabled),
            category: Some(flag.category),
            default_value: Some(flag.default_value),
            description: flag.description,
            user_override: flag.user_override,
            created_by: Some(flag.created_by),
            rollout: flag.rollout,
            admin: flag.admin,
            dependencies: flag.dependencies,
            analytics: flag.analytics,
            environment: flag.environment,
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the enabled state.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Sets the category.
    #[must_use]
    pub const fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub const fn default_value(mut self, value: bool) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the user override.
    #[must_use]
    pub const fn user_override(mut self, value: bool) -> Self {
        self.user_override = Some(value);
        self
    }

    /// Sets the author.
    #[must_use]
    pub fn created_by(mut self, author: impl Into<String>) -> Self {
        self.created_by = Some(author.into());
        self
    }

    /// Sets the rollout settings.
    #[must_use]
    pub fn rollout(mut self, rollout: RolloutConfig) -> Self {
        self.rollout = Some(rollout);
        self
    }

    /// Sets the administrative settings.
    #[must_use]
    pub fn admin(mut self, admin: AdminConfig) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Sets the dependency declaration.
    #[must_use]
    pub fn dependencies(mut self, dependencies: DependencyConfig) -> Self {
        self.dependencies = Some(dependencies);
        self
    }

    /// Sets the analytics switches.
    #[must_use]
    pub fn analytics(mut self, analytics: AnalyticsSettings) -> Self {
        self.analytics = Some(analytics);
        self
    }

    /// Sets the environment scoping.
    #[must_use]
    pub const fn environment(mut self, environment: EnvironmentConfig) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Returns the names of the fields this patch sets.
    #[must_use]
    pub fn modified_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut push = |set: bool, name: &'static str| {
            if set {
                fields.push(name);
            }
        };
        push(self.name.is_some(), "name");
        push(self.enabled.is_some(), "enabled");
        push(self.category.is_some(), "category");
        push(self.default_value.is_some(), "defaultValue");
        push(self.description.is_some(), "description");
        push(self.user_override.is_some(), "userOverride");
        push(self.created_by.is_some(), "createdBy");
        push(self.rollout.is_some(), "rollout");
        push(self.admin.is_some(), "admin");
        push(self.dependencies.is_some(), "dependencies");
        push(self.analytics.is_some(), "analytics");
        push(self.environment.is_some(), "environment");
        fields
    }

    /// Merges this patch over `existing` (or a blank flag), stamping
    /// `last_modified` and the next version.
    #[must_use]
    pub fn apply(self, existing: Option<&FeatureFlag>, now: DateTime<Utc>) -> FeatureFlag {
        let (mut flag, version) = match existing {
            Some(current) => (current.clone(), increment_version(&current.version)),
            None => (FeatureFlag::blank(now), INITIAL_VERSION.to_string()),
        };

        if let Some(name) = self.name {
            flag.name = name;
        }
        if let Some(enabled) = self.enabled {
            flag.enabled = enabled;
        }
        if let Some(category) = self.category {
            flag.category = category;
        }
        if let Some(default_value) = self.default_value {
            flag.default_value = default_value;
        }
        if let Some(created_by) = self.created_by {
            flag.created_by = created_by;
        }
        flag.description = self.description.or(flag.description);
        flag.user_override = self.user_override.or(flag.user_override);
        flag.rollout = self.rollout.or(flag.rollout);
        flag.admin = self.admin.or(flag.admin);
        flag.dependencies = self.dependencies.or(flag.dependencies);
        flag.analytics = self.analytics.or(flag.analytics);
        flag.environment = self.environment.or(flag.environment);

        flag.version = version;
        flag.last_modified = now;
        flag
    }
}

/// Bumps the patch component of a `MAJOR.MINOR.PATCH` version.
///
/// Missing or non-numeric components are read as zero.
#[must_use]
pub fn increment_version(version: &str) -> String {
    let mut parts = version.split('.');
    let mut component = || {
        parts
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or("0")
            .to_string()
    };
    let major = component();
    let minor = component();
    let patch = component().parse::<u64>().unwrap_or(0).saturating_add(1);
    format!("{major}.{minor}.{patch}")
}

/// Returns true when the key set differs or any flag's effective switches changed.
#[must_use]
pub fn has_flags_changed(old: &FeatureMap, new: &FeatureMap) -> bool {
    if old.len() != new.len() {
        return true;
    }

    old.iter().any(|(key, old_flag)| {
        new.get(key).is_none_or(|new_flag| {
            old_flag.enabled != new_flag.enabled || old_flag.user_override != new_flag.user_override
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_increment_version() {
        assert_eq!(increment_version("1.0.0"), "1.0.1");
        assert_eq!(increment_version("2.4.9"), "2.4.10");
        assert_eq!(increment_version("3.1"), "3.1.1");
        assert_eq!(increment_version(""), "0.0.1");
        assert_eq!(increment_version("1.2.x"), "1.2.1");
    }

    #[test]
    fn test_user_override_wins() {
        let mut flag = FeatureFlag::new("Widget", Category::Widget, true, "admin", now());
        assert!(flag.is_enabled());

        flag.user_override = Some(false);
        assert!(!flag.is_enabled());

        flag.reset();
        assert!(flag.is_enabled());
        assert!(flag.user_override.is_none());
    }

    #[test]
    fn test_patch_creates_blank_flag() {
        let flag = FlagPatch::new().enabled(true).apply(None, now());
        assert_eq!(flag.version, INITIAL_VERSION);
        assert!(flag.name.is_empty());
        assert!(flag.created_by.is_empty());
        assert!(flag.enabled);
    }

    #[test]
    fn test_patch_merges_over_existing() {
        let existing = FeatureFlag::new("Widget", Category::Widget, true, "admin", now());
        let later = now() + chrono::Duration::hours(1);
        let flag = FlagPatch::new()
            .description("Shows data")
            .enabled(false)
            .apply(Some(&existing), later);

        assert_eq!(flag.name, "Widget");
        assert_eq!(flag.description.as_deref(), Some("Shows data"));
        assert!(!flag.enabled);
        assert_eq!(flag.version, "1.0.1");
        assert_eq!(flag.last_modified, later);
    }

    #[test]
    fn test_modified_fields() {
        let patch = FlagPatch::new().enabled(true).name("x");
        assert_eq!(patch.modified_fields(), vec!["name", "enabled"]);
    }

    #[test]
    fn test_has_flags_changed() {
        let flag = FeatureFlag::new("Widget", Category::Widget, true, "admin", now());
        let old: FeatureMap = [("w".to_string(), flag.clone())].into_iter().collect();

        let mut renamed = flag.clone();
        renamed.name = "Other".to_string();
        let same_switches: FeatureMap = [("w".to_string(), renamed)].into_iter().collect();
        assert!(!has_flags_changed(&old, &same_switches));

        let mut toggled = flag;
        toggled.user_override = Some(false);
        let changed: FeatureMap = [("w".to_string(), toggled)].into_iter().collect();
        assert!(has_flags_changed(&old, &changed));

        assert!(has_flags_changed(&old, &FeatureMap::new()));
    }

    #[test]
    fn test_flag_serializes_camel_case() {
        let flag = FeatureFlag::new("Widget", Category::Widget, true, "admin", now());
        let value = serde_json::to_value(&flag).unwrap();
        assert_eq!(value["defaultValue"], serde_json::json!(true));
        assert_eq!(value["createdBy"], serde_json::json!("admin"));
        assert_eq!(value["category"], serde_json::json!("widget"));
        assert!(value.get("rollout").is_none());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("prod"), Some(Environment::Production));
        assert_eq!(Environment::parse("Staging"), Some(Environment::Staging));
        assert_eq!(Environment::parse("qa"), None);
    }
}
