//! Read-side views over a feature map: search, statistics, summaries.

use crate::models::{Category, FeatureFlag, FeatureMap};
use crate::validation::ValidationResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Field a [`FeatureQuery`] sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    /// Flag key.
    #[default]
    Key,
    /// Display name.
    Name,
    /// Category.
    Category,
    /// Enabled state (disabled first when ascending).
    Enabled,
    /// Last modification time.
    LastModified,
}

impl SortField {
    /// Parses a sort field name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "key" => Some(Self::Key),
            "name" => Some(Self::Name),
            "category" => Some(Self::Category),
            "enabled" => Some(Self::Enabled),
            "lastmodified" | "last_modified" | "last-modified" => Some(Self::LastModified),
            _ => None,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl SortDirection {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// Filter and ordering over a feature map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureQuery {
    /// Case-insensitive substring matched against name, description, and key.
    pub search: Option<String>,
    /// Only flags in this category.
    pub category: Option<Category>,
    /// Sort field.
    pub sort_by: SortField,
    /// Sort direction.
    pub direction: SortDirection,
}

impl FeatureQuery {
    /// Creates a query matching everything, sorted by key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the search text.
    #[must_use]
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    /// Restricts to a category.
    #[must_use]
    pub const fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the sort field and direction.
    #[must_use]
    pub const fn sort_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_by = field;
        self.direction = direction;
        self
    }

    /// Returns matching flags in query order.
    #[must_use]
    pub fn apply<'a>(&self, config: &'a FeatureMap) -> Vec<(&'a str, &'a FeatureFlag)> {
        let needle = self
            .search
            .as_deref()
            .map(str::to_lowercase)
            .filter(|s| !s.is_empty());

        let mut matches: Vec<(&str, &FeatureFlag)> = config
            .iter()
            .filter(|(key, flag)| {
                needle.as_deref().is_none_or(|needle| matches_search(key, flag, needle))
            })
            .filter(|(_, flag)| self.category.is_none_or(|category| flag.category == category))
            .map(|(key, flag)| (key.as_str(), flag))
            .collect();

        matches.sort_by(|a, b| {
            let ordering = self.compare(a, b);
            match self.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
        matches
    }

    fn compare(&self, (key_a, a): &(&str, &FeatureFlag), (key_b, b): &(&str, &FeatureFlag)) -> Ordering {
        match self.sort_by {
            SortField::Key => key_a.cmp(key_b),
            SortField::Name => a.name.cmp(&b.name),
            SortField::Category => a.category.as_str().cmp(b.category.as_str()),
            SortField::Enabled => a.enabled.cmp(&b.enabled),
            SortField::LastModified => a.last_modified.cmp(&b.last_modified),
        }
    }
}

fn matches_search(key: &str, flag: &FeatureFlag, needle: &str) -> bool {
    flag.name.to_lowercase().contains(needle)
        || flag
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
        || key.to_lowercase().contains(needle)
}

/// Aggregate counts over a feature map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStatistics {
    /// Number of flags.
    pub total: usize,
    /// Flags with `enabled` set.
    pub enabled: usize,
    /// Flags with `enabled` unset.
    pub disabled: usize,
    /// Flag count per category.
    pub by_category: BTreeMap<Category, usize>,
    /// Flags with a rollout block.
    pub with_rollout: usize,
    /// Flags tracking usage analytics.
    pub with_analytics: usize,
    /// Flags requiring at least one other flag.
    pub with_dependencies: usize,
    /// Share of enabled flags (0-100), 0 for an empty map.
    pub enabled_percentage: f64,
}

impl FeatureStatistics {
    /// Computes statistics for `config`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_map(config: &FeatureMap) -> Self {
        let total = config.len();
        let enabled = config.values().filter(|f| f.enabled).count();
        let mut by_category = BTreeMap::new();
        for flag in config.values() {
            *by_category.entry(flag.category).or_insert(0) += 1;
        }

        Self {
            total,
            enabled,
            disabled: total - enabled,
            by_category,
            with_rollout: config.values().filter(|f| f.rollout.is_some()).count(),
            with_analytics: config
                .values()
                .filter(|f| f.analytics.as_ref().is_some_and(|a| a.track_usage))
                .count(),
            with_dependencies: config
                .values()
                .filter(|f| !f.required_features().is_empty())
                .count(),
            enabled_percentage: if total == 0 {
                0.0
            } else {
                enabled as f64 / total as f64 * 100.0
            },
        }
    }
}

/// Counts drawn from a [`ValidationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    /// Whether there are no blocking errors.
    pub is_valid: bool,
    /// Number of errors.
    pub error_count: usize,
    /// Number of warnings.
    pub warning_count: usize,
    /// Number of critical errors.
    pub critical_errors: usize,
}

impl From<&ValidationResult> for ValidationSummary {
    fn from(result: &ValidationResult) -> Self {
        Self {
            is_valid: result.is_valid,
            error_count: result.errors.len(),
            warning_count: result.warnings.len(),
            critical_errors: result.critical_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalyticsSettings, DependencyConfig, RolloutConfig};
    use chrono::{Duration, TimeZone, Utc};

    fn sample() -> FeatureMap {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut dark_pool = FeatureFlag::new("Dark Pool", Category::Widget, true, "admin", now);
        dark_pool.description = Some("Off-exchange volume".to_string());
        dark_pool.rollout = Some(RolloutConfig::new(50.0, now));

        let mut news = FeatureFlag::new("News Feed", Category::News, false, "admin", now + Duration::hours(1));
        news.analytics = Some(AnalyticsSettings {
            track_usage: true,
            ..AnalyticsSettings::default()
        });

        let mut export = FeatureFlag::new("Export", Category::Action, true, "admin", now - Duration::hours(1));
        export.dependencies = Some(DependencyConfig::requires(["darkPool"]));

        [
            ("darkPool".to_string(), dark_pool),
            ("newsFeed".to_string(), news),
            ("export".to_string(), export),
        ]
        .into_iter()
        .collect()
    }

    fn keys(results: &[(&str, &FeatureFlag)]) -> Vec<String> {
        results.iter().map(|(key, _)| (*key).to_string()).collect()
    }

    #[test]
    fn test_search_matches_name_description_and_key() {
        let config = sample();
        assert_eq!(keys(&FeatureQuery::new().search("VOLUME").apply(&config)), vec!["darkPool"]);
        assert_eq!(keys(&FeatureQuery::new().search("feed").apply(&config)), vec!["newsFeed"]);
        assert_eq!(keys(&FeatureQuery::new().search("xpor").apply(&config)), vec!["export"]);
        assert_eq!(FeatureQuery::new().search("").apply(&config).len(), 3);
    }

    #[test]
    fn test_category_filter() {
        let config = sample();
        let results = FeatureQuery::new().category(Category::News).apply(&config);
        assert_eq!(keys(&results), vec!["newsFeed"]);
    }

    #[test]
    fn test_sorting() {
        let config = sample();
        let by_modified = FeatureQuery::new()
            .sort_by(SortField::LastModified, SortDirection::Desc)
            .apply(&config);
        assert_eq!(keys(&by_modified), vec!["newsFeed", "darkPool", "export"]);

        let by_enabled = FeatureQuery::new()
            .sort_by(SortField::Enabled, SortDirection::Asc)
            .apply(&config);
        assert_eq!(by_enabled[0].0, "newsFeed");

        let by_name = FeatureQuery::new()
            .sort_by(SortField::Name, SortDirection::Asc)
            .apply(&config);
        assert_eq!(keys(&by_name), vec!["darkPool", "export", "newsFeed"]);
    }

    #[test]
    fn test_statistics() {
        let stats = FeatureStatistics::from_map(&sample());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.enabled, 2);
        assert_eq!(stats.disabled, 1);
        assert_eq!(stats.with_rollout, 1);
        assert_eq!(stats.with_analytics, 1);
        assert_eq!(stats.with_dependencies, 1);
        assert_eq!(stats.by_category.get(&Category::Widget), Some(&1));
        assert!((stats.enabled_percentage - 200.0 / 3.0).abs() < 1e-9);

        let empty = FeatureStatistics::from_map(&FeatureMap::new());
        assert!(empty.enabled_percentage.abs() < f64::EPSILON);
    }

    #[test]
    fn test_sort_field_parse() {
        assert_eq!(SortField::parse("lastModified"), Some(SortField::LastModified));
        assert_eq!(SortDirection::Asc.toggled(), SortDirection::Desc);
    }
}
