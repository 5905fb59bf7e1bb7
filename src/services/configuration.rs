//! The configuration manager.
//!
//! Owns the canonical [`FeatureMap`] for a process together with the most
//! recent [`ValidationResult`]. Every write is an atomic read-merge-write under
//! one lock, followed by a full revalidation. Failed validation never rolls a
//! write back; it is surfaced through [`ConfigurationManager::validation`] and
//! a `ValidationChanged` event instead. Only imports refuse invalid input.

use super::management::{FeatureQuery, FeatureStatistics, ValidationSummary};
use super::rollout::{
    RolloutStatus, RolloutStrategy, calculate_rollout_percentage, is_user_in_rollout,
    rollout_status,
};
use crate::clock::{Clock, SystemClock};
use crate::config::FlagwiseConfig;
use crate::models::{
    AdminConfig, AnalyticsSettings, Category, ConfigEvent, DependencyConfig, Environment,
    EnvironmentConfig, EventMeta, FeatureFlag, FeatureMap, FlagPatch, RolloutConfig,
    has_flags_changed,
};
use crate::observability::{ConfigEventReceiver, EventBus, EventFilter};
use crate::validation::{
    ValidationError, ValidationResult, check_dependencies, validate_configuration,
    validate_document, validate_environment_constraints,
};
use crate::{Error, Result};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::instrument;

#[derive(Debug, Default)]
struct State {
    flags: FeatureMap,
    validation: ValidationResult,
}

/// Owns and mutates the feature configuration.
pub struct ConfigurationManager {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
    strategy: RolloutStrategy,
    events: EventBus,
}

impl Default for ConfigurationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigurationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationManager")
            .field("flags", &self.read().flags.len())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl ConfigurationManager {
    /// Creates an empty manager on the system clock with random sampling.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty manager reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State::default()),
            clock,
            strategy: RolloutStrategy::default(),
            events: EventBus::default(),
        }
    }

    /// Creates an empty manager using the rollout strategy from `config`.
    #[must_use]
    pub fn from_config(config: &FlagwiseConfig) -> Self {
        Self::new().with_strategy(config.rollout_strategy)
    }

    /// Sets the rollout sampling strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: RolloutStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns the rollout sampling strategy.
    #[must_use]
    pub const fn strategy(&self) -> RolloutStrategy {
        self.strategy
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges `patch` over the flag at `key`, creating it when absent.
    ///
    /// Bumps the patch version (or starts at `1.0.0`), stamps
    /// `last_modified`, and revalidates the whole configuration. The write
    /// is kept even when validation fails.
    #[instrument(skip(self, patch), fields(key = %key))]
    pub fn update(&self, key: &str, patch: FlagPatch) -> FeatureFlag {
        let modified_fields = patch.modified_fields();
        let now = self.clock.now();

        let (flag, validation_event) = {
            let mut state = self.write();
            let flag = patch.apply(state.flags.get(key), now);
            state.flags.insert(key.to_string(), flag.clone());
            (flag, Self::revalidate(&mut state, now))
        };

        metrics::counter!("flag_updates_total").increment(1);
        tracing::info!(
            version = %flag.version,
            enabled = flag.enabled,
            fields = ?modified_fields,
            "Feature flag updated"
        );

        self.events.publish(ConfigEvent::FlagUpdated {
            meta: EventMeta::with_timestamp(now),
            key: key.to_string(),
            version: flag.version.clone(),
            modified_fields,
        });
        if let Some(event) = validation_event {
            self.events.publish(event);
        }
        flag
    }

    /// Recomputes validation and returns a `ValidationChanged` event when
    /// validity or the finding counts moved.
    fn revalidate(state: &mut State, now: chrono::DateTime<chrono::Utc>) -> Option<ConfigEvent> {
        let validation = validate_configuration(&state.flags);
        let changed = validation.is_valid != state.validation.is_valid
            || validation.errors.len() != state.validation.errors.len()
            || validation.warnings.len() != state.validation.warnings.len();

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("validation_errors").set(validation.errors.len() as f64);
        if !validation.is_valid {
            tracing::warn!(
                errors = validation.errors.len(),
                critical = validation.critical_count(),
                "Configuration is invalid"
            );
        }

        let event = changed.then(|| ConfigEvent::ValidationChanged {
            meta: EventMeta::with_timestamp(now),
            is_valid: validation.is_valid,
            error_count: validation.errors.len(),
            warning_count: validation.warnings.len(),
        });
        state.validation = validation;
        event
    }

    /// Sets the enabled state.
    pub fn toggle(&self, key: &str, enabled: bool) -> FeatureFlag {
        self.update(key, FlagPatch::new().enabled(enabled))
    }

    /// Replaces the rollout settings.
    pub fn set_rollout(&self, key: &str, rollout: RolloutConfig) -> FeatureFlag {
        self.update(key, FlagPatch::new().rollout(rollout))
    }

    /// Replaces the dependency declaration.
    pub fn set_dependencies(&self, key: &str, dependencies: DependencyConfig) -> FeatureFlag {
        self.update(key, FlagPatch::new().dependencies(dependencies))
    }

    /// Replaces the description.
    pub fn set_description(&self, key: &str, description: impl Into<String>) -> FeatureFlag {
        self.update(key, FlagPatch::new().description(description))
    }

    /// Replaces the category.
    pub fn set_category(&self, key: &str, category: Category) -> FeatureFlag {
        self.update(key, FlagPatch::new().category(category))
    }

    /// Replaces the analytics switches.
    pub fn set_analytics(&self, key: &str, analytics: AnalyticsSettings) -> FeatureFlag {
        self.update(key, FlagPatch::new().analytics(analytics))
    }

    /// Replaces the environment scoping.
    pub fn set_environment(&self, key: &str, environment: EnvironmentConfig) -> FeatureFlag {
        self.update(key, FlagPatch::new().environment(environment))
    }

    /// Sets a per-user override on the flag.
    pub fn set_user_override(&self, key: &str, value: bool) -> FeatureFlag {
        self.update(key, FlagPatch::new().user_override(value))
    }

    /// Records an administrator override, keeping other admin settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when `key` does not exist.
    pub fn set_admin_override(
        &self,
        key: &str,
        enabled: bool,
        admin_user_id: impl Into<String>,
    ) -> Result<FeatureFlag> {
        let current = self.get(key).ok_or_else(|| Error::NotFound(key.to_string()))?;
        let admin = AdminConfig {
            admin_override: true,
            admin_user_id: Some(admin_user_id.into()),
            ..current.admin.unwrap_or_default()
        };
        Ok(self.update(key, FlagPatch::new().enabled(enabled).admin(admin)))
    }

    /// Restores `enabled` to `default_value` and clears the user override.
    ///
    /// Reset is a restore, not an edit: the version and modification time are
    /// left alone, so resetting twice is the same as resetting once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when `key` does not exist.
    #[instrument(skip(self), fields(key = %key))]
    pub fn reset(&self, key: &str) -> Result<FeatureFlag> {
        let now = self.clock.now();
        let (flag, validation_event) = {
            let mut state = self.write();
            let flag = state
                .flags
                .get_mut(key)
                .ok_or_else(|| Error::NotFound(key.to_string()))?;
            flag.reset();
            let flag = flag.clone();
            (flag, Self::revalidate(&mut state, now))
        };

        tracing::info!(enabled = flag.enabled, "Feature flag reset");
        self.events.publish(ConfigEvent::FlagReset {
            meta: EventMeta::with_timestamp(now),
            key: key.to_string(),
        });
        if let Some(event) = validation_event {
            self.events.publish(event);
        }
        Ok(flag)
    }

    /// Enables every flag.
    pub fn enable_all(&self) {
        self.set_all(true);
    }

    /// Disables every flag.
    pub fn disable_all(&self) {
        self.set_all(false);
    }

    fn set_all(&self, enabled: bool) {
        for key in self.keys() {
            self.toggle(&key, enabled);
        }
    }

    /// Resets every flag.
    pub fn reset_all(&self) {
        for key in self.keys() {
            if let Err(e) = self.reset(&key) {
                tracing::debug!(key = %key, error = %e, "Flag vanished during reset_all");
            }
        }
    }

    /// Returns a copy of the flag at `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<FeatureFlag> {
        self.read().flags.get(key).cloned()
    }

    /// Returns all flag keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.read().flags.keys().cloned().collect()
    }

    /// Number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().flags.len()
    }

    /// Returns true when no flags are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().flags.is_empty()
    }

    /// Returns the effective state of `key`; unknown keys are disabled.
    #[must_use]
    pub fn is_enabled(&self, key: &str) -> bool {
        self.read().flags.get(key).is_some_and(FeatureFlag::is_enabled)
    }

    /// Decides whether `user_id` is inside the rollout of `key`.
    ///
    /// Flags without a rollout (and unknown keys) are never rolled out.
    #[must_use]
    pub fn is_rolled_out(&self, key: &str, user_id: Option<&str>) -> bool {
        let Some(rollout) = self.read().flags.get(key).and_then(|f| f.rollout.clone()) else {
            return false;
        };
        is_user_in_rollout(&rollout, key, user_id, self.clock.now(), self.strategy)
    }

    /// Effective rollout percentage of `key` right now.
    #[must_use]
    pub fn rollout_percentage(&self, key: &str) -> Option<f64> {
        let now = self.clock.now();
        self.read()
            .flags
            .get(key)
            .and_then(|f| f.rollout.as_ref())
            .map(|rollout| calculate_rollout_percentage(rollout, now))
    }

    /// Schedule position of the rollout of `key` right now.
    #[must_use]
    pub fn rollout_status(&self, key: &str) -> Option<RolloutStatus> {
        let now = self.clock.now();
        self.read()
            .flags
            .get(key)
            .and_then(|f| f.rollout.as_ref())
            .map(|rollout| rollout_status(rollout, now))
    }

    /// Returns a copy of the whole configuration.
    #[must_use]
    pub fn export_all(&self) -> FeatureMap {
        self.read().flags.clone()
    }

    /// Replaces the whole configuration if it validates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] and keeps the current state when
    /// the incoming configuration has any blocking error.
    #[instrument(skip(self, config), fields(flags = config.len()))]
    pub fn import_all(&self, config: FeatureMap) -> Result<()> {
        let validation = validate_configuration(&config);
        if !validation.is_valid {
            metrics::counter!("flag_import_rejected_total").increment(1);
            tracing::warn!(errors = validation.errors.len(), "Rejected invalid configuration import");
            return Err(Error::InvalidConfiguration {
                errors: validation.errors,
            });
        }

        let now = self.clock.now();
        let flag_count = config.len();
        let event = ConfigEvent::ValidationChanged {
            meta: EventMeta::with_timestamp(now),
            is_valid: validation.is_valid,
            error_count: validation.errors.len(),
            warning_count: validation.warnings.len(),
        };
        let validity_changed = {
            let mut state = self.write();
            let changed = state.validation != validation;
            state.flags = config;
            state.validation = validation;
            changed
        };

        metrics::counter!("flag_imports_total").increment(1);
        metrics::gauge!("validation_errors").set(0.0);
        tracing::info!(flag_count, "Configuration imported");
        self.events.publish(ConfigEvent::ConfigurationImported {
            meta: EventMeta::with_timestamp(now),
            flag_count,
        });
        if validity_changed {
            self.events.publish(event);
        }
        Ok(())
    }

    /// Imports a JSON document mapping flag keys to flags.
    ///
    /// The raw document is schema-checked before typed deserialization, so
    /// missing fields and wrong types are reported as validation errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for malformed JSON and
    /// [`Error::InvalidConfiguration`] for documents that fail validation.
    pub fn import_json(&self, json: &str) -> Result<usize> {
        let document: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("malformed configuration JSON: {e}")))?;

        let validation = validate_document(&document);
        if !validation.is_valid {
            metrics::counter!("flag_import_rejected_total").increment(1);
            return Err(Error::InvalidConfiguration {
                errors: validation.errors,
            });
        }

        let config: FeatureMap = serde_json::from_value(document)
            .map_err(|e| Error::InvalidInput(format!("configuration does not deserialize: {e}")))?;
        let count = config.len();
        self.import_all(config)?;
        Ok(count)
    }

    /// Serializes the configuration as pretty JSON with camelCase keys.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.read().flags).map_err(|e| Error::OperationFailed {
            operation: "export_json".to_string(),
            cause: e.to_string(),
        })
    }

    /// Returns the retained validation result.
    #[must_use]
    pub fn validation(&self) -> ValidationResult {
        self.read().validation.clone()
    }

    /// Returns counts from the retained validation result.
    #[must_use]
    pub fn validation_summary(&self) -> ValidationSummary {
        ValidationSummary::from(&self.read().validation)
    }

    /// Checks the dependencies of `key` against the current configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when `key` does not exist.
    pub fn dependency_issues(&self, key: &str) -> Result<Vec<ValidationError>> {
        let state = self.read();
        let flag = state
            .flags
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        Ok(flag
            .dependencies
            .as_ref()
            .map(|deps| check_dependencies(key, deps, &state.flags))
            .unwrap_or_default())
    }

    /// Returns the flags usable in `environment`: those without an
    /// environment map, or whose map enables it.
    #[must_use]
    pub fn environment_features(&self, environment: Environment) -> FeatureMap {
        self.read()
            .flags
            .iter()
            .filter(|(_, flag)| flag.environment.is_none_or(|env| env.allows(environment)))
            .map(|(key, flag)| (key.clone(), flag.clone()))
            .collect()
    }

    /// Warns about flags disabled for `environment`.
    #[must_use]
    pub fn validate_environment(&self, environment: Environment) -> ValidationResult {
        validate_environment_constraints(&self.read().flags, environment)
    }

    /// Aggregate counts over the configuration.
    #[must_use]
    pub fn statistics(&self) -> FeatureStatistics {
        FeatureStatistics::from_map(&self.read().flags)
    }

    /// Runs `query` over the configuration.
    #[must_use]
    pub fn query(&self, query: &FeatureQuery) -> Vec<(String, FeatureFlag)> {
        let state = self.read();
        query
            .apply(&state.flags)
            .into_iter()
            .map(|(key, flag)| (key.to_string(), flag.clone()))
            .collect()
    }

    /// Returns true when the configuration differs from `snapshot` in its
    /// key set or any flag's switches.
    #[must_use]
    pub fn has_changed_since(&self, snapshot: &FeatureMap) -> bool {
        has_flags_changed(snapshot, &self.read().flags)
    }

    /// Subscribes to configuration change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }

    /// Subscribes to updates and resets of one flag.
    #[must_use]
    pub fn watch(&self, key: &str) -> ConfigEventReceiver {
        self.events.subscribe_to(EventFilter::Flag(key.to_string()))
    }

    /// Subscribes to changes of the retained validation result.
    #[must_use]
    pub fn validation_changes(&self) -> ConfigEventReceiver {
        self.events.subscribe_to(EventFilter::Type("validation.changed"))
    }

    /// Returns the event bus feeding [`Self::subscribe`].
    #[must_use]
    pub const fn event_bus(&self) -> &EventBus {
        &self.events
    }
}
