//! Business logic services.
//!
//! The configuration manager owns the flag map; rollout and management
//! helpers are pure functions over flags that it and the CLI share.

mod configuration;
pub mod management;
pub mod rollout;

pub use configuration::ConfigurationManager;
pub use management::{
    FeatureQuery, FeatureStatistics, SortDirection, SortField, ValidationSummary,
};
pub use rollout::{
    DEFAULT_ROLLOUT_DURATION, RolloutStatus, RolloutStrategy, calculate_rollout_percentage,
    is_user_in_rollout, rollout_status, stable_bucket,
};
