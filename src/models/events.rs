//! Configuration change events for subscribers.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Shared event metadata.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// When the change was applied.
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    /// Creates event metadata stamped with `timestamp`.
    #[must_use]
    pub fn with_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp,
        }
    }
}

/// Events emitted by the configuration manager.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// A flag was created or updated.
    FlagUpdated {
        /// Event metadata.
        meta: EventMeta,
        /// Flag key.
        key: String,
        /// Version after the update.
        version: String,
        /// Fields that were written.
        modified_fields: Vec<&'static str>,
    },
    /// A flag was reset to its default.
    FlagReset {
        /// Event metadata.
        meta: EventMeta,
        /// Flag key.
        key: String,
    },
    /// The whole configuration was replaced by an import.
    ConfigurationImported {
        /// Event metadata.
        meta: EventMeta,
        /// Number of flags in the imported configuration.
        flag_count: usize,
    },
    /// The retained validation result changed validity.
    ValidationChanged {
        /// Event metadata.
        meta: EventMeta,
        /// Whether the configuration is now valid.
        is_valid: bool,
        /// Number of blocking errors.
        error_count: usize,
        /// Number of warnings.
        warning_count: usize,
    },
}

impl ConfigEvent {
    /// Returns the event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::FlagUpdated { .. } => "flag.updated",
            Self::FlagReset { .. } => "flag.reset",
            Self::ConfigurationImported { .. } => "configuration.imported",
            Self::ValidationChanged { .. } => "validation.changed",
        }
    }

    /// Returns the flag key for per-flag events.
    #[must_use]
    pub fn flag_key(&self) -> Option<&str> {
        match self {
            Self::FlagUpdated { key, .. } | Self::FlagReset { key, .. } => Some(key),
            Self::ConfigurationImported { .. } | Self::ValidationChanged { .. } => None,
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::FlagUpdated { meta, .. }
            | Self::FlagReset { meta, .. }
            | Self::ConfigurationImported { meta, .. }
            | Self::ValidationChanged { meta, .. } => meta,
        }
    }
}
