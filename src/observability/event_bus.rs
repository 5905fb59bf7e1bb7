//! Tokio broadcast event bus for configuration change notifications.

use crate::models::ConfigEvent;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

/// Broadcasts [`ConfigEvent`]s to any number of subscribers.
///
/// Publishing never blocks; slow subscribers observe `Lagged` and skip ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConfigEvent>,
}

/// Which events a [`ConfigEventReceiver`] yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Events of one type, e.g. `"validation.changed"`.
    Type(&'static str),
    /// Events about one flag key.
    Flag(String),
}

impl EventFilter {
    /// Returns true when `event` passes the filter.
    #[must_use]
    pub fn matches(&self, event: &ConfigEvent) -> bool {
        match self {
            Self::Type(event_type) => event.event_type() == *event_type,
            Self::Flag(key) => event.flag_key() == Some(key.as_str()),
        }
    }
}

/// Receiver yielding only events that pass an [`EventFilter`].
#[derive(Debug)]
pub struct ConfigEventReceiver {
    receiver: broadcast::Receiver<ConfigEvent>,
    filter: EventFilter,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event; dropped silently when nobody listens.
    pub fn publish(&self, event: ConfigEvent) {
        metrics::counter!("config_events_published_total", "type" => event.event_type())
            .increment(1);
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for configuration event");
        }
    }

    /// Subscribes to all events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.sender.subscribe()
    }

    /// Subscribes to the events passing `filter`.
    #[must_use]
    pub fn subscribe_to(&self, filter: EventFilter) -> ConfigEventReceiver {
        ConfigEventReceiver {
            receiver: self.sender.subscribe(),
            filter,
        }
    }
}

impl ConfigEventReceiver {
    /// The filter applied to incoming events.
    #[must_use]
    pub const fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Waits for the next matching event, skipping ahead after a lag.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Closed` once the bus is dropped.
    pub async fn recv(&mut self) -> Result<ConfigEvent, broadcast::error::RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Configuration event subscriber lagged");
                },
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventMeta;
    use chrono::Utc;

    fn updated(key: &str) -> ConfigEvent {
        ConfigEvent::FlagUpdated {
            meta: EventMeta::with_timestamp(Utc::now()),
            key: key.into(),
            version: "1.0.1".into(),
            modified_fields: vec!["enabled"],
        }
    }

    #[tokio::test]
    async fn test_type_filter_skips_other_types() {
        let bus = EventBus::new(16);
        let mut resets = bus.subscribe_to(EventFilter::Type("flag.reset"));

        bus.publish(updated("a"));
        bus.publish(ConfigEvent::FlagReset {
            meta: EventMeta::with_timestamp(Utc::now()),
            key: "b".into(),
        });

        let event = resets.recv().await.expect("receive event");
        assert_eq!(event.flag_key(), Some("b"));
    }

    #[tokio::test]
    async fn test_flag_filter_skips_other_keys() {
        let bus = EventBus::new(16);
        let mut watcher = bus.subscribe_to(EventFilter::Flag("darkPool".into()));

        bus.publish(updated("optionsFlow"));
        bus.publish(ConfigEvent::ConfigurationImported {
            meta: EventMeta::with_timestamp(Utc::now()),
            flag_count: 2,
        });
        bus.publish(updated("darkPool"));

        let event = watcher.recv().await.expect("receive event");
        assert_eq!(event.event_type(), "flag.updated");
        assert_eq!(event.flag_key(), Some("darkPool"));
    }

    #[tokio::test]
    async fn test_dropped_bus_closes_receiver() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe_to(EventFilter::Type("flag.reset"));
        bus.publish(updated("a"));
        drop(bus);

        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
