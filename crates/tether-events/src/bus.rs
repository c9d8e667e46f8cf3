//! The event bus.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};

use crate::event::TetherEvent;
use crate::subscriber::SubscriberRegistry;

/// How many events a slow receiver may fall behind before it starts
/// skipping.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Fan-out for [`TetherEvent`]s.
///
/// Each event goes to every [`EventReceiver`] through a broadcast channel,
/// then to the synchronous [`SubscriberRegistry`] on the publishing thread.
/// Both see events in publish order. Clones share the channel and the
/// registry.
///
/// A synchronous subscriber that stores a clone of its own bus keeps the
/// registry alive forever.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<TetherEvent>>,
    registry: Arc<SubscriberRegistry>,
}

impl EventBus {
    /// A bus with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A bus whose receivers may lag by at most `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            registry: Arc::new(SubscriberRegistry::new()),
        }
    }

    /// Publish `event`. Returns how many receivers it was queued for.
    pub fn publish(&self, event: TetherEvent) -> usize {
        let event = Arc::new(event);
        let queued = self.sender.send(Arc::clone(&event)).unwrap_or(0);
        trace!(event_type = event.event_type(), queued, "event published");
        self.registry.notify(&event);
        queued
    }

    /// Receive every event.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            event_type: None,
        }
    }

    /// Receive only events whose [`TetherEvent::event_type`] is `event_type`.
    #[must_use]
    pub fn subscribe_type(&self, event_type: &'static str) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            event_type: Some(event_type),
        }
    }

    /// Synchronous subscribers.
    #[must_use]
    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Receivers plus synchronous subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .receiver_count()
            .saturating_add(self.registry.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// An async subscription, optionally filtered by event type.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<TetherEvent>>,
    event_type: Option<&'static str>,
}

impl EventReceiver {
    fn wants(&self, event: &TetherEvent) -> bool {
        self.event_type.is_none_or(|ty| event.event_type() == ty)
    }

    /// Wait for the next matching event. `None` once every bus clone is
    /// gone.
    ///
    /// A receiver that lagged skips what it missed and carries on.
    pub async fn recv(&mut self) -> Option<Arc<TetherEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => {},
                Err(RecvError::Lagged(missed)) => warn!(missed, "event receiver lagged"),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The next matching event already queued, if any.
    pub fn try_recv(&mut self) -> Option<Arc<TetherEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => {},
                Err(TryRecvError::Lagged(missed)) => warn!(missed, "event receiver lagged"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventMetadata, StoreSource};
    use crate::subscriber::FnSubscriber;
    use std::sync::Mutex;

    fn locale(locale: &str) -> TetherEvent {
        TetherEvent::LocaleChanged {
            metadata: EventMetadata::new("test"),
            locale: locale.to_string(),
        }
    }

    fn locale_of(event: &TetherEvent) -> &str {
        match event {
            TetherEvent::LocaleChanged { locale, .. } => locale,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(locale("de")), 0);
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        assert_eq!(bus.publish(locale("a")), 1);
        bus.publish(locale("b"));

        assert_eq!(locale_of(&receiver.recv().await.unwrap()), "a");
        assert_eq!(locale_of(&receiver.recv().await.unwrap()), "b");
    }

    #[tokio::test]
    async fn test_typed_subscription_skips_other_events() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe_type("store_resolved");

        bus.publish(locale("de"));
        assert!(receiver.try_recv().is_none());

        bus.publish(TetherEvent::StoreResolved {
            metadata: EventMetadata::new("test"),
            source: StoreSource::Dom,
        });
        assert!(receiver.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_lagged_receiver_keeps_newest() {
        let bus = EventBus::with_capacity(2);
        let mut receiver = bus.subscribe();
        for l in ["a", "b", "c", "d"] {
            bus.publish(locale(l));
        }

        assert_eq!(locale_of(&receiver.try_recv().unwrap()), "c");
        assert_eq!(locale_of(&receiver.try_recv().unwrap()), "d");
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_recv_ends_when_bus_dropped() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        drop(bus);
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn test_clones_share_synchronous_subscribers() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.clone()
            .registry()
            .register(Arc::new(FnSubscriber::new("locale", move |event| {
                sink.lock().unwrap().push(locale_of(event).to_string());
            })));

        bus.publish(locale("fr"));
        assert_eq!(*seen.lock().unwrap(), vec!["fr".to_string()]);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
