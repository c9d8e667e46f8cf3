//! Synchronous subscribers.
//!
//! A subscriber runs on the publishing thread, before `publish` returns.
//! The translator uses this to switch locale before anything else observes
//! the change; everything else should prefer an [`EventReceiver`].
//!
//! [`EventReceiver`]: crate::EventReceiver

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace, warn};

use crate::event::TetherEvent;

/// A synchronous event handler.
pub trait EventSubscriber: Send + Sync {
    /// Handle `event`. Must return quickly.
    fn on_event(&self, event: &TetherEvent);

    /// Whether `event` should be delivered at all.
    fn accepts(&self, event: &TetherEvent) -> bool {
        let _ = event;
        true
    }

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Handle returned by [`SubscriberRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// Subscribers notified in registration order.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriberId, Arc<dyn EventSubscriber>)>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish_non_exhaustive()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `subscriber` after every existing one.
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(subscriber = subscriber.name(), ?id, "subscriber registered");
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));
        id
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        let removed = subscribers.len() != before;
        if removed {
            debug!(?id, "subscriber unregistered");
        }
        removed
    }

    /// Deliver `event` to every accepting subscriber.
    ///
    /// Works on a snapshot, so handlers may register or unregister. A
    /// panicking handler is logged and skipped.
    pub fn notify(&self, event: &TetherEvent) {
        let snapshot: Vec<Arc<dyn EventSubscriber>> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, subscriber)| Arc::clone(subscriber))
            .collect();

        for subscriber in snapshot.iter().filter(|s| s.accepts(event)) {
            trace!(subscriber = subscriber.name(), event_type = event.event_type(), "notify");
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscriber.on_event(event);
            }));
            if outcome.is_err() {
                warn!(
                    subscriber = subscriber.name(),
                    event_type = event.event_type(),
                    "subscriber panicked"
                );
            }
        }
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A closure subscriber, optionally limited to one event type.
pub struct FnSubscriber<F> {
    name: String,
    event_type: Option<&'static str>,
    handler: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&TetherEvent) + Send + Sync,
{
    /// Subscribe `handler` to every event.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            event_type: None,
            handler,
        }
    }

    /// Only deliver events whose [`TetherEvent::event_type`] is `event_type`.
    #[must_use]
    pub fn only(mut self, event_type: &'static str) -> Self {
        self.event_type = Some(event_type);
        self
    }
}

impl<F> EventSubscriber for FnSubscriber<F>
where
    F: Fn(&TetherEvent) + Send + Sync,
{
    fn on_event(&self, event: &TetherEvent) {
        (self.handler)(event);
    }

    fn accepts(&self, event: &TetherEvent) -> bool {
        self.event_type.is_none_or(|ty| event.event_type() == ty)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
