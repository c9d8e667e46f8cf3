//! Tether Events - Event bus for the Tether extension loader.
//!
//! This crate provides:
//! - Event types for store transitions, locale changes and extension loads
//! - Broadcast-based event bus for async subscribers
//! - Subscriber registry for synchronous handlers
//!
//! # Architecture
//!
//! An [`EventBus`] delivers each event twice: to every [`EventReceiver`]
//! (`subscribe` / `subscribe_type`) for async consumers, and to the
//! [`SubscriberRegistry`] on the publishing thread for handlers that must
//! observe the event before `publish` returns.
//!
//! # Example
//!
//! ```rust
//! use tether_events::{EventBus, EventMetadata, TetherEvent};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe();
//!
//! bus.publish(TetherEvent::LocaleChanged {
//!     metadata: EventMetadata::new("engine"),
//!     locale: "de".to_string(),
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "locale_changed");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod event;
mod subscriber;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{EventMetadata, StateChange, StoreSource, TetherEvent};
pub use subscriber::{EventSubscriber, FnSubscriber, SubscriberId, SubscriberRegistry};
