//! Block-editor discovery.
//!
//! The host never exposes its block-editor instance, but the UI registers a
//! listener on the engine's `EXTENSION_ADDED` event slot that is bound to a
//! context holding it. Invoking that listener with the call-forwarding
//! primitive overridden hands back the bound context without running the
//! listener; the object locator then finds the editor inside it.
//!
//! When the slot does not exist yet, the trap installs an accessor on it and
//! retries the extraction the moment the host assigns it.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use tether_core::{
    Accessor, CaptureContext, EngineVm, HostFunction, HostValue, ObjectRef, Realm,
};
use tether_events::{EventBus, EventMetadata, TetherEvent};
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::config::DiscoveryConfig;
use crate::error::{TrapError, TrapResult};
use crate::handle::TrapHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unresolved,
    Waiting,
    Resolved,
}

/// Locates the host's block-editor instance.
///
/// Resolution is cached for the life of the trap. Concurrent requests made
/// before the host has wired its listener share one pending resolution.
pub struct BlockEditorTrap {
    realm: Arc<Realm>,
    engine: Arc<dyn EngineVm>,
    config: DiscoveryConfig,
    bus: Option<EventBus>,
    phase: Mutex<Phase>,
    interceptor: Mutex<Option<Arc<ListenerSlotInterceptor>>>,
    resolved: watch::Sender<Option<TrapHandle>>,
}

impl BlockEditorTrap {
    /// Create an unresolved trap.
    #[must_use]
    pub fn new(realm: Arc<Realm>, engine: Arc<dyn EngineVm>, config: DiscoveryConfig) -> Self {
        let (resolved, _) = watch::channel(None);
        Self {
            realm,
            engine,
            config,
            bus: None,
            phase: Mutex::new(Phase::Unresolved),
            interceptor: Mutex::new(None),
            resolved,
        }
    }

    /// Publish [`TetherEvent::BlockEditorResolved`] on `bus` when resolved.
    #[must_use]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The cached handle, if already resolved.
    #[must_use]
    pub fn eager(&self) -> Option<TrapHandle> {
        self.resolved.borrow().clone()
    }

    /// Whether the trap is waiting for the host to assign the listener slot.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) == Phase::Waiting
    }

    /// Resolve the block-editor instance, waiting for the host if needed.
    ///
    /// # Errors
    ///
    /// Returns [`TrapError::Closed`] if the trap is torn down while waiting.
    pub async fn get(self: &Arc<Self>) -> TrapResult<TrapHandle> {
        let mut receiver = self.resolved.subscribe();
        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            match *phase {
                Phase::Resolved => {
                    if let Some(handle) = self.eager() {
                        return Ok(handle);
                    }
                },
                Phase::Waiting => trace!("joining pending block-editor resolution"),
                Phase::Unresolved => {
                    let listeners = self.events().get(&self.config.extension_added_event);
                    if let Some(handle) = self.extract(&listeners) {
                        self.resolve(&mut phase, handle.clone());
                        return Ok(handle);
                    }
                    self.install_interceptor(listeners);
                    *phase = Phase::Waiting;
                },
            }
        }

        let handle = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| TrapError::Closed)?
            .clone();
        handle.ok_or(TrapError::Closed)
    }

    /// Forget the cached handle and remove any installed interceptor,
    /// turning the slot back into a plain data property.
    pub fn reset(&self) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(interceptor) = self
            .interceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            interceptor.detach();
        }
        *phase = Phase::Unresolved;
        self.resolved.send_replace(None);
        debug!("block-editor trap reset");
    }

    fn events(&self) -> ObjectRef {
        self.engine.events()
    }

    fn resolve(&self, phase: &mut Phase, handle: TrapHandle) {
        *phase = Phase::Resolved;
        self.resolved.send_replace(Some(handle));
        info!(member = %self.config.block_editor_member, "block-editor instance located");
        if let Some(bus) = &self.bus {
            bus.publish(TetherEvent::BlockEditorResolved {
                metadata: EventMetadata::new("block_editor_trap"),
            });
        }
    }

    /// Run the extraction against the value stored in the listener slot.
    fn extract(&self, listeners: &HostValue) -> Option<TrapHandle> {
        let candidates: Vec<HostFunction> = match listeners {
            HostValue::Function(listener) => vec![listener.clone()],
            HostValue::Object(list) if list.is_array() => list
                .data_entries()
                .into_iter()
                .filter_map(|(_, value)| value.as_function().cloned())
                .collect(),
            _ => return None,
        };

        let member = self.config.block_editor_member.as_str();
        let locator = self.config.locator();
        for listener in candidates {
            let context = self
                .realm
                .with_forwarder(Arc::new(CaptureContext), |realm| realm.invoke(&listener, &[]));
            let context = match context {
                Ok(context) => context,
                Err(e) => {
                    debug!(listener = listener.name(), error = %e, "listener interception failed");
                    continue;
                },
            };
            if let Some(holder) = locator.find(&context, |o| o.has_own(member))
                && let HostValue::Object(editor) = holder.get(member)
            {
                return Some(TrapHandle::new(&editor));
            }
            trace!(listener = listener.name(), "listener context has no block editor");
        }
        None
    }

    fn install_interceptor(self: &Arc<Self>, current: HostValue) {
        let mut slot = self
            .interceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let interceptor = Arc::new(ListenerSlotInterceptor {
            trap: Arc::downgrade(self),
            events: self.events(),
            key: self.config.extension_added_event.clone(),
            stored: Mutex::new(current),
        });
        interceptor
            .events
            .define_accessor(&interceptor.key, Arc::clone(&interceptor) as Arc<dyn Accessor>);
        *slot = Some(interceptor);
        debug!(slot = %self.config.extension_added_event, "waiting for the host to assign the listener slot");
    }

    fn on_slot_assigned(&self, interceptor: &ListenerSlotInterceptor, value: &HostValue) {
        let Some(handle) = self.extract(value) else {
            trace!("listener slot assigned without a block-editor context");
            return;
        };
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == Phase::Resolved {
            return;
        }
        interceptor.detach();
        self.interceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.resolve(&mut phase, handle);
    }
}

impl std::fmt::Debug for BlockEditorTrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockEditorTrap")
            .field("phase", &*self.phase.lock().unwrap_or_else(PoisonError::into_inner))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Accessor installed on the engine's listener slot while the trap waits.
struct ListenerSlotInterceptor {
    trap: Weak<BlockEditorTrap>,
    events: ObjectRef,
    key: String,
    stored: Mutex<HostValue>,
}

impl ListenerSlotInterceptor {
    /// Turn the slot back into a plain writable property holding the last
    /// assigned value.
    fn detach(&self) {
        let value = self
            .stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if self.events.is_accessor(&self.key) {
            if value.is_nullish() {
                self.events.delete(&self.key);
            } else {
                self.events.define_value(&self.key, value, true);
            }
        }
    }
}

impl Accessor for ListenerSlotInterceptor {
    fn get(&self) -> HostValue {
        self.stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, value: HostValue) {
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = value.clone();
        if let Some(trap) = self.trap.upgrade() {
            trap.on_slot_assigned(self, &value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::StaticDocument;

    struct Engine {
        events: ObjectRef,
    }

    impl EngineVm for Engine {
        fn locale(&self) -> String {
            "en".to_string()
        }
        fn events(&self) -> ObjectRef {
            self.events.clone()
        }
        fn editing_target_id(&self) -> Option<String> {
            None
        }
    }

    fn setup() -> (Arc<BlockEditorTrap>, ObjectRef) {
        let realm = Arc::new(Realm::new(Arc::new(StaticDocument::new("https://host.example/"))));
        let events = ObjectRef::new();
        let engine = Arc::new(Engine {
            events: events.clone(),
        });
        let trap = Arc::new(BlockEditorTrap::new(realm, engine, DiscoveryConfig::default()));
        (trap, events)
    }

    /// A listener bound to a UI context that holds the editor two levels down.
    fn bound_listener(editor: &ObjectRef) -> HostValue {
        let holder = ObjectRef::new();
        holder.set("ScratchBlocks", HostValue::Object(editor.clone()));
        let context = ObjectRef::new();
        context.set("props", HostValue::Object(holder));
        HostValue::Function(
            HostFunction::new("handleExtensionAdded", |_, _| {
                panic!("listener body must not run during extraction")
            })
            .bind(HostValue::Object(context)),
        )
    }

    #[tokio::test]
    async fn test_resolves_immediately_when_listener_present() {
        let (trap, events) = setup();
        let editor = ObjectRef::new();
        events.set("EXTENSION_ADDED", bound_listener(&editor));

        let handle = trap.get().await.unwrap();
        assert!(handle.get().unwrap().ptr_eq(&editor));
        assert_eq!(trap.eager(), Some(handle));
    }

    #[tokio::test]
    async fn test_searches_listener_arrays() {
        let (trap, events) = setup();
        let editor = ObjectRef::new();
        let unrelated = HostValue::Function(
            HostFunction::new("other", |_, _| Ok(HostValue::Undefined))
                .bind(HostValue::Object(ObjectRef::new())),
        );
        events.set(
            "EXTENSION_ADDED",
            HostValue::Object(ObjectRef::array(vec![unrelated, bound_listener(&editor)])),
        );

        let handle = trap.get().await.unwrap();
        assert!(handle.get().unwrap().ptr_eq(&editor));
    }

    #[tokio::test]
    async fn test_waits_for_slot_assignment() {
        let (trap, events) = setup();
        assert!(trap.eager().is_none());

        let first = tokio::spawn({
            let trap = Arc::clone(&trap);
            async move { trap.get().await }
        });
        let second = tokio::spawn({
            let trap = Arc::clone(&trap);
            async move { trap.get().await }
        });

        // Let both requests reach the pending state.
        while !trap.is_waiting() {
            tokio::task::yield_now().await;
        }
        assert!(events.is_accessor("EXTENSION_ADDED"));

        let editor = ObjectRef::new();
        let listener = bound_listener(&editor);
        events.set("EXTENSION_ADDED", listener.clone());

        let a = first.await.unwrap().unwrap();
        let b = second.await.unwrap().unwrap();
        assert_eq!(a, b);
        assert!(a.get().unwrap().ptr_eq(&editor));

        // The slot is a plain data property again, holding the host's value.
        assert!(!events.is_accessor("EXTENSION_ADDED"));
        assert_eq!(events.get("EXTENSION_ADDED"), listener);
    }

    #[tokio::test]
    async fn test_unrelated_assignment_keeps_waiting() {
        let (trap, events) = setup();
        let pending = tokio::spawn({
            let trap = Arc::clone(&trap);
            async move { trap.get().await }
        });
        while !trap.is_waiting() {
            tokio::task::yield_now().await;
        }

        events.set("EXTENSION_ADDED", HostValue::Null);
        assert!(events.is_accessor("EXTENSION_ADDED"));
        assert!(trap.eager().is_none());

        let editor = ObjectRef::new();
        events.set("EXTENSION_ADDED", bound_listener(&editor));
        assert!(pending.await.unwrap().unwrap().get().unwrap().ptr_eq(&editor));
    }

    #[tokio::test]
    async fn test_handle_is_weak() {
        let (trap, events) = setup();
        let editor = ObjectRef::new();
        events.set("EXTENSION_ADDED", bound_listener(&editor));
        let handle = trap.get().await.unwrap();

        events.delete("EXTENSION_ADDED");
        drop(editor);
        assert!(handle.is_released());
    }

    #[tokio::test]
    async fn test_reset_removes_interceptor() {
        let (trap, events) = setup();
        let pending = tokio::spawn({
            let trap = Arc::clone(&trap);
            async move { trap.get().await }
        });
        while !trap.is_waiting() {
            tokio::task::yield_now().await;
        }
        trap.reset();
        assert!(!events.has_own("EXTENSION_ADDED"));
        pending.abort();
    }
}
