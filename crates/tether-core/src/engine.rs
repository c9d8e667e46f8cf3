//! Narrow view of the host's execution engine.

use crate::object::ObjectRef;

/// What Tether needs from the host engine for discovery and localization.
///
/// Primitive registration lives with the extension registry; this trait
/// only covers the parts the traps and the translator read.
pub trait EngineVm: Send + Sync {
    /// The host's current locale (`en`, `zh-cn`, ...).
    fn locale(&self) -> String;

    /// The engine's event-listener table.
    ///
    /// The block-editor trap reads and intercepts the
    /// `EXTENSION_ADDED` slot of this object.
    fn events(&self) -> ObjectRef;

    /// Id of the target currently being edited, falling back to the stage.
    fn editing_target_id(&self) -> Option<String>;
}
