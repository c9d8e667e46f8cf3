//! Prepared extension metadata, in the shape the host engine consumes.
//!
//! Raw descriptors come from `get_info()` as loose JSON. Preparation (see
//! [`crate::Normalizer`]) turns them into these types, where every callable
//! block carries a [`BlockHandler`] and every dynamic menu a
//! [`MenuProducer`]. [`PreparedDescriptor::manifest`] renders the result
//! back to JSON with handlers replaced by method names.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tether_core::{BlockType, ExtensionObject, MethodLookup};
use tracing::{error, warn};

use crate::error::{ExtensionError, ExtensionResult};

/// Marker string for a flyout separator.
pub const SEPARATOR: &str = "---";

// ---------------------------------------------------------------------------
// Block handlers
// ---------------------------------------------------------------------------

/// How a block function obtains the block info passed to the extension.
#[derive(Clone)]
pub(crate) enum BlockInfoSource {
    /// The info prepared at registration.
    Static(Arc<Value>),
    /// `args.mutation.blockInfo`, read on every call.
    Dynamic,
}

/// Wrapper the engine calls to run a block.
///
/// The extension method is looked up by name on every call, so methods
/// added after registration are found.
#[derive(Clone)]
pub struct BlockFunction {
    extension: Arc<dyn ExtensionObject>,
    method: String,
    info: BlockInfoSource,
}

impl BlockFunction {
    pub(crate) fn new(
        extension: Arc<dyn ExtensionObject>,
        method: impl Into<String>,
        info: BlockInfoSource,
    ) -> Self {
        Self {
            extension,
            method: method.into(),
            info,
        }
    }

    /// Name of the extension method this block runs.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Whether the block info comes from the call's mutation.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self.info, BlockInfoSource::Dynamic)
    }

    /// Run the block, propagating failures.
    ///
    /// The extension method receives `[args, util, block_info]`.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::MethodMissing`] when the method does not exist at
    /// call time, [`ExtensionError::MethodFailed`] when it fails.
    pub fn try_call(&self, args: &Value, util: &Value) -> ExtensionResult<Value> {
        let block_info = match &self.info {
            BlockInfoSource::Static(info) => Value::clone(info),
            BlockInfoSource::Dynamic => args
                .pointer("/mutation/blockInfo")
                .cloned()
                .unwrap_or(Value::Null),
        };
        call_method(
            self.extension.as_ref(),
            &self.method,
            &[args.clone(), util.clone(), block_info],
        )
    }

    /// Run the block as the engine does: failures are logged and the block
    /// reports `null`.
    #[must_use]
    pub fn call(&self, args: &Value, util: &Value) -> Value {
        self.try_call(args, util).unwrap_or_else(|e| {
            error!(method = %self.method, error = %e, "block function failed");
            Value::Null
        })
    }
}

impl fmt::Debug for BlockFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockFunction")
            .field("method", &self.method)
            .field("dynamic", &self.is_dynamic())
            .finish_non_exhaustive()
    }
}

/// Zero-argument callback behind a flyout button.
#[derive(Clone)]
pub struct ButtonCallback {
    extension: Arc<dyn ExtensionObject>,
    method: String,
}

impl ButtonCallback {
    pub(crate) fn new(extension: Arc<dyn ExtensionObject>, method: impl Into<String>) -> Self {
        Self {
            extension,
            method: method.into(),
        }
    }

    /// Name of the extension method the button invokes.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Invoke the button. Failures propagate to the host.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::MethodMissing`] or [`ExtensionError::MethodFailed`].
    pub fn call(&self) -> ExtensionResult<Value> {
        call_method(self.extension.as_ref(), &self.method, &[])
    }
}

impl fmt::Debug for ButtonCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ButtonCallback")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// What the engine runs for a block.
#[derive(Debug, Clone)]
pub enum BlockHandler {
    /// Callable block.
    Function(BlockFunction),
    /// Button handled by the host itself (`MAKE_A_LIST`, ...).
    Predefined(String),
    /// Button handled by the extension.
    Button(ButtonCallback),
}

fn call_method(extension: &dyn ExtensionObject, method: &str, args: &[Value]) -> ExtensionResult<Value> {
    match extension.method(method) {
        MethodLookup::Callable(callable) => {
            callable
                .call(args)
                .map_err(|e| ExtensionError::MethodFailed {
                    method: method.to_owned(),
                    message: format!("{e:#}"),
                })
        },
        MethodLookup::Missing => {
            warn!(method, "extension function not found at call time");
            Err(ExtensionError::MethodMissing(method.to_owned()))
        },
    }
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// A prepared, non-separator block.
#[derive(Debug, Clone)]
pub struct PreparedBlockInfo {
    /// Full block metadata after defaults and sanitizing. `func`, when
    /// present, holds the method name.
    pub info: Map<String, Value>,
    /// Block shape.
    pub block_type: BlockType,
    /// Runtime handler, if the block has one.
    pub handler: Option<BlockHandler>,
}

impl PreparedBlockInfo {
    /// Sanitized opcode.
    #[must_use]
    pub fn opcode(&self) -> Option<&str> {
        self.info.get("opcode").and_then(Value::as_str)
    }

    /// Block text (defaults to the opcode).
    #[must_use]
    pub fn text(&self) -> &Value {
        self.info.get("text").unwrap_or(&Value::Null)
    }

    /// Method name the block or button dispatches to.
    #[must_use]
    pub fn func(&self) -> Option<&str> {
        self.info.get("func").and_then(Value::as_str)
    }
}

/// One entry of a prepared block list.
#[derive(Debug, Clone)]
pub enum PreparedBlock {
    /// `"---"`.
    Separator,
    /// A block, label, button or XML entry.
    Block(Box<PreparedBlockInfo>),
}

impl PreparedBlock {
    /// The block, unless this is a separator.
    #[must_use]
    pub fn as_block(&self) -> Option<&PreparedBlockInfo> {
        match self {
            Self::Separator => None,
            Self::Block(block) => Some(block),
        }
    }

    fn manifest(&self) -> Value {
        match self {
            Self::Separator => Value::from(SEPARATOR),
            Self::Block(block) => Value::Object(block.info.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Menus
// ---------------------------------------------------------------------------

/// A resolved menu entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    /// Display text.
    pub text: String,
    /// Value the block receives.
    pub value: Value,
}

impl MenuItem {
    /// `[text, value]`, the engine's pair form.
    #[must_use]
    pub fn to_pair(&self) -> Value {
        Value::Array(vec![Value::from(self.text.clone()), self.value.clone()])
    }
}

type ProducerBody = dyn Fn() -> ExtensionResult<Vec<MenuItem>> + Send + Sync;

/// Bound producer for a dynamic menu.
#[derive(Clone)]
pub struct MenuProducer {
    method: String,
    body: Arc<ProducerBody>,
}

impl MenuProducer {
    pub(crate) fn new<F>(method: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> ExtensionResult<Vec<MenuItem>> + Send + Sync + 'static,
    {
        Self {
            method: method.into(),
            body: Arc::new(body),
        }
    }

    /// Producer method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Produce the items for the target currently being edited.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::EmptyMenu`] when the producer yields nothing, or the
    /// producer's own failure.
    pub fn items(&self) -> ExtensionResult<Vec<MenuItem>> {
        (self.body)()
    }
}

impl fmt::Debug for MenuProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuProducer")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// Items of a prepared menu.
#[derive(Debug, Clone)]
pub enum MenuItems {
    /// Items declared inline, kept as given.
    Static(Vec<Value>),
    /// Items produced by an extension method when the menu opens.
    Dynamic(MenuProducer),
}

/// A menu in object form.
#[derive(Debug, Clone)]
pub struct PreparedMenu {
    /// The items.
    pub items: MenuItems,
    /// Every other menu field (`acceptReporters`, ...).
    pub extra: Map<String, Value>,
}

impl PreparedMenu {
    fn manifest(&self) -> Value {
        let mut out = self.extra.clone();
        let items = match &self.items {
            MenuItems::Static(items) => Value::Array(items.clone()),
            MenuItems::Dynamic(producer) => Value::from(producer.method()),
        };
        out.insert("items".to_owned(), items);
        Value::Object(out)
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// A fully prepared extension descriptor.
#[derive(Debug, Clone)]
pub struct PreparedDescriptor {
    /// Extension id (`^[A-Za-z0-9]+$`).
    pub id: String,
    /// Display name; defaults to the id.
    pub name: Value,
    /// Blocks in declaration order.
    pub blocks: Vec<PreparedBlock>,
    /// Menus by name.
    pub menus: Vec<(String, PreparedMenu)>,
    /// Target types the extension applies to.
    pub target_types: Vec<Value>,
    /// Every other top-level field (`color1`, `blockIconURI`, ...).
    pub extra: Map<String, Value>,
}

impl PreparedDescriptor {
    /// Look a menu up by name.
    #[must_use]
    pub fn menu(&self, name: &str) -> Option<&PreparedMenu> {
        self.menus.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    /// The block with `opcode`.
    #[must_use]
    pub fn block(&self, opcode: &str) -> Option<&PreparedBlockInfo> {
        self.blocks
            .iter()
            .filter_map(PreparedBlock::as_block)
            .find(|b| b.opcode() == Some(opcode))
    }

    /// JSON rendering with handlers replaced by method names.
    ///
    /// Preparing a manifest again yields the same manifest.
    #[must_use]
    pub fn manifest(&self) -> Value {
        let mut out = self.extra.clone();
        out.insert("id".to_owned(), Value::from(self.id.clone()));
        out.insert("name".to_owned(), self.name.clone());
        out.insert(
            "blocks".to_owned(),
            Value::Array(self.blocks.iter().map(PreparedBlock::manifest).collect()),
        );
        out.insert(
            "menus".to_owned(),
            Value::Object(
                self.menus
                    .iter()
                    .map(|(name, menu)| (name.clone(), menu.manifest()))
                    .collect(),
            ),
        );
        out.insert(
            "targetTypes".to_owned(),
            Value::Array(self.target_types.clone()),
        );
        Value::Object(out)
    }
}
