//! Turning raw extension descriptors into [`PreparedDescriptor`]s.
//!
//! Preparation is pure with respect to the raw descriptor: it is read,
//! never modified. A bad id or a non-object descriptor fails the whole
//! registration. A bad block is logged and skipped, and the remaining
//! blocks are still prepared.

use std::sync::Arc;

use serde_json::{Map, Value};
use tether_capabilities::Translator;
use tether_core::{BlockType, Cast, EngineVm, ExtensionObject};
use tracing::{debug, error, warn};

use crate::error::{ExtensionError, ExtensionResult};
use crate::metadata::{
    BlockFunction, BlockHandler, BlockInfoSource, ButtonCallback, MenuItem, MenuItems,
    MenuProducer, PreparedBlock, PreparedBlockInfo, PreparedDescriptor, PreparedMenu, SEPARATOR,
};

/// Button callbacks the host handles itself.
pub const PREDEFINED_CALLBACK_KEYS: [&str; 6] = [
    "MAKE_A_LIST",
    "MAKE_A_PROCEDURE",
    "MAKE_A_VARIABLE",
    "CREATE_LIST",
    "CREATE_PROCEDURE",
    "CREATE_VARIABLE",
];

/// Validate an extension id: non-empty, ASCII letters and digits only.
///
/// # Errors
///
/// Returns [`ExtensionError::InvalidId`] otherwise.
pub fn validate_id(id: &str) -> ExtensionResult<()> {
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ExtensionError::InvalidId(id.to_owned()));
    }
    Ok(())
}

/// Strip `<`, `"` and `&` from an opcode or method name.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(|c| !matches!(c, '<' | '"' | '&')).collect()
}

/// Prepares descriptors for one loaded extension.
///
/// Menu producers capture the engine (for the editing target) and the
/// translator of the extension's surface.
#[derive(Clone)]
pub struct Normalizer {
    vm: Arc<dyn EngineVm>,
    translator: Translator,
}

impl Normalizer {
    /// Create a normalizer.
    #[must_use]
    pub fn new(vm: Arc<dyn EngineVm>, translator: Translator) -> Self {
        Self { vm, translator }
    }

    /// Prepare `raw`, as returned by `extension.get_info()`.
    ///
    /// # Errors
    ///
    /// [`ExtensionError::MalformedDescriptor`] if `raw` is not an object,
    /// [`ExtensionError::InvalidId`] if the id is missing or invalid.
    pub fn prepare(
        &self,
        extension: &Arc<dyn ExtensionObject>,
        raw: &Value,
    ) -> ExtensionResult<PreparedDescriptor> {
        let Some(fields) = raw.as_object() else {
            return Err(ExtensionError::MalformedDescriptor(format!(
                "expected an object, got {raw}"
            )));
        };
        let id = match fields.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => return Err(ExtensionError::InvalidId(other.to_string())),
            None => return Err(ExtensionError::InvalidId(String::new())),
        };
        validate_id(&id)?;

        let name = fields
            .get("name")
            .filter(|n| !n.is_null())
            .cloned()
            .unwrap_or_else(|| Value::from(id.clone()));

        let blocks: Vec<PreparedBlock> = fields
            .get("blocks")
            .and_then(Value::as_array)
            .map(|raw_blocks| {
                raw_blocks
                    .iter()
                    .filter_map(|entry| match prepare_entry(extension, entry) {
                        Ok(block) => Some(block),
                        Err(e) => {
                            error!(extension = %id, error = %e, block = %entry, "error processing block");
                            None
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        let menus = match fields.get("menus") {
            Some(Value::Object(raw_menus)) => self.prepare_menus(extension, &id, raw_menus),
            _ => Vec::new(),
        };

        let target_types = fields
            .get("targetTypes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let extra: Map<String, Value> = fields
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "id" | "name" | "blocks" | "menus" | "targetTypes"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        debug!(extension = %id, blocks = blocks.len(), menus = menus.len(), "prepared descriptor");
        Ok(PreparedDescriptor {
            id,
            name,
            blocks,
            menus,
            target_types,
            extra,
        })
    }

    fn prepare_menus(
        &self,
        extension: &Arc<dyn ExtensionObject>,
        extension_id: &str,
        raw_menus: &Map<String, Value>,
    ) -> Vec<(String, PreparedMenu)> {
        let mut menus = Vec::with_capacity(raw_menus.len());
        for (menu_name, raw) in raw_menus {
            // Shorthand: the menu is its own item list.
            let (items, extra) = match raw {
                Value::Object(fields) if fields.get("items").is_some_and(|i| !i.is_null()) => {
                    let mut extra = fields.clone();
                    let items = extra.remove("items").unwrap_or(Value::Null);
                    (items, extra)
                },
                other => (other.clone(), Map::new()),
            };
            let items = match items {
                Value::Array(list) => MenuItems::Static(list),
                Value::String(method) => MenuItems::Dynamic(self.producer(extension, method)),
                other => {
                    error!(
                        extension = %extension_id,
                        menu = %menu_name,
                        items = %other,
                        "menu items must be a list or a method name"
                    );
                    continue;
                },
            };
            menus.push((menu_name.clone(), PreparedMenu { items, extra }));
        }
        menus
    }

    fn producer(&self, extension: &Arc<dyn ExtensionObject>, method: String) -> MenuProducer {
        if !extension.method(&method).is_callable() {
            warn!(method = %method, "could not find extension menu function");
        }
        let extension = Arc::clone(extension);
        let vm = Arc::clone(&self.vm);
        let translator = self.translator.clone();
        let name = method.clone();
        MenuProducer::new(method, move || {
            let target = vm.editing_target_id().map_or(Value::Null, Value::from);
            let callable = extension
                .method(&name)
                .into_method()
                .ok_or_else(|| ExtensionError::MethodMissing(name.clone()))?;
            let produced = callable
                .call(&[target])
                .map_err(|e| ExtensionError::MethodFailed {
                    method: name.clone(),
                    message: format!("{e:#}"),
                })?;
            let items: Vec<MenuItem> = match produced {
                Value::Array(list) => list
                    .iter()
                    .map(|item| format_menu_item(&translator, item))
                    .collect(),
                _ => Vec::new(),
            };
            if items.is_empty() {
                return Err(ExtensionError::EmptyMenu {
                    method: name.clone(),
                });
            }
            Ok(items)
        })
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("translator", &self.translator)
            .finish_non_exhaustive()
    }
}

fn prepare_entry(
    extension: &Arc<dyn ExtensionObject>,
    entry: &Value,
) -> ExtensionResult<PreparedBlock> {
    match entry {
        Value::String(s) if s == SEPARATOR => Ok(PreparedBlock::Separator),
        Value::Object(raw) => Ok(PreparedBlock::Block(Box::new(prepare_block(extension, raw)?))),
        other => Err(ExtensionError::MalformedDescriptor(format!(
            "block entry is neither an object nor {SEPARATOR:?}: {other}"
        ))),
    }
}

/// Descriptor-field truthiness: `null`, `false`, `0`, `NaN` and `""` are
/// unset. Unlike argument casting, the strings `"0"` and `"false"` count.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n.abs() > 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn prepare_block(
    extension: &Arc<dyn ExtensionObject>,
    raw: &Map<String, Value>,
) -> ExtensionResult<PreparedBlockInfo> {
    let mut info = Map::new();
    info.insert("blockType".to_owned(), Value::from(BlockType::Command.as_str()));
    info.insert("terminal".to_owned(), Value::Bool(false));
    info.insert("blockAllThreads".to_owned(), Value::Bool(false));
    info.insert("arguments".to_owned(), Value::Object(Map::new()));
    for (key, value) in raw {
        info.insert(key.clone(), value.clone());
    }

    let opcode = info
        .get("opcode")
        .filter(|v| is_set(v))
        .map(|v| sanitize(&Cast::to_string(v)));
    match &opcode {
        Some(op) => info.insert("opcode".to_owned(), Value::from(op.clone())),
        None => info.remove("opcode"),
    };
    if !info.get("text").is_some_and(is_set) {
        match &opcode {
            Some(op) => info.insert("text".to_owned(), Value::from(op.clone())),
            None => info.remove("text"),
        };
    }

    let block_type = info
        .get("blockType")
        .and_then(Value::as_str)
        .map_or(BlockType::Command, BlockType::from_wire);
    let func = info
        .get("func")
        .filter(|v| is_set(v))
        .map(Cast::to_string);
    let text = info.get("text").map(Cast::to_string).unwrap_or_default();

    let handler = match block_type {
        BlockType::Event => {
            if let Some(func) = &func {
                warn!(func = %func, opcode = ?opcode, "ignoring function for event block");
            }
            None
        },
        BlockType::Button => match func {
            None => None,
            Some(func) => {
                if let Some(op) = &opcode {
                    warn!(opcode = %op, text = %text, "ignoring opcode for button");
                }
                if PREDEFINED_CALLBACK_KEYS.contains(&func.as_str()) {
                    Some(BlockHandler::Predefined(func))
                } else {
                    warn_if_missing(extension.as_ref(), &func);
                    Some(BlockHandler::Button(ButtonCallback::new(
                        Arc::clone(extension),
                        func,
                    )))
                }
            },
        },
        BlockType::Label | BlockType::Xml => {
            if let Some(op) = &opcode {
                warn!(opcode = %op, block_type = %block_type.as_str(), "ignoring opcode");
            }
            None
        },
        _ => {
            let opcode = opcode.ok_or(ExtensionError::MissingOpcode)?;
            let method = func.map_or(opcode, |f| sanitize(&f));
            warn_if_missing(extension.as_ref(), &method);
            info.insert("func".to_owned(), Value::from(method.clone()));
            let source = if info.get("isDynamic").is_some_and(is_set) {
                BlockInfoSource::Dynamic
            } else {
                BlockInfoSource::Static(Arc::new(Value::Object(info.clone())))
            };
            Some(BlockHandler::Function(BlockFunction::new(
                Arc::clone(extension),
                method,
                source,
            )))
        },
    };

    Ok(PreparedBlockInfo {
        info,
        block_type,
        handler,
    })
}

/// The method may still appear later; only warn.
fn warn_if_missing(extension: &dyn ExtensionObject, method: &str) {
    if !extension.method(method).is_callable() {
        warn!(method, "could not find extension block function");
    }
}

fn format_menu_item(translator: &Translator, item: &Value) -> MenuItem {
    match item {
        Value::String(s) => MenuItem {
            text: s.clone(),
            value: item.clone(),
        },
        Value::Object(fields) => {
            let raw_text = fields.get("text").unwrap_or(&Value::Null);
            let text = match raw_text {
                Value::Object(_) => translator
                    .translate(raw_text, None)
                    .unwrap_or_else(|_| Cast::to_string(raw_text)),
                other => Cast::to_string(other),
            };
            MenuItem {
                text,
                value: fields.get("value").cloned().unwrap_or(Value::Null),
            }
        },
        other => MenuItem {
            text: Cast::to_string(other),
            value: other.clone(),
        },
    }
}
