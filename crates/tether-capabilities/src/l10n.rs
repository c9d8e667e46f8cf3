//! Per-surface translation.
//!
//! Each capability surface owns a [`Translator`]. Extensions pass either a
//! plain default string or a message object; the translator looks the
//! message up in the table the extension installed with [`Translator::setup`]
//! for the active locale, falling back to the default text.
//!
//! The locale starts as the engine's locale and follows
//! [`TetherEvent::LocaleChanged`] once [`Translator::attach`] has been
//! called.

use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde_json::{Map, Value};
use tether_core::Cast;
use tether_events::{EventBus, FnSubscriber, SubscriberId, TetherEvent};
use tracing::{debug, trace};

use crate::error::{CapabilityError, CapabilityResult};

/// A translatable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Plain default text.
    Text(String),
    /// Message object.
    Shaped {
        /// Explicit id; defaults to `_<default>`.
        id: Option<String>,
        /// Default text.
        default: String,
        /// Note for translators.
        description: Option<String>,
    },
}

impl Message {
    /// Accept a string or a `{id?, default, description?}` object.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidMessage`] for anything else.
    pub fn from_value(value: &Value) -> CapabilityResult<Self> {
        match value {
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Object(fields) => {
                let string_field = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_owned);
                Ok(Self::Shaped {
                    id: string_field("id"),
                    default: fields
                        .get("default")
                        .map(Cast::to_string)
                        .unwrap_or_default(),
                    description: string_field("description"),
                })
            },
            other => Err(CapabilityError::InvalidMessage(other.to_string())),
        }
    }

    /// Lookup id.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Text(text) => generate_id(text),
            Self::Shaped { id: Some(id), .. } => id.clone(),
            Self::Shaped { default, .. } => generate_id(default),
        }
    }

    /// Default text.
    #[must_use]
    pub fn default_text(&self) -> &str {
        match self {
            Self::Text(text) | Self::Shaped { default: text, .. } => text,
        }
    }
}

fn generate_id(default: &str) -> String {
    format!("_{default}")
}

struct TranslatorState {
    locale: RwLock<String>,
    table: RwLock<Value>,
    attachment: Mutex<Option<(EventBus, SubscriberId)>>,
}

impl Drop for TranslatorState {
    fn drop(&mut self) {
        let attachment = self
            .attachment
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((bus, id)) = attachment {
            bus.registry().unregister(id);
        }
    }
}

/// Translation function handed to extensions.
#[derive(Clone)]
pub struct Translator {
    state: Arc<TranslatorState>,
}

impl Translator {
    /// Create a translator for `locale` with an empty table.
    #[must_use]
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            state: Arc::new(TranslatorState {
                locale: RwLock::new(locale.into()),
                table: RwLock::new(Value::Object(Map::new())),
                attachment: Mutex::new(None),
            }),
        }
    }

    /// Follow locale changes published on `bus`. The subscription is removed
    /// when the last clone of the translator is dropped.
    pub fn attach(&self, bus: &EventBus) {
        let weak: Weak<TranslatorState> = Arc::downgrade(&self.state);
        let subscriber = FnSubscriber::new("translator", move |event| {
            if let (TetherEvent::LocaleChanged { locale, .. }, Some(state)) = (event, weak.upgrade()) {
                debug!(%locale, "translator locale changed");
                *state.locale.write().unwrap_or_else(PoisonError::into_inner) = locale.clone();
            }
        })
        .only("locale_changed");

        let id = bus.registry().register(Arc::new(subscriber));
        let previous = self
            .state
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((bus.clone(), id));
        if let Some((old_bus, old_id)) = previous {
            old_bus.registry().unregister(old_id);
        }
    }

    /// The active locale.
    #[must_use]
    pub fn language(&self) -> String {
        self.state
            .locale
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch locale directly.
    pub fn set_locale(&self, locale: impl Into<String>) {
        *self.state.locale.write().unwrap_or_else(PoisonError::into_inner) = locale.into();
    }

    /// Replace the translation table (`{locale: {id: text}}`). `None` keeps
    /// the stored table and only re-applies it to the active locale.
    pub fn setup(&self, table: Option<Value>) {
        if let Some(table) = table {
            *self.state.table.write().unwrap_or_else(PoisonError::into_inner) = table;
        }
    }

    /// Translate `message`, interpolating `{name}` placeholders from `args`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::InvalidMessage`] if `message` is neither a
    /// string nor a message object.
    pub fn translate(&self, message: &Value, args: Option<&Value>) -> CapabilityResult<String> {
        let message = Message::from_value(message)?;
        let template = self
            .lookup(&message.id())
            .unwrap_or_else(|| message.default_text().to_owned());
        Ok(match args.and_then(Value::as_object) {
            Some(args) => interpolate(&template, args),
            None => template,
        })
    }

    /// Try the full locale, then progressively shorter subtags.
    fn lookup(&self, id: &str) -> Option<String> {
        let locale = self.language().to_ascii_lowercase();
        let table = self.state.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut candidate = locale.as_str();
        loop {
            if let Some(text) = table
                .as_object()
                .and_then(|locales| {
                    locales
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(candidate))
                })
                .and_then(|(_, entries)| entries.get(id))
                .and_then(Value::as_str)
            {
                return Some(text.to_owned());
            }
            match candidate.rfind('-') {
                Some(cut) => candidate = &candidate[..cut],
                None => {
                    trace!(%locale, id, "missing translation");
                    return None;
                },
            }
        }
    }
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("locale", &self.language())
            .finish_non_exhaustive()
    }
}

fn interpolate(template: &str, args: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let replaced = after.find('}').and_then(|close| {
            let name = after[1..close].trim();
            args.get(name).map(|value| (Cast::to_string(value), close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(&value);
                rest = &after[close.saturating_add(1)..];
            },
            None => {
                out.push('{');
                rest = &after[1..];
            },
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_events::EventMetadata;

    fn table() -> Value {
        json!({
            "de": {"_Hello": "Hallo", "greet": "Hallo {name}!"},
            "zh-cn": {"_Hello": "你好"},
        })
    }

    #[test]
    fn test_plain_string_falls_back_to_default() {
        let translator = Translator::new("en");
        assert_eq!(translator.translate(&json!("Hello"), None).unwrap(), "Hello");
    }

    #[test]
    fn test_lookup_by_generated_and_explicit_id() {
        let translator = Translator::new("de");
        translator.setup(Some(table()));
        assert_eq!(translator.translate(&json!("Hello"), None).unwrap(), "Hallo");
        assert_eq!(
            translator
                .translate(
                    &json!({"id": "greet", "default": "Hi {name}!"}),
                    Some(&json!({"name": "Ada"}))
                )
                .unwrap(),
            "Hallo Ada!"
        );
    }

    #[test]
    fn test_region_falls_back_to_language() {
        let translator = Translator::new("de-AT");
        translator.setup(Some(table()));
        assert_eq!(translator.translate(&json!("Hello"), None).unwrap(), "Hallo");
    }

    #[test]
    fn test_table_keys_match_any_case() {
        let translator = Translator::new("zh-CN");
        translator.setup(Some(json!({"zh-CN": {"_Hello": "你好"}})));
        assert_eq!(translator.translate(&json!("Hello"), None).unwrap(), "你好");

        translator.set_locale("pt-br");
        translator.setup(Some(json!({"PT": {"_Hello": "Olá"}})));
        assert_eq!(translator.translate(&json!("Hello"), None).unwrap(), "Olá");
    }

    #[test]
    fn test_setup_none_keeps_table() {
        let translator = Translator::new("zh-cn");
        translator.setup(Some(table()));
        translator.setup(None);
        assert_eq!(translator.translate(&json!("Hello"), None).unwrap(), "你好");
    }

    #[test]
    fn test_rejects_non_message() {
        let translator = Translator::new("en");
        assert!(matches!(
            translator.translate(&json!(42), None),
            Err(CapabilityError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_placeholders() {
        let translator = Translator::new("en");
        let text = translator
            .translate(&json!("{a} + {b} = {c} {missing}"), Some(&json!({"a": 1, "b": 2.5, "c": "x"})))
            .unwrap();
        assert_eq!(text, "1 + 2.5 = x {missing}");
    }

    #[test]
    fn test_follows_locale_events_until_dropped() {
        let bus = EventBus::new();
        let translator = Translator::new("en");
        translator.setup(Some(table()));
        translator.attach(&bus);
        assert_eq!(bus.registry().len(), 1);

        bus.publish(TetherEvent::LocaleChanged {
            metadata: EventMetadata::new("engine"),
            locale: "de".to_string(),
        });
        assert_eq!(translator.language(), "de");
        assert_eq!(translator.translate(&json!("Hello"), None).unwrap(), "Hallo");

        drop(translator);
        assert!(bus.registry().is_empty());
    }
}
