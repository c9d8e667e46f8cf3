//! Engine enumerations exposed to extensions.
//!
//! The wire values match what the host engine expects in block metadata.
//! Each enum can also be rendered as a `NAME -> value` table, which is how
//! the capability surface hands them to extension code.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => ($key:literal, $wire:literal), )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire value.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }

            /// Constant name (`COMMAND`, `STRING`, ...).
            #[must_use]
            pub fn key(self) -> &'static str {
                match self {
                    $(Self::$variant => $key,)+
                }
            }

            /// `NAME -> wire value` table.
            #[must_use]
            pub fn table() -> Value {
                let mut map = Map::new();
                for variant in Self::ALL {
                    map.insert(variant.key().to_owned(), Value::from(variant.as_str()));
                }
                Value::Object(map)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($name))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

wire_enum! {
    /// Argument types a block input can declare.
    ArgumentType {
        /// Numeric angle picker.
        Angle => ("ANGLE", "angle"),
        /// Boolean slot.
        Boolean => ("BOOLEAN", "Boolean"),
        /// Colour picker.
        Color => ("COLOR", "color"),
        /// Numeric input.
        Number => ("NUMBER", "number"),
        /// Text input.
        String => ("STRING", "string"),
        /// 5x5 matrix.
        Matrix => ("MATRIX", "matrix"),
        /// Musical note.
        Note => ("NOTE", "note"),
        /// Inline image.
        Image => ("IMAGE", "image"),
        /// Costume menu.
        Costume => ("COSTUME", "costume"),
        /// Sound menu.
        Sound => ("SOUND", "sound"),
    }
}

wire_enum! {
    /// Kinds of target an extension may apply to.
    TargetType {
        /// A sprite.
        Sprite => ("SPRITE", "sprite"),
        /// The stage.
        Stage => ("STAGE", "stage"),
    }
}

wire_enum! {
    /// Scope of a reporter's value.
    ReporterScope {
        /// Shared by all targets.
        Global => ("GLOBAL", "global"),
        /// Per target.
        Target => ("TARGET", "target"),
    }
}

/// Shape of a block.
///
/// Unknown wire values are preserved as [`BlockType::Other`]; the normalizer
/// treats them like any callable block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Boolean reporter.
    Boolean,
    /// Flyout button.
    Button,
    /// Stack block.
    #[default]
    Command,
    /// Branching block.
    Conditional,
    /// Edge-triggered hat without a function.
    Event,
    /// Hat block.
    Hat,
    /// Flyout label.
    Label,
    /// Looping block.
    Loop,
    /// Value reporter.
    Reporter,
    /// Raw flyout XML.
    Xml,
    /// Any other value.
    Other(String),
}

impl BlockType {
    const KNOWN: [(Self, &'static str, &'static str); 10] = [
        (Self::Boolean, "BOOLEAN", "Boolean"),
        (Self::Button, "BUTTON", "button"),
        (Self::Command, "COMMAND", "command"),
        (Self::Conditional, "CONDITIONAL", "conditional"),
        (Self::Event, "EVENT", "event"),
        (Self::Hat, "HAT", "hat"),
        (Self::Label, "LABEL", "label"),
        (Self::Loop, "LOOP", "loop"),
        (Self::Reporter, "REPORTER", "reporter"),
        (Self::Xml, "XML", "xml"),
    ];

    /// Wire value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Boolean => "Boolean",
            Self::Button => "button",
            Self::Command => "command",
            Self::Conditional => "conditional",
            Self::Event => "event",
            Self::Hat => "hat",
            Self::Label => "label",
            Self::Loop => "loop",
            Self::Reporter => "reporter",
            Self::Xml => "xml",
            Self::Other(other) => other,
        }
    }

    /// Parse a wire value, preserving unknown values.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|(_, _, wire)| *wire == raw)
            .map_or_else(|| Self::Other(raw.to_owned()), |(ty, _, _)| ty.clone())
    }

    /// `NAME -> wire value` table.
    #[must_use]
    pub fn table() -> Value {
        let mut map = Map::new();
        for (_, key, wire) in &Self::KNOWN {
            map.insert((*key).to_owned(), Value::from(*wire));
        }
        Value::Object(map)
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for BlockType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BlockType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw))
    }
}
