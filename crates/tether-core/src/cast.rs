//! Value coercions with the host engine's semantics.
//!
//! Block arguments reach extensions as loosely typed JSON. [`Cast`] converts
//! them the same way the engine does, so an extension sees `"  12 "` as `12`
//! and `"false"` as `false`.

use std::cmp::Ordering;

use rand::Rng;
use serde_json::Value;

/// Result of resolving a list index argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListIndex {
    /// A valid 1-based index.
    Index(usize),
    /// The whole list (`"all"`), when accepted.
    All,
    /// Out of range or otherwise unusable.
    Invalid,
}

/// Engine-compatible value coercions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cast;

impl Cast {
    /// Convert to a number. Anything that is not a number becomes `0`.
    #[must_use]
    pub fn to_number(value: &Value) -> f64 {
        let n = raw_number(value);
        if n.is_nan() { 0.0 } else { n }
    }

    /// Convert to a boolean.
    ///
    /// The strings `""`, `"0"` and any casing of `"false"` are false.
    #[must_use]
    pub fn to_boolean(value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
            Value::Null => false,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Convert to a string.
    #[must_use]
    pub fn to_string(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(n.as_f64().unwrap_or(f64::NAN)),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_owned(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    other => Self::to_string(other),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_owned(),
        }
    }

    /// Whether the value is null or a whitespace-only string.
    #[must_use]
    pub fn is_white_space(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Compare two values: numerically when both look like numbers,
    /// otherwise as case-insensitive strings.
    ///
    /// Returns a negative number, zero or a positive number.
    #[must_use]
    pub fn compare(left: &Value, right: &Value) -> f64 {
        let mut a = raw_number(left);
        let mut b = raw_number(right);
        if a == 0.0 && Self::is_white_space(left) {
            a = f64::NAN;
        }
        if b == 0.0 && Self::is_white_space(right) {
            b = f64::NAN;
        }

        if a.is_nan() || b.is_nan() {
            let a = Self::to_string(left).to_lowercase();
            let b = Self::to_string(right).to_lowercase();
            return match a.cmp(&b) {
                Ordering::Less => -1.0,
                Ordering::Greater => 1.0,
                Ordering::Equal => 0.0,
            };
        }
        if a.is_infinite() && b.is_infinite() && a.signum() == b.signum() {
            return 0.0;
        }
        a - b
    }

    /// Whether the value represents an integer.
    #[must_use]
    pub fn is_int(value: &Value) -> bool {
        match value {
            Value::Number(n) => n
                .as_f64()
                .is_none_or(|n| n.is_nan() || (n.is_finite() && n.fract() == 0.0)),
            Value::Bool(_) => true,
            Value::String(s) => !s.contains('.'),
            _ => false,
        }
    }

    /// Resolve a 1-based list index argument against a list of `length`.
    ///
    /// Accepts the keywords `all` (when `accept_all`), `last`, `random` and
    /// `any` in addition to numbers.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn to_list_index(index: &Value, length: usize, accept_all: bool) -> ListIndex {
        if let Value::String(keyword) = index {
            match keyword.as_str() {
                "all" => {
                    return if accept_all {
                        ListIndex::All
                    } else {
                        ListIndex::Invalid
                    };
                },
                "last" => {
                    return if length > 0 {
                        ListIndex::Index(length)
                    } else {
                        ListIndex::Invalid
                    };
                },
                "random" | "any" => {
                    return if length > 0 {
                        ListIndex::Index(rand::thread_rng().gen_range(1..=length))
                    } else {
                        ListIndex::Invalid
                    };
                },
                _ => {},
            }
        }

        let position = Self::to_number(index).floor();
        if position < 1.0 || position > length as f64 {
            return ListIndex::Invalid;
        }
        ListIndex::Index(position as usize)
    }
}

fn raw_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_number(s),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {},
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            #[allow(clippy::cast_precision_loss)]
            return u64::from_str_radix(digits, radix).map_or(f64::NAN, |n| n as f64);
        }
    }
    // Rust accepts `inf` and `nan`; the engine does not.
    if trimmed
        .chars()
        .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else {
        n.to_string()
    }
}
