//! Property values attached to log events.
//!
//! Every value knows its *native textual form*, which is what the encoder and
//! the message template write out. That form is always valid JSON text:
//!
//! ```text
//! Scalar(Str("GET"))                 → "GET"
//! Scalar(U64(200))                   → 200
//! Scalar(Null)                       → null
//! Sequence([..])                     → [a,b]
//! Structure([("Key", ..), ..])       → {"Key":a,..}
//! ```

use std::collections::BTreeMap;
use std::fmt;

/// A single non-composite value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(String),
}

/// A tagged property value: scalar, sequence, or structure.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(Scalar),
    Sequence(Vec<PropertyValue>),
    Structure(Vec<(String, PropertyValue)>),
}

impl PropertyValue {
    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    /// The contained text when this is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Scalar(Scalar::U64(n)) => Some(*n),
            Self::Scalar(Scalar::I64(n)) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Scalar(Scalar::F64(n)) => Some(*n),
            Self::Scalar(Scalar::U64(n)) => Some(*n as f64),
            Self::Scalar(Scalar::I64(n)) => Some(*n as f64),
            _ => None,
        }
    }
}

/// Writes `text` as a quoted, escaped JSON string.
pub(crate) fn write_json_str(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    let quoted = serde_json::to_string(text).map_err(|_| fmt::Error)?;
    f.write_str(&quoted)
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::I64(n) => write!(f, "{n}"),
            Self::U64(n) => write!(f, "{n}"),
            // JSON has no NaN or infinity.
            Self::F64(n) if !n.is_finite() => f.write_str("null"),
            Self::F64(n) => write!(f, "{n}"),
            Self::Str(s) => write_json_str(f, s),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(scalar) => scalar.fmt(f),
            Self::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
            Self::Structure(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write_json_str(f, name)?;
                    f.write_str(":")?;
                    value.fmt(f)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<Scalar> for PropertyValue {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Scalar(Scalar::Str(s.to_owned()))
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Scalar(Scalar::Str(s))
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Scalar(Scalar::Bool(b))
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        Self::Scalar(Scalar::F64(n))
    }
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for PropertyValue {
            fn from(n: $t) -> Self {
                Self::Scalar(Scalar::U64(n as u64))
            }
        })*
    };
}

from_unsigned!(u16, u32, u64, usize);

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        Self::Scalar(Scalar::I64(n))
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Into::into)
    }
}

/// Case-sensitive map of property name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties {
    entries: BTreeMap<String, PropertyValue>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Sets `key` only if it is not already present. Returns whether the
    /// value was stored.
    pub fn try_add(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> bool {
        match self.entries.entry(key.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut properties = Self::new();
        for (key, value) in iter {
            properties.insert(key, value);
        }
        properties
    }
}
