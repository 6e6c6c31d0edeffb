//! The caller-side generic value model.
//!
//! A message is a [`GenericValue::Map`] keyed by field name, a repeated field
//! is a [`GenericValue::List`] and a map field is a [`GenericValue::Map`]
//! keyed by the map's key type.

use indexmap::IndexMap;
use std::fmt;

/// Ordered mapping used for messages and map fields.
///
/// Iteration follows insertion order; equality ignores it.
pub type ValueMap = IndexMap<MapKey, GenericValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum GenericValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<GenericValue>),
    Map(ValueMap),
    /// An enum member referenced by name.
    Symbol(String),
}

/// Keys of a [`GenericValue::Map`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(String),
}

impl GenericValue {
    /// Short name of the variant, used in type mismatch reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            GenericValue::Null => "null",
            GenericValue::Bool(_) => "bool",
            GenericValue::Int(_) => "int",
            GenericValue::UInt(_) => "uint",
            GenericValue::Float(_) => "float",
            GenericValue::String(_) => "string",
            GenericValue::Bytes(_) => "bytes",
            GenericValue::List(_) => "list",
            GenericValue::Map(_) => "map",
            GenericValue::Symbol(_) => "symbol",
        }
    }

    /// Build a message-shaped mapping from `(field name, value)` pairs.
    pub fn message<K, V, I>(fields: I) -> Self
    where
        K: Into<String>,
        V: Into<GenericValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        GenericValue::Map(
            fields
                .into_iter()
                .map(|(name, value)| (MapKey::String(name.into()), value.into()))
                .collect(),
        )
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        GenericValue::Symbol(name.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, GenericValue::Null)
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            GenericValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[GenericValue]> {
        match self {
            GenericValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a message field by name.
    pub fn get(&self, field: &str) -> Option<&GenericValue> {
        self.as_map()
            .and_then(|map| map.get(&MapKey::String(field.to_string())))
    }
}

impl MapKey {
    pub fn type_name(&self) -> &'static str {
        match self {
            MapKey::Bool(_) => "bool",
            MapKey::Int(_) => "int",
            MapKey::UInt(_) => "uint",
            MapKey::String(_) => "string",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MapKey::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::UInt(u) => write!(f, "{u}"),
            MapKey::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for GenericValue {
    fn from(value: bool) -> Self {
        GenericValue::Bool(value)
    }
}

impl From<i32> for GenericValue {
    fn from(value: i32) -> Self {
        GenericValue::Int(value.into())
    }
}

impl From<i64> for GenericValue {
    fn from(value: i64) -> Self {
        GenericValue::Int(value)
    }
}

impl From<u32> for GenericValue {
    fn from(value: u32) -> Self {
        GenericValue::UInt(value.into())
    }
}

impl From<u64> for GenericValue {
    fn from(value: u64) -> Self {
        GenericValue::UInt(value)
    }
}

impl From<f64> for GenericValue {
    fn from(value: f64) -> Self {
        GenericValue::Float(value)
    }
}

impl From<f32> for GenericValue {
    fn from(value: f32) -> Self {
        GenericValue::Float(value.into())
    }
}

impl From<&str> for GenericValue {
    fn from(value: &str) -> Self {
        GenericValue::String(value.to_string())
    }
}

impl From<String> for GenericValue {
    fn from(value: String) -> Self {
        GenericValue::String(value)
    }
}

impl From<Vec<u8>> for GenericValue {
    fn from(value: Vec<u8>) -> Self {
        GenericValue::Bytes(value)
    }
}

impl From<Vec<GenericValue>> for GenericValue {
    fn from(value: Vec<GenericValue>) -> Self {
        GenericValue::List(value)
    }
}

impl From<ValueMap> for GenericValue {
    fn from(value: ValueMap) -> Self {
        GenericValue::Map(value)
    }
}

impl From<&str> for MapKey {
    fn from(value: &str) -> Self {
        MapKey::String(value.to_string())
    }
}

impl From<String> for MapKey {
    fn from(value: String) -> Self {
        MapKey::String(value)
    }
}

impl From<i64> for MapKey {
    fn from(value: i64) -> Self {
        MapKey::Int(value)
    }
}

impl From<u64> for MapKey {
    fn from(value: u64) -> Self {
        MapKey::UInt(value)
    }
}

impl From<bool> for MapKey {
    fn from(value: bool) -> Self {
        MapKey::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_equality_ignores_insertion_order() {
        let a = GenericValue::message([("name", GenericValue::from("Ada")), ("age", 36.into())]);
        let b = GenericValue::message([("age", GenericValue::from(36)), ("name", "Ada".into())]);
        assert_eq!(a, b);
    }

    #[test]
    fn get_reads_string_keyed_fields() {
        let person = GenericValue::message([("name", "Ada")]);
        assert_eq!(person.get("name"), Some(&GenericValue::from("Ada")));
        assert_eq!(person.get("age"), None);
        assert_eq!(GenericValue::Int(1).get("name"), None);
    }

    #[test]
    fn signed_and_unsigned_integers_stay_distinct() {
        assert_ne!(GenericValue::from(1i64), GenericValue::from(1u64));
        assert_eq!(GenericValue::from(7u32), GenericValue::UInt(7));
    }
}
