//! Message to generic value conversion.

use crate::value::{GenericValue, MapKey, ValueMap};
use prost_reflect::{DynamicMessage, Kind, ReflectMessage, Value};

/// Convert a message into a mapping of its set fields, in declaration order.
///
/// Fields without presence that hold their default value count as unset and
/// are left out. Unknown fields are kept by the message but never surface
/// here.
pub fn decode(message: &DynamicMessage) -> GenericValue {
    let desc = message.descriptor();
    let mut fields = ValueMap::new();
    for field in desc.fields() {
        if !message.has_field(&field) {
            continue;
        }
        let value = message.get_field(&field);
        let decoded = if field.is_map() {
            let value_kind = match field.kind() {
                Kind::Message(entry) => entry.map_entry_value_field().kind(),
                kind => kind,
            };
            decode_value(&value_kind, &value)
        } else {
            decode_value(&field.kind(), &value)
        };
        fields.insert(MapKey::String(field.name().to_string()), decoded);
    }
    GenericValue::Map(fields)
}

/// `kind` is the element kind: the value kind for maps, the item kind for lists.
fn decode_value(kind: &Kind, value: &Value) -> GenericValue {
    match value {
        Value::Bool(b) => GenericValue::Bool(*b),
        Value::I32(i) => GenericValue::Int((*i).into()),
        Value::I64(i) => GenericValue::Int(*i),
        Value::U32(u) => GenericValue::UInt((*u).into()),
        Value::U64(u) => GenericValue::UInt(*u),
        Value::F32(f) => GenericValue::Float((*f).into()),
        Value::F64(f) => GenericValue::Float(*f),
        Value::String(s) => GenericValue::String(s.clone()),
        Value::Bytes(b) => GenericValue::Bytes(b.to_vec()),
        Value::EnumNumber(number) => {
            let name = match kind {
                Kind::Enum(enum_desc) => enum_desc
                    .get_value(*number)
                    .map(|member| member.name().to_string()),
                _ => None,
            };
            match name {
                Some(name) => GenericValue::Symbol(name),
                None => GenericValue::Int((*number).into()),
            }
        }
        Value::Message(message) => decode(message),
        Value::List(items) => {
            GenericValue::List(items.iter().map(|item| decode_value(kind, item)).collect())
        }
        Value::Map(entries) => {
            let mut pairs: Vec<(MapKey, GenericValue)> = entries
                .iter()
                .map(|(key, item)| (decode_key(key), decode_value(kind, item)))
                .collect();
            // Wire order of map entries is unspecified; present them sorted.
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            GenericValue::Map(pairs.into_iter().collect())
        }
    }
}

fn decode_key(key: &prost_reflect::MapKey) -> MapKey {
    use prost_reflect::MapKey as Key;

    match key {
        Key::Bool(b) => MapKey::Bool(*b),
        Key::I32(i) => MapKey::Int((*i).into()),
        Key::I64(i) => MapKey::Int(*i),
        Key::U32(u) => MapKey::UInt((*u).into()),
        Key::U64(u) => MapKey::UInt(*u),
        Key::String(s) => MapKey::String(s.clone()),
    }
}
