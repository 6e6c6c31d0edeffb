//! JSON adapter for generic values.
//!
//! JSON has no bytes, enum or 64-bit integer types, so reading it needs the
//! message descriptor to decide what each string or number stands for. Values
//! that do not fit the declared field are passed through unchanged and left
//! for the encoder to reject with a precise error.

use crate::describe::kind_name;
use crate::error::{Error, Result};
use crate::value::{GenericValue, MapKey, ValueMap};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use prost_reflect::{FieldDescriptor, Kind, MessageDescriptor};
use serde_json::{Map, Number, Value};

/// Convert a JSON object into a message-shaped value for `desc`.
///
/// Fields may be named by their proto name or their JSON name.
pub fn to_generic(desc: &MessageDescriptor, json: &Value) -> Result<GenericValue> {
    let Value::Object(object) = json else {
        return Ok(plain(json));
    };

    let mut fields = ValueMap::new();
    for (key, value) in object {
        let field = desc
            .get_field_by_name(key)
            .or_else(|| desc.get_field_by_json_name(key));
        let converted = match &field {
            Some(field) => field_value(field, value)?,
            None => plain(value),
        };
        let name = field.map_or_else(|| key.clone(), |f| f.name().to_string());
        fields.insert(MapKey::String(name), converted);
    }
    Ok(GenericValue::Map(fields))
}

fn field_value(field: &FieldDescriptor, value: &Value) -> Result<GenericValue> {
    if value.is_null() {
        return Ok(GenericValue::Null);
    }
    if field.is_map() {
        let (Value::Object(object), Kind::Message(entry)) = (value, field.kind()) else {
            return Ok(plain(value));
        };
        let key_kind = entry.map_entry_key_field().kind();
        let value_kind = entry.map_entry_value_field().kind();
        let mut map = ValueMap::new();
        for (key, item) in object {
            map.insert(
                map_key(field, &key_kind, key)?,
                single(field, &value_kind, item)?,
            );
        }
        return Ok(GenericValue::Map(map));
    }
    if field.is_list() {
        let Value::Array(items) = value else {
            return Ok(plain(value));
        };
        let kind = field.kind();
        return items
            .iter()
            .map(|item| single(field, &kind, item))
            .collect::<Result<Vec<_>>>()
            .map(GenericValue::List);
    }
    single(field, &field.kind(), value)
}

fn single(field: &FieldDescriptor, kind: &Kind, value: &Value) -> Result<GenericValue> {
    let converted = match (kind, value) {
        (Kind::Message(nested), Value::Object(_)) => return to_generic(nested, value),
        (Kind::Bytes, Value::String(text)) => {
            let bytes = BASE64.decode(text).map_err(|e| Error::TypeMismatch {
                field: field.full_name().to_string(),
                expected: "base64 bytes".to_string(),
                found: e.to_string(),
            })?;
            GenericValue::Bytes(bytes)
        }
        (Kind::Enum(_), Value::String(name)) => GenericValue::Symbol(name.clone()),
        (Kind::Float | Kind::Double, Value::Number(n)) => match n.as_f64() {
            Some(f) => GenericValue::Float(f),
            None => plain(value),
        },
        (Kind::Float | Kind::Double, Value::String(text)) => match text.as_str() {
            "NaN" => GenericValue::Float(f64::NAN),
            "Infinity" => GenericValue::Float(f64::INFINITY),
            "-Infinity" => GenericValue::Float(f64::NEG_INFINITY),
            _ => plain(value),
        },
        (kind, Value::String(text)) if is_integer(kind) => {
            parse_integer(kind, text).unwrap_or_else(|| plain(value))
        }
        _ => plain(value),
    };
    Ok(converted)
}

fn map_key(field: &FieldDescriptor, kind: &Kind, key: &str) -> Result<MapKey> {
    let parsed = match kind {
        Kind::String => Some(MapKey::String(key.to_string())),
        Kind::Bool => match key {
            "true" => Some(MapKey::Bool(true)),
            "false" => Some(MapKey::Bool(false)),
            _ => None,
        },
        kind if is_integer(kind) => match parse_integer(kind, key) {
            Some(GenericValue::Int(i)) => Some(MapKey::Int(i)),
            Some(GenericValue::UInt(u)) => Some(MapKey::UInt(u)),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| Error::TypeMismatch {
        field: format!("{}[{key}]", field.full_name()),
        expected: kind_name(kind),
        found: "string".to_string(),
    })
}

fn is_integer(kind: &Kind) -> bool {
    matches!(
        kind,
        Kind::Int32
            | Kind::Int64
            | Kind::Uint32
            | Kind::Uint64
            | Kind::Sint32
            | Kind::Sint64
            | Kind::Fixed32
            | Kind::Fixed64
            | Kind::Sfixed32
            | Kind::Sfixed64
    )
}

fn is_unsigned(kind: &Kind) -> bool {
    matches!(
        kind,
        Kind::Uint32 | Kind::Uint64 | Kind::Fixed32 | Kind::Fixed64
    )
}

/// Decimal text as `UInt` for unsigned kinds and `Int` otherwise.
fn parse_integer(kind: &Kind, text: &str) -> Option<GenericValue> {
    if is_unsigned(kind) {
        text.parse::<u64>().ok().map(GenericValue::UInt)
    } else {
        text.parse::<i64>().ok().map(GenericValue::Int)
    }
}

/// Schema-free conversion.
fn plain(value: &Value) -> GenericValue {
    match value {
        Value::Null => GenericValue::Null,
        Value::Bool(b) => GenericValue::Bool(*b),
        Value::Number(n) => number(n),
        Value::String(s) => GenericValue::String(s.clone()),
        Value::Array(items) => GenericValue::List(items.iter().map(plain).collect()),
        Value::Object(object) => GenericValue::Map(
            object
                .iter()
                .map(|(k, v)| (MapKey::String(k.clone()), plain(v)))
                .collect(),
        ),
    }
}

fn number(n: &Number) -> GenericValue {
    if let Some(i) = n.as_i64() {
        GenericValue::Int(i)
    } else if let Some(u) = n.as_u64() {
        GenericValue::UInt(u)
    } else {
        GenericValue::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Render a generic value as JSON.
///
/// Bytes become base64 strings, enum symbols become strings and non-finite
/// floats become `"NaN"`, `"Infinity"` or `"-Infinity"`.
pub fn from_generic(value: &GenericValue) -> Value {
    match value {
        GenericValue::Null => Value::Null,
        GenericValue::Bool(b) => Value::Bool(*b),
        GenericValue::Int(i) => Value::from(*i),
        GenericValue::UInt(u) => Value::from(*u),
        GenericValue::Float(f) => match Number::from_f64(*f) {
            Some(n) => Value::Number(n),
            None if f.is_nan() => Value::String("NaN".to_string()),
            None if *f > 0.0 => Value::String("Infinity".to_string()),
            None => Value::String("-Infinity".to_string()),
        },
        GenericValue::String(s) | GenericValue::Symbol(s) => Value::String(s.clone()),
        GenericValue::Bytes(b) => Value::String(BASE64.encode(b)),
        GenericValue::List(items) => Value::Array(items.iter().map(from_generic).collect()),
        GenericValue::Map(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), from_generic(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::encode::encode;
    use crate::registry::SchemaRegistry;
    use serde_json::json;

    fn desc(name: &str) -> MessageDescriptor {
        SchemaRegistry::with_builtin()
            .expect("builtin descriptors should load")
            .resolve(name)
            .expect("sample type should be compiled in")
    }

    #[test]
    fn json_is_read_according_to_field_kinds() {
        let scalars = desc("bridge.samples.Scalars");
        let value = to_generic(
            &scalars,
            &json!({
                "int64Value": "-9007199254740993",
                "uint64_value": "18446744073709551615",
                "double_value": 1,
                "float_value": "NaN",
                "bytes_value": "AAEC",
                "color": "RED",
            }),
        )
        .expect("json should convert");

        assert_eq!(value.get("int64_value"), Some(&GenericValue::Int(-9007199254740993)));
        assert_eq!(value.get("uint64_value"), Some(&GenericValue::UInt(u64::MAX)));
        assert_eq!(value.get("double_value"), Some(&GenericValue::Float(1.0)));
        assert_eq!(value.get("bytes_value"), Some(&GenericValue::Bytes(vec![0, 1, 2])));
        assert_eq!(value.get("color"), Some(&GenericValue::symbol("RED")));
        assert!(encode(&scalars, &value).is_ok());
    }

    #[test]
    fn map_keys_follow_the_declared_key_kind() {
        let maps = desc("bridge.samples.Maps");
        let value = to_generic(
            &maps,
            &json!({
                "labels": { "-3": "minus three" },
                "people": { "9": { "name": "Nine" } },
                "flags": { "true": "BLUE" },
            }),
        )
        .expect("json should convert");
        let message = encode(&maps, &value).expect("converted value should encode");
        assert_eq!(decode(&message), value);

        let err = to_generic(&maps, &json!({ "labels": { "x": "bad" } }))
            .expect_err("non-numeric key");
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn unknown_keys_reach_the_encoder() {
        let person = desc("bridge.samples.Person");
        let value = to_generic(&person, &json!({ "name": "Ada", "nickname": "Ace" }))
            .expect("unknown keys pass through");
        assert!(matches!(
            encode(&person, &value),
            Err(Error::UnknownField { ref field, .. }) if field == "nickname"
        ));
    }

    #[test]
    fn invalid_base64_is_a_type_mismatch() {
        let err = to_generic(&desc("bridge.samples.Scalars"), &json!({ "bytes_value": "%%" }))
            .expect_err("not base64");
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn generic_values_render_as_json() {
        let mut labels = ValueMap::new();
        labels.insert(MapKey::Int(7), "seven".into());
        let value = GenericValue::message([
            ("blob", GenericValue::Bytes(vec![0, 1, 2])),
            ("color", GenericValue::symbol("RED")),
            ("inf", GenericValue::Float(f64::NEG_INFINITY)),
            ("labels", GenericValue::Map(labels)),
            ("big", GenericValue::UInt(u64::MAX)),
        ]);
        assert_eq!(
            from_generic(&value),
            json!({
                "blob": "AAEC",
                "color": "RED",
                "inf": "-Infinity",
                "labels": { "7": "seven" },
                "big": 18446744073709551615u64,
            })
        );
    }
}
