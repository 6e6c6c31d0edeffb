//! Generic value to message conversion.
//!
//! Every field is converted by dispatching on its descriptor's [`Kind`] and
//! cardinality; no per-type code is involved.

use crate::arena::{Heap, MessageSource};
use crate::describe::{is_synthetic_oneof, kind_name};
use crate::error::{Error, Result};
use crate::value::{GenericValue, MapKey};
use prost::bytes::Bytes;
use prost_reflect::{
    DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, ReflectMessage, Value,
};
use std::collections::HashMap;

/// Build a heap-owned message of type `desc` from `value`.
pub fn encode(desc: &MessageDescriptor, value: &GenericValue) -> Result<DynamicMessage> {
    let mut message = DynamicMessage::new(desc.clone());
    encode_into(&mut message, value, &mut Heap)?;
    Ok(message)
}

/// Populate `message` from a message-shaped value.
///
/// Nested messages are obtained from `source`, which decides who owns them.
pub(crate) fn encode_into<S: MessageSource>(
    message: &mut DynamicMessage,
    value: &GenericValue,
    source: &mut S,
) -> Result<()> {
    let desc = message.descriptor();
    let fields = match value {
        GenericValue::Map(fields) => fields,
        other => {
            return Err(Error::TypeMismatch {
                field: desc.full_name().to_string(),
                expected: "map".to_string(),
                found: other.type_name().to_string(),
            })
        }
    };

    // oneof name -> member already set
    let mut oneofs: HashMap<String, String> = HashMap::new();

    for (key, field_value) in fields {
        let name = key.as_str().ok_or_else(|| Error::TypeMismatch {
            field: desc.full_name().to_string(),
            expected: "string field name".to_string(),
            found: key.type_name().to_string(),
        })?;
        let field = desc
            .get_field_by_name(name)
            .ok_or_else(|| Error::UnknownField {
                message: desc.full_name().to_string(),
                field: name.to_string(),
            })?;

        if field_value.is_null() {
            continue;
        }

        if let Some(oneof) = field.containing_oneof().filter(|o| !is_synthetic_oneof(o)) {
            if let Some(first) = oneofs.insert(oneof.name().to_string(), name.to_string()) {
                return Err(Error::OneofConflict {
                    oneof: oneof.full_name().to_string(),
                    first,
                    second: name.to_string(),
                });
            }
        }

        let converted = convert_field(&field, field_value, source)?;
        message
            .try_set_field(&field, converted)
            .map_err(|e| Error::TypeMismatch {
                field: field.full_name().to_string(),
                expected: kind_name(&field.kind()),
                found: e.to_string(),
            })?;
    }
    Ok(())
}

fn convert_field<S: MessageSource>(
    field: &FieldDescriptor,
    value: &GenericValue,
    source: &mut S,
) -> Result<Value> {
    if field.is_map() {
        convert_map(field, value, source)
    } else if field.is_list() {
        let items = value.as_list().ok_or_else(|| mismatch(field, "list", value))?;
        let kind = field.kind();
        items
            .iter()
            .map(|item| convert_single(field, &kind, item, source))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    } else {
        convert_single(field, &field.kind(), value, source)
    }
}

fn convert_map<S: MessageSource>(
    field: &FieldDescriptor,
    value: &GenericValue,
    source: &mut S,
) -> Result<Value> {
    let entries = value.as_map().ok_or_else(|| mismatch(field, "map", value))?;
    let entry = match field.kind() {
        Kind::Message(entry) => entry,
        _ => return Err(mismatch(field, "map", value)),
    };
    let key_kind = entry.map_entry_key_field().kind();
    let value_kind = entry.map_entry_value_field().kind();

    let mut out = HashMap::with_capacity(entries.len());
    for (key, item) in entries {
        let converted = convert_key(field, &key_kind, key)?;
        let item = convert_single(field, &value_kind, item, source)?;
        // Int(7) and UInt(7) land on the same protobuf key.
        if out.insert(converted, item).is_some() {
            return Err(Error::TypeMismatch {
                field: format!("{}[{key}]", field.full_name()),
                expected: "distinct map key".to_string(),
                found: "duplicate key".to_string(),
            });
        }
    }
    Ok(Value::Map(out))
}

fn convert_key(
    field: &FieldDescriptor,
    kind: &Kind,
    key: &MapKey,
) -> Result<prost_reflect::MapKey> {
    use prost_reflect::MapKey as Key;

    let integer = match key {
        MapKey::Int(i) => Some(i128::from(*i)),
        MapKey::UInt(u) => Some(i128::from(*u)),
        _ => None,
    };
    let converted = match (kind, key) {
        (Kind::String, MapKey::String(s)) => Some(Key::String(s.clone())),
        (Kind::Bool, MapKey::Bool(b)) => Some(Key::Bool(*b)),
        (Kind::Int32 | Kind::Sint32 | Kind::Sfixed32, _) => {
            integer.and_then(|n| i32::try_from(n).ok()).map(Key::I32)
        }
        (Kind::Int64 | Kind::Sint64 | Kind::Sfixed64, _) => {
            integer.and_then(|n| i64::try_from(n).ok()).map(Key::I64)
        }
        (Kind::Uint32 | Kind::Fixed32, _) => {
            integer.and_then(|n| u32::try_from(n).ok()).map(Key::U32)
        }
        (Kind::Uint64 | Kind::Fixed64, _) => {
            integer.and_then(|n| u64::try_from(n).ok()).map(Key::U64)
        }
        _ => None,
    };
    converted.ok_or_else(|| Error::TypeMismatch {
        field: format!("{}[{key}]", field.full_name()),
        expected: kind_name(kind),
        found: key.type_name().to_string(),
    })
}

/// Convert one non-repeated value of kind `kind`.
fn convert_single<S: MessageSource>(
    field: &FieldDescriptor,
    kind: &Kind,
    value: &GenericValue,
    source: &mut S,
) -> Result<Value> {
    let integer = match value {
        GenericValue::Int(i) => Some(i128::from(*i)),
        GenericValue::UInt(u) => Some(i128::from(*u)),
        _ => None,
    };

    let converted = match kind {
        Kind::Int32 | Kind::Sint32 | Kind::Sfixed32 => {
            integer.and_then(|n| i32::try_from(n).ok()).map(Value::I32)
        }
        Kind::Int64 | Kind::Sint64 | Kind::Sfixed64 => {
            integer.and_then(|n| i64::try_from(n).ok()).map(Value::I64)
        }
        Kind::Uint32 | Kind::Fixed32 => {
            integer.and_then(|n| u32::try_from(n).ok()).map(Value::U32)
        }
        Kind::Uint64 | Kind::Fixed64 => {
            integer.and_then(|n| u64::try_from(n).ok()).map(Value::U64)
        }
        Kind::Double => match value {
            GenericValue::Float(f) => Some(Value::F64(*f)),
            _ => None,
        },
        Kind::Float => match value {
            GenericValue::Float(f) if !f.is_finite() || f64::from(*f as f32) == *f => {
                Some(Value::F32(*f as f32))
            }
            _ => None,
        },
        Kind::Bool => match value {
            GenericValue::Bool(b) => Some(Value::Bool(*b)),
            _ => None,
        },
        Kind::String => match value {
            GenericValue::String(s) => Some(Value::String(s.clone())),
            _ => None,
        },
        Kind::Bytes => match value {
            GenericValue::Bytes(b) => Some(Value::Bytes(Bytes::copy_from_slice(b))),
            _ => None,
        },
        Kind::Enum(enum_desc) => {
            let member = match value {
                GenericValue::Symbol(name) | GenericValue::String(name) => {
                    enum_desc.get_value_by_name(name)
                }
                GenericValue::Int(_) | GenericValue::UInt(_) => integer
                    .and_then(|n| i32::try_from(n).ok())
                    .and_then(|n| enum_desc.get_value(n)),
                other => return Err(mismatch_kind(field, kind, other)),
            };
            let member = member.ok_or_else(|| Error::UnknownEnumValue {
                field: field.full_name().to_string(),
                enum_name: enum_desc.full_name().to_string(),
                value: enum_value_text(value),
            })?;
            Some(Value::EnumNumber(member.number()))
        }
        Kind::Message(message_desc) => {
            if value.as_map().is_none() {
                return Err(mismatch_kind(field, kind, value));
            }
            let mut nested = source.new_message(message_desc);
            encode_into(&mut nested, value, source)?;
            Some(Value::Message(nested))
        }
    };

    converted.ok_or_else(|| mismatch_kind(field, kind, value))
}

fn enum_value_text(value: &GenericValue) -> String {
    match value {
        GenericValue::Symbol(s) | GenericValue::String(s) => s.clone(),
        GenericValue::Int(i) => i.to_string(),
        GenericValue::UInt(u) => u.to_string(),
        other => other.type_name().to_string(),
    }
}

fn mismatch(field: &FieldDescriptor, expected: &str, found: &GenericValue) -> Error {
    Error::TypeMismatch {
        field: field.full_name().to_string(),
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
}

fn mismatch_kind(field: &FieldDescriptor, kind: &Kind, found: &GenericValue) -> Error {
    let found = match found {
        GenericValue::Int(i) => format!("int {i}"),
        GenericValue::UInt(u) => format!("uint {u}"),
        other => other.type_name().to_string(),
    };
    Error::TypeMismatch {
        field: field.full_name().to_string(),
        expected: kind_name(kind),
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;
    use crate::value::ValueMap;

    fn desc(name: &str) -> MessageDescriptor {
        SchemaRegistry::with_builtin()
            .expect("builtin descriptors should load")
            .resolve(name)
            .expect("sample type should be compiled in")
    }

    fn scalars(field: &str, value: impl Into<GenericValue>) -> Result<DynamicMessage> {
        encode(
            &desc("bridge.samples.Scalars"),
            &GenericValue::message([(field, value.into())]),
        )
    }

    #[test]
    fn unknown_field_names_the_message_and_field() {
        let err = encode(
            &desc("bridge.samples.Person"),
            &GenericValue::message([("name", "Ada"), ("nickname", "Ace")]),
        )
        .expect_err("nickname is not declared");
        match err {
            Error::UnknownField { message, field } => {
                assert_eq!(message, "bridge.samples.Person");
                assert_eq!(field, "nickname");
            }
            other => panic!("expected unknown field, got {other:?}"),
        }
    }

    #[test]
    fn non_mapping_values_are_rejected() {
        let err = encode(&desc("bridge.samples.Person"), &GenericValue::from(5))
            .expect_err("a message needs a mapping");
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn null_leaves_the_field_unset() {
        let person = desc("bridge.samples.Person");
        let message = encode(
            &person,
            &GenericValue::message([("name", GenericValue::Null)]),
        )
        .expect("null should be accepted");
        let field = person.get_field_by_name("name").expect("name field");
        assert!(!message.has_field(&field));
    }

    #[test]
    fn integer_ranges_follow_the_declared_kind() {
        assert!(scalars("int32_value", i64::from(i32::MAX)).is_ok());
        assert!(matches!(
            scalars("int32_value", i64::from(i32::MAX) + 1),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(scalars("int32_value", 5u64).is_ok());
        assert!(matches!(
            scalars("uint32_value", -1i64),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(scalars("uint64_value", u64::MAX).is_ok());
        assert!(matches!(
            scalars("int64_value", u64::MAX),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(scalars("sint64_value", i64::MIN).is_ok());
    }

    #[test]
    fn scalar_kinds_do_not_coerce() {
        assert!(matches!(
            scalars("int32_value", "five"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            scalars("string_value", 5),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            scalars("double_value", 1),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            scalars("bool_value", 1),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            scalars("bytes_value", "raw"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn float_fields_require_f32_precision() {
        assert!(scalars("float_value", 0.5f64).is_ok());
        assert!(scalars("float_value", f64::INFINITY).is_ok());
        assert!(scalars("float_value", f64::NAN).is_ok());
        assert!(matches!(
            scalars("float_value", 0.1f64),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn enums_accept_names_and_declared_numbers() {
        assert!(scalars("color", GenericValue::symbol("GREEN")).is_ok());
        assert!(scalars("color", "BLUE").is_ok());
        assert!(scalars("color", 1).is_ok());
        assert!(matches!(
            scalars("color", GenericValue::symbol("PURPLE")),
            Err(Error::UnknownEnumValue { ref value, .. }) if value == "PURPLE"
        ));
        assert!(matches!(
            scalars("color", 42),
            Err(Error::UnknownEnumValue { ref enum_name, .. }) if enum_name == "bridge.samples.Color"
        ));
    }

    #[test]
    fn map_keys_are_converted_to_the_declared_kind() {
        let maps = desc("bridge.samples.Maps");
        let mut labels = ValueMap::new();
        labels.insert(MapKey::Int(7), "seven".into());
        assert!(encode(&maps, &GenericValue::message([("labels", labels)])).is_ok());

        let mut wrong = ValueMap::new();
        wrong.insert(MapKey::from("seven"), "seven".into());
        assert!(matches!(
            encode(&maps, &GenericValue::message([("labels", wrong)])),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn keys_that_collide_after_conversion_are_rejected() {
        let maps = desc("bridge.samples.Maps");
        let mut labels = ValueMap::new();
        labels.insert(MapKey::Int(7), "signed".into());
        labels.insert(MapKey::UInt(7), "unsigned".into());
        assert_eq!(labels.len(), 2);

        match encode(&maps, &GenericValue::message([("labels", labels)])) {
            Err(Error::TypeMismatch { field, found, .. }) => {
                assert_eq!(field, "bridge.samples.Maps.labels[7]");
                assert_eq!(found, "duplicate key");
            }
            other => panic!("expected duplicate key mismatch, got {other:?}"),
        }
    }

    #[test]
    fn two_members_of_one_oneof_conflict() {
        let err = encode(
            &desc("bridge.samples.Envelope"),
            &GenericValue::message([
                ("note", GenericValue::from("hi")),
                ("person", GenericValue::message([("name", "Ada")])),
            ]),
        )
        .expect_err("two oneof members");
        match err {
            Error::OneofConflict { first, second, .. } => {
                assert_eq!(first, "note");
                assert_eq!(second, "person");
            }
            other => panic!("expected oneof conflict, got {other:?}"),
        }
    }

    #[test]
    fn proto3_optional_is_not_a_oneof_conflict() {
        let message = scalars("maybe_count", 0).expect("optional field should encode");
        let field = message
            .descriptor()
            .get_field_by_name("maybe_count")
            .expect("maybe_count field");
        assert!(message.has_field(&field));
    }

    #[test]
    fn repeated_elements_are_checked_individually() {
        let repeated = desc("bridge.samples.Repeated");
        let err = encode(
            &repeated,
            &GenericValue::message([(
                "numbers",
                GenericValue::List(vec![1.into(), "two".into()]),
            )]),
        )
        .expect_err("second element is a string");
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
