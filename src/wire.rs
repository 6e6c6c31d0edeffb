//! Wire format transcoding and message files.
//!
//! A message file holds the wire bytes of exactly one message with no header
//! or length prefix; the reader supplies the type name.

use crate::decode::decode;
use crate::encode::encode;
use crate::error::{Error, Result};
use crate::value::GenericValue;
use nom::{
    bytes::complete::take,
    error::{Error as NomError, ErrorKind},
    IResult,
};
use prost::Message;
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MessageDescriptor, ReflectMessage};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

const MAX_DEPTH: usize = 100;

/// Serialize a message, fields in field-number order.
pub fn serialize(message: &DynamicMessage) -> Vec<u8> {
    message.encode_to_vec()
}

/// Parse wire bytes as a message of type `desc`.
///
/// Field numbers unknown to `desc` are retained and written back out by
/// [`serialize`].
pub fn deserialize(desc: &MessageDescriptor, bytes: &[u8]) -> Result<DynamicMessage> {
    let mut message = DynamicMessage::new(desc.clone());
    merge_into(&mut message, bytes)?;
    Ok(message)
}

pub(crate) fn merge_into(message: &mut DynamicMessage, bytes: &[u8]) -> Result<()> {
    message.merge(bytes).map_err(|e| {
        let desc = message.descriptor();
        Error::Parse {
            type_name: desc.full_name().to_string(),
            offset: locate_malformed(&desc, bytes),
            message: e.to_string(),
        }
    })
}

/// Encode `value` and atomically replace `path` with its wire bytes.
pub fn save(desc: &MessageDescriptor, value: &GenericValue, path: &Path) -> Result<()> {
    let message = encode(desc, value)?;
    let bytes = serialize(&message);
    write_atomic(path, &bytes)?;
    debug!(
        type_name = desc.full_name(),
        path = %path.display(),
        bytes = bytes.len(),
        "saved message"
    );
    Ok(())
}

/// Read `path` and decode it as a message of type `desc`.
pub fn load(desc: &MessageDescriptor, path: &Path) -> Result<GenericValue> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let message = deserialize(desc, &bytes)?;
    debug!(
        type_name = desc.full_name(),
        path = %path.display(),
        bytes = bytes.len(),
        "loaded message"
    );
    Ok(decode(&message))
}

/// Write through a temporary file in the target directory, fsync, then
/// rename over `path`. Readers see either the old or the new contents.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Byte offset of the first top-level record of `bytes` that is not valid
/// for `desc`, if any.
///
/// Records are checked for structure (tags, varints, lengths, groups) and,
/// for fields `desc` declares, for a wire type matching the field kind,
/// UTF-8 strings and well-formed nested messages.
pub(crate) fn locate_malformed(desc: &MessageDescriptor, bytes: &[u8]) -> Option<usize> {
    let mut input = bytes;
    while !input.is_empty() {
        let offset = bytes.len() - input.len();
        match record(desc, input, 0) {
            Ok((rest, ())) => input = rest,
            Err(_) => return Some(offset),
        }
    }
    None
}

fn well_formed(desc: &MessageDescriptor, mut input: &[u8], depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return false;
    }
    while !input.is_empty() {
        match record(desc, input, depth) {
            Ok((rest, ())) => input = rest,
            Err(_) => return false,
        }
    }
    true
}

fn record<'a>(desc: &MessageDescriptor, input: &'a [u8], depth: usize) -> IResult<&'a [u8], ()> {
    let (rest, (number, wire_type)) = parse_tag(input)?;
    let (rest, payload) = skip_value(rest, number, wire_type, depth)?;
    match desc.get_field(number) {
        Some(field) if !field_accepts(&field, wire_type, payload, depth) => fail(input),
        _ => Ok((rest, ())),
    }
}

fn field_accepts(field: &FieldDescriptor, wire_type: u8, payload: &[u8], depth: usize) -> bool {
    let kind = field.kind();
    match (wire_type, &kind) {
        (2, Kind::Message(nested)) => well_formed(nested, payload, depth + 1),
        (3, Kind::Message(_)) => field.is_group(),
        (2, Kind::String) => std::str::from_utf8(payload).is_ok(),
        (2, Kind::Bytes) => true,
        (2, _) => field.is_list() && packed_well_formed(&kind, payload),
        (wire_type, _) => scalar_wire_type(&kind) == Some(wire_type),
    }
}

fn scalar_wire_type(kind: &Kind) -> Option<u8> {
    match kind {
        Kind::Int32
        | Kind::Int64
        | Kind::Uint32
        | Kind::Uint64
        | Kind::Sint32
        | Kind::Sint64
        | Kind::Bool
        | Kind::Enum(_) => Some(0),
        Kind::Fixed64 | Kind::Sfixed64 | Kind::Double => Some(1),
        Kind::Fixed32 | Kind::Sfixed32 | Kind::Float => Some(5),
        Kind::String | Kind::Bytes | Kind::Message(_) => None,
    }
}

fn packed_well_formed(kind: &Kind, mut payload: &[u8]) -> bool {
    match scalar_wire_type(kind) {
        Some(0) => {
            while !payload.is_empty() {
                match parse_varint(payload) {
                    Ok((rest, _)) => payload = rest,
                    Err(_) => return false,
                }
            }
            true
        }
        Some(1) => payload.len() % 8 == 0,
        Some(5) => payload.len() % 4 == 0,
        _ => false,
    }
}

fn fail<T>(input: &[u8]) -> IResult<&[u8], T> {
    Err(nom::Err::Error(NomError::new(input, ErrorKind::Verify)))
}

fn parse_tag(input: &[u8]) -> IResult<&[u8], (u32, u8)> {
    let (rest, tag) = parse_varint(input)?;
    let number = tag >> 3;
    if number == 0 || number > 0x1FFF_FFFF {
        return fail(input);
    }
    Ok((rest, (number as u32, (tag & 0x07) as u8)))
}

/// Skip one value, returning the payload of length-delimited records.
fn skip_value(input: &[u8], number: u32, wire_type: u8, depth: usize) -> IResult<&[u8], &[u8]> {
    match wire_type {
        0 => {
            let (rest, _) = parse_varint(input)?;
            Ok((rest, &rest[..0]))
        }
        1 => {
            let (rest, _) = take_bytes(input, 8)?;
            Ok((rest, &rest[..0]))
        }
        2 => {
            let (rest, len) = parse_varint(input)?;
            let Ok(len) = usize::try_from(len) else {
                return fail(input);
            };
            take_bytes(rest, len)
        }
        3 => skip_group(input, number, depth + 1),
        5 => {
            let (rest, _) = take_bytes(input, 4)?;
            Ok((rest, &rest[..0]))
        }
        _ => fail(input),
    }
}

fn take_bytes(input: &[u8], count: usize) -> IResult<&[u8], &[u8]> {
    take(count)(input)
}

fn skip_group(mut input: &[u8], number: u32, depth: usize) -> IResult<&[u8], &[u8]> {
    if depth > MAX_DEPTH {
        return fail(input);
    }
    let start = input;
    loop {
        let (rest, (inner, wire_type)) = parse_tag(input)?;
        if wire_type == 4 {
            if inner != number {
                return fail(input);
            }
            let consumed = start.len() - input.len();
            return Ok((rest, &start[..consumed]));
        }
        let (rest, _) = skip_value(rest, inner, wire_type, depth)?;
        input = rest;
    }
}

fn parse_varint(input: &[u8]) -> IResult<&[u8], u64> {
    let mut value: u64 = 0;
    for (i, byte) in input.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((&input[i + 1..], value));
        }
    }
    Err(nom::Err::Error(NomError::new(input, ErrorKind::TooLarge)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaRegistry;

    fn desc(name: &str) -> MessageDescriptor {
        SchemaRegistry::with_builtin()
            .expect("builtin descriptors should load")
            .resolve(name)
            .expect("sample type should be compiled in")
    }

    #[test]
    fn serialized_bytes_parse_back_to_an_equal_message() {
        let person = desc("bridge.samples.Person");
        let value = GenericValue::message([
            ("name", GenericValue::from("Ada")),
            ("age", GenericValue::from(36)),
            ("emails", GenericValue::List(vec!["ada@example.com".into()])),
        ]);
        let message = encode(&person, &value).expect("encode");
        let bytes = serialize(&message);
        let parsed = deserialize(&person, &bytes).expect("bytes should parse");
        assert_eq!(parsed, message);
        assert_eq!(decode(&parsed), value);
    }

    #[test]
    fn fields_are_written_in_number_order() {
        let person = desc("bridge.samples.Person");
        let value = GenericValue::message([("age", GenericValue::from(1)), ("name", "A".into())]);
        let bytes = serialize(&encode(&person, &value).expect("encode"));
        assert_eq!(bytes, [0x0A, 0x01, b'A', 0x10, 0x01]);
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let person = desc("bridge.samples.Person");
        // name = "Ada", then field 99 (varint) = 1
        let bytes = [0x0A, 0x03, b'A', b'd', b'a', 0x98, 0x06, 0x01];
        let message = deserialize(&person, &bytes).expect("unknown fields are not errors");
        assert_eq!(decode(&message), GenericValue::message([("name", "Ada")]));
        assert_eq!(serialize(&message), bytes);
    }

    #[test]
    fn truncated_input_reports_the_failing_record() {
        let person = desc("bridge.samples.Person");
        // complete name record, then an age tag with no value
        let err = deserialize(&person, &[0x0A, 0x01, b'A', 0x10]).expect_err("truncated");
        match err {
            Error::Parse {
                type_name, offset, ..
            } => {
                assert_eq!(type_name, "bridge.samples.Person");
                assert_eq!(offset, Some(3));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn scanner_flags_wire_type_and_utf8_problems() {
        let person = desc("bridge.samples.Person");
        // name sent as a varint
        assert_eq!(
            locate_malformed(&person, &[0x0A, 0x01, b'A', 0x08, 0x01]),
            Some(3)
        );
        // name holding invalid UTF-8
        assert_eq!(locate_malformed(&person, &[0x0A, 0x01, 0xFF]), Some(0));
        // field number zero
        assert_eq!(locate_malformed(&person, &[0x00, 0x01]), Some(0));
        // malformed nested address is attributed to the outer record
        assert_eq!(
            locate_malformed(&person, &[0x10, 0x01, 0x22, 0x02, 0x0A, 0x05]),
            Some(2)
        );
        assert_eq!(locate_malformed(&person, &[0x0A, 0x01, b'A']), None);
    }

    #[test]
    fn scanner_accepts_packed_repeated_scalars_and_groups() {
        let repeated = desc("bridge.samples.Repeated");
        // numbers packed: [1, 300]
        assert_eq!(
            locate_malformed(&repeated, &[0x0A, 0x03, 0x01, 0xAC, 0x02]),
            None
        );
        // unknown group 9 containing a varint, closed by its end tag
        assert_eq!(
            locate_malformed(&repeated, &[0x4B, 0x08, 0x01, 0x4C]),
            None
        );
        // group closed with the wrong field number
        assert_eq!(
            locate_malformed(&repeated, &[0x4B, 0x08, 0x01, 0x54]),
            Some(0)
        );
    }

    #[test]
    fn save_replaces_the_file_without_leaving_temporaries() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("person.bin");
        let person = desc("bridge.samples.Person");

        save(&person, &GenericValue::message([("name", "First")]), &path).expect("first save");
        let value = GenericValue::message([("name", "Second")]);
        save(&person, &value, &path).expect("second save");

        assert_eq!(load(&person, &path).expect("load"), value);
        let entries: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("dir entry").file_name())
            .collect();
        assert_eq!(entries, [std::ffi::OsString::from("person.bin")]);
    }

    #[test]
    fn failed_encode_leaves_the_existing_file_alone() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("person.bin");
        let person = desc("bridge.samples.Person");
        let original = GenericValue::message([("name", "Kept")]);
        save(&person, &original, &path).expect("save");

        let bad = GenericValue::message([("nickname", "Ace")]);
        assert!(save(&person, &bad, &path).is_err());
        assert_eq!(load(&person, &path).expect("load"), original);
    }

    #[test]
    fn loading_a_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.bin");
        let err = load(&desc("bridge.samples.Person"), &path).expect_err("missing file");
        assert!(matches!(err, Error::Io { path: ref p, .. } if p == &path));
    }
}
