//! Human-readable schema dumps.
//!
//! The output looks like `.proto` source but is meant for reading only; it
//! is not guaranteed to compile.

use prost_reflect::{
    Cardinality, EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor, OneofDescriptor,
};

const INDENT: &str = "  ";

/// Type name as it would appear in a field declaration.
pub(crate) fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".to_string(),
        Kind::Float => "float".to_string(),
        Kind::Int32 => "int32".to_string(),
        Kind::Int64 => "int64".to_string(),
        Kind::Uint32 => "uint32".to_string(),
        Kind::Uint64 => "uint64".to_string(),
        Kind::Sint32 => "sint32".to_string(),
        Kind::Sint64 => "sint64".to_string(),
        Kind::Fixed32 => "fixed32".to_string(),
        Kind::Fixed64 => "fixed64".to_string(),
        Kind::Sfixed32 => "sfixed32".to_string(),
        Kind::Sfixed64 => "sfixed64".to_string(),
        Kind::Bool => "bool".to_string(),
        Kind::String => "string".to_string(),
        Kind::Bytes => "bytes".to_string(),
        Kind::Message(message) => message.full_name().to_string(),
        Kind::Enum(enum_desc) => enum_desc.full_name().to_string(),
    }
}

/// Oneofs the compiler adds around proto3 `optional` fields.
pub(crate) fn is_synthetic_oneof(oneof: &OneofDescriptor) -> bool {
    oneof
        .fields()
        .any(|field| field.field_descriptor_proto().proto3_optional())
}

/// Dump `desc` with its fields, oneofs, nested messages and nested enums.
pub fn describe(desc: &MessageDescriptor) -> String {
    let mut out = String::new();
    write_message(&mut out, desc, desc.full_name(), 0);
    out
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(text);
    out.push('\n');
}

fn write_message(out: &mut String, desc: &MessageDescriptor, title: &str, depth: usize) {
    line(out, depth, &format!("message {title} {{"));

    let mut oneofs_written: Vec<String> = Vec::new();
    for field in desc.fields() {
        match field.containing_oneof().filter(|o| !is_synthetic_oneof(o)) {
            Some(oneof) => {
                if oneofs_written.iter().any(|name| name == oneof.name()) {
                    continue;
                }
                line(out, depth + 1, &format!("oneof {} {{", oneof.name()));
                for member in oneof.fields() {
                    line(out, depth + 2, &field_line(&member));
                }
                line(out, depth + 1, "}");
                oneofs_written.push(oneof.name().to_string());
            }
            None => line(out, depth + 1, &field_line(&field)),
        }
    }

    for nested in desc.child_messages().filter(|m| !m.is_map_entry()) {
        out.push('\n');
        write_message(out, &nested, nested.name(), depth + 1);
    }
    for nested in desc.child_enums() {
        out.push('\n');
        write_enum(out, &nested, depth + 1);
    }

    line(out, depth, "}");
}

fn field_line(field: &FieldDescriptor) -> String {
    let type_text = match field.kind() {
        Kind::Message(entry) if field.is_map() => format!(
            "map<{}, {}>",
            kind_name(&entry.map_entry_key_field().kind()),
            kind_name(&entry.map_entry_value_field().kind())
        ),
        kind => {
            let in_real_oneof = field
                .containing_oneof()
                .is_some_and(|oneof| !is_synthetic_oneof(&oneof));
            let label = if field.is_list() {
                "repeated "
            } else if field.cardinality() == Cardinality::Required {
                "required "
            } else if field.supports_presence()
                && !in_real_oneof
                && !matches!(kind, Kind::Message(_))
            {
                "optional "
            } else {
                ""
            };
            format!("{label}{}", kind_name(&kind))
        }
    };
    format!("{type_text} {} = {};", field.name(), field.number())
}

fn write_enum(out: &mut String, desc: &EnumDescriptor, depth: usize) {
    line(out, depth, &format!("enum {} {{", desc.name()));
    for value in desc.values() {
        line(
            out,
            depth + 1,
            &format!("{} = {};", value.name(), value.number()),
        );
    }
    line(out, depth, "}");
}
