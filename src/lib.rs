//! Runtime protobuf schema registry and generic value conversion.
//!
//! This crate provides:
//! - A schema registry seeded with compiled-in types and grown at runtime by
//!   importing `.proto` files (`registry`, `importer`)
//! - Reflection-driven conversion between [`GenericValue`] and protobuf
//!   messages (`encode`, `decode`), optionally inside an [`Arena`]
//! - Wire format and message file transcoding (`wire`)
//! - Schema dumps (`describe`), a JSON adapter (`json`) and configuration
//!   (`config`)
//! - Compiled sample types (`pb`)
//!
//! The free functions below operate on the process-wide registry.
//!
//! # Usage
//!
//! ```no_run
//! use protobridge::{Allocation, GenericValue};
//!
//! protobridge::add_import_path("protos")?;
//! protobridge::import_proto_file("person.proto")?;
//!
//! let person = GenericValue::message([("name", "Ada")]);
//! let bytes = protobridge::serialize_to_bytes("Person", &person, Allocation::Heap)?;
//! let back = protobridge::parse_from_bytes("Person", &bytes, Allocation::Arena)?;
//! assert_eq!(back, person);
//! # Ok::<(), protobridge::Error>(())
//! ```

pub mod pb {
    include!(concat!(env!("OUT_DIR"), "/bridge.samples.rs"));
}

pub mod arena;
pub mod config;
pub mod decode;
pub mod describe;
pub mod encode;
pub mod error;
pub mod importer;
pub mod json;
pub mod registry;
pub mod value;
pub mod wire;

use std::path::{Path, PathBuf};

pub use arena::{Allocation, Arena, MessageId};
pub use config::BridgeConfig;
pub use error::{Error, ImportDiagnostic, Result, Severity};
pub use prost_reflect::{DynamicMessage, MessageDescriptor};
pub use registry::SchemaRegistry;
pub use value::{GenericValue, MapKey, ValueMap};

/// Initialize the process-wide registry with the compiled-in types.
///
/// Every other function initializes it on first use; calling this up front
/// only moves the cost and surfaces a broken descriptor set early.
pub fn init() -> Result<()> {
    registry::global().map(|_| ())
}

/// Apply `config`'s import paths to the process-wide registry.
pub fn configure(config: &BridgeConfig) -> Result<()> {
    config.apply(&mut *registry::write()?);
    Ok(())
}

/// Crate version as `major * 1_000_000 + minor * 1_000 + patch`.
pub fn version() -> u32 {
    let part = |text: &str| text.parse::<u32>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 1_000_000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 1_000
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Resolve a fully-qualified message type name.
pub fn resolve_type(type_name: &str) -> Result<MessageDescriptor> {
    registry::resolve_global(type_name)
}

/// Encode `value` as `type_name` and serialize it.
pub fn serialize_to_bytes(
    type_name: &str,
    value: &GenericValue,
    allocation: Allocation,
) -> Result<Vec<u8>> {
    let desc = resolve_type(type_name)?;
    match allocation {
        Allocation::Heap => Ok(wire::serialize(&encode::encode(&desc, value)?)),
        Allocation::Arena => arena::scoped(|arena| {
            let id = arena.encode(&desc, value)?;
            Ok(wire::serialize(&arena[id]))
        }),
    }
}

/// Parse `bytes` as `type_name` and decode the message.
pub fn parse_from_bytes(
    type_name: &str,
    bytes: &[u8],
    allocation: Allocation,
) -> Result<GenericValue> {
    let desc = resolve_type(type_name)?;
    match allocation {
        Allocation::Heap => Ok(decode::decode(&wire::deserialize(&desc, bytes)?)),
        Allocation::Arena => arena::scoped(|arena| {
            let id = arena.parse(&desc, bytes)?;
            Ok(decode::decode(&arena[id]))
        }),
    }
}

/// Atomically write `value` to `path` as the wire bytes of one `type_name`.
pub fn save_to_file(type_name: &str, path: impl AsRef<Path>, value: &GenericValue) -> Result<()> {
    let desc = resolve_type(type_name)?;
    wire::save(&desc, value, path.as_ref())
}

pub fn load_from_file(type_name: &str, path: impl AsRef<Path>) -> Result<GenericValue> {
    let desc = resolve_type(type_name)?;
    wire::load(&desc, path.as_ref())
}

/// Schema text for `type_name`, for debugging.
pub fn describe_schema(type_name: &str) -> Result<String> {
    registry::read()?.describe(type_name)
}

/// Append a directory to the process-wide import search list.
pub fn add_import_path(path: impl Into<PathBuf>) -> Result<()> {
    registry::write()?.add_import_path(path);
    Ok(())
}

/// Import a `.proto` file by bare name; returns the newly registered types.
pub fn import_proto_file(filename: &str) -> Result<Vec<String>> {
    registry::write()?.import_file(filename)
}

/// Message types added by imports, compiled-in types excluded.
pub fn list_imported_types() -> Result<Vec<String>> {
    Ok(registry::read()?.list_imported().to_vec())
}
