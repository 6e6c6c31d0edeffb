//! Schema registry: compiled-in and imported message descriptors.
//!
//! The registry owns a single [`DescriptorPool`] that only ever grows. The
//! compiled-in types are loaded from the descriptor set produced by
//! `build.rs`; `.proto` files imported at runtime are compiled into a
//! candidate pool first and swapped in only when the whole import is valid,
//! so a failed import never leaves partially registered types behind.
//!
//! A process-wide instance is available through [`global`]. It is created
//! lazily on first use and guarded by a `RwLock`: imports and import path
//! changes take the write lock, lookups take the read lock and clone the
//! (reference counted) descriptor out before any conversion work happens.

use crate::describe;
use crate::error::{Error, Result};
use crate::importer;
use prost_reflect::{DescriptorPool, MessageDescriptor};
use prost_types::{DescriptorProto, FileDescriptorProto, FileDescriptorSet};
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

const BUILTIN_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/builtin_descriptor.bin"));

static REGISTRY: OnceLock<RwLock<SchemaRegistry>> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    pool: DescriptorPool,
    import_paths: Vec<PathBuf>,
    imported_files: Vec<String>,
    imported_types: Vec<String>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// An empty registry with no compiled-in types.
    pub fn new() -> Self {
        SchemaRegistry {
            pool: DescriptorPool::new(),
            import_paths: Vec::new(),
            imported_files: Vec::new(),
            imported_types: Vec::new(),
        }
    }

    /// A registry seeded with the types compiled into this crate.
    pub fn with_builtin() -> Result<Self> {
        let pool = DescriptorPool::decode(BUILTIN_DESCRIPTOR_SET)
            .map_err(|e| Error::Descriptor(e.to_string()))?;
        debug!(
            files = pool.files().len(),
            "loaded compiled-in descriptor set"
        );
        Ok(SchemaRegistry {
            pool,
            ..Self::new()
        })
    }

    /// A compiled-in registry with one import path already configured.
    pub fn with_import_path(path: impl AsRef<Path>) -> Result<Self> {
        let mut registry = Self::with_builtin()?;
        registry.add_import_path(path.as_ref());
        Ok(registry)
    }

    /// Resolve a fully-qualified message type name.
    pub fn resolve(&self, type_name: &str) -> Result<MessageDescriptor> {
        self.pool
            .get_message_by_name(type_name)
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.pool.get_message_by_name(type_name).is_some()
    }

    /// Formatted schema of `type_name`, for debugging only.
    pub fn describe(&self, type_name: &str) -> Result<String> {
        self.resolve(type_name).map(|desc| describe::describe(&desc))
    }

    /// Message types registered by imports, in import order.
    ///
    /// Compiled-in types never appear here.
    pub fn list_imported(&self) -> &[String] {
        &self.imported_types
    }

    pub fn import_paths(&self) -> &[PathBuf] {
        &self.import_paths
    }

    /// Append a directory to the import search list.
    ///
    /// Duplicates are kept; directories are searched in the order added.
    pub fn add_import_path(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(path = %path.display(), "added proto import path");
        self.import_paths.push(path);
    }

    /// Import a `.proto` file by bare name, searching the import paths.
    ///
    /// Returns the message types newly registered by the file and any of its
    /// dependencies that were not loaded before.
    pub fn import_file(&mut self, filename: &str) -> Result<Vec<String>> {
        importer::validate_filename(filename)?;

        if self.has_file(filename) {
            let type_name = self
                .pool
                .get_file_by_name(filename)
                .and_then(|file| file.messages().next())
                .map(|message| message.full_name().to_string())
                .unwrap_or_else(|| filename.to_string());
            return Err(Error::DuplicateType {
                file: filename.to_string(),
                type_name,
            });
        }

        let files =
            match importer::compile(self.file_descriptor_set(), &self.import_paths, filename) {
                Ok(files) => files,
                Err(err @ Error::Import { .. }) => {
                    return Err(self.redeclared_type(filename).unwrap_or(err))
                }
                Err(err) => return Err(err),
            };
        let registered = self.register(files)?;
        debug!(
            file = filename,
            types = registered.len(),
            "imported proto file"
        );
        Ok(registered)
    }

    fn has_type(&self, type_name: &str) -> bool {
        self.pool.get_message_by_name(type_name).is_some()
            || self.pool.get_enum_by_name(type_name).is_some()
    }

    /// The first name `filename` declares that is already registered.
    ///
    /// The compiler reports such a clash as an ordinary import failure when
    /// the file also imports the declaring file.
    fn redeclared_type(&self, filename: &str) -> Option<Error> {
        let file = importer::parse_declarations(&self.import_paths, filename)?;
        declared_names(&file)
            .into_iter()
            .find(|type_name| self.has_type(type_name))
            .map(|type_name| Error::DuplicateType {
                file: filename.to_string(),
                type_name,
            })
    }

    pub(crate) fn has_file(&self, name: &str) -> bool {
        self.pool.get_file_by_name(name).is_some()
    }

    pub(crate) fn file_descriptor_set(&self) -> FileDescriptorSet {
        FileDescriptorSet {
            file: self.pool.file_descriptor_protos().cloned().collect(),
        }
    }

    /// Add compiled files to the registry.
    ///
    /// Files already present by name are skipped. Any message or enum name
    /// that is already registered fails the whole batch with
    /// [`Error::DuplicateType`] and leaves the registry untouched.
    pub(crate) fn register(&mut self, files: Vec<FileDescriptorProto>) -> Result<Vec<String>> {
        let new_files: Vec<FileDescriptorProto> = files
            .into_iter()
            .filter(|file| !self.has_file(file.name()))
            .collect();

        for file in &new_files {
            for type_name in declared_names(file) {
                if self.has_type(&type_name) {
                    return Err(Error::DuplicateType {
                        file: file.name().to_string(),
                        type_name,
                    });
                }
            }
        }

        let mut candidate = self.pool.clone();
        candidate
            .add_file_descriptor_protos(new_files.iter().cloned())
            .map_err(|e| Error::Descriptor(e.to_string()))?;

        let mut registered = Vec::new();
        for file in &new_files {
            if let Some(descriptor) = candidate.get_file_by_name(file.name()) {
                for message in descriptor.messages() {
                    collect_message_names(&message, &mut registered);
                }
            }
        }

        self.pool = candidate;
        self.imported_files
            .extend(new_files.iter().map(|file| file.name().to_string()));
        self.imported_types.extend(registered.iter().cloned());
        Ok(registered)
    }

    /// Files registered by imports, in registration order.
    pub fn imported_files(&self) -> &[String] {
        &self.imported_files
    }
}

fn collect_message_names(message: &MessageDescriptor, out: &mut Vec<String>) {
    if message.is_map_entry() {
        return;
    }
    out.push(message.full_name().to_string());
    for child in message.child_messages() {
        collect_message_names(&child, out);
    }
}

/// Fully-qualified names of every message and enum declared in `file`.
fn declared_names(file: &FileDescriptorProto) -> Vec<String> {
    let prefix = file.package();
    let mut names = Vec::new();
    for message in &file.message_type {
        declared_message_names(prefix, message, &mut names);
    }
    for enum_type in &file.enum_type {
        names.push(qualify(prefix, enum_type.name()));
    }
    names
}

fn declared_message_names(prefix: &str, message: &DescriptorProto, out: &mut Vec<String>) {
    let full_name = qualify(prefix, message.name());
    for nested in &message.nested_type {
        declared_message_names(&full_name, nested, out);
    }
    for enum_type in &message.enum_type {
        out.push(qualify(&full_name, enum_type.name()));
    }
    out.push(full_name);
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// The process-wide registry, created on first use.
pub fn global() -> Result<&'static RwLock<SchemaRegistry>> {
    if let Some(registry) = REGISTRY.get() {
        return Ok(registry);
    }
    let registry = SchemaRegistry::with_builtin()?;
    Ok(REGISTRY.get_or_init(|| RwLock::new(registry)))
}

pub(crate) fn read() -> Result<RwLockReadGuard<'static, SchemaRegistry>> {
    global()?.read().map_err(|_| Error::Poisoned)
}

pub(crate) fn write() -> Result<RwLockWriteGuard<'static, SchemaRegistry>> {
    global()?.write().map_err(|_| Error::Poisoned)
}

/// Resolve `type_name` against the process-wide registry.
pub fn resolve_global(type_name: &str) -> Result<MessageDescriptor> {
    read()?.resolve(type_name)
}
