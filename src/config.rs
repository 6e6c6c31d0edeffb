//! Bridge configuration.
//!
//! Nothing here is read implicitly; callers build a [`BridgeConfig`] and
//! apply it to a registry.

use crate::arena::Allocation;
use crate::registry::SchemaRegistry;
use std::ffi::OsString;
use std::path::PathBuf;

/// Directories searched for imports, platform path-list syntax.
pub const IMPORT_PATH_VAR: &str = "PROTOBRIDGE_IMPORT_PATH";
/// `1` or `true` selects arena allocation.
pub const ARENA_VAR: &str = "PROTOBRIDGE_ARENA";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    pub import_paths: Vec<PathBuf>,
    pub allocation: Allocation,
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var_os(IMPORT_PATH_VAR),
            std::env::var(ARENA_VAR).ok(),
        )
    }

    fn from_vars(import_path: Option<OsString>, arena: Option<String>) -> Self {
        let import_paths = import_path
            .map(|paths| {
                std::env::split_paths(&paths)
                    .filter(|path| !path.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let allocation = match arena.as_deref().map(str::trim) {
            Some("1") => Allocation::Arena,
            Some(flag) if flag.eq_ignore_ascii_case("true") => Allocation::Arena,
            _ => Allocation::Heap,
        };
        BridgeConfig {
            import_paths,
            allocation,
        }
    }

    pub fn with_import_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.import_paths.push(path.into());
        self
    }

    pub fn with_allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = allocation;
        self
    }

    /// Append the configured import paths to `registry`, in order.
    pub fn apply(&self, registry: &mut SchemaRegistry) {
        for path in &self.import_paths {
            registry.add_import_path(path.clone());
        }
    }
}
