//! Error types for schema resolution, conversion, import and file transcoding.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the registry, the converter and the transcoder.
///
/// Every variant carries enough structure for a caller to build its own
/// report; `Display` is a one-line summary only.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("message '{message}' has no field named '{field}'")]
    UnknownField { message: String, field: String },

    #[error("type mismatch for '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("'{value}' is not a member of enum '{enum_name}' (field '{field}')")]
    UnknownEnumValue {
        field: String,
        enum_name: String,
        value: String,
    },

    #[error("oneof '{oneof}' has both '{first}' and '{second}' set")]
    OneofConflict {
        oneof: String,
        first: String,
        second: String,
    },

    #[error("failed to parse '{type_name}'{}: {message}", offset_suffix(.offset))]
    Parse {
        type_name: String,
        offset: Option<usize>,
        message: String,
    },

    #[error("failed to import '{file}' ({} diagnostic(s))", .diagnostics.len())]
    Import {
        file: String,
        diagnostics: Vec<ImportDiagnostic>,
    },

    #[error("'{type_name}' from '{file}' is already registered")]
    DuplicateType { file: String, type_name: String },

    #[error("invalid proto filename '{0}': add its directory with add_import_path instead")]
    InvalidFilename(String),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("descriptor error: {0}")]
    Descriptor(String),

    #[error("schema registry lock poisoned")]
    Poisoned,
}

/// Result type alias for protobridge operations.
pub type Result<T> = std::result::Result<T, Error>;

fn offset_suffix(offset: &Option<usize>) -> String {
    offset
        .map(|offset| format!(" at byte {offset}"))
        .unwrap_or_default()
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Diagnostics attached to an import failure, empty for every other kind.
    pub fn diagnostics(&self) -> &[ImportDiagnostic] {
        match self {
            Error::Import { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// One problem reported while compiling a `.proto` file.
///
/// `line` and `column` are 1-based and absent when the compiler could not
/// attribute the problem to a source location (for example a missing file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDiagnostic {
    pub file: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for ImportDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file)?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        write!(f, ": {}: {}", self.severity, self.message)
    }
}
