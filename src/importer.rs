//! Compiles `.proto` files found on the import search path.
//!
//! Files are resolved in this order: files already held by the registry
//! (compiled-in or imported earlier), each import path in the order it was
//! added, and finally the bundled `google/protobuf/*.proto` well-known types.
//! Compiler failures are flattened into a list of [`ImportDiagnostic`]s so the
//! caller sees every problem from one call.

use crate::error::{Error, ImportDiagnostic, Result, Severity};
use miette::{Diagnostic, SourceCode};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use protox::file::{
    ChainFileResolver, DescriptorSetFileResolver, File, FileResolver, GoogleFileResolver,
};
use protox::Compiler;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Reject names that carry directory components.
///
/// Directories belong in the import path list so that an import resolves the
/// same way regardless of the caller's working directory.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Searches a list of directories, first match wins.
#[derive(Debug)]
struct SearchPathResolver {
    paths: Vec<PathBuf>,
}

impl FileResolver for SearchPathResolver {
    fn open_file(&self, name: &str) -> std::result::Result<File, protox::Error> {
        for dir in &self.paths {
            let candidate = dir.join(name);
            if candidate.is_file() {
                trace!(file = name, path = %candidate.display(), "resolved proto file");
                return File::open(name, &candidate);
            }
        }
        Err(protox::Error::file_not_found(name))
    }
}

/// Compile `filename` and everything it imports.
///
/// `registered` holds the files the registry already knows; they satisfy
/// imports without touching the disk and come back unchanged in the result.
pub(crate) fn compile(
    registered: FileDescriptorSet,
    import_paths: &[PathBuf],
    filename: &str,
) -> Result<Vec<FileDescriptorProto>> {
    let mut resolver = ChainFileResolver::new();
    resolver.add(DescriptorSetFileResolver::new(registered));
    resolver.add(SearchPathResolver {
        paths: import_paths.to_vec(),
    });
    resolver.add(GoogleFileResolver::new());

    let mut compiler = Compiler::with_file_resolver(resolver);
    compiler.include_imports(true).include_source_info(true);
    if let Err(err) = compiler.open_file(filename) {
        let diagnostics = collect_diagnostics(&err, filename, import_paths);
        debug!(
            file = filename,
            diagnostics = diagnostics.len(),
            "proto import failed"
        );
        return Err(Error::Import {
            file: filename.to_string(),
            diagnostics,
        });
    }

    Ok(compiler.file_descriptor_set().file)
}

/// Parse `filename` from the search path without resolving its imports.
///
/// Used after a failed compile to find out what the file tried to declare.
pub(crate) fn parse_declarations(
    import_paths: &[PathBuf],
    filename: &str,
) -> Option<FileDescriptorProto> {
    let resolver = SearchPathResolver {
        paths: import_paths.to_vec(),
    };
    resolver
        .open_file(filename)
        .ok()
        .map(|file| file.file_descriptor_proto().clone())
}

/// Flatten a compiler error and its related errors into diagnostics.
fn collect_diagnostics(
    err: &protox::Error,
    filename: &str,
    import_paths: &[PathBuf],
) -> Vec<ImportDiagnostic> {
    let source = err.source_code();

    let mut diagnostics = vec![to_diagnostic(err, source, filename, import_paths)];
    if let Some(related) = err.related() {
        for diag in related {
            let source = diag.source_code().or(source);
            diagnostics.push(to_diagnostic(diag, source, filename, import_paths));
        }
    }
    diagnostics
}

fn to_diagnostic(
    diag: &dyn Diagnostic,
    source: Option<&dyn SourceCode>,
    filename: &str,
    import_paths: &[PathBuf],
) -> ImportDiagnostic {
    let mut file = filename.to_string();
    let mut line = None;
    let mut column = None;

    if let Some(label) = diag.labels().and_then(|mut labels| labels.next()) {
        let from_source = source
            .and_then(|source| source.read_span(label.inner(), 0, 0).ok())
            .map(|contents| {
                (
                    contents.name().map(str::to_string),
                    contents.line() + 1,
                    contents.column() + 1,
                )
            });
        // Without attached source text, recover the position from the file on disk.
        let location = from_source.or_else(|| {
            read_from_search_path(import_paths, filename).map(|text| {
                let (line, column) = line_column(&text, label.offset());
                (None, line, column)
            })
        });
        if let Some((name, l, c)) = location {
            if let Some(name) = name {
                file = name;
            }
            line = Some(l);
            column = Some(c);
        }
    }

    let severity = match diag.severity() {
        Some(miette::Severity::Warning) | Some(miette::Severity::Advice) => Severity::Warning,
        _ => Severity::Error,
    };

    ImportDiagnostic {
        file,
        line,
        column,
        message: diag.to_string(),
        severity,
    }
}

fn read_from_search_path(import_paths: &[PathBuf], name: &str) -> Option<String> {
    import_paths
        .iter()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
        .and_then(|path| std::fs::read_to_string(path).ok())
}

/// 1-based line and column of a byte offset.
fn line_column(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let before = &text.as_bytes()[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);
    (line, offset - line_start + 1)
}
