//! Shared compilation state.
//!
//! Everything that outlives a single phase lives here and is threaded
//! through the pipeline by `&mut`. There are no ambient globals apart
//! from the string interner.

use crate::diagnostic::DiagnosticEngine;
use crate::semantic::{SymbolTable, TypeRegistry};
use crate::source_manager::{SourceManager, SourceSpan};

pub struct CompilationContext {
    pub sources: SourceManager,
    pub types: TypeRegistry,
    pub symbols: SymbolTable,
    pub diagnostics: DiagnosticEngine,
}

impl CompilationContext {
    pub fn new() -> Self {
        CompilationContext {
            sources: SourceManager::new(),
            types: TypeRegistry::new(),
            symbols: SymbolTable::new(),
            diagnostics: DiagnosticEngine::new(),
        }
    }

    /// Render a span as `file:line:col` for cross-referencing messages
    /// such as "previous definition at ...".
    pub fn format_location(&self, span: SourceSpan) -> String {
        let loc = span.start();
        match self.sources.get_line_column(loc) {
            Some((line, column)) => {
                format!("{}:{}:{}", self.sources.get_file_name(loc.source_id), line, column)
            }
            None => "<builtin>".to_string(),
        }
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new()
    }
}
