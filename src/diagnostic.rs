use crate::intern::StringId;
use crate::lexer::TokenKind;
use crate::source_manager::{SourceManager, SourceSpan};

/// Hard cap on reported errors. Reaching it aborts the compilation
/// with a single fatal diagnostic.
pub const MAX_ERRORS: usize = 32;

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Warning,
    Error,
    Fatal,
}

/// Individual diagnostic with rich context
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub location: SourceSpan,
    pub hints: Vec<String>, // Suggestions for fixing
}

/// Parse errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected token: expected {expected_tokens}, found {found:?}")]
    UnexpectedToken {
        expected_tokens: String,
        found: TokenKind,
        location: SourceSpan,
    },

    #[error("unexpected end of file")]
    UnexpectedEof { location: SourceSpan },

    #[error("{message}")]
    SyntaxError { message: String, location: SourceSpan },

    #[error("invalid integer constant: {text}")]
    InvalidIntegerConstant { text: String, location: SourceSpan },

    #[error("invalid float constant: {text}")]
    InvalidFloatConstant { text: String, location: SourceSpan },

    #[error("unknown character '{ch}'")]
    UnknownCharacter { ch: char, location: SourceSpan },

    #[error("unterminated string literal")]
    UnterminatedString { location: SourceSpan },

    #[error("unterminated character constant")]
    UnterminatedChar { location: SourceSpan },

    #[error("unterminated block comment")]
    UnterminatedComment { location: SourceSpan },
}

impl ParseError {
    pub fn location(&self) -> SourceSpan {
        match self {
            ParseError::UnexpectedToken { location, .. } => *location,
            ParseError::UnexpectedEof { location } => *location,
            ParseError::SyntaxError { location, .. } => *location,
            ParseError::InvalidIntegerConstant { location, .. } => *location,
            ParseError::InvalidFloatConstant { location, .. } => *location,
            ParseError::UnknownCharacter { location, .. } => *location,
            ParseError::UnterminatedString { location } => *location,
            ParseError::UnterminatedChar { location } => *location,
            ParseError::UnterminatedComment { location } => *location,
        }
    }
}

/// Semantic errors. Variants carrying a preformatted `previous` string
/// embed the earlier declaration's rendered location in the message.
#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    #[error("undeclared identifier '{name}'")]
    UndeclaredIdentifier { name: StringId, location: SourceSpan },

    #[error("redefinition of '{name}', previous definition at {previous}")]
    Redefinition {
        name: StringId,
        previous: String,
        location: SourceSpan,
    },

    #[error("redefinition of '{name}'")]
    LocalRedefinition { name: StringId, location: SourceSpan },

    #[error("conflicting types for '{name}', previous at {previous}")]
    ConflictingTypes {
        name: StringId,
        previous: String,
        location: SourceSpan,
    },

    #[error("static declaration of '{name}' follows non-static declaration")]
    StaticAfterNonStatic { name: StringId, location: SourceSpan },

    #[error("non-static declaration of '{name}' follows static declaration")]
    NonStaticAfterStatic { name: StringId, location: SourceSpan },

    #[error("use of '{name}' with tag type that does not match previous declaration '{previous_tag}' at {previous}")]
    TagKindMismatch {
        name: StringId,
        previous_tag: String,
        previous: String,
        location: SourceSpan,
    },

    #[error("variable has incomplete type '{type_name}'")]
    IncompleteVariable { type_name: String, location: SourceSpan },

    #[error("expect constant expression")]
    ExpectConstantExpression { location: SourceSpan },

    #[error("{operation} is not an lvalue")]
    NotLValue { operation: String, location: SourceSpan },

    #[error("{message}")]
    InvalidOperands { message: String, location: SourceSpan },

    /// Catch-all for the long tail of declaration and field checks.
    /// The message text is final, formatted at the report site.
    #[error("{message}")]
    Message { message: String, location: SourceSpan },
}

impl SemanticError {
    pub fn location(&self) -> SourceSpan {
        match self {
            SemanticError::UndeclaredIdentifier { location, .. } => *location,
            SemanticError::Redefinition { location, .. } => *location,
            SemanticError::LocalRedefinition { location, .. } => *location,
            SemanticError::ConflictingTypes { location, .. } => *location,
            SemanticError::StaticAfterNonStatic { location, .. } => *location,
            SemanticError::NonStaticAfterStatic { location, .. } => *location,
            SemanticError::TagKindMismatch { location, .. } => *location,
            SemanticError::IncompleteVariable { location, .. } => *location,
            SemanticError::ExpectConstantExpression { location } => *location,
            SemanticError::NotLValue { location, .. } => *location,
            SemanticError::InvalidOperands { location, .. } => *location,
            SemanticError::Message { location, .. } => *location,
        }
    }
}

/// Semantic warnings
#[derive(Debug, thiserror::Error)]
pub enum SemanticWarning {
    #[error("unused function '{name}'")]
    UnusedFunction { name: StringId, location: SourceSpan },

    #[error("unused variable '{name}'")]
    UnusedVariable { name: StringId, location: SourceSpan },

    #[error("{message}")]
    Message { message: String, location: SourceSpan },
}

impl SemanticWarning {
    pub fn location(&self) -> SourceSpan {
        match self {
            SemanticWarning::UnusedFunction { location, .. } => *location,
            SemanticWarning::UnusedVariable { location, .. } => *location,
            SemanticWarning::Message { location, .. } => *location,
        }
    }
}

/// Diagnostic engine for collecting and reporting errors and warnings.
///
/// Errors are counted against [`MAX_ERRORS`]. When the cap is hit, a single
/// fatal "Too many errors." diagnostic is recorded, later reports are
/// swallowed, and [`DiagnosticEngine::is_over_limit`] starts returning true
/// so the front end can stop at the next safe point.
pub struct DiagnosticEngine {
    pub diagnostics: Vec<Diagnostic>,
    pub warnings_as_errors: bool,
    error_count: usize,
    over_limit: bool,
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        DiagnosticEngine {
            diagnostics: Vec::new(),
            warnings_as_errors: false,
            error_count: 0,
            over_limit: false,
        }
    }

    fn push_error(&mut self, message: String, location: SourceSpan, hints: Vec<String>) {
        if self.over_limit {
            return;
        }
        self.diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Error,
            message,
            location,
            hints,
        });
        self.error_count += 1;
        if self.error_count >= MAX_ERRORS {
            self.over_limit = true;
            self.diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Fatal,
                message: "Too many errors.".to_string(),
                location: SourceSpan::empty(),
                hints: Vec::new(),
            });
        }
    }

    pub fn report_error(&mut self, error: SemanticError) {
        let location = error.location();
        self.push_error(error.to_string(), location, Vec::new());
    }

    pub fn report_parse_error(&mut self, error: ParseError) {
        let location = error.location();
        self.push_error(error.to_string(), location, Vec::new());
    }

    pub fn report_error_with_hint(&mut self, message: String, location: SourceSpan, hint: String) {
        self.push_error(message, location, vec![hint]);
    }

    pub fn report_warning(&mut self, warning: SemanticWarning) {
        if self.warnings_as_errors {
            let location = warning.location();
            self.push_error(warning.to_string(), location, Vec::new());
            return;
        }
        self.diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Warning,
            message: warning.to_string(),
            location: warning.location(),
            hints: Vec::new(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// True once the error cap has been reached. The front end checks this
    /// at declaration and statement boundaries and stops consuming input.
    pub fn is_over_limit(&self) -> bool {
        self.over_limit
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics ordered by source position. Reports with no real
    /// location (the fatal cap message) sort last.
    pub fn sorted_diagnostics(&self) -> Vec<&Diagnostic> {
        let mut sorted: Vec<&Diagnostic> = self.diagnostics.iter().collect();
        sorted.sort_by_key(|d| {
            let loc = d.location.start();
            let builtin = loc == crate::source_manager::SourceLoc::builtin();
            (builtin, loc.source_id.0.get(), loc.offset)
        });
        sorted
    }
}

/// Renders diagnostics in the `file:line:col: level: message` form.
pub struct ErrorFormatter {
    pub show_hints: bool,
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        ErrorFormatter { show_hints: true }
    }
}

impl ErrorFormatter {
    /// Format a single diagnostic
    pub fn format_diagnostic(&self, diag: &Diagnostic, source_manager: &SourceManager) -> String {
        let level_str = match diag.level {
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Error => "error",
            // Fatal diagnostics carry no location and no level prefix
            DiagnosticLevel::Fatal => return diag.message.clone(),
        };

        let mut result = String::new();
        let start = diag.location.start();
        if let Some((line, col)) = source_manager.get_line_column(start) {
            let filename = source_manager.get_file_name(start.source_id);
            result.push_str(&format!("{}:{}:{}: ", filename, line, col));
        }
        result.push_str(&format!("{}: {}", level_str, diag.message));

        if self.show_hints {
            for hint in &diag.hints {
                result.push_str(&format!("\n  hint: {}", hint));
            }
        }

        result
    }

    /// Format multiple diagnostics
    pub fn format_diagnostics(&self, diagnostics: &[&Diagnostic], source_manager: &SourceManager) -> String {
        diagnostics
            .iter()
            .map(|diag| self.format_diagnostic(diag, source_manager))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Print all diagnostics to stderr, in source order
    pub fn print_diagnostics(&self, engine: &DiagnosticEngine, source_manager: &SourceManager) {
        for diag in engine.sorted_diagnostics() {
            eprintln!("{}", self.format_diagnostic(diag, source_manager));
        }
    }
}
