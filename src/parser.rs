//! Recursive-descent parser.
//!
//! The parser consumes the token stream produced by the lexer and builds
//! three things at once: the expression/statement arena in [`Ast`], the
//! symbol table inside the shared [`CompilationContext`], and the list of
//! function definitions in the returned [`TranslationUnit`]. Expressions
//! are typed as they are parsed, so conversions (`Conv`, `Decay`) appear
//! in the tree exactly where the language implies them.
//!
//! Declarations are the involved part of the grammar and live in their
//! own submodules: `type_specifiers` handles the specifier run,
//! `declarator` the pointer/array/function derivations, `declarations`
//! ties both together with the symbol table.
//!
//! Error handling follows one rule: a `ParseError` aborts the current
//! declaration or statement and bubbles to the nearest recovery point,
//! where it is reported and the stream is resynchronized. Diagnostics
//! that do not make the construct unparseable (duplicate specifiers,
//! bad array bounds) are reported in place and parsing continues.

pub mod declarations;
pub mod declarator;
pub mod expressions;
pub mod statements;
pub mod type_specifiers;

#[cfg(test)]
mod tests_parser;

use crate::ast::{Ast, TranslationUnit};
use crate::context::CompilationContext;
use crate::diagnostic::ParseError;
use crate::intern::StringId;
use crate::lexer::{Token, TokenKind};
use crate::semantic::validate;
use crate::semantic::{QualType, SymbolEntryRef};
use crate::source_manager::SourceSpan;

pub type ParseResult<T> = Result<T, ParseError>;

/// Parser state over one token stream.
///
/// The context and AST are borrowed mutably for the whole parse; all
/// submodule functions receive `&mut Parser` and reach through it.
pub struct Parser<'a> {
    ctx: &'a mut CompilationContext,
    ast: &'a mut Ast,
    tokens: &'a [Token],
    current_idx: usize,
    unit: TranslationUnit,

    /// Return type of the function whose body is being parsed
    return_type: Option<QualType>,
    /// Name of that function, for return-statement diagnostics
    function_name: Option<StringId>,
    /// Automatic variables of the current function, in declaration order
    locals: Vec<SymbolEntryRef>,
    /// Loop nesting depth, for `break` and `continue` placement
    loop_depth: u32,
    /// Parameter-list nesting depth while parsing declarators
    param_depth: u32,
}

impl<'a> Parser<'a> {
    pub fn new(ctx: &'a mut CompilationContext, ast: &'a mut Ast, tokens: &'a [Token]) -> Self {
        Parser {
            ctx,
            ast,
            tokens,
            current_idx: 0,
            unit: TranslationUnit::default(),
            return_type: None,
            function_name: None,
            locals: Vec::new(),
            loop_depth: 0,
            param_depth: 0,
        }
    }

    /// Parse the whole stream into a translation unit.
    ///
    /// External declarations are parsed one after another; a parse error
    /// inside one declaration is reported and the stream skips ahead to
    /// the next plausible declaration start. The loop also stops early
    /// when the diagnostic engine hits its error cap.
    pub fn parse_translation_unit(mut self) -> TranslationUnit {
        while !self.is_token(TokenKind::EndOfFile) {
            if self.ctx.diagnostics.is_over_limit() {
                break;
            }
            // A lone semicolon at file scope is tolerated
            if self.accept(TokenKind::Semicolon).is_some() {
                continue;
            }
            if self.starts_declaration() {
                if let Err(error) = declarations::parse_external_declaration(&mut self) {
                    self.ctx.diagnostics.report_parse_error(error);
                    self.synchronize();
                }
            } else {
                let message = format!("invalid token '{}' in declaration", self.current_text());
                let location = self.current_span();
                self.ctx
                    .diagnostics
                    .report_parse_error(ParseError::SyntaxError { message, location });
                self.advance();
                self.synchronize();
            }
        }
        validate::check_tentative_definitions(self.ctx);
        self.unit
    }

    // === Token navigation ===

    fn try_current_token(&self) -> Option<&Token> {
        self.tokens.get(self.current_idx)
    }

    fn current_token(&self) -> ParseResult<Token> {
        match self.tokens.get(self.current_idx) {
            Some(token) => Ok(*token),
            None => Err(ParseError::UnexpectedEof {
                location: self.previous_span(),
            }),
        }
    }

    /// Kind of the current token; `EndOfFile` past the end.
    fn current_kind(&self) -> TokenKind {
        self.try_current_token().map(|t| t.kind).unwrap_or(TokenKind::EndOfFile)
    }

    fn current_span(&self) -> SourceSpan {
        self.try_current_token().map(|t| t.span).unwrap_or_else(|| self.previous_span())
    }

    /// Source spelling of the current token, for diagnostics.
    fn current_text(&self) -> String {
        token_text(&self.current_kind())
    }

    fn previous_span(&self) -> SourceSpan {
        if self.current_idx > 0 {
            if let Some(token) = self.tokens.get(self.current_idx - 1) {
                return token.span;
            }
        }
        self.tokens.last().map(|t| t.span).unwrap_or_else(SourceSpan::empty)
    }

    fn advance(&mut self) {
        if self.current_idx < self.tokens.len() {
            self.current_idx += 1;
        }
    }

    fn is_token(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    /// Kind of the token `offset` positions ahead; `EndOfFile` past the end.
    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.current_idx + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::EndOfFile)
    }

    /// Consume the current token if it matches.
    fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        let token = *self.try_current_token()?;
        if token.kind == kind {
            self.advance();
            Some(token)
        } else {
            None
        }
    }

    /// Consume the current token or fail with `UnexpectedToken`.
    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        let token = self.current_token()?;
        if token.kind == kind {
            self.advance();
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken {
                expected_tokens: format!("'{}'", token_text(&kind)),
                found: token.kind,
                location: token.span,
            })
        }
    }

    fn accept_identifier(&mut self) -> Option<(StringId, SourceSpan)> {
        if let Some(token) = self.try_current_token() {
            if let TokenKind::Identifier(name) = token.kind {
                let span = token.span;
                self.advance();
                return Some((name, span));
            }
        }
        None
    }

    fn expect_identifier(&mut self) -> ParseResult<(StringId, SourceSpan)> {
        let token = self.current_token()?;
        if let TokenKind::Identifier(name) = token.kind {
            self.advance();
            Ok((name, token.span))
        } else {
            Err(ParseError::UnexpectedToken {
                expected_tokens: "identifier".to_string(),
                found: token.kind,
                location: token.span,
            })
        }
    }

    /// Skip ahead to the next statement or declaration boundary.
    ///
    /// Consumes up to and including a `;` at the current bracket depth.
    /// A closing bracket that would unbalance the stream is left for the
    /// enclosing construct to consume.
    fn synchronize(&mut self) {
        let mut depth: u32 = 0;
        while let Some(token) = self.try_current_token() {
            match token.kind {
                TokenKind::EndOfFile => return,
                TokenKind::LeftBrace | TokenKind::LeftParen | TokenKind::LeftBracket => depth += 1,
                TokenKind::RightBrace | TokenKind::RightParen | TokenKind::RightBracket => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    // === Lookahead predicates ===

    /// Is `name` currently bound to a typedef?
    ///
    /// The parser needs this to tell a declaration from an expression
    /// statement, which is why parsing and symbol installation cannot be
    /// separated into phases.
    fn is_typedef_name(&self, name: StringId) -> bool {
        match self.ctx.symbols.lookup(name) {
            Some((entry_ref, _)) => self.ctx.symbols.entry(entry_ref).is_typedef(),
            None => false,
        }
    }

    /// Does the current token start a declaration?
    fn starts_declaration(&self) -> bool {
        match self.current_kind() {
            TokenKind::Identifier(name) => self.is_typedef_name(name),
            kind => kind.is_declaration_specifier_start(),
        }
    }

    /// Does the current token start a type name (cast, `sizeof`)?
    /// Storage classes are excluded; they cannot appear in a type name.
    fn starts_type_name(&self) -> bool {
        match self.current_kind() {
            TokenKind::Identifier(name) => self.is_typedef_name(name),
            kind => kind.is_type_specifier() || kind.is_type_qualifier(),
        }
    }

    /// At a `(` in an abstract or parameter declarator: does the token
    /// after it open a parameter list rather than a nested declarator?
    /// `int (T)` with `T` a typedef is a function type; `int (x)` in a
    /// parameter position declares `x`.
    fn paren_opens_parameter_list(&self) -> bool {
        match self.peek_kind(1) {
            TokenKind::RightParen | TokenKind::Ellipsis => true,
            TokenKind::Identifier(name) => self.is_typedef_name(name),
            kind => kind.is_declaration_specifier_start(),
        }
    }
}

/// Source spelling of a token kind, for diagnostics. Tokens carrying a
/// value render that value.
pub(crate) fn token_text(kind: &TokenKind) -> String {
    let fixed = match kind {
        TokenKind::IntegerConstant { value, .. } => return value.to_string(),
        TokenKind::FloatConstant { value, .. } => return value.to_string(),
        TokenKind::CharacterConstant(byte) => return format!("'{}'", *byte as char),
        TokenKind::StringLiteral(spelling) => return spelling.to_string(),
        TokenKind::Identifier(name) => return name.to_string(),

        TokenKind::Auto => "auto",
        TokenKind::Extern => "extern",
        TokenKind::Register => "register",
        TokenKind::Static => "static",
        TokenKind::Typedef => "typedef",
        TokenKind::Const => "const",
        TokenKind::Restrict => "restrict",
        TokenKind::Volatile => "volatile",
        TokenKind::Bool => "_Bool",
        TokenKind::Char => "char",
        TokenKind::Double => "double",
        TokenKind::Float => "float",
        TokenKind::Int => "int",
        TokenKind::Long => "long",
        TokenKind::Short => "short",
        TokenKind::Signed => "signed",
        TokenKind::Unsigned => "unsigned",
        TokenKind::Void => "void",
        TokenKind::Struct => "struct",
        TokenKind::Union => "union",
        TokenKind::Enum => "enum",
        TokenKind::Break => "break",
        TokenKind::Case => "case",
        TokenKind::Continue => "continue",
        TokenKind::Default => "default",
        TokenKind::Do => "do",
        TokenKind::Else => "else",
        TokenKind::For => "for",
        TokenKind::Goto => "goto",
        TokenKind::If => "if",
        TokenKind::Return => "return",
        TokenKind::Switch => "switch",
        TokenKind::While => "while",
        TokenKind::Inline => "inline",
        TokenKind::Sizeof => "sizeof",
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::Increment => "++",
        TokenKind::Decrement => "--",
        TokenKind::And => "&",
        TokenKind::Or => "|",
        TokenKind::Xor => "^",
        TokenKind::Tilde => "~",
        TokenKind::LeftShift => "<<",
        TokenKind::RightShift => ">>",
        TokenKind::Less => "<",
        TokenKind::Greater => ">",
        TokenKind::LessEqual => "<=",
        TokenKind::GreaterEqual => ">=",
        TokenKind::Equal => "==",
        TokenKind::NotEqual => "!=",
        TokenKind::Assign => "=",
        TokenKind::PlusAssign => "+=",
        TokenKind::MinusAssign => "-=",
        TokenKind::StarAssign => "*=",
        TokenKind::DivAssign => "/=",
        TokenKind::ModAssign => "%=",
        TokenKind::AndAssign => "&=",
        TokenKind::OrAssign => "|=",
        TokenKind::XorAssign => "^=",
        TokenKind::LeftShiftAssign => "<<=",
        TokenKind::RightShiftAssign => ">>=",
        TokenKind::Not => "!",
        TokenKind::LogicAnd => "&&",
        TokenKind::LogicOr => "||",
        TokenKind::Arrow => "->",
        TokenKind::Dot => ".",
        TokenKind::Question => "?",
        TokenKind::Colon => ":",
        TokenKind::Comma => ",",
        TokenKind::Semicolon => ";",
        TokenKind::Ellipsis => "...",
        TokenKind::LeftParen => "(",
        TokenKind::RightParen => ")",
        TokenKind::LeftBracket => "[",
        TokenKind::RightBracket => "]",
        TokenKind::LeftBrace => "{",
        TokenKind::RightBrace => "}",
        TokenKind::EndOfFile => "end of file",
        TokenKind::Unknown => "unknown",
    };
    fixed.to_string()
}
