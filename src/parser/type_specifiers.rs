//! Declaration specifier parsing.
//!
//! A specifier run is a bag of keywords in any order: storage class,
//! qualifiers, `inline`, sign, size, and at most one base type. The
//! parser counts what it sees, diagnoses duplicates and impossible
//! combinations, and resolves the bag to a single [`QualType`].

use crate::ast::StorageClass;
use crate::diagnostic::{SemanticError, SemanticWarning};
use crate::lexer::TokenKind;
use crate::semantic::{QualType, TypeQualifiers, TypeRef};
use crate::source_manager::SourceSpan;

use super::{declarations, token_text, ParseResult, Parser};

/// Where a specifier run appears; decides which specifiers are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecContext {
    /// File-scope or block-scope declaration
    Declaration,
    /// Function parameter. Storage classes are collected here and
    /// validated when the parameter is built, so that `register` can be
    /// accepted and everything else rejected with a better message.
    Parameter,
    /// Type name in a cast or `sizeof`
    TypeName,
}

/// Resolved result of one specifier run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeclSpec {
    pub base: QualType,
    pub storage: Option<StorageClass>,
    /// Span of the storage-class keyword when one was present
    pub storage_span: SourceSpan,
    pub is_inline: bool,
    /// A struct/union/enum body was parsed inside this run
    pub tag_defined_here: bool,
    pub span: SourceSpan,
}

/// What occupied the base-type slot.
enum Base {
    None,
    Void,
    Bool,
    Char,
    Int,
    Float,
    Double,
    Tag(TypeRef),
    Typedef(QualType),
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Size {
    None,
    Short,
    Long,
    LongLong,
}

/// Parse a declaration specifier run.
///
/// The caller guarantees the current token can start one. Diagnoses are
/// reported in place; the run always resolves to some type so parsing
/// can continue.
pub(crate) fn parse_specifiers(p: &mut Parser, context: SpecContext) -> ParseResult<DeclSpec> {
    let start_span = p.current_span();

    let mut storage: Option<StorageClass> = None;
    let mut storage_span = start_span;
    let mut sign: Option<TokenKind> = None;
    let mut size = Size::None;
    let mut base = Base::None;
    // Keyword spelling of the base, for combination diagnostics
    let mut base_text = String::new();
    let mut qualifiers = TypeQualifiers::empty();
    let mut is_inline = false;
    let mut tag_defined_here = false;

    loop {
        let token = p.current_token()?;
        match token.kind {
            kind if kind.is_storage_class_specifier() => {
                p.advance();
                if context == SpecContext::TypeName {
                    p.ctx.diagnostics.report_error(SemanticError::Message {
                        message: "type name does not allow storage class to be specified".to_string(),
                        location: token.span,
                    });
                } else if storage.is_some() {
                    p.ctx.diagnostics.report_error(SemanticError::Message {
                        message: format!("duplicate storage class '{}'", token_text(&kind)),
                        location: token.span,
                    });
                } else {
                    storage = Some(storage_class_of(kind));
                    storage_span = token.span;
                }
            }
            kind @ (TokenKind::Const | TokenKind::Volatile | TokenKind::Restrict) => {
                p.advance();
                let flag = qualifier_of(kind);
                if qualifiers.contains(flag) {
                    p.ctx.diagnostics.report_warning(SemanticWarning::Message {
                        message: format!("duplicate '{}' declaration specifier", token_text(&kind)),
                        location: token.span,
                    });
                }
                qualifiers |= flag;
            }
            TokenKind::Inline => {
                p.advance();
                if context == SpecContext::TypeName {
                    p.ctx.diagnostics.report_error(SemanticError::Message {
                        message: "function specifier not allowed".to_string(),
                        location: token.span,
                    });
                } else if is_inline {
                    p.ctx.diagnostics.report_warning(SemanticWarning::Message {
                        message: "duplicate 'inline' declaration specifier".to_string(),
                        location: token.span,
                    });
                }
                is_inline = true;
            }
            kind @ (TokenKind::Signed | TokenKind::Unsigned) => {
                p.advance();
                if sign.is_some() {
                    p.ctx.diagnostics.report_error(SemanticError::Message {
                        message: format!("duplicate signed/unsigned speficier '{}'", token_text(&kind)),
                        location: token.span,
                    });
                } else {
                    sign = Some(kind);
                }
            }
            TokenKind::Short => {
                p.advance();
                if size != Size::None {
                    p.ctx.diagnostics.report_error(SemanticError::Message {
                        message: "duplicate type specifier 'short'".to_string(),
                        location: token.span,
                    });
                } else {
                    size = Size::Short;
                }
            }
            TokenKind::Long => {
                p.advance();
                match size {
                    Size::None => size = Size::Long,
                    Size::Long => size = Size::LongLong,
                    _ => p.ctx.diagnostics.report_error(SemanticError::Message {
                        message: "duplicate type specifier 'long'".to_string(),
                        location: token.span,
                    }),
                }
            }
            kind @ (TokenKind::Void
            | TokenKind::Bool
            | TokenKind::Char
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::Double) => {
                p.advance();
                let new_base = match kind {
                    TokenKind::Void => Base::Void,
                    TokenKind::Bool => Base::Bool,
                    TokenKind::Char => Base::Char,
                    TokenKind::Int => Base::Int,
                    TokenKind::Float => Base::Float,
                    TokenKind::Double => Base::Double,
                    _ => unreachable!(),
                };
                set_base(p, &mut base, &mut base_text, new_base, &token_text(&kind), token.span);
            }
            kind @ (TokenKind::Struct | TokenKind::Union | TokenKind::Enum) => {
                // The tag is parsed (and its body recorded) even when the
                // base slot is already taken
                let keyword = token_text(&kind);
                let (tag_type, defined_here) = declarations::parse_tag_specifier(p)?;
                tag_defined_here |= defined_here;
                set_base(p, &mut base, &mut base_text, Base::Tag(tag_type), &keyword, token.span);
            }
            TokenKind::Identifier(name)
                if matches!(base, Base::None) && sign.is_none() && size == Size::None && p.is_typedef_name(name) =>
            {
                p.advance();
                let (entry_ref, _) = p.ctx.symbols.lookup(name).expect("typedef oracle just found it");
                let aliased = p.ctx.symbols.entry(entry_ref).type_info;
                p.ctx.symbols.mark_referenced(entry_ref);
                set_base(p, &mut base, &mut base_text, Base::Typedef(aliased), &name.to_string(), token.span);
            }
            _ => break,
        }
    }

    if matches!(base, Base::None) && sign.is_none() && size == Size::None {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: "missing type specifier".to_string(),
            location: p.current_span(),
        });
    }

    // Size and sign only combine with a few bases
    let int_base = matches!(base, Base::Int | Base::None);
    match size {
        Size::Short if !int_base => report_invalid_combo(p, "short", &base_text, start_span),
        Size::LongLong if !int_base => {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("long long {} is invalid", base_text),
                location: start_span,
            });
        }
        Size::Long if !int_base && !matches!(base, Base::Double) => {
            report_invalid_combo(p, "long", &base_text, start_span)
        }
        _ => {}
    }
    if sign.is_some() && !int_base && !matches!(base, Base::Char) {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("'{}' cannot be signed or unsigned", base_text),
            location: start_span,
        });
    }

    let is_unsigned = sign == Some(TokenKind::Unsigned);
    let types = &p.ctx.types;
    let base_type = match base {
        Base::Typedef(aliased) => aliased,
        Base::Tag(tag_type) => QualType::unqualified(tag_type),
        Base::Void => QualType::unqualified(types.type_void),
        Base::Bool => QualType::unqualified(types.type_bool),
        Base::Float => QualType::unqualified(types.type_float),
        Base::Double => QualType::unqualified(if size == Size::Long {
            types.type_long_double
        } else {
            types.type_double
        }),
        Base::Char => QualType::unqualified(if is_unsigned { types.type_char_unsigned } else { types.type_char }),
        Base::Int | Base::None => QualType::unqualified(match size {
            Size::Short if is_unsigned => types.type_short_unsigned,
            Size::Short => types.type_short,
            Size::Long if is_unsigned => types.type_long_unsigned,
            Size::Long => types.type_long,
            Size::LongLong if is_unsigned => types.type_long_long_unsigned,
            Size::LongLong => types.type_long_long,
            Size::None if is_unsigned => types.type_int_unsigned,
            Size::None => types.type_int,
        }),
    };

    Ok(DeclSpec {
        base: base_type.with_qualifiers(qualifiers),
        storage,
        storage_span,
        is_inline,
        tag_defined_here,
        span: start_span.merge(p.previous_span()),
    })
}

fn set_base(p: &mut Parser, base: &mut Base, base_text: &mut String, new_base: Base, text: &str, span: SourceSpan) {
    if matches!(base, Base::None) {
        *base = new_base;
        *base_text = text.to_string();
    } else {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("duplicate type specifier '{}'", text),
            location: span,
        });
    }
}

fn report_invalid_combo(p: &mut Parser, size_text: &str, base_text: &str, span: SourceSpan) {
    p.ctx.diagnostics.report_error(SemanticError::Message {
        message: format!("{} {} is invalid", size_text, base_text),
        location: span,
    });
}

fn storage_class_of(kind: TokenKind) -> StorageClass {
    match kind {
        TokenKind::Typedef => StorageClass::Typedef,
        TokenKind::Extern => StorageClass::Extern,
        TokenKind::Static => StorageClass::Static,
        TokenKind::Auto => StorageClass::Auto,
        TokenKind::Register => StorageClass::Register,
        _ => unreachable!("not a storage class token"),
    }
}

fn qualifier_of(kind: TokenKind) -> TypeQualifiers {
    match kind {
        TokenKind::Const => TypeQualifiers::CONST,
        TokenKind::Volatile => TypeQualifiers::VOLATILE,
        TokenKind::Restrict => TypeQualifiers::RESTRICT,
        _ => unreachable!("not a qualifier token"),
    }
}
