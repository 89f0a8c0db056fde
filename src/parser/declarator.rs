//! Declarator parsing and type composition.
//!
//! A declarator is parsed into a flat chain of derivation steps
//! ([`DeclPart`]), ordered from the declared name outward. The chain is
//! then folded around the specifier base type by [`compose_type`], which
//! is where derivation rules are enforced: what an array may contain,
//! what a function may return, and where the parameter-only array forms
//! (`[static n]`, `[const]`, `[*]`) are allowed.
//!
//! Parameter lists are parsed here too, since they appear inside
//! declarators. Parameters are recorded in the function type but not
//! installed as symbols; that happens only when a definition follows.

use crate::ast::StorageClass;
use crate::diagnostic::{ParseError, SemanticError, SemanticWarning};
use crate::intern::StringId;
use crate::lexer::TokenKind;
use crate::semantic::validate;
use crate::semantic::{ArraySizeType, FunctionParameter, QualType, TypeKind, TypeQualifiers};
use crate::source_manager::SourceSpan;

use super::type_specifiers::{self, SpecContext};
use super::{expressions, ParseResult, Parser};

/// One type derivation step, ordered from the name outward.
#[derive(Debug)]
pub(crate) enum DeclPart {
    Pointer(TypeQualifiers),
    Array(ArrayPart),
    Function(FunctionPart),
}

#[derive(Debug)]
pub(crate) struct ArrayPart {
    pub bound: ArraySizeType,
    /// `static` inside the brackets
    pub is_static: bool,
    /// Qualifiers inside the brackets
    pub qualifiers: TypeQualifiers,
    pub span: SourceSpan,
}

#[derive(Debug)]
pub(crate) struct FunctionPart {
    pub parameters: Vec<ParamDecl>,
    pub is_variadic: bool,
    /// False for `()` and old-style identifier lists
    pub is_prototype: bool,
    pub span: SourceSpan,
}

/// One parameter as recorded in the function type. The type has already
/// been through the array/function-to-pointer adjustment.
#[derive(Debug, Clone)]
pub(crate) struct ParamDecl {
    pub name: Option<StringId>,
    pub ty: QualType,
    pub span: SourceSpan,
}

/// A parsed declarator: the introduced name, if any, plus the
/// derivation chain.
#[derive(Debug)]
pub(crate) struct Declarator {
    pub name: Option<StringId>,
    pub name_span: SourceSpan,
    pub parts: Vec<DeclPart>,
}

impl Declarator {
    /// Does the outermost derivation make this a function declarator?
    pub fn is_function(&self) -> bool {
        matches!(self.parts.first(), Some(DeclPart::Function(_)))
    }

    pub fn function_part(&self) -> Option<&FunctionPart> {
        match self.parts.first() {
            Some(DeclPart::Function(func)) => Some(func),
            _ => None,
        }
    }
}

/// Which grammar production is being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclaratorKind {
    /// Must introduce a name (declarations, function definitions)
    Named,
    /// Must not introduce a name (type names in casts and `sizeof`)
    Abstract,
    /// May do either (function parameters)
    Param,
}

/// Parse one declarator of the given kind.
pub(crate) fn parse_declarator(p: &mut Parser, kind: DeclaratorKind) -> ParseResult<Declarator> {
    // Pointer prefix. Each `*` may carry a qualifier run that applies to
    // that pointer; the last `*` parsed binds closest to the base type.
    let mut pointer_quals: Vec<TypeQualifiers> = Vec::new();
    while p.accept(TokenKind::Star).is_some() {
        let mut quals = TypeQualifiers::empty();
        loop {
            let token = p.current_token()?;
            let flag = match token.kind {
                TokenKind::Const => TypeQualifiers::CONST,
                TokenKind::Volatile => TypeQualifiers::VOLATILE,
                TokenKind::Restrict => TypeQualifiers::RESTRICT,
                _ => break,
            };
            if quals.contains(flag) {
                p.ctx.diagnostics.report_warning(SemanticWarning::Message {
                    message: format!("duplicate type qualifier '{}'", super::token_text(&token.kind)),
                    location: token.span,
                });
            }
            quals |= flag;
            p.advance();
        }
        pointer_quals.push(quals);
    }

    let mut declarator = parse_direct_declarator(p, kind)?;
    declarator.parts.extend(pointer_quals.into_iter().rev().map(DeclPart::Pointer));
    Ok(declarator)
}

fn parse_direct_declarator(p: &mut Parser, kind: DeclaratorKind) -> ParseResult<Declarator> {
    let token = p.current_token()?;
    match token.kind {
        TokenKind::Identifier(name) if kind != DeclaratorKind::Abstract => {
            p.advance();
            let parts = parse_suffixes(p)?;
            Ok(Declarator {
                name: Some(name),
                name_span: token.span,
                parts,
            })
        }
        TokenKind::LeftParen => {
            // In abstract and parameter positions a `(` is ambiguous:
            // `int (int)` starts a parameter list, `int (*p)` groups.
            // After a name there is no ambiguity and suffix parsing
            // handles the call parentheses.
            if kind != DeclaratorKind::Named && p.paren_opens_parameter_list() {
                let parts = parse_suffixes(p)?;
                return Ok(Declarator {
                    name: None,
                    name_span: token.span,
                    parts,
                });
            }
            p.advance();
            let inner = parse_declarator(p, kind)?;
            p.expect(TokenKind::RightParen)?;
            let suffixes = parse_suffixes(p)?;
            // The grouped declarator binds tighter than anything that
            // follows the closing parenthesis
            let mut parts = inner.parts;
            parts.extend(suffixes);
            Ok(Declarator {
                name: inner.name,
                name_span: inner.name_span,
                parts,
            })
        }
        TokenKind::LeftBracket if kind != DeclaratorKind::Named => {
            let parts = parse_suffixes(p)?;
            Ok(Declarator {
                name: None,
                name_span: token.span,
                parts,
            })
        }
        _ => match kind {
            DeclaratorKind::Named => Err(ParseError::SyntaxError {
                message: "expect identifier or '('".to_string(),
                location: token.span,
            }),
            DeclaratorKind::Abstract => Err(ParseError::SyntaxError {
                message: format!("expect '(' or '[' at '{}'", p.current_text()),
                location: token.span,
            }),
            // An unnamed parameter with no derivations at all
            DeclaratorKind::Param => Ok(Declarator {
                name: None,
                name_span: token.span,
                parts: Vec::new(),
            }),
        },
    }
}

/// Array and function suffixes, in source order. The first suffix binds
/// closest to the name.
fn parse_suffixes(p: &mut Parser) -> ParseResult<Vec<DeclPart>> {
    let mut parts = Vec::new();
    loop {
        match p.current_kind() {
            TokenKind::LeftBracket => parts.push(DeclPart::Array(parse_array_part(p)?)),
            TokenKind::LeftParen => parts.push(DeclPart::Function(parse_parameter_list(p)?)),
            _ => break,
        }
    }
    Ok(parts)
}

/// One `[...]` derivation. The grammar accepts `static` and qualifiers
/// in any bracket; whether they are legal there is decided during
/// composition, which knows the parameter context.
fn parse_array_part(p: &mut Parser) -> ParseResult<ArrayPart> {
    let open = p.expect(TokenKind::LeftBracket)?;
    let mut is_static = false;
    let mut qualifiers = TypeQualifiers::empty();
    let mut bound = ArraySizeType::Incomplete;

    if p.accept(TokenKind::Static).is_some() {
        is_static = true;
    }
    loop {
        let token = p.current_token()?;
        let flag = match token.kind {
            TokenKind::Const => TypeQualifiers::CONST,
            TokenKind::Volatile => TypeQualifiers::VOLATILE,
            TokenKind::Restrict => TypeQualifiers::RESTRICT,
            _ => break,
        };
        if qualifiers.contains(flag) {
            p.ctx.diagnostics.report_warning(SemanticWarning::Message {
                message: format!("duplicate type qualifier '{}'", super::token_text(&token.kind)),
                location: token.span,
            });
        }
        qualifiers |= flag;
        p.advance();
    }
    // `[const static n]` is also legal
    if !is_static && p.accept(TokenKind::Static).is_some() {
        is_static = true;
    }

    if p.is_token(TokenKind::Star) && p.peek_kind(1) == TokenKind::RightBracket {
        p.advance();
        bound = ArraySizeType::Star;
    } else if !p.is_token(TokenKind::RightBracket) {
        bound = parse_array_bound(p)?;
    }

    let close = p.expect(TokenKind::RightBracket)?;
    Ok(ArrayPart {
        bound,
        is_static,
        qualifiers,
        span: open.span.merge(close.span),
    })
}

/// Parse and evaluate an array bound. Problems are reported in place and
/// recovered with a bound of one so the array stays complete.
fn parse_array_bound(p: &mut Parser) -> ParseResult<ArraySizeType> {
    let expr = expressions::parse_assignment(p)?;
    let span = p.ast.get_span(expr);
    let ty = p.ast.get_type(expr);

    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Error) {
        return Ok(ArraySizeType::Fixed(1));
    }
    if !p.ctx.types.kind(ty.ty).is_integer() {
        let type_name = p.ctx.types.display(ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("size of array has non-integer type '{}'", type_name),
            location: span,
        });
        return Ok(ArraySizeType::Fixed(1));
    }
    match expressions::eval_const_int(p, expr) {
        None => {
            p.ctx
                .diagnostics
                .report_error(SemanticError::ExpectConstantExpression { location: span });
            Ok(ArraySizeType::Fixed(1))
        }
        Some(value) if value < 0 => {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: "array has negative size".to_string(),
                location: span,
            });
            Ok(ArraySizeType::Fixed(1))
        }
        Some(value) => Ok(ArraySizeType::Fixed(value as u64)),
    }
}

// === Parameter lists ===

fn parse_parameter_list(p: &mut Parser) -> ParseResult<FunctionPart> {
    let open = p.expect(TokenKind::LeftParen)?;
    p.param_depth += 1;
    let result = parse_parameter_list_tail(p, open.span);
    p.param_depth -= 1;
    result
}

fn parse_parameter_list_tail(p: &mut Parser, open_span: SourceSpan) -> ParseResult<FunctionPart> {
    // `()`: an old-style declaration saying nothing about parameters
    if let Some(close) = p.accept(TokenKind::RightParen) {
        return Ok(FunctionPart {
            parameters: Vec::new(),
            is_variadic: false,
            is_prototype: false,
            span: open_span.merge(close.span),
        });
    }

    if p.starts_declaration() {
        parse_prototype_parameters(p, open_span)
    } else if matches!(p.current_kind(), TokenKind::Identifier(_)) {
        parse_oldstyle_parameters(p, open_span)
    } else if p.is_token(TokenKind::Ellipsis) {
        let span = p.current_span();
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: "ISO C requires a named parameter before '...'".to_string(),
            location: span,
        });
        p.advance();
        let close = p.expect(TokenKind::RightParen)?;
        Ok(FunctionPart {
            parameters: Vec::new(),
            is_variadic: true,
            is_prototype: true,
            span: open_span.merge(close.span),
        })
    } else {
        Err(ParseError::SyntaxError {
            message: format!("expect parameter declarator at '{}'", p.current_text()),
            location: p.current_span(),
        })
    }
}

fn parse_prototype_parameters(p: &mut Parser, open_span: SourceSpan) -> ParseResult<FunctionPart> {
    let mut parameters: Vec<ParamDecl> = Vec::new();
    let mut is_variadic = false;

    loop {
        if p.is_token(TokenKind::Ellipsis) {
            let span = p.current_span();
            if parameters.is_empty() {
                p.ctx.diagnostics.report_error(SemanticError::Message {
                    message: "ISO C requires a named parameter before '...'".to_string(),
                    location: span,
                });
            }
            p.advance();
            is_variadic = true;
            break;
        }
        if !p.starts_declaration() {
            return Err(ParseError::SyntaxError {
                message: format!("expect parameter declarator at '{}'", p.current_text()),
                location: p.current_span(),
            });
        }

        let spec = type_specifiers::parse_specifiers(p, SpecContext::Parameter)?;
        let declarator = parse_declarator(p, DeclaratorKind::Param)?;
        let composed = compose_type(p, spec.base, &declarator.parts, true);

        if p.ctx.types.kind(composed.ty).is_void() && declarator.parts.is_empty() {
            // `void` in a parameter list is only the "no parameters"
            // marker, and only in exactly one shape
            if let Some(name_span) = declarator.name.map(|_| declarator.name_span) {
                p.ctx.diagnostics.report_error(SemanticError::Message {
                    message: "argument may not have 'void' type".to_string(),
                    location: name_span,
                });
            } else if !composed.qualifiers.is_empty() {
                p.ctx.diagnostics.report_error(SemanticError::Message {
                    message: "'void' as parameter must not have type qualifiers".to_string(),
                    location: spec.span,
                });
            } else if parameters.is_empty() && p.is_token(TokenKind::RightParen) {
                // `(void)`: an empty prototype, nothing to record
            } else {
                p.ctx.diagnostics.report_error(SemanticError::Message {
                    message: "'void' must be the first and only parameter if specified".to_string(),
                    location: spec.span,
                });
            }
        } else {
            let param = make_parameter(p, &spec, &declarator, composed);
            if let Some(name) = param.name {
                if parameters.iter().any(|q| q.name == Some(name)) {
                    p.ctx.diagnostics.report_error(SemanticError::LocalRedefinition {
                        name,
                        location: param.span,
                    });
                }
            }
            parameters.push(param);
        }

        if p.accept(TokenKind::Comma).is_none() {
            break;
        }
    }

    let close = p.expect(TokenKind::RightParen)?;
    Ok(FunctionPart {
        parameters,
        is_variadic,
        is_prototype: true,
        span: open_span.merge(close.span),
    })
}

/// Build one prototype parameter: validate its storage class, apply the
/// array/function adjustment, and warn about types that cannot outlive
/// the declaration.
fn make_parameter(
    p: &mut Parser,
    spec: &type_specifiers::DeclSpec,
    declarator: &Declarator,
    composed: QualType,
) -> ParamDecl {
    if let Some(storage) = spec.storage {
        if storage != StorageClass::Register {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("invalid storage class specifier '{}' in function declarator", storage.as_str()),
                location: spec.storage_span,
            });
        }
    }
    if spec.is_inline {
        validate::check_inline(p.ctx, true, composed, spec.span);
    }

    let kind = p.ctx.types.kind(composed.ty);
    let is_tag_type = kind.is_record() || matches!(kind, TypeKind::Enum { .. });
    if is_tag_type && (spec.tag_defined_here || !p.ctx.types.is_complete(composed.ty)) {
        let type_name = p.ctx.types.display(composed);
        p.ctx.diagnostics.report_warning(SemanticWarning::Message {
            message: format!("declaration of '{}' will not be visible outside of this function", type_name),
            location: spec.span,
        });
    }

    let adjusted = p.ctx.types.decay(composed);
    let span = if declarator.name.is_some() {
        declarator.name_span
    } else {
        spec.span
    };
    ParamDecl {
        name: declarator.name,
        ty: adjusted,
        span,
    }
}

/// Old-style identifier list: `f(a, b)`. Types default to int and are
/// refined by the declarations between `)` and `{` of a definition.
fn parse_oldstyle_parameters(p: &mut Parser, open_span: SourceSpan) -> ParseResult<FunctionPart> {
    if p.param_depth > 1 {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: "a parameter list without types is only allowed in a function definition".to_string(),
            location: p.current_span(),
        });
    }

    let int_type = QualType::unqualified(p.ctx.types.type_int);
    let mut parameters: Vec<ParamDecl> = Vec::new();
    loop {
        let (name, span) = p.expect_identifier()?;
        if parameters.iter().any(|q| q.name == Some(name)) {
            p.ctx
                .diagnostics
                .report_error(SemanticError::LocalRedefinition { name, location: span });
        } else {
            parameters.push(ParamDecl {
                name: Some(name),
                ty: int_type,
                span,
            });
        }
        if p.accept(TokenKind::Comma).is_none() {
            break;
        }
    }
    let close = p.expect(TokenKind::RightParen)?;
    Ok(FunctionPart {
        parameters,
        is_variadic: false,
        is_prototype: false,
        span: open_span.merge(close.span),
    })
}

// === Type composition ===

/// Fold a declarator chain around its base type.
///
/// The chain is ordered from the name outward, so folding walks it in
/// reverse: the last part binds directly to the base. `is_param` enables
/// the parameter-only array forms for the derivation at chain position
/// zero and rejects them everywhere else.
pub(crate) fn compose_type(p: &mut Parser, base: QualType, parts: &[DeclPart], is_param: bool) -> QualType {
    let mut ty = base;
    let count = parts.len();
    for (rev_index, part) in parts.iter().rev().enumerate() {
        let chain_index = count - 1 - rev_index;
        match part {
            DeclPart::Pointer(quals) => {
                let ptr = p.ctx.types.pointer_to(ty);
                ty = QualType::new(ptr, *quals);
            }
            DeclPart::Array(array) => {
                ty = compose_array(p, ty, array, is_param, chain_index == 0);
            }
            DeclPart::Function(func) => {
                ty = compose_function(p, ty, func);
            }
        }
    }
    ty
}

fn compose_array(p: &mut Parser, element: QualType, array: &ArrayPart, is_param: bool, outermost: bool) -> QualType {
    if !validate::check_array_element(p.ctx, element, array.span) {
        return p.ctx.types.error_type();
    }

    let is_star = matches!(array.bound, ArraySizeType::Star);
    let has_quals = array.is_static || !array.qualifiers.is_empty();

    if (is_star || has_quals) && !(is_param && outermost) {
        if !is_param {
            if is_star {
                p.ctx.diagnostics.report_error(SemanticError::Message {
                    message: "star modifier used outside of function prototype".to_string(),
                    location: array.span,
                });
            }
            if has_quals {
                p.ctx.diagnostics.report_error(SemanticError::Message {
                    message: "type qualifier used in array declarator outside of function prototype".to_string(),
                    location: array.span,
                });
            }
        } else {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: "type qualifier used in non-outermost array type derivation".to_string(),
                location: array.span,
            });
        }
        // Recover with the plain form of the same array
        let bound = if is_star { ArraySizeType::Incomplete } else { array.bound };
        return QualType::unqualified(p.ctx.types.array_of(element, bound));
    }

    let array_type = p
        .ctx
        .types
        .param_array_of(element, array.bound, array.is_static, array.qualifiers);
    QualType::unqualified(array_type)
}

fn compose_function(p: &mut Parser, return_type: QualType, func: &FunctionPart) -> QualType {
    let return_type = if validate::check_return_type(p.ctx, return_type, func.span) {
        return_type
    } else {
        p.ctx.types.error_type()
    };
    let parameters: Vec<FunctionParameter> = func
        .parameters
        .iter()
        .map(|q| FunctionParameter {
            param_type: q.ty,
            name: q.name,
        })
        .collect();
    let function_type = p
        .ctx
        .types
        .function_type(return_type, parameters, func.is_variadic, func.is_prototype);
    QualType::unqualified(function_type)
}

/// `type-name`: specifiers plus an optional abstract declarator. Used by
/// casts and `sizeof`.
pub(crate) fn parse_type_name(p: &mut Parser) -> ParseResult<QualType> {
    let spec = type_specifiers::parse_specifiers(p, SpecContext::TypeName)?;
    let ty = match p.current_kind() {
        TokenKind::Star | TokenKind::LeftParen | TokenKind::LeftBracket => {
            let declarator = parse_declarator(p, DeclaratorKind::Abstract)?;
            compose_type(p, spec.base, &declarator.parts, false)
        }
        _ => spec.base,
    };
    Ok(ty)
}
