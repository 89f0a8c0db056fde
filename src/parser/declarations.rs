//! Declaration parsing at file, block, and member scope.
//!
//! A declaration is a specifier run followed by a comma-separated list
//! of init-declarators. Each declarator is composed into a type and
//! installed through the `validate` layer, which owns the merging and
//! redeclaration rules. File-scope initializers are kept as constant
//! expression trees on the symbol; block-scope initializers are lowered
//! here into plain assignment statements, element by element, so later
//! stages only ever see ordinary stores.
//!
//! Struct, union, and enum bodies are parsed here as well, since a tag
//! definition can appear inside any specifier run.

use thin_vec::ThinVec;

use crate::ast::{BinaryOp, FunctionDef, NodeKind, NodeRef, StorageClass, UnaryOp};
use crate::diagnostic::{ParseError, SemanticError, SemanticWarning};
use crate::intern::{self, StringId};
use crate::lexer::{self, TokenKind};
use crate::semantic::validate::{self, TagKind};
use crate::semantic::{
    ArraySizeType, DefinitionState, EnumConstant, Namespace, QualType, ScopeKind, StructMember,
    SymbolEntry, SymbolEntryRef, SymbolKind, TypeKind, TypeRef,
};
use crate::source_manager::SourceSpan;

use super::declarator::{self, DeclPart, Declarator, DeclaratorKind, ParamDecl};
use super::type_specifiers::{self, DeclSpec, SpecContext};
use super::{expressions, statements, ParseResult, Parser};

/// One declaration at file scope, including function definitions.
pub(crate) fn parse_external_declaration(p: &mut Parser) -> ParseResult<()> {
    let spec = type_specifiers::parse_specifiers(p, SpecContext::Declaration)?;
    parse_init_declarators(p, spec, None, true)
}

/// One declaration inside a function body. Initializers of automatic
/// variables are appended to `statements` as assignments.
pub(crate) fn parse_local_declaration(p: &mut Parser, statements: &mut Vec<NodeRef>) -> ParseResult<()> {
    let spec = type_specifiers::parse_specifiers(p, SpecContext::Declaration)?;
    parse_init_declarators(p, spec, Some(statements), false)
}

fn parse_init_declarators(
    p: &mut Parser,
    spec: DeclSpec,
    mut statements: Option<&mut Vec<NodeRef>>,
    allow_function_definition: bool,
) -> ParseResult<()> {
    if !starts_declarator(p) {
        // `struct S { ... };` stands on its own; anything else needs a
        // declarator here
        if is_tag_base(p, spec.base) {
            p.expect(TokenKind::Semicolon)?;
            return Ok(());
        }
        return Err(ParseError::SyntaxError {
            message: format!("invalid token '{}' in declaration", p.current_text()),
            location: p.current_span(),
        });
    }

    let mut decl = declarator::parse_declarator(p, DeclaratorKind::Named)?;

    if allow_function_definition && is_function_definition(p, &decl) {
        return parse_function_definition(p, spec, decl);
    }

    loop {
        declare_one(p, &spec, decl, statements.as_mut().map(|list| &mut **list))?;
        if p.accept(TokenKind::Comma).is_none() {
            break;
        }
        decl = declarator::parse_declarator(p, DeclaratorKind::Named)?;
    }
    p.expect(TokenKind::Semicolon)?;
    Ok(())
}

fn starts_declarator(p: &Parser) -> bool {
    matches!(
        p.current_kind(),
        TokenKind::Identifier(_) | TokenKind::Star | TokenKind::LeftParen
    )
}

fn is_tag_base(p: &Parser, base: QualType) -> bool {
    matches!(
        p.ctx.types.kind(base.ty),
        TypeKind::Record { .. } | TypeKind::Enum { .. }
    )
}

/// A function declarator becomes a definition when a body follows, or
/// when old-style parameter declarations do.
fn is_function_definition(p: &Parser, decl: &Declarator) -> bool {
    if decl.name.is_none() {
        return false;
    }
    let Some(func) = decl.function_part() else {
        return false;
    };
    if p.is_token(TokenKind::LeftBrace) {
        return true;
    }
    !func.is_prototype && p.starts_declaration()
}

// === Single declarators ===

fn declare_one(
    p: &mut Parser,
    spec: &DeclSpec,
    decl: Declarator,
    statements: Option<&mut Vec<NodeRef>>,
) -> ParseResult<()> {
    let Some(name) = decl.name else {
        return Ok(());
    };
    let span = decl.name_span;
    let ty = declarator::compose_type(p, spec.base, &decl.parts, false);

    if spec.storage == Some(StorageClass::Typedef) {
        return declare_typedef(p, spec, &decl, name, ty, span);
    }
    if decl.is_function() {
        return declare_function(p, spec, &decl, name, ty, span);
    }
    declare_variable(p, spec, name, ty, span, statements)
}

fn declare_typedef(
    p: &mut Parser,
    spec: &DeclSpec,
    decl: &Declarator,
    name: StringId,
    ty: QualType,
    span: SourceSpan,
) -> ParseResult<()> {
    if p.ctx.symbols.at_global_scope() {
        check_oldstyle_named(p, decl);
    }
    validate::check_inline(p.ctx, spec.is_inline, ty, span);
    if p.ctx.symbols.at_global_scope() {
        validate::declare_global(p.ctx, name, ty, spec.storage, SymbolKind::Typedef, span);
    } else {
        validate::declare_local(p.ctx, name, ty, spec.storage, SymbolKind::Typedef, span);
    }
    reject_initializer(p, span)
}

fn declare_function(
    p: &mut Parser,
    spec: &DeclSpec,
    decl: &Declarator,
    name: StringId,
    ty: QualType,
    span: SourceSpan,
) -> ParseResult<()> {
    check_oldstyle_named(p, decl);
    validate::check_inline(p.ctx, spec.is_inline, ty, span);

    let kind = SymbolKind::Function {
        is_inline: spec.is_inline,
    };
    if p.ctx.symbols.at_global_scope() {
        validate::check_file_scope_storage(p.ctx, spec.storage, spec.storage_span);
        validate::declare_global(p.ctx, name, ty, spec.storage, kind, span);
    } else {
        validate::check_block_function_storage(p.ctx, spec.storage, spec.storage_span);
        validate::declare_local(p.ctx, name, ty, spec.storage, kind, span);
    }
    if name == intern::intern("main") {
        validate::check_main(p.ctx, ty.ty, span);
    }
    reject_initializer(p, span)
}

/// Old-style parameter names have nowhere to get their types outside of
/// a function definition.
fn check_oldstyle_named(p: &mut Parser, decl: &Declarator) {
    let Some(func) = decl.function_part() else {
        return;
    };
    if !func.is_prototype && !func.parameters.is_empty() {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: "a parameter list without types is only allowed in a function definition".to_string(),
            location: func.span,
        });
    }
}

/// `=` after something that is not a variable. The initializer is still
/// parsed so recovery continues past it.
fn reject_initializer(p: &mut Parser, span: SourceSpan) -> ParseResult<()> {
    if p.accept(TokenKind::Assign).is_none() {
        return Ok(());
    }
    p.ctx.diagnostics.report_error(SemanticError::Message {
        message: "illegal initializer (only variable can be initialized)".to_string(),
        location: span,
    });
    let discard = QualType::unqualified(p.ctx.types.type_error);
    let _ = parse_initializer(p, discard)?;
    Ok(())
}

fn declare_variable(
    p: &mut Parser,
    spec: &DeclSpec,
    name: StringId,
    ty: QualType,
    span: SourceSpan,
    statements: Option<&mut Vec<NodeRef>>,
) -> ParseResult<()> {
    let at_global = p.ctx.symbols.at_global_scope();
    validate::check_inline(p.ctx, spec.is_inline, ty, span);

    let entry_ref = if at_global {
        validate::check_file_scope_storage(p.ctx, spec.storage, spec.storage_span);
        let kind = SymbolKind::Variable {
            is_global: true,
            initializer: None,
        };
        validate::declare_global(p.ctx, name, ty, spec.storage, kind, span)
    } else {
        let kind = SymbolKind::Variable {
            is_global: false,
            initializer: None,
        };
        validate::declare_local(p.ctx, name, ty, spec.storage, kind, span)
    };
    // A merged or conflicting redeclaration hands back the older entry
    let fresh = p.ctx.symbols.entry(entry_ref).def_span == span;

    let is_extern = spec.storage == Some(StorageClass::Extern);
    let is_static = spec.storage == Some(StorageClass::Static);

    if p.accept(TokenKind::Assign).is_some() {
        if is_extern {
            if at_global {
                p.ctx.diagnostics.report_warning(SemanticWarning::Message {
                    message: "'extern' variable has an initializer".to_string(),
                    location: span,
                });
            } else {
                p.ctx.diagnostics.report_error(SemanticError::Message {
                    message: "'extern' variable cannot have an initializer".to_string(),
                    location: span,
                });
            }
        }

        let target = p.ctx.symbols.entry(entry_ref).type_info;
        let init = parse_initializer(p, target)?;

        let completed = complete_array_from_initializer(p, target, init);
        if completed != target && fresh {
            p.ctx.symbols.entry_mut(entry_ref).type_info = completed;
        }

        if at_global || is_static {
            // Static storage needs a link-time value
            if !is_address_constant(p, init) {
                p.ctx.diagnostics.report_error(SemanticError::ExpectConstantExpression {
                    location: p.ast.get_span(init),
                });
            }
            if (at_global || fresh) && validate::mark_defined(p.ctx, entry_ref, span) {
                if let SymbolKind::Variable { initializer, .. } = &mut p.ctx.symbols.entry_mut(entry_ref).kind {
                    *initializer = Some(init);
                }
            }
        } else if !is_extern {
            if let Some(statements) = statements {
                let lvalue = p.ast.push_node(NodeKind::Ident(entry_ref), span, completed, true);
                expand_local_initializer(p, lvalue, completed, Some(init), span, statements);
            }
        }
    }

    let final_type = p.ctx.symbols.entry(entry_ref).type_info;
    let needs_complete = if at_global {
        // Tentative definitions get another chance at the end of the unit
        p.ctx.symbols.entry(entry_ref).def_state == DefinitionState::Defined
    } else {
        !is_extern
    };
    if needs_complete {
        validate::check_complete_variable(p.ctx, final_type, span);
    }

    if !at_global && fresh {
        if is_static {
            p.unit.static_locals.push(entry_ref);
        } else if !is_extern {
            p.locals.push(entry_ref);
        }
    }
    Ok(())
}

// === Function definitions ===

fn parse_function_definition(p: &mut Parser, spec: DeclSpec, mut decl: Declarator) -> ParseResult<()> {
    let Some(name) = decl.name else {
        return Ok(());
    };
    let span = decl.name_span;

    if let Some(storage) = spec.storage {
        if storage != StorageClass::Extern && storage != StorageClass::Static {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("invalid storage class specifier '{}'", storage.as_str()),
                location: spec.storage_span,
            });
        }
    }

    // Old-style declarations give the identifier-list parameters their
    // types before the function type is composed.
    let oldstyle = decl.function_part().map(|func| !func.is_prototype).unwrap_or(false);
    if oldstyle && p.starts_declaration() {
        let mut parameters = match decl.parts.first_mut() {
            Some(DeclPart::Function(func)) => std::mem::take(&mut func.parameters),
            _ => Vec::new(),
        };
        parse_oldstyle_declarations(p, &mut parameters)?;
        if let Some(DeclPart::Function(func)) = decl.parts.first_mut() {
            func.parameters = parameters;
        }
    }

    if !p.is_token(TokenKind::LeftBrace) {
        return Err(ParseError::SyntaxError {
            message: "expect function body after function declarator".to_string(),
            location: p.current_span(),
        });
    }

    let ty = declarator::compose_type(p, spec.base, &decl.parts, false);
    let parameters: Vec<ParamDecl> = match decl.parts.first() {
        Some(DeclPart::Function(func)) => func.parameters.clone(),
        _ => Vec::new(),
    };

    validate::check_inline(p.ctx, spec.is_inline, ty, span);
    let entry_ref = validate::declare_global(
        p.ctx,
        name,
        ty,
        spec.storage,
        SymbolKind::Function {
            is_inline: spec.is_inline,
        },
        span,
    );
    validate::mark_defined(p.ctx, entry_ref, span);
    if name == intern::intern("main") {
        validate::check_main(p.ctx, ty.ty, span);
    }

    let scope_id = p.ctx.symbols.push_scope(ScopeKind::Param);
    let mut param_refs: Vec<SymbolEntryRef> = Vec::with_capacity(parameters.len());
    for param in &parameters {
        let Some(param_name) = param.name else {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: "parameter name omitted".to_string(),
                location: param.span,
            });
            continue;
        };
        if !p.ctx.types.is_complete(param.ty.ty) && !matches!(p.ctx.types.kind(param.ty.ty), TypeKind::Error) {
            let type_name = p.ctx.types.display(param.ty);
            p.ctx.diagnostics.report_error(SemanticError::IncompleteVariable {
                type_name,
                location: param.span,
            });
        }
        let param_ref = p.ctx.symbols.install(
            param_name,
            SymbolEntry {
                name: param_name,
                kind: SymbolKind::Variable {
                    is_global: false,
                    initializer: None,
                },
                type_info: param.ty,
                storage_class: None,
                scope_id,
                def_span: param.span,
                def_state: DefinitionState::Defined,
                is_referenced: false,
            },
            Namespace::Ordinary,
        );
        param_refs.push(param_ref);
    }

    let return_type = p
        .ctx
        .types
        .return_type_of(ty.ty)
        .unwrap_or(QualType::unqualified(p.ctx.types.type_error));
    p.return_type = Some(return_type);
    p.function_name = Some(name);
    let saved_locals = std::mem::take(&mut p.locals);

    let body_result = statements::parse_compound(p, ScopeKind::Local);
    validate::check_undefined_labels(p.ctx);

    let locals = std::mem::replace(&mut p.locals, saved_locals);
    p.return_type = None;
    p.function_name = None;
    p.ctx.symbols.pop_scope();

    let body = body_result?;

    // A conflicting earlier declaration may have left a non-function
    // entry behind; the body was still parsed for its diagnostics.
    if matches!(p.ctx.symbols.entry(entry_ref).kind, SymbolKind::Function { .. }) {
        p.unit.functions.push(FunctionDef {
            symbol: entry_ref,
            scope_id,
            parameters: param_refs,
            locals,
            body,
            span: spec.span.merge(p.previous_span()),
        });
    }
    Ok(())
}

/// The declarations between `)` and `{` of an old-style definition.
/// Each one types a name from the identifier list.
fn parse_oldstyle_declarations(p: &mut Parser, parameters: &mut Vec<ParamDecl>) -> ParseResult<()> {
    let mut declared: Vec<StringId> = Vec::new();
    while p.starts_declaration() {
        let spec = type_specifiers::parse_specifiers(p, SpecContext::Declaration)?;

        if !starts_declarator(p) {
            if is_tag_base(p, spec.base) {
                p.expect(TokenKind::Semicolon)?;
                p.ctx.diagnostics.report_warning(SemanticWarning::Message {
                    message: "empty declaraion".to_string(),
                    location: spec.span,
                });
                continue;
            }
            return Err(ParseError::SyntaxError {
                message: format!("invalid token '{}' in declaration", p.current_text()),
                location: p.current_span(),
            });
        }

        loop {
            let decl = declarator::parse_declarator(p, DeclaratorKind::Named)?;
            declare_oldstyle_parameter(p, &spec, decl, parameters, &mut declared)?;
            if p.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        p.expect(TokenKind::Semicolon)?;
    }
    Ok(())
}

fn declare_oldstyle_parameter(
    p: &mut Parser,
    spec: &DeclSpec,
    decl: Declarator,
    parameters: &mut Vec<ParamDecl>,
    declared: &mut Vec<StringId>,
) -> ParseResult<()> {
    let Some(name) = decl.name else {
        return Ok(());
    };
    let span = decl.name_span;

    if let Some(storage) = spec.storage {
        if storage != StorageClass::Register {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: format!(
                    "invalid storage class specifier '{}' in function declarator",
                    storage.as_str()
                ),
                location: spec.storage_span,
            });
        }
    }

    let ty = declarator::compose_type(p, spec.base, &decl.parts, true);

    if decl.is_function() {
        // Declares nothing a parameter could use
        p.ctx.diagnostics.report_warning(SemanticWarning::Message {
            message: "empty declaraion".to_string(),
            location: span,
        });
        return reject_trailing_initializer(p, span);
    }

    if declared.contains(&name) {
        p.ctx.diagnostics.report_error(SemanticError::LocalRedefinition { name, location: span });
        return reject_trailing_initializer(p, span);
    }
    declared.push(name);

    let adjusted = p.ctx.types.decay(ty);
    if let Some(param) = parameters.iter_mut().find(|param| param.name == Some(name)) {
        param.ty = adjusted;
        param.span = span;
    } else {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("parameter named '{}' is missing", name),
            location: span,
        });
    }
    reject_trailing_initializer(p, span)
}

fn reject_trailing_initializer(p: &mut Parser, span: SourceSpan) -> ParseResult<()> {
    if p.is_token(TokenKind::Assign) {
        return reject_initializer(p, span);
    }
    Ok(())
}

// === Tags ===

/// Parses a `struct`/`union`/`enum` specifier starting at its keyword.
/// Returns the tag type and whether a body was defined here.
pub(crate) fn parse_tag_specifier(p: &mut Parser) -> ParseResult<(TypeRef, bool)> {
    let keyword = p.current_token()?;
    let tag_kind = match keyword.kind {
        TokenKind::Struct => TagKind::Struct,
        TokenKind::Union => TagKind::Union,
        TokenKind::Enum => TagKind::Enum,
        _ => unreachable!("caller matched a tag keyword"),
    };
    p.advance();

    let tag_name = p.accept_identifier();

    if p.accept(TokenKind::LeftBrace).is_some() {
        let ty = match tag_name {
            Some((name, name_span)) => validate::resolve_tag(p.ctx, tag_kind, name, true, name_span),
            None => anonymous_tag(p, tag_kind),
        };
        parse_tag_body(p, tag_kind, ty)?;
        p.expect(TokenKind::RightBrace)?;
        return Ok((ty, true));
    }

    match tag_name {
        Some((name, name_span)) => {
            let ty = validate::resolve_tag(p.ctx, tag_kind, name, false, name_span);
            Ok((ty, false))
        }
        None => {
            p.ctx.diagnostics.report_parse_error(ParseError::SyntaxError {
                message: "expected identifier or '{'".to_string(),
                location: p.current_span(),
            });
            Ok((anonymous_tag(p, tag_kind), false))
        }
    }
}

fn anonymous_tag(p: &mut Parser, tag_kind: TagKind) -> TypeRef {
    match tag_kind {
        TagKind::Struct => p.ctx.types.declare_record(None, false),
        TagKind::Union => p.ctx.types.declare_record(None, true),
        TagKind::Enum => p.ctx.types.declare_enum(None),
    }
}

fn parse_tag_body(p: &mut Parser, tag_kind: TagKind, ty: TypeRef) -> ParseResult<()> {
    if tag_kind == TagKind::Enum {
        let enumerators = parse_enumerators(p, ty)?;
        p.ctx.types.complete_enum(ty, enumerators);
    } else {
        let members = parse_record_fields(p)?;
        if validate::check_fields(p.ctx, &members, tag_kind == TagKind::Union) {
            p.ctx.types.complete_record(ty, members);
        }
    }
    Ok(())
}

fn parse_record_fields(p: &mut Parser) -> ParseResult<Vec<StructMember>> {
    let mut members: Vec<StructMember> = Vec::new();

    if p.is_token(TokenKind::RightBrace) {
        p.ctx.diagnostics.report_parse_error(ParseError::SyntaxError {
            message: "expect type name or qualifiers".to_string(),
            location: p.current_span(),
        });
        return Ok(members);
    }

    'lines: while p.starts_declaration() {
        // Fields use the type-name specifier rules: no storage class,
        // no function specifier
        let spec = type_specifiers::parse_specifiers(p, SpecContext::TypeName)?;

        loop {
            let member = match parse_one_field(p, &spec, &members) {
                Ok(member) => member,
                Err(error) => {
                    p.ctx.diagnostics.report_parse_error(error);
                    p.synchronize();
                    continue 'lines;
                }
            };
            members.push(member);
            if p.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        p.expect(TokenKind::Semicolon)?;
    }
    Ok(members)
}

fn parse_one_field(p: &mut Parser, spec: &DeclSpec, members: &[StructMember]) -> ParseResult<StructMember> {
    // `int : 3;` pads without declaring a member
    if p.is_token(TokenKind::Colon) {
        let width = parse_bit_width(p)?;
        let bit_field_size = validate::check_bit_field(p.ctx, None, spec.base, width, spec.span);
        return Ok(StructMember {
            name: None,
            member_type: spec.base,
            bit_field_size,
            span: spec.span,
        });
    }

    let decl = declarator::parse_declarator(p, DeclaratorKind::Named)?;
    let ty = declarator::compose_type(p, spec.base, &decl.parts, false);
    let span = decl.name_span;

    let mut bit_field_size = None;
    if p.is_token(TokenKind::Colon) {
        let width = parse_bit_width(p)?;
        bit_field_size = validate::check_bit_field(p.ctx, decl.name, ty, width, span);
    }

    if let Some(field_name) = decl.name {
        if members.iter().any(|member| member.name == Some(field_name)) {
            p.ctx.diagnostics.report_error(SemanticError::LocalRedefinition {
                name: field_name,
                location: span,
            });
        }
    }

    Ok(StructMember {
        name: decl.name,
        member_type: ty,
        bit_field_size,
        span,
    })
}

fn parse_bit_width(p: &mut Parser) -> ParseResult<i64> {
    p.expect(TokenKind::Colon)?;
    let expr = expressions::parse_assignment(p)?;
    match expressions::eval_const_int(p, expr) {
        Some(value) => Ok(value),
        None => {
            p.ctx.diagnostics.report_error(SemanticError::ExpectConstantExpression {
                location: p.ast.get_span(expr),
            });
            Ok(1)
        }
    }
}

fn parse_enumerators(p: &mut Parser, enum_ty: TypeRef) -> ParseResult<Vec<EnumConstant>> {
    let mut enumerators: Vec<EnumConstant> = Vec::new();

    if !matches!(p.current_kind(), TokenKind::Identifier(_)) {
        p.ctx.diagnostics.report_parse_error(ParseError::SyntaxError {
            message: "expect identifier".to_string(),
            location: p.current_span(),
        });
        return Ok(enumerators);
    }

    let mut next_value: i64 = 0;
    while let Some((name, span)) = p.accept_identifier() {
        if p.accept(TokenKind::Assign).is_some() {
            let expr = expressions::parse_assignment(p)?;
            match expressions::eval_const_int(p, expr) {
                Some(value) => next_value = value,
                None => {
                    p.ctx.diagnostics.report_error(SemanticError::ExpectConstantExpression {
                        location: p.ast.get_span(expr),
                    });
                }
            }
        }
        let value = next_value;
        next_value = next_value.wrapping_add(1);

        let constant_type = QualType::unqualified(enum_ty);
        let kind = SymbolKind::EnumConstant { value };
        if p.ctx.symbols.at_global_scope() {
            validate::declare_global(p.ctx, name, constant_type, None, kind, span);
        } else {
            validate::declare_local(p.ctx, name, constant_type, None, kind, span);
        }
        enumerators.push(EnumConstant { name, value, span });

        if p.accept(TokenKind::Comma).is_none() {
            break;
        }
    }
    Ok(enumerators)
}

// === Initializers ===

fn parse_initializer(p: &mut Parser, target: QualType) -> ParseResult<NodeRef> {
    if p.is_token(TokenKind::LeftBrace) {
        return parse_braced_initializer(p, target);
    }

    let expr = expressions::parse_assignment(p)?;

    // A string literal initializes a char array directly. It stays
    // undecayed; its own array type carries the length.
    if char_array_element(p, target).is_some() {
        if let NodeKind::ConstString(_) = p.ast.get_kind(expr) {
            check_string_fit(p, target, expr);
            return Ok(expr);
        }
    }

    let span = p.ast.get_span(expr);
    Ok(expressions::convert_for_assignment(p, expr, target, span))
}

fn parse_braced_initializer(p: &mut Parser, target: QualType) -> ParseResult<NodeRef> {
    let open = p.expect(TokenKind::LeftBrace)?;

    // `char s[] = {"text"}`: the braced form of a string initializer
    if char_array_element(p, target).is_some() && matches!(p.current_kind(), TokenKind::StringLiteral(_)) {
        let string = parse_initializer(p, target)?;
        p.accept(TokenKind::Comma);
        p.expect(TokenKind::RightBrace)?;
        return Ok(string);
    }

    let mut elements: ThinVec<NodeRef> = ThinVec::new();
    let mut reported_excess = false;

    while !p.is_token(TokenKind::RightBrace) {
        let position = elements.len() as u64;
        let (element_target, aggregate) = element_target_at(p, target, position);

        if element_target.is_none() && !reported_excess {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("excess elements in {} initializer", aggregate),
                location: p.current_span(),
            });
            reported_excess = true;
        }

        let fallback = QualType::unqualified(p.ctx.types.type_error);
        let element = parse_initializer(p, element_target.unwrap_or(fallback))?;
        elements.push(element);

        if p.accept(TokenKind::Comma).is_none() {
            break;
        }
    }
    let close = p.expect(TokenKind::RightBrace)?;

    let span = open.span.merge(close.span);
    Ok(p.ast.push_node(NodeKind::InitList(elements), span, target, false))
}

/// The target type for the initializer at `position`, or `None` past
/// the end. The second value names the aggregate for diagnostics.
fn element_target_at(p: &Parser, target: QualType, position: u64) -> (Option<QualType>, &'static str) {
    match p.ctx.types.kind(target.ty) {
        TypeKind::Array { element_type, size, .. } => {
            let within = match size {
                ArraySizeType::Fixed(n) => position < *n,
                _ => true,
            };
            (within.then_some(*element_type), "array")
        }
        TypeKind::Record { is_complete: false, .. } => {
            // The incomplete-type error is reported by the declaration
            (Some(QualType::unqualified(p.ctx.types.type_error)), "struct")
        }
        TypeKind::Record {
            members,
            is_union: false,
            ..
        } => (
            members.get(position as usize).map(|member| member.member_type),
            "struct",
        ),
        TypeKind::Record {
            members,
            is_union: true,
            ..
        } => {
            if position == 0 {
                (members.first().map(|member| member.member_type), "union")
            } else {
                (None, "union")
            }
        }
        TypeKind::Error => (Some(QualType::unqualified(p.ctx.types.type_error)), "scalar"),
        _ => ((position == 0).then_some(target), "scalar"),
    }
}

/// The element type when `ty` is an array of character type.
fn char_array_element(p: &Parser, ty: QualType) -> Option<QualType> {
    match p.ctx.types.kind(ty.ty) {
        TypeKind::Array { element_type, .. } => match p.ctx.types.kind(element_type.ty) {
            TypeKind::Char { .. } => Some(*element_type),
            _ => None,
        },
        _ => None,
    }
}

fn check_string_fit(p: &mut Parser, target: QualType, string: NodeRef) {
    let TypeKind::Array {
        size: ArraySizeType::Fixed(length),
        ..
    } = p.ctx.types.kind(target.ty)
    else {
        return;
    };
    let length = *length;
    let NodeKind::ConstString(spelling) = p.ast.get_kind(string) else {
        return;
    };
    // Exactly filling the array, dropping the terminator, is allowed
    let decoded = lexer::decode_string_spelling(spelling.as_str());
    if decoded.len() as u64 > length {
        p.ctx.diagnostics.report_warning(SemanticWarning::Message {
            message: "initializer-string for char array is too long".to_string(),
            location: p.ast.get_span(string),
        });
    }
}

/// `int x[] = {...}` takes its length from the initializer; a string
/// initializer contributes its own array type.
fn complete_array_from_initializer(p: &mut Parser, ty: QualType, init: NodeRef) -> QualType {
    let TypeKind::Array {
        element_type,
        size: ArraySizeType::Incomplete,
        ..
    } = p.ctx.types.kind(ty.ty)
    else {
        return ty;
    };
    let element_type = *element_type;

    let length = match p.ast.get_kind(init) {
        NodeKind::InitList(items) => items.len() as u64,
        NodeKind::ConstString(_) => match p.ctx.types.kind(p.ast.get_type(init).ty) {
            TypeKind::Array {
                size: ArraySizeType::Fixed(n),
                ..
            } => *n,
            _ => return ty,
        },
        _ => return ty,
    };

    let completed = p.ctx.types.array_of(element_type, ArraySizeType::Fixed(length));
    QualType::new(completed, ty.qualifiers)
}

// === Static initializer values ===

/// Whether `node` can be evaluated at link time: arithmetic constants,
/// string literals, addresses of static-storage objects, and constant
/// offsets from those.
fn is_address_constant(p: &Parser, node: NodeRef) -> bool {
    if expressions::eval_const_int(p, node).is_some() {
        return true;
    }
    match p.ast.get_kind(node) {
        NodeKind::ConstInt(_) | NodeKind::ConstFloat(_) | NodeKind::ConstString(_) => true,
        NodeKind::InitList(items) => items.iter().all(|&item| is_address_constant(p, item)),
        NodeKind::Conv(inner) => is_address_constant(p, *inner),
        NodeKind::Decay(inner) => is_static_lvalue(p, *inner),
        NodeKind::Unary(UnaryOp::AddrOf, inner) => is_static_lvalue(p, *inner),
        NodeKind::Unary(UnaryOp::Plus | UnaryOp::Minus | UnaryOp::BitNot, inner) => is_address_constant(p, *inner),
        NodeKind::Binary(BinaryOp::Add | BinaryOp::Sub, lhs, rhs) => {
            is_address_constant(p, *lhs) && is_address_constant(p, *rhs)
        }
        NodeKind::Ident(entry_ref) => {
            let entry = p.ctx.symbols.entry(*entry_ref);
            matches!(
                entry.kind,
                SymbolKind::Function { .. } | SymbolKind::EnumConstant { .. }
            )
        }
        NodeKind::Error => true,
        _ => false,
    }
}

/// An lvalue designating an object with static storage duration.
fn is_static_lvalue(p: &Parser, node: NodeRef) -> bool {
    match p.ast.get_kind(node) {
        NodeKind::ConstString(_) => true,
        NodeKind::Ident(entry_ref) => {
            let entry = p.ctx.symbols.entry(*entry_ref);
            match entry.kind {
                SymbolKind::Function { .. } => true,
                SymbolKind::Variable { is_global, .. } => {
                    is_global || entry.storage_class == Some(StorageClass::Static)
                }
                _ => false,
            }
        }
        NodeKind::Member(base, _) => is_static_lvalue(p, *base),
        NodeKind::Index(base, index) => is_address_constant(p, *base) && is_address_constant(p, *index),
        NodeKind::Unary(UnaryOp::Deref, inner) => is_address_constant(p, *inner),
        NodeKind::Error => true,
        _ => false,
    }
}

// === Local initializer lowering ===

/// Lowers an automatic variable's initializer to assignments, one per
/// scalar element. `init` is `None` for the zero-filled tail of a
/// partial aggregate initializer.
fn expand_local_initializer(
    p: &mut Parser,
    lvalue: NodeRef,
    target: QualType,
    init: Option<NodeRef>,
    span: SourceSpan,
    statements: &mut Vec<NodeRef>,
) {
    match p.ctx.types.kind(target.ty).clone() {
        TypeKind::Array { element_type, size, .. } => {
            let length = match size {
                ArraySizeType::Fixed(n) => n,
                _ => return,
            };

            if let Some(init_node) = init {
                if let NodeKind::ConstString(spelling) = p.ast.get_kind(init_node) {
                    let spelling = *spelling;
                    expand_string_initializer(p, lvalue, target, element_type, length, spelling, span, statements);
                    return;
                }
            }

            let items = match init {
                Some(init_node) => match p.ast.get_kind(init_node) {
                    NodeKind::InitList(items) => Some(items.clone()),
                    // A type error was already reported
                    _ => return,
                },
                None => None,
            };
            for index in 0..length {
                let element_init = items.as_ref().and_then(|items| items.get(index as usize).copied());
                let element = index_lvalue(p, lvalue, target, element_type, index, span);
                expand_local_initializer(p, element, element_type, element_init, span, statements);
            }
        }
        TypeKind::Record { members, is_union, .. } => {
            let items = match init {
                Some(init_node) => match p.ast.get_kind(init_node) {
                    NodeKind::InitList(items) => Some(items.clone()),
                    _ => {
                        // Whole-record assignment from a compatible value
                        push_assign(p, lvalue, init_node, span, statements);
                        return;
                    }
                },
                None => None,
            };
            for (index, member) in members.iter().enumerate() {
                if is_union && index > 0 {
                    break;
                }
                let member_init = items.as_ref().and_then(|items| items.get(index).copied());
                let field = p
                    .ast
                    .push_node(NodeKind::Member(lvalue, index as u32), span, member.member_type, true);
                expand_local_initializer(p, field, member.member_type, member_init, span, statements);
            }
        }
        TypeKind::Error => {}
        _ => {
            let value = match init {
                Some(init_node) => match p.ast.get_kind(init_node) {
                    // `int x = {5}` carries one element
                    NodeKind::InitList(items) => items.first().copied(),
                    _ => Some(init_node),
                },
                None => None,
            };
            let value = match value {
                Some(value) => value,
                None => {
                    let zero = p.ast.push_node(
                        NodeKind::ConstInt(0),
                        span,
                        QualType::unqualified(p.ctx.types.type_int),
                        false,
                    );
                    expressions::convert_for_assignment(p, zero, target, span)
                }
            };
            push_assign(p, lvalue, value, span, statements);
        }
    }
}

fn expand_string_initializer(
    p: &mut Parser,
    lvalue: NodeRef,
    array_type: QualType,
    element_type: QualType,
    length: u64,
    spelling: StringId,
    span: SourceSpan,
    statements: &mut Vec<NodeRef>,
) {
    let bytes = lexer::decode_string_spelling(spelling.as_str());
    for index in 0..length {
        let value = bytes.get(index as usize).copied().unwrap_or(0);
        let element = index_lvalue(p, lvalue, array_type, element_type, index, span);
        let constant = p
            .ast
            .push_node(NodeKind::ConstInt(value as i64), span, element_type, false);
        push_assign(p, element, constant, span, statements);
    }
}

fn index_lvalue(
    p: &mut Parser,
    array: NodeRef,
    array_type: QualType,
    element_type: QualType,
    index: u64,
    span: SourceSpan,
) -> NodeRef {
    let pointer_type = p.ctx.types.decay(array_type);
    let base = p.ast.push_node(NodeKind::Decay(array), span, pointer_type, false);
    let index_node = p.ast.push_node(
        NodeKind::ConstInt(index as i64),
        span,
        QualType::unqualified(p.ctx.types.type_long),
        false,
    );
    p.ast.push_node(NodeKind::Index(base, index_node), span, element_type, true)
}

fn push_assign(p: &mut Parser, lvalue: NodeRef, value: NodeRef, span: SourceSpan, statements: &mut Vec<NodeRef>) {
    let result_type = p.ctx.types.strip_all(p.ast.get_type(lvalue));
    let assign = p.ast.push_node(NodeKind::Assign(lvalue, value), span, result_type, false);
    let void_type = QualType::unqualified(p.ctx.types.type_void);
    let statement = p
        .ast
        .push_node(NodeKind::ExpressionStatement(assign), span, void_type, false);
    statements.push(statement);
}
