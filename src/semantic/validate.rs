//! Declaration rules and semantic checks.
//!
//! The parser calls into this module as declarators complete: global and
//! block-scope declaration merging, tag resolution, bit-field and field
//! list checks, `main` signature validation, storage class legality, and
//! the end-of-unit unused-static pass. The symbol table provides the
//! storage mechanics; the C rules live here.

use log::debug;

use crate::ast::StorageClass;
use crate::context::CompilationContext;
use crate::diagnostic::{SemanticError, SemanticWarning};
use crate::intern::StringId;
use crate::source_manager::{SourceId, SourceSpan};

use super::symbol_table::{DefinitionState, Namespace, ScopeId, SymbolEntry, SymbolEntryRef, SymbolKind};
use super::types::{ArraySizeType, QualType, TypeKind, TypeRef};

/// Which tag keyword introduced a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Struct,
    Union,
    Enum,
}

impl TagKind {
    fn matches(self, kind: &TypeKind) -> bool {
        match kind {
            TypeKind::Record { is_union: false, .. } => self == TagKind::Struct,
            TypeKind::Record { is_union: true, .. } => self == TagKind::Union,
            TypeKind::Enum { .. } => self == TagKind::Enum,
            _ => false,
        }
    }
}

fn kind_class(kind: &SymbolKind) -> u8 {
    match kind {
        SymbolKind::Variable { .. } => 0,
        SymbolKind::Function { .. } => 1,
        SymbolKind::Typedef => 2,
        SymbolKind::EnumConstant { .. } => 3,
        SymbolKind::Label { .. } => 4,
        SymbolKind::Tag => 5,
    }
}

fn has_external_linkage(storage: Option<StorageClass>) -> bool {
    matches!(storage, None | Some(StorageClass::Extern))
}

/// Declare `name` at file scope, merging with an existing declaration
/// when the types are equivalent. Returns the surviving entry; on a
/// conflict the previous entry survives so later references keep
/// working.
pub fn declare_global(
    ctx: &mut CompilationContext,
    name: StringId,
    type_info: QualType,
    storage_class: Option<StorageClass>,
    kind: SymbolKind,
    span: SourceSpan,
) -> SymbolEntryRef {
    debug_assert!(ctx.symbols.at_global_scope());

    let def_state = initial_def_state(storage_class, &kind);
    let Some(existing_ref) = ctx.symbols.lookup_in_scope_ns(name, ScopeId::GLOBAL, Namespace::Ordinary) else {
        return ctx.symbols.install(
            name,
            SymbolEntry {
                name,
                kind,
                type_info,
                storage_class,
                scope_id: ScopeId::GLOBAL,
                def_span: span,
                def_state,
                is_referenced: false,
            },
            Namespace::Ordinary,
        );
    };

    let existing = ctx.symbols.entry(existing_ref);
    let previous_span = existing.def_span;

    // A variable cannot redeclare a function, a typedef cannot
    // redeclare either, and so on
    if kind_class(&existing.kind) != kind_class(&kind) {
        let previous = ctx.format_location(previous_span);
        ctx.diagnostics.report_error(SemanticError::Redefinition {
            name,
            previous,
            location: span,
        });
        return existing_ref;
    }

    if matches!(kind, SymbolKind::EnumConstant { .. }) {
        let previous = ctx.format_location(previous_span);
        ctx.diagnostics.report_error(SemanticError::Redefinition {
            name,
            previous,
            location: span,
        });
        return existing_ref;
    }

    if !ctx.types.is_compatible(existing.type_info, type_info) {
        let previous = ctx.format_location(previous_span);
        ctx.diagnostics.report_error(SemanticError::ConflictingTypes {
            name,
            previous,
            location: span,
        });
        return existing_ref;
    }

    // Storage class ordering. `extern` adopts whatever linkage is
    // already established; `static` must come first. A function with
    // no storage class keeps an earlier internal linkage.
    let existing_static = existing.is_static();
    let is_function = existing.is_function();
    if storage_class == Some(StorageClass::Static) && has_external_linkage(existing.storage_class) {
        ctx.diagnostics
            .report_error(SemanticError::StaticAfterNonStatic { name, location: span });
        return existing_ref;
    }
    if existing_static && storage_class.is_none() && !is_function {
        ctx.diagnostics
            .report_error(SemanticError::NonStaticAfterStatic { name, location: span });
        return existing_ref;
    }

    let merged_type = ctx.types.composite(existing.type_info, type_info);
    let existing = ctx.symbols.entry_mut(existing_ref);
    existing.type_info = merged_type;
    existing.def_state = def_state_max(existing.def_state, def_state);
    debug!("merged global declaration of {:?}", name);
    existing_ref
}

fn initial_def_state(storage_class: Option<StorageClass>, kind: &SymbolKind) -> DefinitionState {
    match kind {
        // Functions and externs are declarations until a body or
        // initializer arrives; a plain object declaration is tentative
        SymbolKind::Function { .. } => DefinitionState::DeclaredOnly,
        SymbolKind::Variable { .. } if storage_class == Some(StorageClass::Extern) => DefinitionState::DeclaredOnly,
        SymbolKind::Variable { .. } => DefinitionState::Tentative,
        _ => DefinitionState::Defined,
    }
}

fn def_state_max(a: DefinitionState, b: DefinitionState) -> DefinitionState {
    use DefinitionState::*;
    match (a, b) {
        (Defined, _) | (_, Defined) => Defined,
        (Tentative, _) | (_, Tentative) => Tentative,
        _ => DeclaredOnly,
    }
}

/// Promote a symbol to Defined when its initializer or function body
/// arrives. A second definition is an error and leaves the first one
/// in place.
pub fn mark_defined(ctx: &mut CompilationContext, entry_ref: SymbolEntryRef, span: SourceSpan) -> bool {
    let existing = ctx.symbols.entry(entry_ref);
    if existing.def_state == DefinitionState::Defined {
        let name = existing.name;
        let previous = ctx.format_location(existing.def_span);
        ctx.diagnostics.report_error(SemanticError::Redefinition {
            name,
            previous,
            location: span,
        });
        return false;
    }
    let entry = ctx.symbols.entry_mut(entry_ref);
    entry.def_state = DefinitionState::Defined;
    entry.def_span = span;
    true
}

/// Declare `name` in the current block or parameter scope.
///
/// Redeclaration in the same declaration space is an error, except that
/// function and `extern` declarations may coincide with each other,
/// which models referring again to a file-scope entity from a block.
pub fn declare_local(
    ctx: &mut CompilationContext,
    name: StringId,
    type_info: QualType,
    storage_class: Option<StorageClass>,
    kind: SymbolKind,
    span: SourceSpan,
) -> SymbolEntryRef {
    debug_assert!(!ctx.symbols.at_global_scope());

    if let Some(existing_ref) = ctx.symbols.conflicting_in_declaration_space(name) {
        let existing = ctx.symbols.entry(existing_ref);
        let linkage_decl = existing.is_function() || existing.storage_class == Some(StorageClass::Extern);
        let new_linkage_decl =
            matches!(kind, SymbolKind::Function { .. }) || storage_class == Some(StorageClass::Extern);
        if linkage_decl && new_linkage_decl {
            if !ctx.types.is_compatible(existing.type_info, type_info) {
                let previous = ctx.format_location(existing.def_span);
                ctx.diagnostics.report_error(SemanticError::ConflictingTypes {
                    name,
                    previous,
                    location: span,
                });
            }
            return existing_ref;
        }
        let previous = ctx.format_location(existing.def_span);
        ctx.diagnostics.report_error(SemanticError::Redefinition {
            name,
            previous,
            location: span,
        });
        return existing_ref;
    }

    let def_state = initial_def_state(storage_class, &kind);
    let scope_id = ctx.symbols.current_scope();
    ctx.symbols.install(
        name,
        SymbolEntry {
            name,
            kind,
            type_info,
            storage_class,
            scope_id,
            def_span: span,
            def_state,
            is_referenced: false,
        },
        Namespace::Ordinary,
    )
}

/// Resolve a `struct`/`union`/`enum` tag reference or definition.
///
/// A definition (`with_body`) looks only in the current scope: an
/// incomplete tag there gets completed, a complete one is a
/// redefinition. A reference searches outward and declares an
/// incomplete tag in the current scope when nothing is found.
pub fn resolve_tag(
    ctx: &mut CompilationContext,
    tag_kind: TagKind,
    name: StringId,
    with_body: bool,
    span: SourceSpan,
) -> TypeRef {
    let found = if with_body {
        ctx.symbols
            .lookup_in_scope_ns(name, ctx.symbols.current_scope(), Namespace::Tag)
            .map(|entry_ref| (entry_ref, ctx.symbols.current_scope()))
    } else {
        ctx.symbols.lookup_tag(name)
    };

    if let Some((entry_ref, _)) = found {
        let existing = ctx.symbols.entry(entry_ref);
        let existing_ty = existing.type_info.ty;
        let previous_span = existing.def_span;

        if !tag_kind.matches(ctx.types.kind(existing_ty)) {
            let previous_tag = ctx.types.display(QualType::unqualified(existing_ty));
            let previous = ctx.format_location(previous_span);
            ctx.diagnostics.report_error(SemanticError::TagKindMismatch {
                name,
                previous_tag,
                previous,
                location: span,
            });
            return new_tag_type(ctx, tag_kind, Some(name));
        }

        if with_body && ctx.types.is_complete(existing_ty) {
            let previous = ctx.format_location(previous_span);
            ctx.diagnostics.report_error(SemanticError::Redefinition {
                name,
                previous,
                location: span,
            });
            // Keep parsing the body against a fresh type
            return new_tag_type(ctx, tag_kind, Some(name));
        }

        ctx.symbols.mark_referenced(entry_ref);
        return existing_ty;
    }

    let ty = new_tag_type(ctx, tag_kind, Some(name));
    let scope_id = ctx.symbols.current_scope();
    ctx.symbols.install(
        name,
        SymbolEntry {
            name,
            kind: SymbolKind::Tag,
            type_info: QualType::unqualified(ty),
            storage_class: None,
            scope_id,
            def_span: span,
            def_state: DefinitionState::Defined,
            is_referenced: false,
        },
        Namespace::Tag,
    );
    ty
}

fn new_tag_type(ctx: &mut CompilationContext, tag_kind: TagKind, tag: Option<StringId>) -> TypeRef {
    match tag_kind {
        TagKind::Struct => ctx.types.declare_record(tag, false),
        TagKind::Union => ctx.types.declare_record(tag, true),
        TagKind::Enum => ctx.types.declare_enum(tag),
    }
}

// === Declarator checks ===

/// Reject illegal array element types. The flexible-array exception is
/// handled by the field-list check, not here.
pub fn check_array_element(ctx: &mut CompilationContext, element: QualType, span: SourceSpan) -> bool {
    if ctx.types.kind(element.ty).is_function() {
        ctx.diagnostics.report_error(SemanticError::Message {
            message: "array of function is invalid".to_string(),
            location: span,
        });
        return false;
    }
    if !ctx.types.is_complete(element.ty) {
        let type_name = ctx.types.display(element);
        ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("array has incomplete element type '{}'", type_name),
            location: span,
        });
        return false;
    }
    true
}

/// Reject function types that return arrays or functions.
pub fn check_return_type(ctx: &mut CompilationContext, return_type: QualType, span: SourceSpan) -> bool {
    let kind = ctx.types.kind(return_type.ty);
    if kind.is_array() {
        let type_name = ctx.types.display(return_type);
        ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("function cannot return array type '{}'", type_name),
            location: span,
        });
        return false;
    }
    if kind.is_function() {
        let type_name = ctx.types.display(return_type);
        ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("function cannot return function type '{}'", type_name),
            location: span,
        });
        return false;
    }
    true
}

pub fn check_inline(ctx: &mut CompilationContext, is_inline: bool, ty: QualType, span: SourceSpan) {
    if is_inline && !ctx.types.kind(ty.ty).is_function() {
        ctx.diagnostics.report_error(SemanticError::Message {
            message: "'inline' can only appear on functions".to_string(),
            location: span,
        });
    }
}

pub fn check_file_scope_storage(ctx: &mut CompilationContext, storage: Option<StorageClass>, span: SourceSpan) {
    if matches!(storage, Some(StorageClass::Auto) | Some(StorageClass::Register)) {
        ctx.diagnostics.report_error(SemanticError::Message {
            message: "illegal storage class on file-scoped variable".to_string(),
            location: span,
        });
    }
}

pub fn check_block_function_storage(ctx: &mut CompilationContext, storage: Option<StorageClass>, span: SourceSpan) {
    if let Some(sc) = storage {
        if sc != StorageClass::Extern {
            ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("function declared in block scope cannot have '{}' storage class", sc.as_str()),
                location: span,
            });
        }
    }
}

/// A defined variable must have a complete type. Extern declarations
/// and function parameters are checked elsewhere.
pub fn check_complete_variable(ctx: &mut CompilationContext, ty: QualType, span: SourceSpan) -> bool {
    if !ctx.types.is_complete(ty.ty) {
        let type_name = ctx.types.display(ty);
        ctx.diagnostics
            .report_error(SemanticError::IncompleteVariable { type_name, location: span });
        return false;
    }
    true
}

// === Fields and bit-fields ===

/// Validate one bit-field and return its width when usable.
pub fn check_bit_field(
    ctx: &mut CompilationContext,
    name: Option<StringId>,
    field_type: QualType,
    width: i64,
    span: SourceSpan,
) -> Option<u32> {
    if !ctx.types.kind(field_type.ty).is_integer() {
        let type_name = ctx.types.display(field_type);
        let message = match name {
            Some(n) => format!("bit-field '{}' has non-integral type '{}'", n, type_name),
            None => format!("anonymous bit-field has non-integral type '{}'", type_name),
        };
        ctx.diagnostics
            .report_error(SemanticError::Message { message, location: span });
        return None;
    }
    if width < 0 {
        let message = match name {
            Some(n) => format!("bit-field '{}' has negative width '{}'", n, width),
            None => format!("anonymous bit-field has negative width '{}'", width),
        };
        ctx.diagnostics
            .report_error(SemanticError::Message { message, location: span });
        return None;
    }
    if width == 0 {
        if let Some(n) = name {
            ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("named bit-field '{}' has zero width", n),
                location: span,
            });
            return None;
        }
        return Some(0);
    }

    let type_bits = ctx.types.size_of(field_type.ty).unwrap_or(4) * 8;
    if width as u64 > type_bits {
        let message = match name {
            Some(n) => format!(
                "size of bit-field '{}' ({} bits) exceeds size of its type ({} bits)",
                n, width, type_bits
            ),
            None => format!("anonymous bit-field ({} bits) exceeds size of its type ({} bits)", width, type_bits),
        };
        ctx.diagnostics
            .report_error(SemanticError::Message { message, location: span });
        return None;
    }
    Some(width as u32)
}

/// Validate a completed field list before the record is completed.
/// Returns false when the list is unusable.
pub fn check_fields(ctx: &mut CompilationContext, members: &[super::types::StructMember], is_union: bool) -> bool {
    let mut ok = true;
    let count = members.len();
    for (index, m) in members.iter().enumerate() {
        let is_last = index == count - 1;
        let kind = ctx.types.kind(m.member_type.ty);
        if kind.is_function() {
            let type_name = ctx.types.display(m.member_type);
            ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("field has invalid type '{}'", type_name),
                location: m.span,
            });
            ok = false;
            continue;
        }
        let is_flexible = matches!(
            kind,
            TypeKind::Array {
                size: ArraySizeType::Incomplete,
                ..
            }
        );
        if is_flexible {
            if count == 1 {
                ctx.diagnostics.report_error(SemanticError::Message {
                    message: "flexible array cannot be the only member".to_string(),
                    location: m.span,
                });
                ok = false;
            } else if !is_last || is_union {
                let type_name = ctx.types.display(m.member_type);
                ctx.diagnostics.report_error(SemanticError::Message {
                    message: format!("field has incomplete type '{}'", type_name),
                    location: m.span,
                });
                ok = false;
            }
            continue;
        }
        if !ctx.types.is_complete(m.member_type.ty) {
            let type_name = ctx.types.display(m.member_type);
            ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("field has incomplete type '{}'", type_name),
                location: m.span,
            });
            ok = false;
        }
    }
    ok
}

// === main ===

/// Check the signature of a file-scope function named `main`.
pub fn check_main(ctx: &mut CompilationContext, func_type: TypeRef, span: SourceSpan) {
    let TypeKind::Function {
        return_type,
        parameters,
        ..
    } = ctx.types.kind(func_type).clone()
    else {
        return;
    };

    if return_type.ty != ctx.types.type_int {
        ctx.diagnostics.report_error(SemanticError::Message {
            message: "return type of 'main' is not 'int'".to_string(),
            location: span,
        });
    }

    let n = parameters.len();
    if n != 0 && n != 2 && n != 3 {
        ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("expect 0, 2 or 3 parameters for 'main', have {}", n),
            location: span,
        });
        return;
    }

    if n >= 2 {
        if parameters[0].param_type.ty != ctx.types.type_int {
            ctx.diagnostics.report_error(SemanticError::Message {
                message: "first parameter of 'main' is not 'int'".to_string(),
                location: span,
            });
        }
        for (i, ordinal) in [(1, "second"), (2, "third")] {
            if i >= n {
                break;
            }
            if !is_char_ptr_ptr(ctx, parameters[i].param_type) {
                ctx.diagnostics.report_error(SemanticError::Message {
                    message: format!("{} parameter of 'main' is not 'char **'", ordinal),
                    location: span,
                });
            }
        }
    }
}

fn is_char_ptr_ptr(ctx: &CompilationContext, ty: QualType) -> bool {
    let Some(inner) = ctx.types.pointee_of(ty.ty) else {
        return false;
    };
    if !inner.qualifiers.is_empty() {
        return false;
    }
    let Some(pointee) = ctx.types.pointee_of(inner.ty) else {
        return false;
    };
    pointee.qualifiers.is_empty() && matches!(ctx.types.kind(pointee.ty), TypeKind::Char { is_signed: true })
}

// === Labels ===

pub fn define_label(ctx: &mut CompilationContext, name: StringId, span: SourceSpan) -> SymbolEntryRef {
    match ctx.symbols.define_label(name, span) {
        Ok(entry_ref) => entry_ref,
        Err(existing_ref) => {
            ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("duplicate label '{}'", name),
                location: span,
            });
            existing_ref
        }
    }
}

/// Report labels a `goto` names but the function never defines.
/// Called as each function body closes, before the scope pops.
pub fn check_undefined_labels(ctx: &mut CompilationContext) {
    for entry_ref in ctx.symbols.undefined_labels() {
        let entry = ctx.symbols.entry(entry_ref);
        let name = entry.name;
        let location = entry.def_span;
        ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("label '{}' used but not defined", name),
            location,
        });
    }
}

// === Unused pass ===

/// Warn about file-scope statics that were never referenced. Only
/// symbols declared in the primary file warn; the emitter separately
/// skips them.
pub fn report_unused_statics(ctx: &mut CompilationContext, primary: SourceId) {
    let mut unused: Vec<(StringId, bool, SourceSpan)> = Vec::new();
    for (_, entry) in ctx.symbols.global_symbols() {
        if !entry.is_static() || entry.is_referenced {
            continue;
        }
        if entry.def_span.source_id() != primary {
            continue;
        }
        match entry.kind {
            SymbolKind::Function { .. } => unused.push((entry.name, true, entry.def_span)),
            SymbolKind::Variable { .. } => unused.push((entry.name, false, entry.def_span)),
            _ => {}
        }
    }
    for (name, is_function, location) in unused {
        let warning = if is_function {
            SemanticWarning::UnusedFunction { name, location }
        } else {
            SemanticWarning::UnusedVariable { name, location }
        };
        ctx.diagnostics.report_warning(warning);
    }
}

/// Settle tentative definitions once the whole unit has been seen. A
/// still-incomplete array gets one element; any other incomplete type
/// has no size for the implied zero-initialized definition.
pub fn check_tentative_definitions(ctx: &mut CompilationContext) {
    let mut tentative: Vec<(SymbolEntryRef, QualType, SourceSpan)> = Vec::new();
    for (entry_ref, entry) in ctx.symbols.global_symbols() {
        if entry.def_state != DefinitionState::Tentative {
            continue;
        }
        if !matches!(entry.kind, SymbolKind::Variable { .. }) {
            continue;
        }
        if ctx.types.is_complete(entry.type_info.ty) {
            continue;
        }
        if matches!(ctx.types.kind(entry.type_info.ty), TypeKind::Error) {
            continue;
        }
        tentative.push((entry_ref, entry.type_info, entry.def_span));
    }

    for (entry_ref, type_info, location) in tentative {
        if let TypeKind::Array {
            element_type,
            size: ArraySizeType::Incomplete,
            ..
        } = ctx.types.kind(type_info.ty)
        {
            let element_type = *element_type;
            let completed = ctx.types.array_of(element_type, ArraySizeType::Fixed(1));
            ctx.symbols.entry_mut(entry_ref).type_info = QualType::new(completed, type_info.qualifiers);
            ctx.diagnostics.report_warning(SemanticWarning::Message {
                message: "tentative array definition assumed to have one element".to_string(),
                location,
            });
        } else {
            let type_name = ctx.types.display(type_info);
            ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("tentative definition has type '{}' that is never completed", type_name),
                location,
            });
        }
    }
}
