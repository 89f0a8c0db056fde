use crate::ast::StorageClass;
use crate::context::CompilationContext;
use crate::intern::intern;
use crate::source_manager::SourceSpan;

use super::symbol_table::{Namespace, ScopeKind, SymbolEntry, SymbolKind};
use super::types::QualType;
use super::validate::{self, TagKind};
use super::{DefinitionState, ScopeId};

fn variable_kind() -> SymbolKind {
    SymbolKind::Variable {
        is_global: true,
        initializer: None,
    }
}

fn function_kind() -> SymbolKind {
    SymbolKind::Function { is_inline: false }
}

fn entry(ctx: &CompilationContext, name: &str, kind: SymbolKind) -> SymbolEntry {
    SymbolEntry {
        name: intern(name),
        kind,
        type_info: QualType::unqualified(ctx.types.type_int),
        storage_class: None,
        scope_id: ScopeId::GLOBAL,
        def_span: SourceSpan::default(),
        def_state: DefinitionState::Tentative,
        is_referenced: false,
    }
}

fn messages(ctx: &CompilationContext) -> Vec<String> {
    ctx.diagnostics.diagnostics().iter().map(|d| d.message.clone()).collect()
}

#[test]
fn lookup_walks_scopes_outward() {
    let mut ctx = CompilationContext::new();
    let x = intern("x");

    let e = entry(&ctx, "x", variable_kind());
    let outer = ctx.symbols.install(x, e, Namespace::Ordinary);

    ctx.symbols.push_scope(ScopeKind::Block);
    let (found, scope) = ctx.symbols.lookup(x).unwrap();
    assert_eq!(found, outer);
    assert_eq!(scope, ScopeId::GLOBAL);

    // Shadowing: inner declaration wins until the scope pops
    let e2 = entry(&ctx, "x", variable_kind());
    let inner = ctx.symbols.install(x, e2, Namespace::Ordinary);
    let (found, _) = ctx.symbols.lookup(x).unwrap();
    assert_eq!(found, inner);

    ctx.symbols.pop_scope();
    let (found, _) = ctx.symbols.lookup(x).unwrap();
    assert_eq!(found, outer);
}

#[test]
fn namespaces_do_not_collide() {
    let mut ctx = CompilationContext::new();
    let name = intern("list");

    let e = entry(&ctx, "list", variable_kind());
    ctx.symbols.install(name, e, Namespace::Ordinary);

    // A struct tag with the same spelling is a different symbol
    assert!(ctx.symbols.lookup_tag(name).is_none());
    let tag_entry = entry(&ctx, "list", SymbolKind::Tag);
    ctx.symbols.install(name, tag_entry, Namespace::Tag);
    assert!(ctx.symbols.lookup_tag(name).is_some());
    assert!(ctx.symbols.lookup(name).is_some());
}

#[test]
fn params_and_body_share_a_declaration_space() {
    let mut ctx = CompilationContext::new();
    let a = intern("a");

    ctx.symbols.push_scope(ScopeKind::Param);
    let e = entry(&ctx, "a", variable_kind());
    let param_ref = ctx.symbols.install(a, e, Namespace::Ordinary);

    // The body's outermost block sees the parameter as a conflict
    ctx.symbols.push_scope(ScopeKind::Local);
    assert_eq!(ctx.symbols.conflicting_in_declaration_space(a), Some(param_ref));

    // A deeper block may shadow the parameter
    ctx.symbols.push_scope(ScopeKind::Block);
    assert_eq!(ctx.symbols.conflicting_in_declaration_space(a), None);
}

#[test]
fn global_merge_keeps_one_entry() {
    let mut ctx = CompilationContext::new();
    let f = intern("f");
    let int = QualType::unqualified(ctx.types.type_int);
    let fty = QualType::unqualified(ctx.types.function_type(int, vec![], false, true));

    let first = validate::declare_global(&mut ctx, f, fty, None, function_kind(), SourceSpan::default());
    let second = validate::declare_global(&mut ctx, f, fty, None, function_kind(), SourceSpan::default());
    assert_eq!(first, second);
    assert!(!ctx.diagnostics.has_errors());
}

#[test]
fn global_conflicting_types_reported() {
    let mut ctx = CompilationContext::new();
    let x = intern("x");
    let int = QualType::unqualified(ctx.types.type_int);
    let long = QualType::unqualified(ctx.types.type_long);

    validate::declare_global(&mut ctx, x, int, None, variable_kind(), SourceSpan::default());
    validate::declare_global(&mut ctx, x, long, None, variable_kind(), SourceSpan::default());
    assert_eq!(ctx.diagnostics.error_count(), 1);
    assert!(messages(&ctx)[0].starts_with("conflicting types for 'x'"));
}

#[test]
fn static_ordering_is_enforced() {
    let mut ctx = CompilationContext::new();
    let int = QualType::unqualified(ctx.types.type_int);

    // static int s; int s;  -> non-static follows static
    let s = intern("s");
    validate::declare_global(&mut ctx, s, int, Some(StorageClass::Static), variable_kind(), SourceSpan::default());
    validate::declare_global(&mut ctx, s, int, None, variable_kind(), SourceSpan::default());
    assert_eq!(
        messages(&ctx)[0],
        "non-static declaration of 's' follows static declaration"
    );

    // int t; static int t;  -> static follows non-static
    let t = intern("t");
    validate::declare_global(&mut ctx, t, int, None, variable_kind(), SourceSpan::default());
    validate::declare_global(&mut ctx, t, int, Some(StorageClass::Static), variable_kind(), SourceSpan::default());
    assert_eq!(messages(&ctx)[1], "static declaration of 't' follows non-static declaration");
}

#[test]
fn static_function_followed_by_plain_declaration_is_legal() {
    let mut ctx = CompilationContext::new();
    let f = intern("f");
    let int = QualType::unqualified(ctx.types.type_int);
    let fty = QualType::unqualified(ctx.types.function_type(int, vec![], false, true));

    validate::declare_global(&mut ctx, f, fty, Some(StorageClass::Static), function_kind(), SourceSpan::default());
    let merged = validate::declare_global(&mut ctx, f, fty, None, function_kind(), SourceSpan::default());
    assert!(!ctx.diagnostics.has_errors());
    assert!(ctx.symbols.entry(merged).is_static());
}

#[test]
fn second_definition_is_a_redefinition() {
    let mut ctx = CompilationContext::new();
    let x = intern("x");
    let int = QualType::unqualified(ctx.types.type_int);

    let r1 = validate::declare_global(&mut ctx, x, int, None, variable_kind(), SourceSpan::default());
    assert!(validate::mark_defined(&mut ctx, r1, SourceSpan::default()));

    let r2 = validate::declare_global(&mut ctx, x, int, None, variable_kind(), SourceSpan::default());
    assert_eq!(r1, r2);
    assert!(!validate::mark_defined(&mut ctx, r2, SourceSpan::default()));
    assert_eq!(ctx.diagnostics.error_count(), 1);
    assert!(messages(&ctx)[0].starts_with("redefinition of 'x'"));
}

#[test]
fn block_extern_coincides_with_global_function() {
    let mut ctx = CompilationContext::new();
    let f = intern("f");
    let int = QualType::unqualified(ctx.types.type_int);
    let fty = QualType::unqualified(ctx.types.function_type(int, vec![], false, true));

    validate::declare_global(&mut ctx, f, fty, None, function_kind(), SourceSpan::default());

    // inside some function body: extern int f(void);
    ctx.symbols.push_scope(ScopeKind::Param);
    ctx.symbols.push_scope(ScopeKind::Local);
    validate::declare_local(
        &mut ctx,
        f,
        fty,
        Some(StorageClass::Extern),
        function_kind(),
        SourceSpan::default(),
    );
    assert!(!ctx.diagnostics.has_errors());
}

#[test]
fn block_redeclaration_is_an_error() {
    let mut ctx = CompilationContext::new();
    let x = intern("x");
    let int = QualType::unqualified(ctx.types.type_int);

    ctx.symbols.push_scope(ScopeKind::Param);
    ctx.symbols.push_scope(ScopeKind::Local);
    let local = SymbolKind::Variable {
        is_global: false,
        initializer: None,
    };
    validate::declare_local(&mut ctx, x, int, None, local.clone(), SourceSpan::default());
    validate::declare_local(&mut ctx, x, int, None, local, SourceSpan::default());
    assert_eq!(ctx.diagnostics.error_count(), 1);
    assert!(messages(&ctx)[0].starts_with("redefinition of 'x'"));
}

#[test]
fn tag_forward_reference_completes_in_same_scope() {
    let mut ctx = CompilationContext::new();
    let node = intern("node");

    let forward = validate::resolve_tag(&mut ctx, TagKind::Struct, node, false, SourceSpan::default());
    assert!(!ctx.types.is_complete(forward));

    // struct node { ... } finds the same incomplete type
    let defined = validate::resolve_tag(&mut ctx, TagKind::Struct, node, true, SourceSpan::default());
    assert_eq!(forward, defined);
    assert!(!ctx.diagnostics.has_errors());
}

#[test]
fn complete_tag_redefinition_is_an_error() {
    let mut ctx = CompilationContext::new();
    let s = intern("s");

    let first = validate::resolve_tag(&mut ctx, TagKind::Struct, s, true, SourceSpan::default());
    ctx.types.complete_record(first, vec![]);

    let second = validate::resolve_tag(&mut ctx, TagKind::Struct, s, true, SourceSpan::default());
    assert_ne!(first, second);
    assert_eq!(ctx.diagnostics.error_count(), 1);
    assert!(messages(&ctx)[0].starts_with("redefinition of 's'"));
}

#[test]
fn tag_keyword_mismatch_is_an_error() {
    let mut ctx = CompilationContext::new();
    let s = intern("s");

    validate::resolve_tag(&mut ctx, TagKind::Struct, s, false, SourceSpan::default());
    validate::resolve_tag(&mut ctx, TagKind::Union, s, false, SourceSpan::default());
    assert_eq!(ctx.diagnostics.error_count(), 1);
    assert!(messages(&ctx)[0].starts_with("use of 's' with tag type that does not match previous declaration"));
}

#[test]
fn labels_track_definition_and_use() {
    let mut ctx = CompilationContext::new();
    ctx.symbols.push_scope(ScopeKind::Param);
    ctx.symbols.push_scope(ScopeKind::Local);

    let done = intern("done");
    let missing = intern("missing");

    // goto done; done: ...; goto missing;
    ctx.symbols.use_label(done, SourceSpan::default());
    validate::define_label(&mut ctx, done, SourceSpan::default());
    ctx.symbols.use_label(missing, SourceSpan::default());

    validate::check_undefined_labels(&mut ctx);
    assert_eq!(ctx.diagnostics.error_count(), 1);
    assert_eq!(messages(&ctx)[0], "label 'missing' used but not defined");
}

#[test]
fn duplicate_label_is_an_error() {
    let mut ctx = CompilationContext::new();
    ctx.symbols.push_scope(ScopeKind::Param);
    ctx.symbols.push_scope(ScopeKind::Local);

    let l = intern("l");
    validate::define_label(&mut ctx, l, SourceSpan::default());
    validate::define_label(&mut ctx, l, SourceSpan::default());
    assert_eq!(ctx.diagnostics.error_count(), 1);
    assert_eq!(messages(&ctx)[0], "duplicate label 'l'");
}

#[test]
fn unreferenced_statics_warn_in_primary_file() {
    let mut ctx = CompilationContext::new();
    let primary = ctx.sources.add_buffer(b"static int dead; static int live;".to_vec(), "main.c");
    let span = crate::source_manager::SourceSpan::new_with_length(primary, 0, 6);

    let int = QualType::unqualified(ctx.types.type_int);
    validate::declare_global(&mut ctx, intern("dead"), int, Some(StorageClass::Static), variable_kind(), span);
    let live = validate::declare_global(&mut ctx, intern("live"), int, Some(StorageClass::Static), variable_kind(), span);
    ctx.symbols.mark_referenced(live);

    validate::report_unused_statics(&mut ctx, primary);
    let msgs = messages(&ctx);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0], "unused variable 'dead'");
    assert!(!ctx.diagnostics.has_errors());
}
