//! Shared test utilities.
//!
//! Integration tests drive the compiler through these helpers instead of
//! rebuilding the lexer-to-emitter plumbing in every file. Helpers that
//! can fail return the rendered diagnostics, so a failing test prints
//! what the compiler actually said.

use crate::ast::Ast;
use crate::context::CompilationContext;
use crate::diagnostic::ErrorFormatter;
use crate::emit::emit_unit;
use crate::ir::lower::lower_unit;
use crate::lexer::{Lexer, TokenKind};
use crate::parser::{token_text, Parser};
use crate::semantic::SymbolKind;

/// Run the front end on a source string: lex, parse, validate.
fn run_front_end(input: &str, filename: &str) -> (CompilationContext, Ast, crate::ast::TranslationUnit) {
    let mut ctx = CompilationContext::new();
    let source_id = ctx.sources.add_buffer(input.as_bytes().to_vec(), filename);
    let tokens = Lexer::new(ctx.sources.get_buffer(source_id), source_id).tokenize(&mut ctx.diagnostics);
    let mut ast = Ast::new();
    let unit = Parser::new(&mut ctx, &mut ast, &tokens).parse_translation_unit();
    (ctx, ast, unit)
}

/// All diagnostics in source order, rendered the way the driver prints
/// them.
fn rendered_diagnostics(ctx: &CompilationContext) -> Vec<String> {
    let formatter = ErrorFormatter::default();
    ctx.diagnostics
        .sorted_diagnostics()
        .into_iter()
        .map(|diag| formatter.format_diagnostic(diag, &ctx.sources))
        .collect()
}

/// Compile a source string to assembly text. `Err` carries the rendered
/// diagnostics when the front end rejects the input.
pub fn compile_to_assembly(input: &str, filename: &str) -> Result<String, Vec<String>> {
    let (mut ctx, ast, unit) = run_front_end(input, filename);
    if ctx.diagnostics.has_errors() {
        return Err(rendered_diagnostics(&ctx));
    }
    let ir = lower_unit(&mut ctx, &ast, &unit);
    Ok(emit_unit(&mut ctx, &ast, &unit, &ir))
}

/// Compile a source string and render the lowered IR.
pub fn compile_to_ir(input: &str, filename: &str) -> Result<String, Vec<String>> {
    let (mut ctx, ast, unit) = run_front_end(input, filename);
    if ctx.diagnostics.has_errors() {
        return Err(rendered_diagnostics(&ctx));
    }
    let ir = lower_unit(&mut ctx, &ast, &unit);
    Ok(ir.to_string())
}

/// Run the front end and return every diagnostic it produced, errors and
/// warnings both, in source order.
pub fn compile_and_get_diagnostics(input: &str, filename: &str) -> Vec<String> {
    let (ctx, _ast, _unit) = run_front_end(input, filename);
    rendered_diagnostics(&ctx)
}

/// Parse a source string and render its file-scope variables and
/// functions as C declarations, in declaration order. Panics when the
/// input does not parse cleanly.
pub fn declaration_types(input: &str) -> Vec<String> {
    let (ctx, _ast, _unit) = run_front_end(input, "test.c");
    assert!(
        !ctx.diagnostics.has_errors(),
        "unexpected errors for {:?}: {:?}",
        input,
        rendered_diagnostics(&ctx)
    );
    ctx.symbols
        .global_symbols()
        .filter(|(_, entry)| matches!(entry.kind, SymbolKind::Variable { .. } | SymbolKind::Function { .. }))
        .map(|(_, entry)| ctx.types.display_declaration(entry.type_info, &entry.name.to_string()))
        .collect()
}

/// Lex a source string and return the token spellings up to end of file.
/// Panics when the lexer reports an error.
pub fn token_listing(input: &str) -> Vec<String> {
    let mut ctx = CompilationContext::new();
    let source_id = ctx.sources.add_buffer(input.as_bytes().to_vec(), "test.c");
    let tokens = Lexer::new(ctx.sources.get_buffer(source_id), source_id).tokenize(&mut ctx.diagnostics);
    assert!(
        !ctx.diagnostics.has_errors(),
        "unexpected lex errors for {:?}: {:?}",
        input,
        rendered_diagnostics(&ctx)
    );
    tokens
        .iter()
        .take_while(|token| token.kind != TokenKind::EndOfFile)
        .map(|token| token_text(&token.kind))
        .collect()
}
