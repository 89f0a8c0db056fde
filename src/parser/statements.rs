//! Statement parsing.
//!
//! Compound statements own their scope: the scope is pushed before the
//! block items parse and popped on every exit path, so declarations
//! inside a broken block never leak. Statement nodes are typed `void`;
//! the expressions hanging off them carry the real types.

use crate::ast::{NodeKind, NodeRef};
use crate::diagnostic::{ParseError, SemanticError, SemanticWarning};
use crate::intern::StringId;
use crate::lexer::TokenKind;
use crate::semantic::validate;
use crate::semantic::{QualType, ScopeId, ScopeKind, TypeKind};
use crate::source_manager::SourceSpan;

use super::{declarations, expressions, ParseResult, Parser};

/// Compound statement. The caller picks the scope kind: `Local` for a
/// function body, `Block` for a nested block.
pub(crate) fn parse_compound(p: &mut Parser, kind: ScopeKind) -> ParseResult<NodeRef> {
    let open = p.expect(TokenKind::LeftBrace)?;
    let scope_id = p.ctx.symbols.push_scope(kind);
    let result = parse_block_items(p, scope_id, open.span);
    p.ctx.symbols.pop_scope();
    result
}

/// Block items up to the closing brace. A parse error inside one item
/// is reported and the stream skips ahead to the next boundary, so one
/// broken statement does not take the rest of the block with it.
fn parse_block_items(p: &mut Parser, scope_id: ScopeId, open_span: SourceSpan) -> ParseResult<NodeRef> {
    let mut statements: Vec<NodeRef> = Vec::new();

    while !p.is_token(TokenKind::RightBrace) && !p.is_token(TokenKind::EndOfFile) {
        if p.ctx.diagnostics.is_over_limit() {
            break;
        }
        let result = if p.starts_declaration() {
            declarations::parse_local_declaration(p, &mut statements)
        } else {
            parse_statement(p).map(|statement| statements.push(statement))
        };
        if let Err(error) = result {
            p.ctx.diagnostics.report_parse_error(error);
            p.synchronize();
        }
    }

    let close = p.expect(TokenKind::RightBrace)?;
    let span = open_span.merge(close.span);
    let ty = QualType::unqualified(p.ctx.types.type_void);
    Ok(p.ast.push_node(NodeKind::Compound(scope_id, statements), span, ty, false))
}

fn parse_statement(p: &mut Parser) -> ParseResult<NodeRef> {
    let token = p.current_token()?;
    match token.kind {
        TokenKind::LeftBrace => parse_compound(p, ScopeKind::Block),
        TokenKind::Semicolon => {
            p.advance();
            Ok(push_statement(p, NodeKind::Empty, token.span))
        }
        TokenKind::If => parse_if(p),
        TokenKind::While => parse_while(p),
        TokenKind::Do => parse_do_while(p),
        TokenKind::For => parse_for(p),
        TokenKind::Return => parse_return(p),
        TokenKind::Break => parse_break(p),
        TokenKind::Continue => parse_continue(p),
        TokenKind::Goto => parse_goto(p),
        TokenKind::Switch | TokenKind::Case | TokenKind::Default => Err(ParseError::SyntaxError {
            message: "switch statement is not supported".to_string(),
            location: token.span,
        }),
        TokenKind::Identifier(name) if p.peek_kind(1) == TokenKind::Colon => parse_labeled(p, name),
        _ => parse_expression_statement(p),
    }
}

fn push_statement(p: &mut Parser, kind: NodeKind, span: SourceSpan) -> NodeRef {
    let ty = QualType::unqualified(p.ctx.types.type_void);
    p.ast.push_node(kind, span, ty, false)
}

fn parse_if(p: &mut Parser) -> ParseResult<NodeRef> {
    let keyword = p.expect(TokenKind::If)?;
    p.expect(TokenKind::LeftParen)?;
    let condition = expressions::parse_condition(p)?;
    p.expect(TokenKind::RightParen)?;

    let then_branch = parse_statement(p)?;
    let else_branch = if p.accept(TokenKind::Else).is_some() {
        Some(parse_statement(p)?)
    } else {
        None
    };

    let end = else_branch.unwrap_or(then_branch);
    let span = keyword.span.merge(p.ast.get_span(end));
    Ok(push_statement(
        p,
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        },
        span,
    ))
}

/// Parse a loop body with `break` and `continue` armed.
fn parse_loop_body(p: &mut Parser) -> ParseResult<NodeRef> {
    p.loop_depth += 1;
    let body = parse_statement(p);
    p.loop_depth -= 1;
    body
}

fn parse_while(p: &mut Parser) -> ParseResult<NodeRef> {
    let keyword = p.expect(TokenKind::While)?;
    p.expect(TokenKind::LeftParen)?;
    let condition = expressions::parse_condition(p)?;
    p.expect(TokenKind::RightParen)?;

    let body = parse_loop_body(p)?;
    let span = keyword.span.merge(p.ast.get_span(body));
    Ok(push_statement(p, NodeKind::While { condition, body }, span))
}

fn parse_do_while(p: &mut Parser) -> ParseResult<NodeRef> {
    let keyword = p.expect(TokenKind::Do)?;
    let body = parse_loop_body(p)?;

    p.expect(TokenKind::While)?;
    p.expect(TokenKind::LeftParen)?;
    let condition = expressions::parse_condition(p)?;
    p.expect(TokenKind::RightParen)?;
    let semi = p.expect(TokenKind::Semicolon)?;

    let span = keyword.span.merge(semi.span);
    Ok(push_statement(p, NodeKind::DoWhile { body, condition }, span))
}

/// `for` opens its own scope so an init-clause declaration is visible
/// in the condition, the increment, and the body, and nowhere else.
fn parse_for(p: &mut Parser) -> ParseResult<NodeRef> {
    let keyword = p.expect(TokenKind::For)?;
    p.expect(TokenKind::LeftParen)?;
    let scope_id = p.ctx.symbols.push_scope(ScopeKind::Block);
    let result = parse_for_rest(p, scope_id, keyword.span);
    p.ctx.symbols.pop_scope();
    result
}

fn parse_for_rest(p: &mut Parser, scope_id: ScopeId, keyword_span: SourceSpan) -> ParseResult<NodeRef> {
    let init = if p.accept(TokenKind::Semicolon).is_some() {
        None
    } else if p.starts_declaration() {
        // A declaration lowers to assignment statements; more than one
        // gets wrapped so the loop node holds a single init reference
        let start = p.current_span();
        let mut decl_statements: Vec<NodeRef> = Vec::new();
        declarations::parse_local_declaration(p, &mut decl_statements)?;
        match decl_statements.len() {
            0 => None,
            1 => Some(decl_statements[0]),
            _ => {
                let span = start.merge(p.previous_span());
                Some(push_statement(p, NodeKind::Compound(scope_id, decl_statements), span))
            }
        }
    } else {
        Some(parse_expression_statement(p)?)
    };

    let condition = if p.is_token(TokenKind::Semicolon) {
        None
    } else {
        Some(expressions::parse_condition(p)?)
    };
    p.expect(TokenKind::Semicolon)?;

    let increment = if p.is_token(TokenKind::RightParen) {
        None
    } else {
        Some(expressions::parse_expression(p)?)
    };
    p.expect(TokenKind::RightParen)?;

    let body = parse_loop_body(p)?;
    let span = keyword_span.merge(p.ast.get_span(body));
    Ok(push_statement(
        p,
        NodeKind::For {
            scope_id,
            init,
            condition,
            increment,
            body,
        },
        span,
    ))
}

fn parse_return(p: &mut Parser) -> ParseResult<NodeRef> {
    let keyword = p.expect(TokenKind::Return)?;
    let return_type = p.return_type.unwrap_or_else(|| p.ctx.types.error_type());
    let returns_void = p.ctx.types.kind(return_type.ty).is_void();
    let return_is_error = matches!(p.ctx.types.kind(return_type.ty), TypeKind::Error);
    let function_name = p.function_name.map(|name| name.to_string()).unwrap_or_default();

    let value = if p.is_token(TokenKind::Semicolon) {
        if !returns_void && !return_is_error {
            p.ctx.diagnostics.report_warning(SemanticWarning::Message {
                message: format!("non-void function '{}' should return a value", function_name),
                location: keyword.span,
            });
        }
        None
    } else {
        let expr = expressions::parse_expression(p)?;
        if returns_void {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("void function '{}' should not return a value", function_name),
                location: p.ast.get_span(expr),
            });
            Some(expr)
        } else {
            let span = p.ast.get_span(expr);
            Some(expressions::convert_for_assignment(p, expr, return_type, span))
        }
    };

    let semi = p.expect(TokenKind::Semicolon)?;
    let span = keyword.span.merge(semi.span);
    Ok(push_statement(p, NodeKind::Return(value), span))
}

fn parse_break(p: &mut Parser) -> ParseResult<NodeRef> {
    let keyword = p.expect(TokenKind::Break)?;
    if p.loop_depth == 0 {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: "'break' statement not in a loop".to_string(),
            location: keyword.span,
        });
    }
    let semi = p.expect(TokenKind::Semicolon)?;
    Ok(push_statement(p, NodeKind::Break, keyword.span.merge(semi.span)))
}

fn parse_continue(p: &mut Parser) -> ParseResult<NodeRef> {
    let keyword = p.expect(TokenKind::Continue)?;
    if p.loop_depth == 0 {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: "'continue' statement not in a loop".to_string(),
            location: keyword.span,
        });
    }
    let semi = p.expect(TokenKind::Semicolon)?;
    Ok(push_statement(p, NodeKind::Continue, keyword.span.merge(semi.span)))
}

fn parse_goto(p: &mut Parser) -> ParseResult<NodeRef> {
    let keyword = p.expect(TokenKind::Goto)?;
    let (name, name_span) = p.expect_identifier()?;
    let entry_ref = p.ctx.symbols.use_label(name, name_span);
    let semi = p.expect(TokenKind::Semicolon)?;
    Ok(push_statement(p, NodeKind::Goto(entry_ref), keyword.span.merge(semi.span)))
}

/// Labels live in their own namespace on the function scope, so a label
/// can share its spelling with any ordinary identifier.
fn parse_labeled(p: &mut Parser, name: StringId) -> ParseResult<NodeRef> {
    let name_span = p.current_span();
    p.advance();
    p.advance();

    let entry_ref = validate::define_label(p.ctx, name, name_span);
    let statement = parse_statement(p)?;
    let span = name_span.merge(p.ast.get_span(statement));
    Ok(push_statement(p, NodeKind::Labeled(entry_ref, statement), span))
}

fn parse_expression_statement(p: &mut Parser) -> ParseResult<NodeRef> {
    let expr = expressions::parse_expression(p)?;
    let semi = p.expect(TokenKind::Semicolon)?;
    let span = p.ast.get_span(expr).merge(semi.span);
    Ok(push_statement(p, NodeKind::ExpressionStatement(expr), span))
}
