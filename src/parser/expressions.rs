//! Expression parsing and typing.
//!
//! A Pratt loop drives the binary operators; unary, postfix, and primary
//! forms are plain recursive descent. Every node is typed as it is
//! built, and implied conversions become explicit `Conv` and `Decay`
//! nodes immediately, so the tree that reaches lowering carries no
//! unstated rules.
//!
//! Constant expressions fold on the spot: arithmetic between literals
//! collapses to a single literal node. Array bounds, enum values and
//! bit-field widths then accept any constant expression without a
//! separate evaluator.

use crate::ast::{BinaryOp, NodeKind, NodeRef, UnaryOp};
use crate::diagnostic::{ParseError, SemanticError, SemanticWarning};
use crate::intern::{self, StringId};
use crate::lexer::{self, IntLitKind, TokenKind};
use crate::semantic::{ArraySizeType, QualType, SymbolKind, TypeKind};
use crate::source_manager::SourceSpan;

use super::{declarator, ParseResult, Parser};

/// Literal payload of a node, when it is one.
enum Literal {
    Int(i64),
    Float(f64),
}

fn literal_of(p: &Parser, node: NodeRef) -> Option<Literal> {
    match p.ast.get_kind(node) {
        NodeKind::ConstInt(value) => Some(Literal::Int(*value)),
        NodeKind::ConstFloat(value) => Some(Literal::Float(*value)),
        _ => None,
    }
}

// === Entry points ===

/// Full expression, including the comma operator.
pub(crate) fn parse_expression(p: &mut Parser) -> ParseResult<NodeRef> {
    let mut expr = parse_assignment(p)?;
    while p.accept(TokenKind::Comma).is_some() {
        let rhs = parse_assignment(p)?;
        let rhs = rvalue(p, rhs);
        let ty = p.ctx.types.strip_all(p.ast.get_type(rhs));
        let span = p.ast.get_span(expr).merge(p.ast.get_span(rhs));
        expr = p
            .ast
            .push_node(NodeKind::Binary(BinaryOp::Comma, expr, rhs), span, ty, false);
    }
    Ok(expr)
}

/// Assignment expression, the level initializers and arguments use.
pub(crate) fn parse_assignment(p: &mut Parser) -> ParseResult<NodeRef> {
    let lhs = parse_conditional(p)?;

    if p.is_token(TokenKind::Assign) {
        let op_span = p.current_span();
        p.advance();
        let rhs = parse_assignment(p)?;
        return Ok(build_assignment(p, lhs, rhs, op_span));
    }
    if let Some(op) = compound_op_for(p.current_kind()) {
        let op_span = p.current_span();
        p.advance();
        let rhs = parse_assignment(p)?;
        return Ok(build_compound_assignment(p, op, lhs, rhs, op_span));
    }
    Ok(lhs)
}

/// An expression in statement-condition position: `if`, `while`,
/// `do`/`while`, `for`. The type must be scalar.
pub(crate) fn parse_condition(p: &mut Parser) -> ParseResult<NodeRef> {
    let expr = parse_expression(p)?;
    let expr = rvalue(p, expr);
    let ty = p.ast.get_type(expr);
    let scalar = {
        let kind = p.ctx.types.kind(ty.ty);
        kind.is_scalar() || matches!(kind, TypeKind::Error)
    };
    if !scalar {
        let name = p.ctx.types.display(ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("statement requires expression of scalar type ('{}' invalid)", name),
            location: p.ast.get_span(expr),
        });
    }
    Ok(expr)
}

// === Conditional ===

fn parse_conditional(p: &mut Parser) -> ParseResult<NodeRef> {
    let condition = parse_binary(p, 0)?;
    if p.accept(TokenKind::Question).is_none() {
        return Ok(condition);
    }
    let condition = rvalue(p, condition);
    check_scalar_operand(p, condition);

    let then_expr = parse_expression(p)?;
    p.expect(TokenKind::Colon)?;
    let else_expr = parse_conditional(p)?;
    Ok(build_conditional(p, condition, then_expr, else_expr))
}

fn build_conditional(p: &mut Parser, condition: NodeRef, then_expr: NodeRef, else_expr: NodeRef) -> NodeRef {
    let mut then_expr = rvalue(p, then_expr);
    let mut else_expr = rvalue(p, else_expr);

    let then_ty = p.ast.get_type(then_expr);
    let else_ty = p.ast.get_type(else_expr);
    let then_kind = p.ctx.types.kind(then_ty.ty).clone();
    let else_kind = p.ctx.types.kind(else_ty.ty).clone();
    let span = p.ast.get_span(condition).merge(p.ast.get_span(else_expr));

    let result = if matches!(then_kind, TypeKind::Error) || matches!(else_kind, TypeKind::Error) {
        p.ctx.types.error_type()
    } else if then_kind.is_arithmetic() && else_kind.is_arithmetic() {
        let op_type = p.ctx.types.usual_arithmetic_conversion(then_ty, else_ty);
        then_expr = convert(p, then_expr, op_type);
        else_expr = convert(p, else_expr, op_type);
        op_type
    } else if then_ty.ty == else_ty.ty {
        p.ctx.types.strip_all(then_ty)
    } else if then_kind.is_pointer() && is_null_constant(p, else_expr) {
        let target = p.ctx.types.strip_all(then_ty);
        else_expr = convert(p, else_expr, target);
        target
    } else if else_kind.is_pointer() && is_null_constant(p, then_expr) {
        let target = p.ctx.types.strip_all(else_ty);
        then_expr = convert(p, then_expr, target);
        target
    } else if then_kind.is_pointer() && else_kind.is_pointer() {
        // Disagreeing pointer types settle on the `void *` side
        if pointee_is_void(p, then_ty) {
            p.ctx.types.strip_all(then_ty)
        } else if pointee_is_void(p, else_ty) {
            p.ctx.types.strip_all(else_ty)
        } else {
            report_incompatible_operands(p, then_ty, else_ty, span);
            p.ctx.types.error_type()
        }
    } else {
        report_incompatible_operands(p, then_ty, else_ty, span);
        p.ctx.types.error_type()
    };

    // A constant condition selects its branch at parse time; the branch
    // not taken would never have been evaluated anyway
    if let Some(Literal::Int(value)) = literal_of(p, condition) {
        let branch = if value != 0 { then_expr } else { else_expr };
        if p.ast.get_kind(branch).is_constant() {
            return branch;
        }
    }

    p.ast.push_node(
        NodeKind::Conditional {
            condition,
            then_expr,
            else_expr,
        },
        span,
        result,
        false,
    )
}

fn pointee_is_void(p: &Parser, ty: QualType) -> bool {
    p.ctx
        .types
        .pointee_of(ty.ty)
        .map(|pointee| p.ctx.types.kind(pointee.ty).is_void())
        .unwrap_or(false)
}

fn check_scalar_operand(p: &mut Parser, node: NodeRef) {
    let ty = p.ast.get_type(node);
    let scalar = {
        let kind = p.ctx.types.kind(ty.ty);
        kind.is_scalar() || matches!(kind, TypeKind::Error)
    };
    if !scalar {
        let name = p.ctx.types.display(ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("used type '{}' where arithmetic or pointer type is required", name),
            location: p.ast.get_span(node),
        });
    }
}

fn report_incompatible_operands(p: &mut Parser, a: QualType, b: QualType, span: SourceSpan) {
    let a_name = p.ctx.types.display(a);
    let b_name = p.ctx.types.display(b);
    p.ctx.diagnostics.report_error(SemanticError::Message {
        message: format!("incompatible operand types ('{}' and '{}')", a_name, b_name),
        location: span,
    });
}

// === Binary operators ===

/// Operator and left binding power for the Pratt loop. All the C binary
/// operators are left-associative, so the right side parses one level
/// tighter.
fn binary_op_for(kind: TokenKind) -> Option<(BinaryOp, u8)> {
    let entry = match kind {
        TokenKind::Star => (BinaryOp::Mul, 10),
        TokenKind::Slash => (BinaryOp::Div, 10),
        TokenKind::Percent => (BinaryOp::Mod, 10),
        TokenKind::Plus => (BinaryOp::Add, 9),
        TokenKind::Minus => (BinaryOp::Sub, 9),
        TokenKind::LeftShift => (BinaryOp::LShift, 8),
        TokenKind::RightShift => (BinaryOp::RShift, 8),
        TokenKind::Less => (BinaryOp::Less, 7),
        TokenKind::Greater => (BinaryOp::Greater, 7),
        TokenKind::LessEqual => (BinaryOp::LessEqual, 7),
        TokenKind::GreaterEqual => (BinaryOp::GreaterEqual, 7),
        TokenKind::Equal => (BinaryOp::Equal, 6),
        TokenKind::NotEqual => (BinaryOp::NotEqual, 6),
        TokenKind::And => (BinaryOp::BitAnd, 5),
        TokenKind::Xor => (BinaryOp::BitXor, 4),
        TokenKind::Or => (BinaryOp::BitOr, 3),
        TokenKind::LogicAnd => (BinaryOp::LogicAnd, 2),
        TokenKind::LogicOr => (BinaryOp::LogicOr, 1),
        _ => return None,
    };
    Some(entry)
}

fn parse_binary(p: &mut Parser, min_bp: u8) -> ParseResult<NodeRef> {
    let mut lhs = parse_cast(p)?;
    loop {
        let Some((op, bp)) = binary_op_for(p.current_kind()) else {
            break;
        };
        if bp < min_bp {
            break;
        }
        let op_span = p.current_span();
        p.advance();
        let rhs = parse_binary(p, bp + 1)?;
        lhs = build_binary(p, op, lhs, rhs, op_span);
    }
    Ok(lhs)
}

fn build_binary(p: &mut Parser, op: BinaryOp, lhs: NodeRef, rhs: NodeRef, op_span: SourceSpan) -> NodeRef {
    let lhs = rvalue(p, lhs);
    let rhs = rvalue(p, rhs);

    let lhs_ty = p.ast.get_type(lhs);
    let rhs_ty = p.ast.get_type(rhs);
    let lhs_kind = p.ctx.types.kind(lhs_ty.ty).clone();
    let rhs_kind = p.ctx.types.kind(rhs_ty.ty).clone();
    let span = p.ast.get_span(lhs).merge(p.ast.get_span(rhs));

    if matches!(lhs_kind, TypeKind::Error) || matches!(rhs_kind, TypeKind::Error) {
        let error = p.ctx.types.error_type();
        return p.ast.push_node(NodeKind::Binary(op, lhs, rhs), span, error, false);
    }

    match op {
        BinaryOp::Add | BinaryOp::Sub if lhs_kind.is_pointer() && rhs_kind.is_integer() => {
            pointer_offset(p, op, lhs, rhs, lhs_ty, span)
        }
        BinaryOp::Add if lhs_kind.is_integer() && rhs_kind.is_pointer() => {
            // Normalized to pointer-first for lowering
            pointer_offset(p, op, rhs, lhs, rhs_ty, span)
        }
        BinaryOp::Sub if lhs_kind.is_pointer() && rhs_kind.is_pointer() => {
            pointer_difference(p, lhs, rhs, lhs_ty, rhs_ty, op_span, span)
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            if !lhs_kind.is_arithmetic() || !rhs_kind.is_arithmetic() {
                report_invalid_operands(p, lhs_ty, rhs_ty, op_span);
                return push_error(p, span);
            }
            let op_type = p.ctx.types.usual_arithmetic_conversion(lhs_ty, rhs_ty);
            let lhs = convert(p, lhs, op_type);
            let rhs = convert(p, rhs, op_type);
            fold_or_push(p, op, lhs, rhs, op_type, op_type, span)
        }
        BinaryOp::Mod | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            if !lhs_kind.is_integer() || !rhs_kind.is_integer() {
                report_invalid_operands(p, lhs_ty, rhs_ty, op_span);
                return push_error(p, span);
            }
            let op_type = p.ctx.types.usual_arithmetic_conversion(lhs_ty, rhs_ty);
            let lhs = convert(p, lhs, op_type);
            let rhs = convert(p, rhs, op_type);
            fold_or_push(p, op, lhs, rhs, op_type, op_type, span)
        }
        BinaryOp::LShift | BinaryOp::RShift => {
            if !lhs_kind.is_integer() || !rhs_kind.is_integer() {
                report_invalid_operands(p, lhs_ty, rhs_ty, op_span);
                return push_error(p, span);
            }
            // Shifts promote each side separately; the left side alone
            // decides the result type
            let op_type = p.ctx.types.integer_promote(lhs_ty);
            let amount_type = p.ctx.types.integer_promote(rhs_ty);
            let lhs = convert(p, lhs, op_type);
            let rhs = convert(p, rhs, amount_type);
            fold_or_push(p, op, lhs, rhs, op_type, op_type, span)
        }
        BinaryOp::Equal
        | BinaryOp::NotEqual
        | BinaryOp::Less
        | BinaryOp::LessEqual
        | BinaryOp::Greater
        | BinaryOp::GreaterEqual => {
            build_comparison(p, op, lhs, rhs, lhs_ty, rhs_ty, &lhs_kind, &rhs_kind, op_span, span)
        }
        BinaryOp::LogicAnd | BinaryOp::LogicOr => {
            build_logical(p, op, lhs, rhs, lhs_ty, rhs_ty, &lhs_kind, &rhs_kind, op_span, span)
        }
        BinaryOp::Comma => unreachable!("comma is handled by parse_expression"),
    }
}

fn pointer_offset(p: &mut Parser, op: BinaryOp, pointer: NodeRef, offset: NodeRef, pointer_ty: QualType, span: SourceSpan) -> NodeRef {
    let offset_type = QualType::unqualified(p.ctx.types.type_long);
    let offset = convert(p, offset, offset_type);
    let result = p.ctx.types.strip_all(pointer_ty);
    p.ast.push_node(NodeKind::Binary(op, pointer, offset), span, result, false)
}

fn pointer_difference(
    p: &mut Parser,
    lhs: NodeRef,
    rhs: NodeRef,
    lhs_ty: QualType,
    rhs_ty: QualType,
    op_span: SourceSpan,
    span: SourceSpan,
) -> NodeRef {
    let lhs_pointee = p.ctx.types.pointee_of(lhs_ty.ty);
    let rhs_pointee = p.ctx.types.pointee_of(rhs_ty.ty);
    if lhs_pointee.map(|q| q.ty) != rhs_pointee.map(|q| q.ty) {
        report_invalid_operands(p, lhs_ty, rhs_ty, op_span);
        return push_error(p, span);
    }
    let result = QualType::unqualified(p.ctx.types.type_long);
    p.ast.push_node(NodeKind::Binary(BinaryOp::Sub, lhs, rhs), span, result, false)
}

#[allow(clippy::too_many_arguments)]
fn build_comparison(
    p: &mut Parser,
    op: BinaryOp,
    lhs: NodeRef,
    rhs: NodeRef,
    lhs_ty: QualType,
    rhs_ty: QualType,
    lhs_kind: &TypeKind,
    rhs_kind: &TypeKind,
    op_span: SourceSpan,
    span: SourceSpan,
) -> NodeRef {
    let int_type = QualType::unqualified(p.ctx.types.type_int);

    if lhs_kind.is_arithmetic() && rhs_kind.is_arithmetic() {
        let op_type = p.ctx.types.usual_arithmetic_conversion(lhs_ty, rhs_ty);
        let lhs = convert(p, lhs, op_type);
        let rhs = convert(p, rhs, op_type);
        return fold_or_push(p, op, lhs, rhs, op_type, int_type, span);
    }
    if lhs_kind.is_pointer() && rhs_kind.is_pointer() {
        return p.ast.push_node(NodeKind::Binary(op, lhs, rhs), span, int_type, false);
    }
    if lhs_kind.is_pointer() && is_null_constant(p, rhs) {
        let target = p.ctx.types.strip_all(lhs_ty);
        let rhs = convert(p, rhs, target);
        return p.ast.push_node(NodeKind::Binary(op, lhs, rhs), span, int_type, false);
    }
    if rhs_kind.is_pointer() && is_null_constant(p, lhs) {
        let target = p.ctx.types.strip_all(rhs_ty);
        let lhs = convert(p, lhs, target);
        return p.ast.push_node(NodeKind::Binary(op, lhs, rhs), span, int_type, false);
    }
    report_invalid_operands(p, lhs_ty, rhs_ty, op_span);
    push_error(p, span)
}

#[allow(clippy::too_many_arguments)]
fn build_logical(
    p: &mut Parser,
    op: BinaryOp,
    lhs: NodeRef,
    rhs: NodeRef,
    lhs_ty: QualType,
    rhs_ty: QualType,
    lhs_kind: &TypeKind,
    rhs_kind: &TypeKind,
    op_span: SourceSpan,
    span: SourceSpan,
) -> NodeRef {
    if !lhs_kind.is_scalar() || !rhs_kind.is_scalar() {
        report_invalid_operands(p, lhs_ty, rhs_ty, op_span);
        return push_error(p, span);
    }
    let int_type = QualType::unqualified(p.ctx.types.type_int);

    let truth = |literal: Literal| match literal {
        Literal::Int(value) => value != 0,
        Literal::Float(value) => value != 0.0,
    };
    if let Some(left) = literal_of(p, lhs).map(truth) {
        // The left side alone can decide; the right side would never run
        let decided = match op {
            BinaryOp::LogicAnd if !left => Some(0),
            BinaryOp::LogicOr if left => Some(1),
            _ => None,
        };
        if let Some(value) = decided {
            return p.ast.push_node(NodeKind::ConstInt(value), span, int_type, false);
        }
        if let Some(right) = literal_of(p, rhs).map(truth) {
            let value = match op {
                BinaryOp::LogicAnd => (left && right) as i64,
                _ => (left || right) as i64,
            };
            return p.ast.push_node(NodeKind::ConstInt(value), span, int_type, false);
        }
    }
    p.ast.push_node(NodeKind::Binary(op, lhs, rhs), span, int_type, false)
}

fn report_invalid_operands(p: &mut Parser, lhs: QualType, rhs: QualType, span: SourceSpan) {
    let lhs_name = p.ctx.types.display(lhs);
    let rhs_name = p.ctx.types.display(rhs);
    p.ctx.diagnostics.report_error(SemanticError::InvalidOperands {
        message: format!("invalid operands to binary expression ('{}' and '{}')", lhs_name, rhs_name),
        location: span,
    });
}

/// Fold two literal operands, or push the operator node. `op_type`
/// supplies the signedness the operation runs in, `result_type` the
/// type of the value it produces (they differ for comparisons).
fn fold_or_push(
    p: &mut Parser,
    op: BinaryOp,
    lhs: NodeRef,
    rhs: NodeRef,
    op_type: QualType,
    result_type: QualType,
    span: SourceSpan,
) -> NodeRef {
    let result = p.ctx.types.strip_all(result_type);
    let folded = match (literal_of(p, lhs), literal_of(p, rhs)) {
        (Some(Literal::Int(a)), Some(Literal::Int(b))) => {
            let signed = p.ctx.types.kind(op_type.ty).is_signed();
            fold_int_op(op, a, b, signed).map(|value| {
                let kind = p.ctx.types.kind(result.ty);
                NodeKind::ConstInt(cast_int_value(value, kind))
            })
        }
        (Some(Literal::Float(a)), Some(Literal::Float(b))) => fold_float_op(p, op, a, b, result),
        _ => None,
    };
    match folded {
        Some(kind) => p.ast.push_node(kind, span, result, false),
        None => p.ast.push_node(NodeKind::Binary(op, lhs, rhs), span, result, false),
    }
}

/// Integer fold in 64-bit two's complement. Division by zero and
/// out-of-range shifts stay unfolded and fault at run time instead.
fn fold_int_op(op: BinaryOp, a: i64, b: i64, signed: bool) -> Option<i64> {
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return None;
            }
            if signed {
                a.wrapping_div(b)
            } else {
                ((a as u64) / (b as u64)) as i64
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return None;
            }
            if signed {
                a.wrapping_rem(b)
            } else {
                ((a as u64) % (b as u64)) as i64
            }
        }
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::LShift => {
            if !(0..64).contains(&b) {
                return None;
            }
            ((a as u64) << b) as i64
        }
        BinaryOp::RShift => {
            if !(0..64).contains(&b) {
                return None;
            }
            if signed {
                a >> b
            } else {
                ((a as u64) >> b) as i64
            }
        }
        BinaryOp::Equal => (a == b) as i64,
        BinaryOp::NotEqual => (a != b) as i64,
        BinaryOp::Less => {
            if signed {
                (a < b) as i64
            } else {
                ((a as u64) < (b as u64)) as i64
            }
        }
        BinaryOp::LessEqual => {
            if signed {
                (a <= b) as i64
            } else {
                ((a as u64) <= (b as u64)) as i64
            }
        }
        BinaryOp::Greater => {
            if signed {
                (a > b) as i64
            } else {
                ((a as u64) > (b as u64)) as i64
            }
        }
        BinaryOp::GreaterEqual => {
            if signed {
                (a >= b) as i64
            } else {
                ((a as u64) >= (b as u64)) as i64
            }
        }
        BinaryOp::LogicAnd => (a != 0 && b != 0) as i64,
        BinaryOp::LogicOr => (a != 0 || b != 0) as i64,
        BinaryOp::Comma => return None,
    };
    Some(value)
}

fn fold_float_op(p: &Parser, op: BinaryOp, a: f64, b: f64, result: QualType) -> Option<NodeKind> {
    let arithmetic = match op {
        BinaryOp::Add => Some(a + b),
        BinaryOp::Sub => Some(a - b),
        BinaryOp::Mul => Some(a * b),
        BinaryOp::Div => Some(a / b),
        _ => None,
    };
    if let Some(value) = arithmetic {
        let kind = p.ctx.types.kind(result.ty);
        return Some(NodeKind::ConstFloat(round_to(value, kind)));
    }
    let compared = match op {
        BinaryOp::Equal => a == b,
        BinaryOp::NotEqual => a != b,
        BinaryOp::Less => a < b,
        BinaryOp::LessEqual => a <= b,
        BinaryOp::Greater => a > b,
        BinaryOp::GreaterEqual => a >= b,
        _ => return None,
    };
    Some(NodeKind::ConstInt(compared as i64))
}

// === Assignment ===

fn compound_op_for(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::PlusAssign => BinaryOp::Add,
        TokenKind::MinusAssign => BinaryOp::Sub,
        TokenKind::StarAssign => BinaryOp::Mul,
        TokenKind::DivAssign => BinaryOp::Div,
        TokenKind::ModAssign => BinaryOp::Mod,
        TokenKind::AndAssign => BinaryOp::BitAnd,
        TokenKind::OrAssign => BinaryOp::BitOr,
        TokenKind::XorAssign => BinaryOp::BitXor,
        TokenKind::LeftShiftAssign => BinaryOp::LShift,
        TokenKind::RightShiftAssign => BinaryOp::RShift,
        _ => return None,
    };
    Some(op)
}

fn build_assignment(p: &mut Parser, lhs: NodeRef, rhs: NodeRef, op_span: SourceSpan) -> NodeRef {
    check_assignable(p, lhs, op_span);
    let target = p.ast.get_type(lhs);
    let rhs = convert_for_assignment(p, rhs, target, op_span);
    let span = p.ast.get_span(lhs).merge(p.ast.get_span(rhs));
    let result = p.ctx.types.strip_all(target);
    p.ast.push_node(NodeKind::Assign(lhs, rhs), span, result, false)
}

fn build_compound_assignment(p: &mut Parser, op: BinaryOp, lhs: NodeRef, rhs: NodeRef, op_span: SourceSpan) -> NodeRef {
    check_assignable(p, lhs, op_span);
    let rhs = rvalue(p, rhs);

    let lhs_ty = p.ast.get_type(lhs);
    let rhs_ty = p.ast.get_type(rhs);
    let lhs_kind = p.ctx.types.kind(lhs_ty.ty).clone();
    let rhs_kind = p.ctx.types.kind(rhs_ty.ty).clone();
    let span = p.ast.get_span(lhs).merge(p.ast.get_span(rhs));

    if matches!(lhs_kind, TypeKind::Error) || matches!(rhs_kind, TypeKind::Error) {
        return push_error(p, span);
    }

    // Pointer `+=`/`-=` keeps the pointer type; everything else runs in
    // the usual arithmetic conversion type and converts back on store
    let (op_type, rhs) = if matches!(op, BinaryOp::Add | BinaryOp::Sub) && lhs_kind.is_pointer() && rhs_kind.is_integer()
    {
        let offset_type = QualType::unqualified(p.ctx.types.type_long);
        (p.ctx.types.strip_all(lhs_ty), convert(p, rhs, offset_type))
    } else if valid_compound_operands(op, &lhs_kind, &rhs_kind) {
        let op_type = match op {
            BinaryOp::LShift | BinaryOp::RShift => p.ctx.types.integer_promote(lhs_ty),
            _ => p.ctx.types.usual_arithmetic_conversion(lhs_ty, rhs_ty),
        };
        (op_type, convert(p, rhs, op_type))
    } else {
        report_invalid_operands(p, lhs_ty, rhs_ty, op_span);
        return push_error(p, span);
    };

    let result = p.ctx.types.strip_all(lhs_ty);
    p.ast
        .push_node(NodeKind::CompoundAssign { op, lhs, rhs, op_type }, span, result, false)
}

fn valid_compound_operands(op: BinaryOp, lhs: &TypeKind, rhs: &TypeKind) -> bool {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => lhs.is_arithmetic() && rhs.is_arithmetic(),
        _ => lhs.is_integer() && rhs.is_integer(),
    }
}

/// An assignment target must be a modifiable lvalue: an lvalue that is
/// neither an array nor const-qualified.
fn check_assignable(p: &mut Parser, lhs: NodeRef, op_span: SourceSpan) {
    let ty = p.ast.get_type(lhs);
    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Error) {
        return;
    }
    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Array { .. }) {
        let name = p.ctx.types.display(ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("array type '{}' is not assignable", name),
            location: p.ast.get_span(lhs),
        });
        return;
    }
    if !p.ast.is_lvalue(lhs) {
        p.ctx.diagnostics.report_error(SemanticError::NotLValue {
            operation: "assignment target".to_string(),
            location: p.ast.get_span(lhs),
        });
        return;
    }
    if ty.is_const() {
        let name = p.ctx.types.display(ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("cannot assign to const-qualified type '{}'", name),
            location: op_span,
        });
    }
}

/// Convert `value` to `target` under the assignment rules: arithmetic
/// to arithmetic, pointer to pointer, a constant zero to any pointer,
/// any scalar to `_Bool`. Used by `=`, initializers, arguments against
/// prototypes, and `return`.
pub(crate) fn convert_for_assignment(p: &mut Parser, value: NodeRef, target: QualType, span: SourceSpan) -> NodeRef {
    let value = rvalue(p, value);
    let value_ty = p.ast.get_type(value);

    if value_ty.ty == target.ty {
        return value;
    }

    let target_kind = p.ctx.types.kind(target.ty).clone();
    let value_kind = p.ctx.types.kind(value_ty.ty).clone();
    if matches!(target_kind, TypeKind::Error) || matches!(value_kind, TypeKind::Error) {
        return value;
    }

    let compatible = (target_kind.is_arithmetic() && value_kind.is_arithmetic())
        || (target_kind.is_pointer() && value_kind.is_pointer())
        || (target_kind.is_pointer() && is_null_constant(p, value))
        || (matches!(target_kind, TypeKind::Bool) && value_kind.is_scalar());
    if !compatible {
        let target_name = p.ctx.types.display(target);
        let value_name = p.ctx.types.display(value_ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("assigning to '{}' from incompatible type '{}'", target_name, value_name),
            location: span,
        });
        return value;
    }

    if target_kind.is_pointer() && value_kind.is_pointer() {
        let target_pointee = p.ctx.types.pointee_of(target.ty);
        let value_pointee = p.ctx.types.pointee_of(value_ty.ty);
        let void_involved = target_pointee.map(|q| p.ctx.types.kind(q.ty).is_void()).unwrap_or(false)
            || value_pointee.map(|q| p.ctx.types.kind(q.ty).is_void()).unwrap_or(false);
        if !void_involved && target_pointee.map(|q| q.ty) != value_pointee.map(|q| q.ty) {
            let target_name = p.ctx.types.display(target);
            let value_name = p.ctx.types.display(value_ty);
            p.ctx.diagnostics.report_warning(SemanticWarning::Message {
                message: format!("incompatible pointer types assigning to '{}' from '{}'", target_name, value_name),
                location: span,
            });
        }
    }

    convert(p, value, target)
}

// === Value conversions ===

/// Value adjustment: arrays and function designators decay to pointers.
fn rvalue(p: &mut Parser, node: NodeRef) -> NodeRef {
    let ty = p.ast.get_type(node);
    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Array { .. } | TypeKind::Function { .. }) {
        let decayed = p.ctx.types.decay(ty);
        let span = p.ast.get_span(node);
        return p.ast.push_node(NodeKind::Decay(node), span, decayed, false);
    }
    node
}

/// Convert to `target`, folding literals instead of wrapping them.
fn convert(p: &mut Parser, node: NodeRef, target: QualType) -> NodeRef {
    let from = p.ast.get_type(node);
    if from.ty == target.ty {
        return node;
    }
    let result = p.ctx.types.strip_all(target);
    let span = p.ast.get_span(node);

    if let Some(folded) = fold_conversion(p, node, target) {
        return p.ast.push_node(folded, span, result, false);
    }
    p.ast.push_node(NodeKind::Conv(node), span, result, false)
}

fn fold_conversion(p: &Parser, node: NodeRef, target: QualType) -> Option<NodeKind> {
    let target_kind = p.ctx.types.kind(target.ty);
    match literal_of(p, node)? {
        Literal::Int(value) => {
            if target_kind.is_integer() {
                return Some(NodeKind::ConstInt(cast_int_value(value, target_kind)));
            }
            if target_kind.is_floating() {
                let signed = p.ctx.types.kind(p.ast.get_type(node).ty).is_signed();
                let float_value = if signed { value as f64 } else { value as u64 as f64 };
                return Some(NodeKind::ConstFloat(round_to(float_value, target_kind)));
            }
            if target_kind.is_pointer() {
                return Some(NodeKind::ConstInt(value));
            }
        }
        Literal::Float(value) => {
            if target_kind.is_integer() {
                return Some(NodeKind::ConstInt(cast_int_value(value as i64, target_kind)));
            }
            if target_kind.is_floating() {
                return Some(NodeKind::ConstFloat(round_to(value, target_kind)));
            }
        }
    }
    None
}

fn round_to(value: f64, kind: &TypeKind) -> f64 {
    if matches!(kind, TypeKind::Float) {
        value as f32 as f64
    } else {
        value
    }
}

/// Truncate and re-extend a value to the width and signedness of an
/// integer type, the effect of storing and reloading it.
fn cast_int_value(value: i64, kind: &TypeKind) -> i64 {
    match kind {
        TypeKind::Bool => (value != 0) as i64,
        TypeKind::Char { is_signed: true } => value as i8 as i64,
        TypeKind::Char { is_signed: false } => value as u8 as i64,
        TypeKind::Short { is_signed: true } => value as i16 as i64,
        TypeKind::Short { is_signed: false } => value as u16 as i64,
        TypeKind::Int { is_signed: true } | TypeKind::Enum { .. } => value as i32 as i64,
        TypeKind::Int { is_signed: false } => value as u32 as i64,
        _ => value,
    }
}

/// An integer constant expression with value zero: the null pointer
/// constant.
fn is_null_constant(p: &Parser, node: NodeRef) -> bool {
    eval_const_int(p, node) == Some(0)
}

/// Evaluate an integer constant expression. Folding happens during
/// parsing, so a constant expression has already collapsed to a literal
/// by the time this runs; anything else is not constant.
pub(crate) fn eval_const_int(p: &Parser, node: NodeRef) -> Option<i64> {
    match p.ast.get_kind(node) {
        NodeKind::ConstInt(value) => Some(*value),
        NodeKind::Ident(entry_ref) => match &p.ctx.symbols.entry(*entry_ref).kind {
            SymbolKind::EnumConstant { value } => Some(*value),
            _ => None,
        },
        NodeKind::Conv(inner) => {
            let value = eval_const_int(p, *inner)?;
            let kind = p.ctx.types.kind(p.ast.get_type(node).ty);
            if kind.is_integer() {
                Some(cast_int_value(value, kind))
            } else {
                None
            }
        }
        _ => None,
    }
}

// === Casts ===

fn parse_cast(p: &mut Parser) -> ParseResult<NodeRef> {
    if p.is_token(TokenKind::LeftParen) && type_name_follows(p, 1) {
        let open = p.expect(TokenKind::LeftParen)?;
        let target = declarator::parse_type_name(p)?;
        p.expect(TokenKind::RightParen)?;
        let operand = parse_cast(p)?;
        return Ok(build_cast(p, target, operand, open.span));
    }
    parse_unary(p)
}

/// Whether the token at `offset` begins a type name. Decides cast
/// versus parenthesized expression.
fn type_name_follows(p: &Parser, offset: usize) -> bool {
    let kind = p.peek_kind(offset);
    if kind.is_type_specifier() || kind.is_type_qualifier() {
        return true;
    }
    match kind {
        TokenKind::Identifier(name) => p.is_typedef_name(name),
        _ => false,
    }
}

fn build_cast(p: &mut Parser, target: QualType, operand: NodeRef, open_span: SourceSpan) -> NodeRef {
    let operand = rvalue(p, operand);
    let operand_ty = p.ast.get_type(operand);
    let span = open_span.merge(p.ast.get_span(operand));

    let target_kind = p.ctx.types.kind(target.ty).clone();
    let operand_kind = p.ctx.types.kind(operand_ty.ty).clone();

    if matches!(target_kind, TypeKind::Error) || matches!(operand_kind, TypeKind::Error) {
        return push_error(p, span);
    }

    // `(void)x` discards the value
    if target_kind.is_void() {
        let void_type = QualType::unqualified(p.ctx.types.type_void);
        return p.ast.push_node(NodeKind::Conv(operand), span, void_type, false);
    }

    if !target_kind.is_scalar() {
        let name = p.ctx.types.display(target);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("used type '{}' where arithmetic or pointer type is required", name),
            location: span,
        });
        return push_error(p, span);
    }
    if !operand_kind.is_scalar() {
        let name = p.ctx.types.display(operand_ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("operand of type '{}' where arithmetic or pointer type is required", name),
            location: span,
        });
        return push_error(p, span);
    }
    if target_kind.is_pointer() && operand_kind.is_floating() {
        let name = p.ctx.types.display(operand_ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("operand of type '{}' cannot be cast to a pointer type", name),
            location: span,
        });
        return push_error(p, span);
    }
    if target_kind.is_floating() && operand_kind.is_pointer() {
        let name = p.ctx.types.display(target);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("pointer cannot be cast to type '{}'", name),
            location: span,
        });
        return push_error(p, span);
    }

    let result = convert(p, operand, target);
    // A no-op cast still strips lvalue-ness
    if result == operand && p.ast.is_lvalue(operand) {
        let ty = p.ctx.types.strip_all(target);
        return p.ast.push_node(NodeKind::Conv(operand), span, ty, false);
    }
    result
}

// === Unary operators ===

fn parse_unary(p: &mut Parser) -> ParseResult<NodeRef> {
    let token = p.current_token()?;
    match token.kind {
        TokenKind::Plus => {
            p.advance();
            let operand = parse_cast(p)?;
            Ok(build_unary_arithmetic(p, UnaryOp::Plus, operand, token.span))
        }
        TokenKind::Minus => {
            p.advance();
            let operand = parse_cast(p)?;
            Ok(build_unary_arithmetic(p, UnaryOp::Minus, operand, token.span))
        }
        TokenKind::Tilde => {
            p.advance();
            let operand = parse_cast(p)?;
            Ok(build_unary_arithmetic(p, UnaryOp::BitNot, operand, token.span))
        }
        TokenKind::Not => {
            p.advance();
            let operand = parse_cast(p)?;
            Ok(build_logical_not(p, operand, token.span))
        }
        TokenKind::Star => {
            p.advance();
            let operand = parse_cast(p)?;
            Ok(build_deref(p, operand, token.span))
        }
        TokenKind::And => {
            p.advance();
            let operand = parse_cast(p)?;
            Ok(build_address_of(p, operand, token.span))
        }
        TokenKind::Increment => {
            p.advance();
            let operand = parse_unary(p)?;
            Ok(build_step(p, NodeKind::PreIncrement, "increment", operand, token.span))
        }
        TokenKind::Decrement => {
            p.advance();
            let operand = parse_unary(p)?;
            Ok(build_step(p, NodeKind::PreDecrement, "decrement", operand, token.span))
        }
        TokenKind::Sizeof => parse_sizeof(p),
        _ => parse_postfix(p),
    }
}

fn build_unary_arithmetic(p: &mut Parser, op: UnaryOp, operand: NodeRef, op_span: SourceSpan) -> NodeRef {
    let operand = rvalue(p, operand);
    let ty = p.ast.get_type(operand);
    let span = op_span.merge(p.ast.get_span(operand));
    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Error) {
        return push_error(p, span);
    }

    let valid = match op {
        UnaryOp::BitNot => p.ctx.types.kind(ty.ty).is_integer(),
        _ => p.ctx.types.kind(ty.ty).is_arithmetic(),
    };
    if !valid {
        let name = p.ctx.types.display(ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("invalid argument type '{}' to unary expression", name),
            location: span,
        });
        return push_error(p, span);
    }

    let result = p.ctx.types.integer_promote(ty);
    let operand = convert(p, operand, result);

    if let Some(literal) = literal_of(p, operand) {
        let result_kind = p.ctx.types.kind(result.ty);
        let folded = match (op, literal) {
            (UnaryOp::Plus, Literal::Int(value)) => Some(NodeKind::ConstInt(value)),
            (UnaryOp::Plus, Literal::Float(value)) => Some(NodeKind::ConstFloat(value)),
            (UnaryOp::Minus, Literal::Int(value)) => {
                Some(NodeKind::ConstInt(cast_int_value(value.wrapping_neg(), result_kind)))
            }
            (UnaryOp::Minus, Literal::Float(value)) => Some(NodeKind::ConstFloat(-value)),
            (UnaryOp::BitNot, Literal::Int(value)) => Some(NodeKind::ConstInt(cast_int_value(!value, result_kind))),
            _ => None,
        };
        if let Some(kind) = folded {
            return p.ast.push_node(kind, span, result, false);
        }
    }
    p.ast.push_node(NodeKind::Unary(op, operand), span, result, false)
}

fn build_logical_not(p: &mut Parser, operand: NodeRef, op_span: SourceSpan) -> NodeRef {
    let operand = rvalue(p, operand);
    let ty = p.ast.get_type(operand);
    let span = op_span.merge(p.ast.get_span(operand));
    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Error) {
        return push_error(p, span);
    }
    if !p.ctx.types.kind(ty.ty).is_scalar() {
        let name = p.ctx.types.display(ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("invalid argument type '{}' to unary expression", name),
            location: span,
        });
        return push_error(p, span);
    }
    let result = QualType::unqualified(p.ctx.types.type_int);
    match literal_of(p, operand) {
        Some(Literal::Int(value)) => p.ast.push_node(NodeKind::ConstInt((value == 0) as i64), span, result, false),
        Some(Literal::Float(value)) => p
            .ast
            .push_node(NodeKind::ConstInt((value == 0.0) as i64), span, result, false),
        None => p
            .ast
            .push_node(NodeKind::Unary(UnaryOp::LogicNot, operand), span, result, false),
    }
}

fn build_deref(p: &mut Parser, operand: NodeRef, op_span: SourceSpan) -> NodeRef {
    let operand = rvalue(p, operand);
    let ty = p.ast.get_type(operand);
    let span = op_span.merge(p.ast.get_span(operand));
    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Error) {
        return push_error(p, span);
    }
    let Some(pointee) = p.ctx.types.pointee_of(ty.ty) else {
        let name = p.ctx.types.display(ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("indirection requires pointer operand ('{}' invalid)", name),
            location: span,
        });
        return push_error(p, span);
    };
    // Through a function pointer the result is the function designator,
    // which is not an lvalue
    let is_function = p.ctx.types.kind(pointee.ty).is_function();
    p.ast
        .push_node(NodeKind::Unary(UnaryOp::Deref, operand), span, pointee, !is_function)
}

fn build_address_of(p: &mut Parser, operand: NodeRef, op_span: SourceSpan) -> NodeRef {
    let ty = p.ast.get_type(operand);
    let span = op_span.merge(p.ast.get_span(operand));
    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Error) {
        return push_error(p, span);
    }

    let is_function = p.ctx.types.kind(ty.ty).is_function();
    if !p.ast.is_lvalue(operand) && !is_function {
        p.ctx.diagnostics.report_error(SemanticError::NotLValue {
            operation: "operand of '&'".to_string(),
            location: span,
        });
        return push_error(p, span);
    }
    if let NodeKind::Member(base, index) = p.ast.get_kind(operand) {
        let (base, index) = (*base, *index);
        if member_is_bit_field(p, base, index) {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: "cannot take the address of a bit-field".to_string(),
                location: span,
            });
            return push_error(p, span);
        }
    }

    let pointer = p.ctx.types.pointer_to(ty);
    p.ast.push_node(
        NodeKind::Unary(UnaryOp::AddrOf, operand),
        span,
        QualType::unqualified(pointer),
        false,
    )
}

fn member_is_bit_field(p: &Parser, base: NodeRef, index: u32) -> bool {
    let base_ty = p.ast.get_type(base);
    match p.ctx.types.kind(base_ty.ty) {
        TypeKind::Record { members, .. } => members
            .get(index as usize)
            .map(|member| member.bit_field_size.is_some())
            .unwrap_or(false),
        _ => false,
    }
}

/// `++`/`--`, both fixes. The operand must be a modifiable lvalue of
/// arithmetic or pointer type.
fn build_step(
    p: &mut Parser,
    make: fn(NodeRef) -> NodeKind,
    verb: &str,
    operand: NodeRef,
    op_span: SourceSpan,
) -> NodeRef {
    let ty = p.ast.get_type(operand);
    let span = op_span.merge(p.ast.get_span(operand));
    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Error) {
        return push_error(p, span);
    }
    check_assignable(p, operand, op_span);
    let valid = {
        let kind = p.ctx.types.kind(ty.ty);
        kind.is_arithmetic() || kind.is_pointer()
    };
    if !valid {
        let name = p.ctx.types.display(ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("cannot {} value of type '{}'", verb, name),
            location: span,
        });
        return push_error(p, span);
    }
    let result = p.ctx.types.strip_all(ty);
    p.ast.push_node(make(operand), span, result, false)
}

fn parse_sizeof(p: &mut Parser) -> ParseResult<NodeRef> {
    let keyword = p.expect(TokenKind::Sizeof)?;
    let (ty, end_span) = if p.is_token(TokenKind::LeftParen) && type_name_follows(p, 1) {
        p.advance();
        let ty = declarator::parse_type_name(p)?;
        let close = p.expect(TokenKind::RightParen)?;
        (ty, close.span)
    } else {
        // `sizeof expr`: the operand is typed but never evaluated, and
        // arrays do not decay
        let operand = parse_unary(p)?;
        (p.ast.get_type(operand), p.ast.get_span(operand))
    };
    let span = keyword.span.merge(end_span);
    Ok(build_sizeof(p, ty, span))
}

fn build_sizeof(p: &mut Parser, ty: QualType, span: SourceSpan) -> NodeRef {
    let result = QualType::unqualified(p.ctx.types.type_long_unsigned);
    let size = match p.ctx.types.size_of(ty.ty) {
        Some(size) => size,
        None => {
            let is_function = p.ctx.types.kind(ty.ty).is_function();
            let name = p.ctx.types.display(ty);
            let message = if is_function {
                format!("invalid application of 'sizeof' to a function type '{}'", name)
            } else {
                format!("invalid application of 'sizeof' to an incomplete type '{}'", name)
            };
            p.ctx
                .diagnostics
                .report_error(SemanticError::Message { message, location: span });
            1
        }
    };
    p.ast.push_node(NodeKind::ConstInt(size as i64), span, result, false)
}

// === Postfix operators ===

fn parse_postfix(p: &mut Parser) -> ParseResult<NodeRef> {
    let mut expr = parse_primary(p)?;
    loop {
        match p.current_kind() {
            TokenKind::LeftParen => {
                expr = parse_call(p, expr)?;
            }
            TokenKind::LeftBracket => {
                expr = parse_index(p, expr)?;
            }
            TokenKind::Dot => {
                let op_span = p.current_span();
                p.advance();
                expr = parse_member(p, expr, op_span, false)?;
            }
            TokenKind::Arrow => {
                let op_span = p.current_span();
                p.advance();
                expr = parse_member(p, expr, op_span, true)?;
            }
            TokenKind::Increment => {
                let op_span = p.current_span();
                p.advance();
                expr = build_step(p, NodeKind::PostIncrement, "increment", expr, op_span);
            }
            TokenKind::Decrement => {
                let op_span = p.current_span();
                p.advance();
                expr = build_step(p, NodeKind::PostDecrement, "decrement", expr, op_span);
            }
            _ => break,
        }
    }
    Ok(expr)
}

fn parse_call(p: &mut Parser, callee: NodeRef) -> ParseResult<NodeRef> {
    p.expect(TokenKind::LeftParen)?;
    let callee = rvalue(p, callee);

    let mut arguments: Vec<NodeRef> = Vec::new();
    if !p.is_token(TokenKind::RightParen) {
        loop {
            arguments.push(parse_assignment(p)?);
            if p.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
    }
    let close = p.expect(TokenKind::RightParen)?;
    let span = p.ast.get_span(callee).merge(close.span);
    Ok(build_call(p, callee, arguments, span))
}

fn build_call(p: &mut Parser, callee: NodeRef, arguments: Vec<NodeRef>, span: SourceSpan) -> NodeRef {
    let callee_ty = p.ast.get_type(callee);
    if matches!(p.ctx.types.kind(callee_ty.ty), TypeKind::Error) {
        let error = p.ctx.types.error_type();
        return p.ast.push_node(NodeKind::Call(callee, arguments), span, error, false);
    }

    let function = p
        .ctx
        .types
        .pointee_of(callee_ty.ty)
        .map(|pointee| pointee.ty)
        .filter(|&ty| p.ctx.types.kind(ty).is_function());
    let Some(function_ty) = function else {
        let name = p.ctx.types.display(callee_ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("called object type '{}' is not a function or function pointer", name),
            location: p.ast.get_span(callee),
        });
        let error = p.ctx.types.error_type();
        return p.ast.push_node(NodeKind::Call(callee, arguments), span, error, false);
    };

    let TypeKind::Function {
        return_type,
        parameters,
        is_variadic,
        is_prototype,
    } = p.ctx.types.kind(function_ty).clone()
    else {
        unreachable!("filtered to a function type");
    };

    let mut converted: Vec<NodeRef> = Vec::with_capacity(arguments.len());
    if is_prototype {
        if arguments.len() > parameters.len() && !is_variadic {
            let excess = arguments[parameters.len()];
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: "too many arguments to function call".to_string(),
                location: p.ast.get_span(excess),
            });
        } else if arguments.len() < parameters.len() {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: "too few arguments to function call".to_string(),
                location: span,
            });
        }
        for (index, &argument) in arguments.iter().enumerate() {
            let node = match parameters.get(index) {
                Some(parameter) => {
                    let arg_span = p.ast.get_span(argument);
                    convert_for_assignment(p, argument, parameter.param_type, arg_span)
                }
                // Variadic tail, or recovery past an excess argument
                None => promote_argument(p, argument),
            };
            converted.push(node);
        }
    } else {
        for &argument in &arguments {
            converted.push(promote_argument(p, argument));
        }
    }

    let result = p.ctx.types.strip_all(return_type);
    p.ast.push_node(NodeKind::Call(callee, converted), span, result, false)
}

/// Default argument promotions, for variadic tails and calls through
/// unprototyped declarations.
fn promote_argument(p: &mut Parser, argument: NodeRef) -> NodeRef {
    let argument = rvalue(p, argument);
    let ty = p.ast.get_type(argument);
    if matches!(p.ctx.types.kind(ty.ty), TypeKind::Error) {
        return argument;
    }
    if !p.ctx.types.kind(ty.ty).is_arithmetic() {
        return argument;
    }
    let promoted = p.ctx.types.default_argument_promote(ty);
    convert(p, argument, promoted)
}

fn parse_index(p: &mut Parser, base: NodeRef) -> ParseResult<NodeRef> {
    p.expect(TokenKind::LeftBracket)?;
    let index = parse_expression(p)?;
    let close = p.expect(TokenKind::RightBracket)?;
    let span = p.ast.get_span(base).merge(close.span);
    Ok(build_index(p, base, index, span))
}

fn build_index(p: &mut Parser, base: NodeRef, index: NodeRef, span: SourceSpan) -> NodeRef {
    let base = rvalue(p, base);
    let index = rvalue(p, index);
    let base_ty = p.ast.get_type(base);
    let index_ty = p.ast.get_type(index);
    if matches!(p.ctx.types.kind(base_ty.ty), TypeKind::Error) || matches!(p.ctx.types.kind(index_ty.ty), TypeKind::Error)
    {
        return push_error(p, span);
    }

    // `i[a]` subscripts the same as `a[i]`
    let (pointer, offset) = if p.ctx.types.kind(base_ty.ty).is_pointer() {
        (base, index)
    } else if p.ctx.types.kind(index_ty.ty).is_pointer() {
        (index, base)
    } else {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: "subscripted value is not an array or pointer".to_string(),
            location: span,
        });
        return push_error(p, span);
    };

    let offset_ty = p.ast.get_type(offset);
    if !p.ctx.types.kind(offset_ty.ty).is_integer() {
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: "array subscript is not an integer".to_string(),
            location: p.ast.get_span(offset),
        });
        return push_error(p, span);
    }

    let pointer_ty = p.ast.get_type(pointer);
    let pointee = match p.ctx.types.pointee_of(pointer_ty.ty) {
        Some(pointee) => pointee,
        None => p.ctx.types.error_type(),
    };
    if !p.ctx.types.is_complete(pointee.ty) && !matches!(p.ctx.types.kind(pointee.ty), TypeKind::Error) {
        let name = p.ctx.types.display(pointee);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("subscript of pointer to incomplete type '{}'", name),
            location: span,
        });
        return push_error(p, span);
    }

    let offset_type = QualType::unqualified(p.ctx.types.type_long);
    let offset = convert(p, offset, offset_type);
    p.ast.push_node(NodeKind::Index(pointer, offset), span, pointee, true)
}

fn parse_member(p: &mut Parser, base: NodeRef, op_span: SourceSpan, through_pointer: bool) -> ParseResult<NodeRef> {
    let Some((name, name_span)) = p.accept_identifier() else {
        return Err(ParseError::SyntaxError {
            message: "expect member name".to_string(),
            location: p.current_span(),
        });
    };
    Ok(build_member(p, base, name, through_pointer, op_span, name_span))
}

fn build_member(
    p: &mut Parser,
    base: NodeRef,
    name: StringId,
    through_pointer: bool,
    op_span: SourceSpan,
    name_span: SourceSpan,
) -> NodeRef {
    let mut object = base;

    if through_pointer {
        object = rvalue(p, object);
        let ty = p.ast.get_type(object);
        if matches!(p.ctx.types.kind(ty.ty), TypeKind::Error) {
            return push_error(p, name_span);
        }
        let Some(pointee) = p.ctx.types.pointee_of(ty.ty) else {
            let type_name = p.ctx.types.display(ty);
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("member reference type '{}' is not a pointer", type_name),
                location: op_span,
            });
            return push_error(p, name_span);
        };
        let span = p.ast.get_span(object);
        object = p
            .ast
            .push_node(NodeKind::Unary(UnaryOp::Deref, object), span, pointee, true);
    }

    let object_ty = p.ast.get_type(object);
    if matches!(p.ctx.types.kind(object_ty.ty), TypeKind::Error) {
        return push_error(p, name_span);
    }
    let TypeKind::Record { members, is_complete, .. } = p.ctx.types.kind(object_ty.ty).clone() else {
        let type_name = p.ctx.types.display(object_ty);
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("member reference base type '{}' is not a structure or union", type_name),
            location: op_span,
        });
        return push_error(p, name_span);
    };
    if !is_complete {
        let type_name = p.ctx.types.display(p.ctx.types.strip_all(object_ty));
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("incomplete definition of type '{}'", type_name),
            location: op_span,
        });
        return push_error(p, name_span);
    }

    let Some(index) = members.iter().position(|member| member.name == Some(name)) else {
        let type_name = p.ctx.types.display(p.ctx.types.strip_all(object_ty));
        p.ctx.diagnostics.report_error(SemanticError::Message {
            message: format!("no member named '{}' in '{}'", name, type_name),
            location: name_span,
        });
        return push_error(p, name_span);
    };

    // The object's qualifiers apply to the member access
    let member_ty = p.ctx.types.merge_qualifiers(members[index].member_type, object_ty.qualifiers);
    let span = p.ast.get_span(object).merge(name_span);
    let is_lvalue = p.ast.is_lvalue(object);
    p.ast
        .push_node(NodeKind::Member(object, index as u32), span, member_ty, is_lvalue)
}

// === Primary expressions ===

fn parse_primary(p: &mut Parser) -> ParseResult<NodeRef> {
    let token = p.current_token()?;
    match token.kind {
        TokenKind::IntegerConstant { value, kind } => {
            p.advance();
            let ty = match kind {
                IntLitKind::Int => p.ctx.types.type_int,
                IntLitKind::UInt => p.ctx.types.type_int_unsigned,
                IntLitKind::Long => p.ctx.types.type_long,
                IntLitKind::ULong => p.ctx.types.type_long_unsigned,
            };
            Ok(p.ast
                .push_node(NodeKind::ConstInt(value as i64), token.span, QualType::unqualified(ty), false))
        }
        TokenKind::FloatConstant { value, is_float } => {
            p.advance();
            let ty = if is_float {
                p.ctx.types.type_float
            } else {
                p.ctx.types.type_double
            };
            let value = if is_float { value as f32 as f64 } else { value };
            Ok(p.ast
                .push_node(NodeKind::ConstFloat(value), token.span, QualType::unqualified(ty), false))
        }
        TokenKind::CharacterConstant(value) => {
            p.advance();
            let ty = QualType::unqualified(p.ctx.types.type_int);
            Ok(p.ast.push_node(NodeKind::ConstInt(value as i64), token.span, ty, false))
        }
        TokenKind::StringLiteral(_) => parse_string_literal(p),
        TokenKind::Identifier(name) => {
            p.advance();
            Ok(build_identifier(p, name, token.span))
        }
        TokenKind::LeftParen => {
            p.advance();
            let expr = parse_expression(p)?;
            p.expect(TokenKind::RightParen)?;
            Ok(expr)
        }
        _ => Err(ParseError::SyntaxError {
            message: "expect expression".to_string(),
            location: token.span,
        }),
    }
}

/// A string literal, typed as a char array including the terminator.
/// Adjacent literals concatenate into one array.
fn parse_string_literal(p: &mut Parser) -> ParseResult<NodeRef> {
    let token = p.current_token()?;
    let TokenKind::StringLiteral(first) = token.kind else {
        unreachable!("caller matched a string literal");
    };
    p.advance();
    let mut span = token.span;
    let mut spelling = first;

    while let TokenKind::StringLiteral(next) = p.current_kind() {
        let next_span = p.current_span();
        p.advance();
        spelling = intern::intern(&format!("{}{}", spelling, next));
        span = span.merge(next_span);
    }

    let length = lexer::decode_string_spelling(spelling.as_str()).len() as u64 + 1;
    let element = QualType::unqualified(p.ctx.types.type_char);
    let array = p.ctx.types.array_of(element, ArraySizeType::Fixed(length));
    Ok(p.ast
        .push_node(NodeKind::ConstString(spelling), span, QualType::unqualified(array), true))
}

fn build_identifier(p: &mut Parser, name: StringId, span: SourceSpan) -> NodeRef {
    let Some((entry_ref, _)) = p.ctx.symbols.lookup(name) else {
        p.ctx
            .diagnostics
            .report_error(SemanticError::UndeclaredIdentifier { name, location: span });
        return push_error(p, span);
    };
    p.ctx.symbols.mark_referenced(entry_ref);

    enum Resolved {
        Enum(i64),
        Type,
        Value { is_function: bool },
    }
    let entry = p.ctx.symbols.entry(entry_ref);
    let ty = entry.type_info;
    let resolved = match &entry.kind {
        SymbolKind::EnumConstant { value } => Resolved::Enum(*value),
        SymbolKind::Typedef => Resolved::Type,
        SymbolKind::Function { .. } => Resolved::Value { is_function: true },
        _ => Resolved::Value { is_function: false },
    };

    match resolved {
        Resolved::Enum(value) => p.ast.push_node(NodeKind::ConstInt(value), span, ty, false),
        Resolved::Type => {
            p.ctx.diagnostics.report_error(SemanticError::Message {
                message: format!("unexpected type name '{}'", name),
                location: span,
            });
            push_error(p, span)
        }
        Resolved::Value { is_function } => p.ast.push_node(NodeKind::Ident(entry_ref), span, ty, !is_function),
    }
}

fn push_error(p: &mut Parser, span: SourceSpan) -> NodeRef {
    let ty = p.ctx.types.error_type();
    p.ast.push_node(NodeKind::Error, span, ty, false)
}
