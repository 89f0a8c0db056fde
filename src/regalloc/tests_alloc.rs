use crate::ast::Ast;
use crate::context::CompilationContext;
use crate::ir::lower::lower_unit;
use crate::ir::{BinOp, Instr, IrFunction, IrUnit, OpClass, OpWidth, Operand, TempId, Value};
use crate::lexer::Lexer;
use crate::parser::Parser;

use super::{Allocation, Liveness, Location, Reg, allocate_function};

fn compile(input: &str) -> (CompilationContext, IrUnit) {
    let mut ctx = CompilationContext::new();
    let source_id = ctx.sources.add_buffer(input.as_bytes().to_vec(), "test_input");
    let tokens = Lexer::new(ctx.sources.get_buffer(source_id), source_id).tokenize(&mut ctx.diagnostics);
    let mut ast = Ast::new();
    let unit = Parser::new(&mut ctx, &mut ast, &tokens).parse_translation_unit();
    assert!(
        !ctx.diagnostics.has_errors(),
        "unexpected errors for {:?}: {:?}",
        input,
        ctx.diagnostics.diagnostics()
    );
    let ir = lower_unit(&mut ctx, &ast, &unit);
    (ctx, ir)
}

fn function_named<'a>(unit: &'a IrUnit, name: &str) -> &'a IrFunction {
    unit.functions
        .iter()
        .find(|f| f.name.as_str() == name)
        .unwrap_or_else(|| panic!("function '{}' was not lowered", name))
}

fn allocate(input: &str, name: &str) -> Allocation {
    let (mut ctx, unit) = compile(input);
    allocate_function(&mut ctx, function_named(&unit, name))
}

// === Register choice ===

#[test]
fn temporaries_prefer_registers() {
    let allocation = allocate("int add(int a, int b) { return a + b; }", "add");
    assert_eq!(allocation.location(TempId(0)), Location::Reg(Reg::Rsi));
}

#[test]
fn result_reuses_the_left_source_register() {
    let allocation = allocate("int lsum(int a, int b, int c) { return (a + b) + c; }", "lsum");
    assert_eq!(allocation.location(TempId(0)), Location::Reg(Reg::Rsi));
    assert_eq!(allocation.location(TempId(1)), Location::Reg(Reg::Rsi));
}

#[test]
fn result_avoids_the_right_source_register() {
    // The right operand is read after the result register is written,
    // so t1 must not take t0's home.
    let allocation = allocate("int rsum(int a, int b, int c) { return a + (b + c); }", "rsum");
    assert_eq!(allocation.location(TempId(0)), Location::Reg(Reg::Rsi));
    assert_eq!(allocation.location(TempId(1)), Location::Reg(Reg::Rdi));
}

#[test]
fn float_temporaries_draw_from_the_xmm_pool() {
    let (mut ctx, unit) = compile("double mix(double a, double b, double c) { return a * b + c; }");
    let mix = function_named(&unit, "mix");
    let allocation = allocate_function(&mut ctx, mix);
    assert_eq!(allocation.location(TempId(0)), Location::Reg(Reg::Xmm(2)));
    assert_eq!(allocation.location(TempId(1)), Location::Reg(Reg::Xmm(2)));
    assert_eq!(
        allocation.frame.reg_params,
        vec![
            (Reg::Xmm(0), OpWidth::Q, -8),
            (Reg::Xmm(1), OpWidth::Q, -16),
            (Reg::Xmm(2), OpWidth::Q, -24),
        ]
    );
}

#[test]
fn unread_results_still_get_homes() {
    let allocation = allocate("void spin(int a) { a + 1; }", "spin");
    assert!(matches!(allocation.location(TempId(0)), Location::Reg(_)));
}

// === Calls ===

#[test]
fn call_crossing_results_go_to_the_stack() {
    let allocation = allocate(
        "int f(void);\n\
         int twice(void) { return f() + f(); }",
        "twice",
    );
    // The first result is live across the second call; the second is
    // consumed immediately.
    assert_eq!(allocation.location(TempId(0)), Location::Spill(-8));
    assert_eq!(allocation.location(TempId(1)), Location::Reg(Reg::Rsi));
    assert_eq!(allocation.location(TempId(2)), Location::Reg(Reg::Rdi));
    assert_eq!(allocation.frame.frame_size, 16);
}

#[test]
fn staged_arguments_stay_live_until_their_call() {
    let (mut ctx, unit) = compile(
        "int g(int x);\n\
         int relay(int x) { return g(x); }",
    );
    let relay = function_named(&unit, "relay");

    // The snapshot copy is read by the call, not by its Param.
    let liveness = Liveness::analyze(relay);
    let call_index = relay
        .instrs
        .iter()
        .position(|instr| matches!(instr, Instr::Call { .. }))
        .unwrap() as u32;
    assert_eq!(liveness.last_use_of(TempId(0)), Some(call_index));

    let allocation = allocate_function(&mut ctx, relay);
    assert_eq!(allocation.location(TempId(0)), Location::Spill(-16));
}

#[test]
fn outgoing_staging_area_rounds_the_frame() {
    let allocation = allocate(
        "int sink(int a, int b, int c, int d, int e, int f, int g);\n\
         int push_all(void) { return sink(1, 2, 3, 4, 5, 6, 7); }",
        "push_all",
    );
    // One stack argument needs eight bytes at the bottom of the frame.
    assert_eq!(allocation.frame.frame_size, 16);
    assert_eq!(allocation.location(TempId(0)), Location::Reg(Reg::Rsi));
}

// === Frame layout ===

#[test]
fn parameters_spill_below_the_frame_pointer() {
    let (mut ctx, unit) = compile("int add(int a, int b) { return a + b; }");
    let add = function_named(&unit, "add");
    let allocation = allocate_function(&mut ctx, add);
    assert_eq!(
        allocation.frame.reg_params,
        vec![(Reg::Rdi, OpWidth::L, -4), (Reg::Rsi, OpWidth::L, -8)]
    );
    assert_eq!(allocation.frame.homes[&add.params[0]], -4);
    assert_eq!(allocation.frame.homes[&add.params[1]], -8);
    assert_eq!(allocation.frame.frame_size, 16);
}

#[test]
fn locals_come_before_slots_below_the_frame_pointer() {
    let (mut ctx, unit) = compile(
        "struct pair { long a; long b; };\n\
         struct pair make(void);\n\
         long first(void) { struct pair p; p = make(); return p.a; }",
    );
    let first = function_named(&unit, "first");
    let allocation = allocate_function(&mut ctx, first);
    assert_eq!(allocation.frame.homes[&first.locals[0]], -16);
    assert_eq!(allocation.frame.slot_offsets, vec![-32]);
    assert_eq!(allocation.frame.frame_size, 32);
}

#[test]
fn aggregate_parameters_keep_caller_offsets() {
    let (mut ctx, unit) = compile(
        "struct pair { long a; long b; };\n\
         long take(struct pair p, long x) { return p.a + x; }",
    );
    let take = function_named(&unit, "take");
    let allocation = allocate_function(&mut ctx, take);
    // The aggregate is addressed in the caller's frame; the scalar
    // after it still takes the first integer register.
    assert_eq!(allocation.frame.homes[&take.params[0]], 16);
    assert_eq!(allocation.frame.homes[&take.params[1]], -8);
    assert_eq!(allocation.frame.reg_params, vec![(Reg::Rdi, OpWidth::Q, -8)]);
}

#[test]
fn hidden_return_pointer_spills_into_its_slot() {
    let (mut ctx, unit) = compile(
        "struct pair { long a; long b; };\n\
         struct pair dup(struct pair p) { return p; }",
    );
    let dup = function_named(&unit, "dup");
    let allocation = allocate_function(&mut ctx, dup);
    assert_eq!(allocation.frame.homes[&dup.params[0]], 16);
    assert_eq!(allocation.frame.slot_offsets, vec![-8]);
    assert_eq!(allocation.frame.reg_params[0], (Reg::Rdi, OpWidth::Q, -8));
}

// === Eviction ===

#[test]
fn full_pool_evicts_the_most_distant_temporary() {
    let (mut ctx, mut unit) = compile("int base(void) { return 0; }");
    let mut function = unit.functions.remove(0);

    let imm = |n: i64| Operand::Direct(Value::IntConst(n));
    let temp = |n: u32| Operand::Direct(Value::Temp(TempId(n)));
    let bin = |result: u32, lhs: Operand, rhs: Operand| Instr::Bin {
        op: BinOp::AddI,
        width: OpWidth::L,
        is_signed: true,
        result: temp(result),
        lhs,
        rhs,
    };

    // Seven concurrently live values against a pool of six, then a
    // chain that consumes them in order. t5 is needed longest of the
    // six occupants when t6 arrives, so it is the one sent to memory.
    let mut instrs = Vec::new();
    for n in 0..7 {
        instrs.push(bin(n, imm(1), imm(n as i64)));
    }
    instrs.push(bin(7, temp(0), temp(1)));
    instrs.push(bin(8, temp(7), temp(2)));
    instrs.push(bin(9, temp(8), temp(3)));
    instrs.push(bin(10, temp(9), temp(4)));
    instrs.push(bin(11, temp(10), temp(5)));
    instrs.push(bin(12, temp(11), temp(6)));
    instrs.push(Instr::Return {
        class: OpClass::Int,
        width: OpWidth::L,
        value: Some(temp(12)),
    });
    instrs.push(Instr::Label(function.return_label));
    function.instrs = instrs;
    function.temp_count = 13;

    let allocation = allocate_function(&mut ctx, &function);
    assert_eq!(allocation.location(TempId(0)), Location::Reg(Reg::Rsi));
    assert_eq!(allocation.location(TempId(1)), Location::Reg(Reg::Rdi));
    assert_eq!(allocation.location(TempId(2)), Location::Reg(Reg::R8));
    assert_eq!(allocation.location(TempId(3)), Location::Reg(Reg::R9));
    assert_eq!(allocation.location(TempId(4)), Location::Reg(Reg::R10));
    assert_eq!(allocation.location(TempId(5)), Location::Spill(-8));
    assert_eq!(allocation.location(TempId(6)), Location::Reg(Reg::R11));
    assert_eq!(allocation.location(TempId(12)), Location::Reg(Reg::Rsi));
    assert_eq!(allocation.frame.frame_size, 16);
}
