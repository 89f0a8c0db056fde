use crate::ast::Ast;
use crate::context::CompilationContext;
use crate::ir::lower::lower_unit;
use crate::lexer::Lexer;
use crate::parser::Parser;

use super::emit_unit;

fn assemble(input: &str) -> String {
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
    emit_unit(&mut ctx, &ast, &unit, &ir)
}

fn assert_has(asm: &str, fragment: &str) {
    assert!(
        asm.contains(fragment),
        "missing {:?} in assembly:\n{}",
        fragment,
        asm
    );
}

// === Whole functions ===

#[test]
fn adds_two_parameters() {
    let asm = assemble("int add(int a, int b) { return a + b; }");
    let expected = format!(
        "\t.text\n\
         \t.globl\tadd\n\
         add:\n\
         \tpushq\t%rbp\n\
         \tmovq\t%rsp, %rbp\n\
         \tsubq\t$16, %rsp\n\
         \tmovl\t%edi, -4(%rbp)\n\
         \tmovl\t%esi, -8(%rbp)\n\
         \tmovl\t-4(%rbp), %esi\n\
         \taddl\t-8(%rbp), %esi\n\
         \tmovl\t%esi, %eax\n\
         .L0:\n\
         \tleave\n\
         \tret\n\
         \t.ident\t\"kolak {}\"\n",
        env!("CARGO_PKG_VERSION")
    );
    assert_eq!(asm, expected);
}

#[test]
fn constant_return_skips_the_frame_adjustment() {
    let asm = assemble("int answer(void) { return 42; }");
    let expected = format!(
        "\t.text\n\
         \t.globl\tanswer\n\
         answer:\n\
         \tpushq\t%rbp\n\
         \tmovq\t%rsp, %rbp\n\
         \tmovl\t$42, %eax\n\
         .L0:\n\
         \tleave\n\
         \tret\n\
         \t.ident\t\"kolak {}\"\n",
        env!("CARGO_PKG_VERSION")
    );
    assert_eq!(asm, expected);
}

#[test]
fn doubles_return_through_the_literal_pool() {
    let asm = assemble("double half_more(void) { return 1.5; }");
    assert_has(&asm, "\tmovsd\t.LC0(%rip), %xmm0\n");
    assert_has(&asm, "\t.section\t.rodata\n\t.align\t8\n.LC0:\n\t.quad\t4609434218613702656\n");
}

#[test]
fn main_returns_zero_without_a_return_statement() {
    let asm = assemble("int main(void) { }");
    assert_has(&asm, "\tmovl\t$0, %eax\n");
}

// === Arithmetic selection ===

#[test]
fn signed_division_sign_extends_the_dividend() {
    let asm = assemble("int quot(int a, int b) { return a / b; }");
    assert_has(&asm, "\tmovl\t-8(%rbp), %ecx\n\tcltd\n\tidivl\t%ecx\n");
}

#[test]
fn unsigned_division_zeroes_the_high_half() {
    let asm = assemble("unsigned rem(unsigned a, unsigned b) { return a % b; }");
    assert_has(&asm, "\txorl\t%edx, %edx\n\tdivl\t%ecx\n");
    assert_has(&asm, "\tmovl\t%edx, ");
}

#[test]
fn variable_shift_counts_go_through_cl() {
    let asm = assemble("int shl(int a, int b) { return a << b; }");
    assert_has(&asm, "\tmovl\t-8(%rbp), %ecx\n\tsall\t%cl, %esi\n");
}

#[test]
fn widening_a_parameter_sign_extends_its_home() {
    let asm = assemble("long widen(int a) { return a; }");
    assert_has(&asm, "\tmovslq\t-4(%rbp), %rsi\n");
}

#[test]
fn unsigned_long_to_double_splits_on_the_sign_bit() {
    let asm = assemble("double scale(unsigned long n) { return n; }");
    assert_has(&asm, "\ttestq\t%rax, %rax\n\tjs\t.LE0\n");
    assert_has(&asm, "\tcvtsi2sdq\t%rax, %xmm2\n");
    assert_has(&asm, "\taddsd\t%xmm2, %xmm2\n.LE1:\n");
}

#[test]
fn double_comparison_uses_unordered_compare() {
    let asm = assemble("int less(double a, double b) { return a < b; }");
    assert_has(&asm, "\tucomisd\t");
}

// === Memory operands ===

#[test]
fn stores_through_a_pointer_stage_in_rax() {
    let asm = assemble("void store(int *p, int v) { *p = v; }");
    assert_has(&asm, "\tmovq\t-8(%rbp), %rcx\n\tmovl\t-12(%rbp), %eax\n\tmovl\t%eax, (%rcx)\n");
}

#[test]
fn indexed_loads_use_scaled_addressing() {
    let asm = assemble("int nth(int *p, long i) { return p[i]; }");
    assert_has(&asm, "(%rax,%rsi)");
}

// === Calls ===

#[test]
fn arguments_fill_registers_in_order() {
    let asm = assemble(
        "int add2(int a, int b);\n\
         int call_both(void) { return add2(1, 2); }",
    );
    assert_has(&asm, "\tmovl\t$1, %edi\n\tmovl\t$2, %esi\n\tcall\tadd2\n");
}

#[test]
fn seventh_argument_onward_goes_to_the_stack() {
    let asm = assemble(
        "int sum8(int a, int b, int c, int d, int e, int f, int g, int h);\n\
         int wide(void) { return sum8(1, 2, 3, 4, 5, 6, 7, 8); }",
    );
    assert_has(&asm, "\tmovl\t$7, (%rsp)\n");
    assert_has(&asm, "\tmovl\t$8, 8(%rsp)\n");
    assert_has(&asm, "\tmovl\t$6, %r9d\n");
}

#[test]
fn variadic_calls_report_vector_register_count() {
    let asm = assemble(
        "int printf(const char *fmt, ...);\n\
         int shout(void) { return printf(\"%f\", 1.5); }",
    );
    assert_has(&asm, "\tleaq\t.LC0(%rip), %rdi\n");
    assert_has(&asm, "\tmovsd\t.LC1(%rip), %xmm0\n");
    assert_has(&asm, "\tmovl\t$1, %eax\n\tcall\tprintf\n");
    assert_has(&asm, "\t.asciz\t\"%f\"\n");
}

#[test]
fn function_pointers_call_through_r10() {
    let asm = assemble("int apply(int (*fn)(int)) { return fn(5); }");
    assert_has(&asm, "\tmovl\t$5, %edi\n");
    assert_has(&asm, "\tcall\t*%r10\n");
}

// === Data sections ===

#[test]
fn initialized_globals_define_data() {
    let asm = assemble("int g = 5;\nint read_g(void) { return g; }");
    assert_has(&asm, "\t.data\n\t.globl\tg\n\t.align\t4\ng:\n\t.long\t5\n");
    assert_has(&asm, "\tmovl\tg(%rip), %eax\n");
}

#[test]
fn tentative_definitions_become_common_blocks() {
    let asm = assemble("int t;\n");
    assert_has(&asm, "\t.comm\tt,4,4\n");
}

#[test]
fn file_statics_stay_out_of_the_symbol_table() {
    let asm = assemble("static int hidden = 1;\nint peek(void) { return hidden; }");
    assert_has(&asm, "hidden:\n\t.long\t1\n");
    assert!(!asm.contains(".globl\thidden"), "static leaked linkage:\n{}", asm);
}

#[test]
fn block_statics_get_mangled_local_labels() {
    let asm = assemble("int count(void) { static int n; n = n + 1; return n; }");
    assert_has(&asm, "\t.local\t.Ln.");
    assert_has(&asm, "\t.comm\t.Ln.");
    assert_has(&asm, ".Ln.");
}

#[test]
fn pointer_initializers_scale_element_offsets() {
    let asm = assemble("int arr[4];\nint *q = arr + 1;\n");
    assert_has(&asm, "\t.comm\tarr,16,4\n");
    assert_has(&asm, "q:\n\t.quad\tarr+4\n");
}

#[test]
fn enum_constants_fold_into_initializers() {
    let asm = assemble("enum color { RED = 1, GREEN = 4 };\nint favorite = GREEN;\n");
    assert_has(&asm, "favorite:\n\t.long\t4\n");
}

#[test]
fn struct_members_pad_to_their_offsets() {
    let asm = assemble("struct pair { char c; int i; };\nstruct pair p = {'a', 5};\n");
    assert_has(&asm, "p:\n\t.byte\t97\n\t.zero\t3\n\t.long\t5\n");
}

#[test]
fn bit_fields_pack_into_their_storage_unit() {
    let asm = assemble("struct flags { int a : 3; int b : 5; };\nstruct flags x = {1, 2};\n");
    assert_has(&asm, "x:\n\t.long\t17\n");
}

#[test]
fn array_initializers_zero_fill_the_tail() {
    let asm = assemble("int four[4] = {1, 2};\n");
    assert_has(&asm, "four:\n\t.long\t1\n\t.long\t2\n\t.zero\t8\n");
}

#[test]
fn char_arrays_take_string_initializers() {
    let asm = assemble("char msg[6] = \"hi\";\n");
    assert_has(&asm, "msg:\n\t.asciz\t\"hi\"\n\t.zero\t3\n");
}

#[test]
fn exact_fit_strings_drop_the_terminator() {
    let asm = assemble("char tag[2] = \"hi\";\n");
    assert_has(&asm, "tag:\n\t.ascii\t\"hi\"\n");
}
