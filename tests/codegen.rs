//! End-to-end checks on the emitted assembly.
//!
//! These drive whole programs through the pipeline and look for the
//! load-bearing instructions in the output. Instruction selection
//! details live in the unit tests next to the emitter; the point here
//! is that complete programs come out the other end in one piece.

use kolak::test_utils::compile_to_assembly;

fn assemble(input: &str) -> String {
    compile_to_assembly(input, "test.c")
        .unwrap_or_else(|errors| panic!("compilation failed for {:?}:\n{}", input, errors.join("\n")))
}

fn assert_has(asm: &str, fragment: &str) {
    assert!(
        asm.contains(fragment),
        "missing {:?} in assembly:\n{}",
        fragment,
        asm
    );
}

#[test]
fn returns_a_constant() {
    let asm = assemble("int main(void) { return 42; }");
    assert_has(&asm, "\t.globl\tmain\n");
    assert_has(&asm, "main:\n");
    assert_has(&asm, "\tmovl\t$42, %eax\n");
    assert_has(&asm, "\tleave\n\tret\n");
}

#[test]
fn main_without_a_return_yields_zero() {
    let asm = assemble("int main(void) { 1 + 2; }");
    assert_has(&asm, "\tmovl\t$0, %eax\n");
}

#[test]
fn calls_pass_arguments_in_registers() {
    let asm = assemble(
        "int add2(int a, int b) { return a + b; }\n\
         int main(void) { return add2(1, 2); }",
    );
    assert_has(&asm, "\tmovl\t$1, %edi\n\tmovl\t$2, %esi\n\tcall\tadd2\n");
}

#[test]
fn globals_land_in_the_data_section() {
    let asm = assemble("int g = 5;\nint main(void) { return g; }");
    assert_has(&asm, "\t.data\n\t.globl\tg\n\t.align\t4\ng:\n\t.long\t5\n");
    assert_has(&asm, "\tmovl\tg(%rip), %eax\n");
}

#[test]
fn string_arguments_come_from_the_literal_pool() {
    let asm = assemble(
        "int puts(const char *s);\n\
         int main(void) { puts(\"hi\"); return 0; }",
    );
    assert_has(&asm, "\tleaq\t.LC0(%rip), %rdi\n");
    assert_has(&asm, "\tcall\tputs\n");
    assert_has(&asm, "\t.asciz\t\"hi\"\n");
}

#[test]
fn if_branches_compare_and_jump() {
    let asm = assemble("int sign(int n) { if (n < 0) return -1; return 1; }");
    assert_has(&asm, "\tcmpl\t$0, ");
    assert_has(&asm, "\tjge\t.L");
    assert_has(&asm, "\tmovl\t$-1, %eax\n");
}

#[test]
fn returns_share_one_epilogue() {
    let asm = assemble("int pick(int c) { if (c) return 1; return 2; }");
    // Both returns jump to the same synthetic label; leave/ret appear once.
    assert_eq!(asm.matches("\tleave\n").count(), 1);
    assert_eq!(asm.matches("\tret\n").count(), 1);
}

#[test]
fn while_loops_jump_backward() {
    let asm = assemble(
        "int count(int n) {\n\
             int i = 0;\n\
             while (i < n) i = i + 1;\n\
             return i;\n\
         }",
    );
    assert_has(&asm, "\tjmp\t.L");
    assert_has(&asm, "\taddl\t$1, ");
}

#[test]
fn ternary_selects_between_arms() {
    let asm = assemble("int pick(int c) { return c ? 10 : 20; }");
    assert_has(&asm, "\tmovl\t$10, ");
    assert_has(&asm, "\tmovl\t$20, ");
    assert_has(&asm, "\tjmp\t.L");
}

#[test]
fn logical_and_materializes_zero_or_one() {
    let asm = assemble("int both(int a, int b) { return a && b; }");
    assert_has(&asm, "\tmovl\t$1, ");
    assert_has(&asm, "\tmovl\t$0, ");
}

#[test]
fn goto_reaches_a_user_label() {
    let asm = assemble(
        "int spin(void) {\n\
             int x = 0;\n\
         again:\n\
             x = x + 1;\n\
             if (x < 3) goto again;\n\
             return x;\n\
         }",
    );
    assert_has(&asm, "\tjl\t.L");
    assert_has(&asm, "\taddl\t$1, ");
}

#[test]
fn recursion_calls_back_into_the_function() {
    let asm = assemble(
        "int fact(int n) {\n\
             if (n < 2) return 1;\n\
             return n * fact(n - 1);\n\
         }",
    );
    assert_has(&asm, "\tcall\tfact\n");
    assert_has(&asm, "\timull\t");
}

#[test]
fn the_unit_ends_with_the_ident_note() {
    let asm = assemble("int main(void) { return 0; }");
    assert_has(&asm, &format!("\t.ident\t\"kolak {}\"\n", env!("CARGO_PKG_VERSION")));
}
