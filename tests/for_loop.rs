//! Loop statements: for, while, do-while, break, continue.

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
fn a_counted_loop_tests_and_jumps_back() {
    let asm = assemble(
        "int sum(void) {\n\
             int s = 0;\n\
             for (int i = 0; i < 10; i = i + 1) s = s + i;\n\
             return s;\n\
         }",
    );
    assert_has(&asm, "\tcmpl\t$10, ");
    assert_has(&asm, "\tjge\t.L");
    assert_has(&asm, "\tjmp\t.L");
}

#[test]
fn the_init_clause_declares_into_its_own_scope() {
    let asm = assemble(
        "int outer(void) {\n\
             int i = 99;\n\
             for (int i = 0; i < 3; i = i + 1) { }\n\
             return i;\n\
         }",
    );
    assert_has(&asm, "\tmovl\t$99, ");
    assert_has(&asm, "\tcmpl\t$3, ");
}

#[test]
fn empty_clauses_spin_until_break() {
    let asm = assemble(
        "int once(void) {\n\
             for (;;) break;\n\
             return 0;\n\
         }",
    );
    assert_has(&asm, "\tjmp\t.L");
}

#[test]
fn continue_skips_to_the_step() {
    assemble(
        "int evens(void) {\n\
             int s = 0;\n\
             for (int i = 0; i < 10; i = i + 1) {\n\
                 if (i % 2) continue;\n\
                 s = s + i;\n\
             }\n\
             return s;\n\
         }",
    );
}

#[test]
fn loops_nest() {
    let asm = assemble(
        "int grid(void) {\n\
             int n = 0;\n\
             for (int i = 0; i < 3; i = i + 1)\n\
                 for (int j = 0; j < 4; j = j + 1)\n\
                     n = n + 1;\n\
             return n;\n\
         }",
    );
    assert_has(&asm, "\tcmpl\t$3, ");
    assert_has(&asm, "\tcmpl\t$4, ");
}

#[test]
fn while_checks_before_the_body() {
    let asm = assemble(
        "int drain(int n) {\n\
             while (n > 0) n = n - 1;\n\
             return n;\n\
         }",
    );
    assert_has(&asm, "\tcmpl\t$0, ");
    assert_has(&asm, "\tjle\t.L");
}

#[test]
fn do_while_checks_after_the_body() {
    let asm = assemble(
        "int at_least_once(void) {\n\
             int i = 0;\n\
             do { i = i + 1; } while (i < 5);\n\
             return i;\n\
         }",
    );
    assert_has(&asm, "\tcmpl\t$5, ");
    assert_has(&asm, "\tjl\t.L");
}

#[test]
fn a_false_constant_condition_still_compiles() {
    assemble(
        "int never(void) {\n\
             int n = 0;\n\
             while (0) n = 1;\n\
             return n;\n\
         }",
    );
}
