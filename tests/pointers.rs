//! Pointer arithmetic, indexing, and indirection.

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
fn address_of_yields_the_slot_address() {
    let asm = assemble(
        "int deref(void) {\n\
             int x = 7;\n\
             int *p = &x;\n\
             return *p;\n\
         }",
    );
    assert_has(&asm, "\tleaq\t");
    assert_has(&asm, "(%rbp), ");
}

#[test]
fn pointer_plus_constant_folds_the_scaled_offset() {
    let asm = assemble(
        "int second(int *p) {\n\
             return *(p + 1);\n\
         }",
    );
    assert_has(&asm, "\taddq\t$4, ");
}

#[test]
fn a_variable_subscript_scales_then_indexes() {
    let asm = assemble(
        "int at(int *a, int i) {\n\
             return a[i];\n\
         }",
    );
    assert_has(&asm, "\timulq\t$4, ");
    assert_has(&asm, ",%r");
}

#[test]
fn a_constant_subscript_becomes_a_displacement() {
    let asm = assemble(
        "int third(int *a) {\n\
             return a[2];\n\
         }",
    );
    assert_has(&asm, "\tmovl\t8(%r");
}

#[test]
fn pointer_difference_divides_by_the_element_size() {
    let asm = assemble(
        "long gap(int *a, int *b) {\n\
             return a - b;\n\
         }",
    );
    assert_has(&asm, "\tsubq\t");
    assert_has(&asm, "\tcqto\n");
    assert_has(&asm, "\tidivq\t%rcx\n");
}

#[test]
fn double_indirection_loads_twice() {
    let asm = assemble(
        "int through(int **pp) {\n\
             return **pp;\n\
         }",
    );
    assert_has(&asm, "\tmovq\t(%r");
    assert_has(&asm, "\tmovl\t(%r");
}

#[test]
fn array_names_decay_to_addresses() {
    let asm = assemble(
        "int first(int *p);\n\
         int main(void) {\n\
             int a[3];\n\
             a[0] = 5;\n\
             return first(a);\n\
         }",
    );
    assert_has(&asm, "\tleaq\t");
    assert_has(&asm, "(%rbp), ");
}

#[test]
fn calls_through_a_function_pointer_go_indirect() {
    let asm = assemble(
        "int apply(int (*f)(int), int x) {\n\
             return f(x);\n\
         }",
    );
    assert_has(&asm, "\tcall\t*%r10\n");
}
