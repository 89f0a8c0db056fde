//! Declarator parsing, checked through the rendered symbol table.

use kolak::test_utils::{compile_and_get_diagnostics, declaration_types};

#[test]
fn object_declarations_render_in_c_style() {
    let types = declaration_types(
        "int a;\n\
         int *b;\n\
         int c[4];\n\
         int (*f)(int, long);\n\
         const char *s;\n\
         unsigned long long big;\n",
    );
    insta::assert_yaml_snapshot!(&types, @r#"
    - int a
    - int *b
    - "int c[4]"
    - "int (*f) (int, long)"
    - const char *s
    - unsigned long long big
    "#);
}

#[test]
fn function_declarations_list_parameter_types() {
    let types = declaration_types(
        "long max(long, long);\n\
         void nothing(void);\n\
         double mix(int, ...);\n",
    );
    insta::assert_yaml_snapshot!(&types, @r#"
    - "long max (long, long)"
    - void nothing (void)
    - "double mix (int, ...)"
    "#);
}

#[test]
fn typedefs_resolve_to_their_underlying_type() {
    let types = declaration_types("typedef int myint;\nmyint x;\n");
    insta::assert_yaml_snapshot!(&types, @r"
    - int x
    ");
}

#[test]
fn a_prototype_merges_with_its_definition() {
    let types = declaration_types(
        "int add(int, int);\n\
         int add(int a, int b) { return a + b; }\n",
    );
    insta::assert_yaml_snapshot!(&types, @r#"
    - "int add (int, int)"
    "#);
}

#[test]
fn repeated_tentative_definitions_collapse() {
    let types = declaration_types("int g;\nint g;\n");
    insta::assert_yaml_snapshot!(&types, @r"
    - int g
    ");
}

#[test]
fn conflicting_redeclarations_are_reported() {
    let diagnostics = compile_and_get_diagnostics("int x;\ndouble x;\n", "decl.c");
    assert!(
        diagnostics
            .iter()
            .any(|d| d.contains("error: conflicting types for 'x', previous at decl.c:1:5")),
        "unexpected diagnostics: {:#?}",
        diagnostics
    );
}

#[test]
fn reporting_stops_at_the_error_cap() {
    let mut source = String::from("int main(void) {\n");
    for i in 0..40 {
        source.push_str(&format!("    u{};\n", i));
    }
    source.push_str("    return 0;\n}\n");

    let diagnostics = compile_and_get_diagnostics(&source, "cap.c");
    let errors = diagnostics.iter().filter(|d| d.contains(": error:")).count();
    assert_eq!(errors, 32, "diagnostics: {:#?}", diagnostics);
    assert!(diagnostics.iter().any(|d| d == "Too many errors."));
    assert_eq!(diagnostics.len(), 33);
}
