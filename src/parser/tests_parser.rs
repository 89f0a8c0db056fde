use crate::ast::{Ast, NodeKind, TranslationUnit};
use crate::context::CompilationContext;
use crate::diagnostic::DiagnosticLevel;
use crate::intern::intern;
use crate::lexer::Lexer;
use crate::semantic::SymbolKind;

use super::Parser;

struct Parsed {
    ctx: CompilationContext,
    ast: Ast,
    unit: TranslationUnit,
}

fn parse(input: &str) -> Parsed {
    let mut ctx = CompilationContext::new();
    let source_id = ctx.sources.add_buffer(input.as_bytes().to_vec(), "test_input");
    let tokens = Lexer::new(ctx.sources.get_buffer(source_id), source_id).tokenize(&mut ctx.diagnostics);
    let mut ast = Ast::new();
    let unit = Parser::new(&mut ctx, &mut ast, &tokens).parse_translation_unit();
    Parsed { ctx, ast, unit }
}

fn parse_ok(input: &str) -> Parsed {
    let parsed = parse(input);
    assert!(
        !parsed.ctx.diagnostics.has_errors(),
        "unexpected errors for {:?}: {:?}",
        input,
        parsed.ctx.diagnostics.diagnostics()
    );
    parsed
}

fn errors(parsed: &Parsed) -> Vec<String> {
    parsed
        .ctx
        .diagnostics
        .diagnostics()
        .iter()
        .filter(|d| d.level != DiagnosticLevel::Warning)
        .map(|d| d.message.clone())
        .collect()
}

fn warnings(parsed: &Parsed) -> Vec<String> {
    parsed
        .ctx
        .diagnostics
        .diagnostics()
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Warning)
        .map(|d| d.message.clone())
        .collect()
}

fn assert_error(input: &str, expected: &str) {
    let parsed = parse(input);
    let messages = errors(&parsed);
    assert!(
        messages.iter().any(|m| m.contains(expected)),
        "expected error containing {:?} for {:?}, got {:?}",
        expected,
        input,
        messages
    );
}

/// Rendered type of a file-scope symbol.
fn display_of(parsed: &Parsed, name: &str) -> String {
    let (entry_ref, _) = parsed
        .ctx
        .symbols
        .lookup(intern(name))
        .unwrap_or_else(|| panic!("symbol '{}' not found", name));
    let entry = parsed.ctx.symbols.entry(entry_ref);
    parsed.ctx.types.display(entry.type_info)
}

// === Declarators ===

#[test]
fn declarator_shapes() {
    let parsed = parse_ok("int *p; int a[3]; int m[3][4]; int (*fp)(char *, int); int (*pa)[4]; double d;");
    assert_eq!(display_of(&parsed, "p"), "int *");
    assert_eq!(display_of(&parsed, "a"), "int [3]");
    assert_eq!(display_of(&parsed, "m"), "int [3][4]");
    assert_eq!(display_of(&parsed, "fp"), "int (*) (char *, int)");
    assert_eq!(display_of(&parsed, "pa"), "int (*)[4]");
    assert_eq!(display_of(&parsed, "d"), "double");
}

#[test]
fn function_declarations() {
    let parsed = parse_ok("int f(void); int g(int, char); int h(int n, ...); int k();");
    assert_eq!(display_of(&parsed, "f"), "int (void)");
    assert_eq!(display_of(&parsed, "g"), "int (int, char)");
    assert_eq!(display_of(&parsed, "h"), "int (int, ...)");
    assert_eq!(display_of(&parsed, "k"), "int ()");
}

#[test]
fn parameter_arrays_decay() {
    let parsed = parse_ok("void f(int a[10], char *argv[]);");
    assert_eq!(display_of(&parsed, "f"), "void (int *, char **)");
}

#[test]
fn typedef_builds_derived_types() {
    let parsed = parse_ok("typedef int *IntPtr; IntPtr p; typedef IntPtr *Indirect; Indirect q;");
    assert_eq!(display_of(&parsed, "p"), "int *");
    assert_eq!(display_of(&parsed, "q"), "int **");
}

#[test]
fn typedef_name_shadowed_by_block_variable() {
    parse_ok(
        r#"
        typedef int T;
        void f(void) {
            T first;
            int T;
            T = 3;
            first = T;
        }
    "#,
    );
}

#[test]
fn old_style_parameter_list_requires_definition() {
    assert_error(
        "int f(a, b);",
        "a parameter list without types is only allowed in a function definition",
    );
}

// === Redeclaration rules ===

#[test]
fn compatible_redeclaration_merges() {
    let parsed = parse_ok("int f(int x); int f(int y) { return y; }");
    assert_eq!(display_of(&parsed, "f"), "int (int)");
    assert_eq!(parsed.unit.functions.len(), 1);
}

#[test]
fn conflicting_types_are_reported() {
    assert_error("int x; double x;", "conflicting types for 'x'");
}

#[test]
fn duplicate_definition_is_reported() {
    assert_error("int x = 1; int x = 2;", "redefinition of 'x'");
}

#[test]
fn tentative_definitions_merge_quietly() {
    let parsed = parse_ok("int x; int x = 5; int x;");
    let (entry_ref, _) = parsed.ctx.symbols.lookup(intern("x")).unwrap();
    let entry = parsed.ctx.symbols.entry(entry_ref);
    assert!(matches!(
        entry.kind,
        SymbolKind::Variable {
            initializer: Some(_),
            ..
        }
    ));
}

#[test]
fn static_linkage_mismatches() {
    assert_error(
        "int f(void); static int f(void) { return 0; }",
        "static declaration of 'f' follows non-static declaration",
    );
    assert_error(
        "static int g(void); int g(void) { return 0; }",
        "non-static declaration of 'g' follows static declaration",
    );
}

#[test]
fn local_redefinition_is_reported() {
    assert_error("void f(void) { int x; int x; }", "redefinition of 'x'");
    assert_error("void g(int x) { int x; }", "redefinition of 'x'");
}

#[test]
fn locals_shadow_outer_scopes() {
    parse_ok(
        r#"
        int x;
        void f(void) {
            int x;
            {
                int x;
                x = 1;
            }
        }
    "#,
    );
}

// === Storage classes ===

#[test]
fn file_scope_rejects_auto_and_register() {
    assert_error("auto int x;", "illegal storage class on file-scoped variable");
    assert_error("register int y;", "illegal storage class on file-scoped variable");
}

#[test]
fn block_scope_function_must_be_extern() {
    assert_error(
        "void f(void) { static int g(void); }",
        "function declared in block scope cannot have 'static' storage class",
    );
}

#[test]
fn extern_initializer_rules() {
    let parsed = parse("extern int a = 1;");
    assert!(!parsed.ctx.diagnostics.has_errors());
    assert!(warnings(&parsed).iter().any(|m| m.contains("'extern' variable has an initializer")));

    assert_error(
        "void f(void) { extern int b = 2; }",
        "'extern' variable cannot have an initializer",
    );
}

// === Tags, fields, enums ===

#[test]
fn struct_definition_and_member_access() {
    let parsed = parse_ok(
        r#"
        struct Point { int x; int y; };
        struct Point origin;
        int get_x(struct Point *p) { return p->x; }
        int get_y(struct Point q) { return q.y; }
    "#,
    );
    assert_eq!(display_of(&parsed, "origin"), "struct Point");
    assert_eq!(parsed.unit.functions.len(), 2);
}

#[test]
fn incomplete_struct_variable_is_rejected() {
    let parsed = parse("struct Node; struct Node *next; void f(void) { struct Node local; }");
    let messages = errors(&parsed);
    assert_eq!(messages.len(), 1, "got {:?}", messages);
    assert!(messages[0].contains("variable has incomplete type 'struct Node'"));
}

#[test]
fn tentative_definition_needs_a_completed_type() {
    assert_error(
        "struct Node; struct Node head;",
        "tentative definition has type 'struct Node' that is never completed",
    );
}

#[test]
fn duplicate_member_is_reported() {
    assert_error("struct S { int a; int a; };", "redefinition of 'a'");
}

#[test]
fn unknown_member_is_reported() {
    assert_error(
        "struct P { int x; }; int f(struct P p) { return p.y; }",
        "no member named 'y' in 'struct P'",
    );
}

#[test]
fn bit_field_widths_are_checked() {
    parse_ok("struct Flags { unsigned int a : 3; unsigned int : 2; unsigned int b : 1; };");
    assert_error("struct Bad { int a : -1; };", "bit-field 'a' has negative width");
    assert_error("struct Wide { int a : 40; };", "exceeds size of its type");
    assert_error("struct Zero { int a : 0; };", "named bit-field 'a' has zero width");
}

#[test]
fn enum_constants_participate_in_constant_expressions() {
    let parsed = parse_ok("enum Color { RED, GREEN = 5, BLUE }; int arr[BLUE];");
    assert_eq!(display_of(&parsed, "arr"), "int [6]");
}

// === Array bounds and constant folding ===

#[test]
fn array_bounds_fold() {
    let parsed = parse_ok("int a[3 + 4]; int b[sizeof(int) * 2]; int c[1 ? 3 : 4]; int d[(2 > 1) ? 2 + 2 : 9];");
    assert_eq!(display_of(&parsed, "a"), "int [7]");
    assert_eq!(display_of(&parsed, "b"), "int [8]");
    assert_eq!(display_of(&parsed, "c"), "int [3]");
    assert_eq!(display_of(&parsed, "d"), "int [4]");
}

#[test]
fn array_bound_must_be_constant() {
    assert_error("int n; int a[n];", "expect constant expression");
}

#[test]
fn negative_array_bound_is_rejected() {
    assert_error("int a[-4];", "array has negative size");
}

// === Initializers ===

#[test]
fn string_initializer_completes_char_array() {
    let parsed = parse_ok(r#"char s[] = "hi"; char exact[2] = "hi";"#);
    assert_eq!(display_of(&parsed, "s"), "char [3]");
    assert_eq!(display_of(&parsed, "exact"), "char [2]");
}

#[test]
fn oversized_string_initializer_warns() {
    let parsed = parse(r#"char tight[1] = "hi";"#);
    assert!(!parsed.ctx.diagnostics.has_errors());
    assert!(warnings(&parsed)
        .iter()
        .any(|m| m.contains("initializer-string for char array is too long")));
}

#[test]
fn initializer_list_completes_array() {
    let parsed = parse_ok("int a[] = {1, 2, 3}; int grid[2][2] = {{1, 2}, {3, 4}};");
    assert_eq!(display_of(&parsed, "a"), "int [3]");
    assert_eq!(display_of(&parsed, "grid"), "int [2][2]");
}

#[test]
fn excess_initializer_elements_are_reported() {
    assert_error("int b[2] = {1, 2, 3};", "excess elements in array initializer");
}

#[test]
fn local_array_initializer_lowers_to_assignments() {
    let parsed = parse_ok("void f(void) { int a[2] = {7, 9}; }");
    let body = parsed.unit.functions[0].body;
    let NodeKind::Compound(_, statements) = parsed.ast.get_kind(body) else {
        panic!("function body is not a compound statement");
    };
    let assigns = statements
        .iter()
        .filter(|&&s| matches!(parsed.ast.get_kind(s), NodeKind::ExpressionStatement(_)))
        .count();
    assert_eq!(assigns, 2);
}

#[test]
fn static_local_requires_constant_initializer() {
    parse_ok("int f(void) { static int counter = 3; return counter; }");
    assert_error(
        "int g(int n) { static int bad = n; return bad; }",
        "expect constant expression",
    );
}

#[test]
fn global_initializer_must_be_address_constant() {
    parse_ok(r#"int x = 4; int *p = &x; char *s = "a" "b"; int zero = 0; int *null_ptr = 0;"#);
    assert_error("int a; int b = a;", "expect constant expression");
}

#[test]
fn function_initializer_is_rejected() {
    assert_error("int f(void) = 3;", "illegal initializer");
}

// === Tentative definitions ===

#[test]
fn tentative_array_completes_to_one_element() {
    let parsed = parse("int t[];");
    assert!(!parsed.ctx.diagnostics.has_errors());
    assert_eq!(display_of(&parsed, "t"), "int [1]");
    assert!(warnings(&parsed)
        .iter()
        .any(|m| m.contains("tentative array definition assumed to have one element")));
}

// === main ===

#[test]
fn main_signatures() {
    parse_ok("int main(void) { return 0; }");
    parse_ok("int main(int argc, char **argv) { return argc; }");
    assert_error("void main(void) {}", "return type of 'main' is not 'int'");
    assert_error("int main(int only) { return only; }", "expect 0, 2 or 3 parameters for 'main'");
}

// === Old-style definitions ===

#[test]
fn old_style_definition_types_parameters() {
    let parsed = parse_ok(
        r#"
        int add(a, b)
        int a, b;
        { return a + b; }
    "#,
    );
    assert_eq!(parsed.unit.functions[0].parameters.len(), 2);
    assert_eq!(display_of(&parsed, "add"), "int ()");
}

#[test]
fn old_style_declaration_must_match_list() {
    assert_error(
        "int f(a) int a; int b; { return a; }",
        "parameter named 'b' is missing",
    );
}

// === Expressions ===

#[test]
fn undeclared_identifier_is_reported() {
    assert_error("int f(void) { return missing; }", "undeclared identifier 'missing'");
}

#[test]
fn assignment_needs_modifiable_lvalue() {
    assert_error("void f(int a) { 3 = a; }", "assignment target is not an lvalue");
    assert_error(
        "void g(void) { const int c = 1; c = 2; }",
        "cannot assign to const-qualified type",
    );
    assert_error("void h(void) { int a[2]; int b[2]; a = b; }", "array type 'int [2]' is not assignable");
}

#[test]
fn pointer_arithmetic_types() {
    parse_ok(
        r#"
        long diff(int *a, int *b) { return a - b; }
        int *advance(int *p, int n) { return p + n; }
        int deref_offset(int *p) { return *(p + 1) + p[2]; }
    "#,
    );
    assert_error(
        "int bad(int *p, double d) { return p - d; }",
        "invalid operands to binary expression",
    );
}

#[test]
fn call_arguments_are_checked() {
    assert_error(
        "int add(int a, int b); int f(void) { return add(1); }",
        "too few arguments to function call",
    );
    assert_error(
        "int neg(int a); int g(void) { return neg(1, 2); }",
        "too many arguments to function call",
    );
    assert_error(
        "int x; int h(void) { return x(); }",
        "called object type 'int' is not a function or function pointer",
    );
}

#[test]
fn variadic_calls_promote_float_arguments() {
    parse_ok(
        r#"
        int printf(const char *fmt, ...);
        int f(void) { float half = 0.5f; return printf("%d %f", 42, half); }
    "#,
    );
}

#[test]
fn address_of_needs_lvalue() {
    parse_ok("int x; int *p = &x;");
    assert_error("void f(void) { int *p = &3; }", "operand of '&' is not an lvalue");
    assert_error(
        "struct B { int w : 4; }; int *f(struct B *b) { return &b->w; }",
        "cannot take the address of a bit-field",
    );
}

#[test]
fn sizeof_rejects_incomplete_and_function_types() {
    assert_error(
        "struct N; unsigned long f(void) { return sizeof(struct N); }",
        "invalid application of 'sizeof' to an incomplete type",
    );
    assert_error(
        "int g(void); unsigned long h(void) { return sizeof g; }",
        "invalid application of 'sizeof' to a function type",
    );
}

// === Statements ===

#[test]
fn return_types_are_converted_and_checked() {
    parse_ok("int f(void) { return 3.5; } double g(void) { return 1; }");
    assert_error("void h(void) { return 1; }", "void function 'h' should not return a value");

    let parsed = parse("int k(void) { return; }");
    assert!(!parsed.ctx.diagnostics.has_errors());
    assert!(warnings(&parsed)
        .iter()
        .any(|m| m.contains("non-void function 'k' should return a value")));
}

#[test]
fn break_and_continue_must_be_in_loops() {
    assert_error("void f(void) { break; }", "'break' statement not in a loop");
    assert_error("void g(void) { continue; }", "'continue' statement not in a loop");
    parse_ok(
        r#"
        int f(void) {
            int i;
            int total = 0;
            for (i = 0; i < 10; i++) {
                if (i == 2) continue;
                if (i > 7) break;
                total += i;
            }
            while (total > 100) { total -= 3; }
            do { total++; } while (total < 0);
            return total;
        }
    "#,
    );
}

#[test]
fn for_init_declaration_is_scoped_to_the_loop() {
    let parsed = parse("void f(void) { for (int i = 0; i < 3; i++) ; i = 5; }");
    let messages = errors(&parsed);
    assert_eq!(messages.len(), 1, "got {:?}", messages);
    assert!(messages[0].contains("undeclared identifier 'i'"));
}

#[test]
fn labels_and_goto() {
    parse_ok("void f(void) { goto end; end: return; }");
    assert_error("void g(void) { goto nowhere; }", "label 'nowhere' used but not defined");
    assert_error("void h(void) { x: ; x: ; }", "duplicate label 'x'");
}

#[test]
fn label_namespace_is_separate() {
    parse_ok("void f(void) { int done = 0; done = 1; goto done; done: return; }");
}

#[test]
fn switch_is_not_supported() {
    assert_error("void f(int x) { switch (x) { } }", "switch statement is not supported");
}

// === Error cap ===

#[test]
fn error_cap_stops_the_parse() {
    let mut input = String::from("void f(void) {\n");
    for i in 0..40 {
        input.push_str(&format!("missing{};\n", i));
    }
    input.push('}');

    let parsed = parse(&input);
    assert!(parsed.ctx.diagnostics.is_over_limit());
    assert!(parsed
        .ctx
        .diagnostics
        .diagnostics()
        .iter()
        .any(|d| d.message == "Too many errors."));
}
