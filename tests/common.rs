//! Shared conventions for the integration suite.
//!
//! Feature tests drive the compiler in process through
//! `kolak::test_utils`, which runs the library pipeline on source
//! strings. The wrappers here cover the two assertion patterns the
//! suite leans on: compile and panic with the diagnostics, or demand a
//! specific rejection.

use kolak::test_utils::{compile_and_get_diagnostics, compile_to_assembly};

/// Compile `input` to assembly, panicking with the diagnostics on error.
pub fn assemble(input: &str) -> String {
    compile_to_assembly(input, "test.c")
        .unwrap_or_else(|errors| panic!("compilation failed for {:?}:\n{}", input, errors.join("\n")))
}

/// Assert that `input` compiles without errors.
pub fn assert_compiles(input: &str) {
    assemble(input);
}

/// Assert that `input` is rejected with an error containing `fragment`.
pub fn assert_rejected(input: &str, fragment: &str) {
    let diagnostics = compile_and_get_diagnostics(input, "test.c");
    assert!(
        diagnostics.iter().any(|d| d.contains("error") && d.contains(fragment)),
        "expected an error containing {:?} for {:?}, got: {:?}",
        fragment,
        input,
        diagnostics
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_returns_assembly_text() {
        let asm = assemble("int main(void) { return 0; }");
        assert!(asm.contains("main:"));
        assert!(asm.contains("\tret\n"));
    }

    #[test]
    fn warnings_do_not_fail_the_build() {
        assert_compiles("static void helper(void) { }\nint main(void) { return 0; }");
    }

    #[test]
    fn assert_rejected_sees_the_diagnostic() {
        assert_rejected("int main(void) { return x; }", "undeclared identifier 'x'");
    }

    #[test]
    #[should_panic(expected = "compilation failed")]
    fn assemble_panics_on_bad_input() {
        assemble("int main(void) { return x; }");
    }
}
