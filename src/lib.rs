//! A small ahead-of-time C compiler.
//!
//! The pipeline is a straight line: source text is lexed into tokens,
//! parsed into a typed AST while the symbol table is built, lowered to a
//! three-address IR, register-allocated, and emitted as x86-64 assembly
//! text in AT&T syntax. Each stage lives in its own module and talks to
//! the others through the shared [`context::CompilationContext`].

pub mod ast;
pub mod context;
pub mod diagnostic;
pub mod intern;
pub mod lexer;
pub mod source_manager;

/// Recursive-descent parser and declaration handling.
pub mod parser;
/// Symbol table, type system, and validation rules.
pub mod semantic;

/// Three-address intermediate representation and AST lowering.
pub mod ir;
/// Register and stack-slot assignment over the IR.
pub mod regalloc;
/// Assembly text emission.
pub mod emit;

/// Command-line driver.
pub mod driver;

/// Helpers for driving the pipeline from integration tests.
pub mod test_utils;
