use super::*;
use crate::diagnostic::DiagnosticEngine;
use crate::source_manager::SourceManager;

/// Lex a string, asserting that no diagnostics were produced.
fn lex(input: &str) -> Vec<TokenKind> {
    let (kinds, diag) = lex_with_diagnostics(input);
    assert!(
        !diag.has_errors(),
        "unexpected lexer errors for {:?}: {:?}",
        input,
        diag.diagnostics()
    );
    kinds
}

/// Lex a string and return both the token kinds (without EndOfFile) and
/// the diagnostic engine for error inspection.
fn lex_with_diagnostics(input: &str) -> (Vec<TokenKind>, DiagnosticEngine) {
    let mut source_manager = SourceManager::new();
    let source_id = source_manager.add_buffer(input.as_bytes().to_vec(), "test_input");
    let mut diag = DiagnosticEngine::new();
    let tokens = Lexer::new(source_manager.get_buffer(source_id), source_id).tokenize(&mut diag);
    let kinds: Vec<TokenKind> = tokens
        .iter()
        .map(|t| t.kind)
        .filter(|k| *k != TokenKind::EndOfFile)
        .collect();
    (kinds, diag)
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        lex("int x unsigned _Bool frobnicate"),
        vec![
            TokenKind::Int,
            TokenKind::Identifier(intern("x")),
            TokenKind::Unsigned,
            TokenKind::Bool,
            TokenKind::Identifier(intern("frobnicate")),
        ]
    );
}

#[test]
fn keyword_prefix_is_identifier() {
    assert_eq!(lex("integer"), vec![TokenKind::Identifier(intern("integer"))]);
    assert_eq!(lex("voidptr"), vec![TokenKind::Identifier(intern("voidptr"))]);
}

#[test]
fn punctuation_maximal_munch() {
    assert_eq!(
        lex("<<= >>= ... ->"),
        vec![
            TokenKind::LeftShiftAssign,
            TokenKind::RightShiftAssign,
            TokenKind::Ellipsis,
            TokenKind::Arrow,
        ]
    );
    assert_eq!(
        lex("a+++b"),
        vec![
            TokenKind::Identifier(intern("a")),
            TokenKind::Increment,
            TokenKind::Plus,
            TokenKind::Identifier(intern("b")),
        ]
    );
}

#[test]
fn integer_constants_pick_types() {
    assert_eq!(
        lex("0 42 0x10 010"),
        vec![
            TokenKind::IntegerConstant {
                value: 0,
                kind: IntLitKind::Int
            },
            TokenKind::IntegerConstant {
                value: 42,
                kind: IntLitKind::Int
            },
            TokenKind::IntegerConstant {
                value: 16,
                kind: IntLitKind::Int
            },
            TokenKind::IntegerConstant {
                value: 8,
                kind: IntLitKind::Int
            },
        ]
    );

    // Suffixes
    assert_eq!(
        lex("7u 7l 7ul 7ull"),
        vec![
            TokenKind::IntegerConstant {
                value: 7,
                kind: IntLitKind::UInt
            },
            TokenKind::IntegerConstant {
                value: 7,
                kind: IntLitKind::Long
            },
            TokenKind::IntegerConstant {
                value: 7,
                kind: IntLitKind::ULong
            },
            TokenKind::IntegerConstant {
                value: 7,
                kind: IntLitKind::ULong
            },
        ]
    );

    // Magnitude promotion: decimal skips unsigned, hex does not
    assert_eq!(
        lex("2147483648"),
        vec![TokenKind::IntegerConstant {
            value: 2147483648,
            kind: IntLitKind::Long
        }]
    );
    assert_eq!(
        lex("0x80000000"),
        vec![TokenKind::IntegerConstant {
            value: 0x8000_0000,
            kind: IntLitKind::UInt
        }]
    );
    assert_eq!(
        lex("0xffffffffffffffff"),
        vec![TokenKind::IntegerConstant {
            value: u64::MAX,
            kind: IntLitKind::ULong
        }]
    );
}

#[test]
fn float_constants() {
    assert_eq!(
        lex("1.5 2e3 1.5f 1.5L"),
        vec![
            TokenKind::FloatConstant {
                value: 1.5,
                is_float: false
            },
            TokenKind::FloatConstant {
                value: 2000.0,
                is_float: false
            },
            TokenKind::FloatConstant {
                value: 1.5,
                is_float: true
            },
            TokenKind::FloatConstant {
                value: 1.5,
                is_float: false
            },
        ]
    );
    // Leading dot
    assert_eq!(
        lex(".25"),
        vec![TokenKind::FloatConstant {
            value: 0.25,
            is_float: false
        }]
    );
    // Hex float
    assert_eq!(
        lex("0x1.8p1"),
        vec![TokenKind::FloatConstant {
            value: 3.0,
            is_float: false
        }]
    );
}

#[test]
fn char_constants() {
    assert_eq!(
        lex(r"'a' '\n' '\0' '\x41'"),
        vec![
            TokenKind::CharacterConstant(b'a'),
            TokenKind::CharacterConstant(b'\n'),
            TokenKind::CharacterConstant(0),
            TokenKind::CharacterConstant(b'A'),
        ]
    );
}

#[test]
fn string_literal_keeps_spelling() {
    assert_eq!(lex(r#""hello\n""#), vec![TokenKind::StringLiteral(intern(r"hello\n"))]);
}

#[test]
fn comments_are_skipped() {
    assert_eq!(
        lex("int /* a comment */ x; // trailing\nlong y;"),
        vec![
            TokenKind::Int,
            TokenKind::Identifier(intern("x")),
            TokenKind::Semicolon,
            TokenKind::Long,
            TokenKind::Identifier(intern("y")),
            TokenKind::Semicolon,
        ]
    );
}

#[test]
fn unterminated_string_reports_error() {
    let (_, diag) = lex_with_diagnostics("\"oops\n");
    assert!(diag.has_errors());
}

#[test]
fn hash_directive_rejected_with_hint() {
    let (kinds, diag) = lex_with_diagnostics("#include <stdio.h>\nint x;");
    assert!(diag.has_errors());
    let first = &diag.diagnostics()[0];
    assert!(first.message.contains("preprocessor directives are not supported"));
    assert!(!first.hints.is_empty());
    // Lexing resumes on the next line
    assert_eq!(
        kinds,
        vec![TokenKind::Int, TokenKind::Identifier(intern("x")), TokenKind::Semicolon]
    );
}

#[test]
fn unknown_character_reports_error() {
    let (kinds, diag) = lex_with_diagnostics("int @ x;");
    assert!(diag.has_errors());
    assert_eq!(
        kinds,
        vec![TokenKind::Int, TokenKind::Identifier(intern("x")), TokenKind::Semicolon]
    );
}

#[test]
fn spans_cover_token_text() {
    let mut source_manager = SourceManager::new();
    let input = "int counter;";
    let source_id = source_manager.add_buffer(input.as_bytes().to_vec(), "test_input");
    let mut diag = DiagnosticEngine::new();
    let tokens = Lexer::new(source_manager.get_buffer(source_id), source_id).tokenize(&mut diag);
    assert_eq!(source_manager.get_source_text(tokens[0].span), "int");
    assert_eq!(source_manager.get_source_text(tokens[1].span), "counter");
    assert_eq!(source_manager.get_source_text(tokens[2].span), ";");
}
