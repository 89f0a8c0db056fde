use crate::ast::Ast;
use crate::ir::IrUnit;
use crate::lexer::Token;

/// Pipeline stop points, selected by the dump flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompilePhase {
    Lex,
    Parse,
    Lower,
    #[default]
    Emit,
}

/// Outputs of one compilation, filled up to the stop phase.
#[derive(Default)]
pub struct CompileArtifact {
    pub tokens: Option<Vec<Token>>,
    pub ast: Option<Ast>,
    pub ir: Option<IrUnit>,
    pub assembly: Option<String>,
}
