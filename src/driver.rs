//! Compiler driver.
//!
//! The driver owns the [`CompilationContext`] and walks the pipeline in
//! phase order, stopping where the dump flags say and checking the
//! diagnostic engine between phases. Phase outputs land in a
//! [`CompileArtifact`]; [`CompilerDriver::run`] decides what to do with
//! the one that was filled last: dumps go to stdout, assembly goes to
//! the output target, diagnostics go to stderr in source order.

pub mod artifact;
pub mod cli;

#[cfg(test)]
mod tests_driver;

use std::fs;
use std::io::Read;

use itertools::Itertools;
use log::debug;

use crate::ast::{Ast, NodeKind, NodeRef, TranslationUnit};
use crate::context::CompilationContext;
use crate::diagnostic::ErrorFormatter;
use crate::emit::emit_unit;
use crate::ir::IrUnit;
use crate::ir::lower::lower_unit;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::parser::{Parser, token_text};
use crate::source_manager::SourceId;

pub use artifact::{CompileArtifact, CompilePhase};
pub use cli::{Cli, CompileConfig};

/// Main compiler driver.
pub struct CompilerDriver {
    config: CompileConfig,
    ctx: CompilationContext,
}

impl CompilerDriver {
    pub fn new(cli: Cli) -> Self {
        Self::from_config(cli.into_config())
    }

    pub fn from_config(config: CompileConfig) -> Self {
        let mut ctx = CompilationContext::new();
        ctx.diagnostics.warnings_as_errors = config.warnings_as_errors;
        CompilerDriver { config, ctx }
    }

    /// Run the phases up to `stop_after`, collecting that phase's output.
    ///
    /// Each phase only runs on an error-free predecessor; the first
    /// phase boundary with errors pending aborts with
    /// [`PipelineError::Fatal`] and leaves the diagnostics to `run`.
    pub fn run_pipeline(&mut self, stop_after: CompilePhase) -> Result<CompileArtifact, PipelineError> {
        let mut out = CompileArtifact::default();

        let source_id = self.load_input()?;
        debug!("compiling {}", self.ctx.sources.get_file_name(source_id));

        let tokens = self.run_lexer(source_id)?;
        if stop_after == CompilePhase::Lex {
            out.tokens = Some(tokens);
            return Ok(out);
        }

        let (ast, unit) = self.run_parser(&tokens)?;
        if stop_after == CompilePhase::Parse {
            out.ast = Some(ast);
            return Ok(out);
        }

        let ir = self.run_lowering(&ast, &unit);
        if stop_after == CompilePhase::Lower {
            out.ir = Some(ir);
            return Ok(out);
        }

        debug!("emitting assembly for {} functions", ir.functions.len());
        out.assembly = Some(emit_unit(&mut self.ctx, &ast, &unit, &ir));
        Ok(out)
    }

    fn load_input(&mut self) -> Result<SourceId, PipelineError> {
        if self.config.reads_stdin() {
            let mut buffer = Vec::new();
            std::io::stdin().read_to_end(&mut buffer).map_err(PipelineError::IoError)?;
            return Ok(self.ctx.sources.add_buffer(buffer, "<stdin>"));
        }
        self.ctx.sources.add_file_from_path(&self.config.input).map_err(PipelineError::IoError)
    }

    fn run_lexer(&mut self, source_id: SourceId) -> Result<Vec<Token>, PipelineError> {
        let tokens = Lexer::new(self.ctx.sources.get_buffer(source_id), source_id).tokenize(&mut self.ctx.diagnostics);
        self.check_for_errors()?;
        Ok(tokens)
    }

    fn run_parser(&mut self, tokens: &[Token]) -> Result<(Ast, TranslationUnit), PipelineError> {
        let mut ast = Ast::new();
        let unit = Parser::new(&mut self.ctx, &mut ast, tokens).parse_translation_unit();
        self.check_for_errors()?;
        Ok((ast, unit))
    }

    fn run_lowering(&mut self, ast: &Ast, unit: &TranslationUnit) -> IrUnit {
        debug_assert!(!self.ctx.diagnostics.has_errors(), "lowering requires an error-free parse");
        debug!("lowering {} functions", unit.functions.len());
        lower_unit(&mut self.ctx, ast, unit)
    }

    fn check_for_errors(&self) -> Result<(), PipelineError> {
        if self.ctx.diagnostics.has_errors() {
            Err(PipelineError::Fatal)
        } else {
            Ok(())
        }
    }

    /// Run the compilation and dispose of the final artifact.
    pub fn run(&mut self) -> Result<(), DriverError> {
        let stop_after = self.config.stop_after();
        match self.run_pipeline(stop_after) {
            Ok(artifact) => {
                self.print_diagnostics();
                if let Some(assembly) = artifact.assembly {
                    self.write_assembly(&assembly)?;
                } else if let Some(ir) = artifact.ir {
                    print!("{}", ir);
                } else if let Some(ast) = artifact.ast {
                    self.dump_ast(&ast);
                } else if let Some(tokens) = artifact.tokens {
                    self.dump_tokens(&tokens);
                }
                Ok(())
            }
            Err(PipelineError::IoError(error)) => {
                Err(DriverError::IoError(format!("{}: {}", self.config.input.display(), error)))
            }
            Err(PipelineError::Fatal) => {
                self.print_diagnostics();
                Err(DriverError::CompilationFailed)
            }
        }
    }

    fn write_assembly(&self, assembly: &str) -> Result<(), DriverError> {
        match self.config.output_target() {
            Some(path) => {
                debug!("writing assembly to {}", path.display());
                fs::write(&path, assembly)
                    .map_err(|error| DriverError::IoError(format!("failed to write {}: {}", path.display(), error)))
            }
            None => {
                print!("{}", assembly);
                Ok(())
            }
        }
    }

    /// Print accumulated diagnostics to stderr, in source order.
    pub fn print_diagnostics(&self) {
        let formatter = ErrorFormatter::default();
        formatter.print_diagnostics(&self.ctx.diagnostics, &self.ctx.sources);
    }

    pub fn has_errors(&self) -> bool {
        self.ctx.diagnostics.has_errors()
    }

    // === Dumps ===

    fn dump_tokens(&self, tokens: &[Token]) {
        for token in tokens {
            if matches!(token.kind, TokenKind::EndOfFile) {
                break;
            }
            println!("{}: {}", self.ctx.format_location(token.span), token_text(&token.kind));
        }
    }

    /// Flat arena dump: one node per line, children by node number.
    fn dump_ast(&self, ast: &Ast) {
        for index in 0..ast.len() {
            let Some(node_ref) = NodeRef::new(index as u32 + 1) else {
                continue;
            };
            println!("{}: {}", node_ref.get(), self.render_node(ast, node_ref));
        }
    }

    fn render_node(&self, ast: &Ast, node_ref: NodeRef) -> String {
        match ast.get_kind(node_ref) {
            NodeKind::ConstInt(value) => format!("ConstInt({})", value),
            NodeKind::ConstFloat(value) => format!("ConstFloat({})", value),
            NodeKind::ConstString(spelling) => format!("ConstString({})", spelling),
            NodeKind::Ident(sym) => format!("Ident({})", self.ctx.symbols.entry(*sym).name),
            NodeKind::Unary(op, operand) => format!("Unary({:?}, {})", op, operand.get()),
            NodeKind::Binary(op, lhs, rhs) => format!("Binary({:?}, {}, {})", op, lhs.get(), rhs.get()),
            NodeKind::Conditional { condition, then_expr, else_expr } => {
                format!("Conditional({}, {}, {})", condition.get(), then_expr.get(), else_expr.get())
            }
            NodeKind::Assign(lhs, rhs) => format!("Assign({}, {})", lhs.get(), rhs.get()),
            NodeKind::CompoundAssign { op, lhs, rhs, .. } => {
                format!("CompoundAssign({:?}, {}, {})", op, lhs.get(), rhs.get())
            }
            NodeKind::PreIncrement(expr) => format!("PreIncrement({})", expr.get()),
            NodeKind::PreDecrement(expr) => format!("PreDecrement({})", expr.get()),
            NodeKind::PostIncrement(expr) => format!("PostIncrement({})", expr.get()),
            NodeKind::PostDecrement(expr) => format!("PostDecrement({})", expr.get()),
            NodeKind::Call(callee, arguments) => format!("Call({}, [{}])", callee.get(), ref_list(arguments)),
            NodeKind::Member(base, member) => format!("Member({}, {})", base.get(), member),
            NodeKind::Index(base, index) => format!("Index({}, {})", base.get(), index.get()),
            NodeKind::Conv(operand) => {
                format!("Conv({}) : {}", operand.get(), self.ctx.types.display(ast.get_type(node_ref)))
            }
            NodeKind::Decay(operand) => {
                format!("Decay({}) : {}", operand.get(), self.ctx.types.display(ast.get_type(node_ref)))
            }
            NodeKind::InitList(items) => format!("InitList([{}])", ref_list(items)),
            NodeKind::Compound(_, statements) => format!("Compound([{}])", ref_list(statements)),
            NodeKind::If { condition, then_branch, else_branch } => {
                format!(
                    "If(condition={}, then={}, else={})",
                    condition.get(),
                    then_branch.get(),
                    opt_ref(*else_branch)
                )
            }
            NodeKind::While { condition, body } => {
                format!("While(condition={}, body={})", condition.get(), body.get())
            }
            NodeKind::DoWhile { body, condition } => {
                format!("DoWhile(body={}, condition={})", body.get(), condition.get())
            }
            NodeKind::For { init, condition, increment, body, .. } => {
                format!(
                    "For(init={}, condition={}, increment={}, body={})",
                    opt_ref(*init),
                    opt_ref(*condition),
                    opt_ref(*increment),
                    body.get()
                )
            }
            NodeKind::Return(expr) => format!("Return({})", opt_ref(*expr)),
            NodeKind::Break => "Break".to_string(),
            NodeKind::Continue => "Continue".to_string(),
            NodeKind::Goto(label) => format!("Goto({})", self.ctx.symbols.entry(*label).name),
            NodeKind::Labeled(label, statement) => {
                format!("Labeled({}, {})", self.ctx.symbols.entry(*label).name, statement.get())
            }
            NodeKind::ExpressionStatement(expr) => format!("ExpressionStatement({})", expr.get()),
            NodeKind::Empty => "Empty".to_string(),
            NodeKind::Error => "Error".to_string(),
        }
    }
}

fn opt_ref(node_ref: Option<NodeRef>) -> String {
    node_ref.map(|r| r.get().to_string()).unwrap_or_else(|| "none".to_string())
}

fn ref_list(refs: &[NodeRef]) -> String {
    refs.iter().map(|r| r.get().to_string()).join(", ")
}

/// Driver-level failures, rendered for the user by `main`.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Compilation failed due to errors")]
    CompilationFailed,
}

/// Error that stops the compilation pipeline.
#[derive(Debug)]
pub enum PipelineError {
    Fatal,
    IoError(std::io::Error),
}
