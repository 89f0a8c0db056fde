//! Command-line surface.
//!
//! `Cli` is the clap derive struct; `into_config` folds it into the
//! [`CompileConfig`] the driver consumes. Tests construct configs
//! through [`CompileConfig::from_source_code`] instead, which parks the
//! source text in a named temporary file so the pipeline reads it like
//! any other input.

use std::path::{Path, PathBuf};

use clap::Parser as CliParser;

use super::artifact::CompilePhase;

/// Command-line interface.
#[derive(CliParser, Debug)]
#[command(name = "kolak", version, about = "A small C compiler emitting x86-64 assembly")]
pub struct Cli {
    /// Input source file; `-` reads standard input
    pub input: PathBuf,

    /// Where to write the generated assembly
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Print the token stream and stop
    #[arg(long)]
    pub dump_tokens: bool,

    /// Print the parsed tree and stop
    #[arg(long)]
    pub dump_ast: bool,

    /// Print the lowered IR and stop
    #[arg(long)]
    pub dump_ir: bool,

    /// Warning controls; `-Werror` promotes warnings to errors
    #[arg(short = 'W', value_name = "KIND")]
    pub warnings: Vec<String>,

    /// Verbose logging; repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Convert the parsed arguments into a compilation configuration.
    pub fn into_config(self) -> CompileConfig {
        let warnings_as_errors = self.warnings.iter().any(|w| w == "error");
        CompileConfig {
            input: self.input,
            output: self.output,
            dump_tokens: self.dump_tokens,
            dump_ast: self.dump_ast,
            dump_ir: self.dump_ir,
            warnings_as_errors,
            _temp_file: None,
        }
    }
}

/// Everything the driver needs for one compilation.
pub struct CompileConfig {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub dump_tokens: bool,
    pub dump_ast: bool,
    pub dump_ir: bool,
    pub warnings_as_errors: bool,
    /// Keeps the backing file of [`CompileConfig::from_source_code`]
    /// alive for the driver's lifetime.
    _temp_file: Option<tempfile::TempPath>,
}

impl CompileConfig {
    /// Build a configuration around a string of source code.
    pub fn from_source_code(source: &str) -> Self {
        use std::io::Write;
        let mut tmpfile = tempfile::Builder::new().suffix(".c").tempfile().expect("create temp source file");
        write!(tmpfile, "{}", source).expect("write temp source file");
        let temp_path = tmpfile.into_temp_path();
        let input = temp_path.to_path_buf();

        CompileConfig {
            input,
            output: None,
            dump_tokens: false,
            dump_ast: false,
            dump_ir: false,
            warnings_as_errors: false,
            _temp_file: Some(temp_path),
        }
    }

    /// The phase after which the pipeline stops, from the dump flags.
    pub fn stop_after(&self) -> CompilePhase {
        if self.dump_tokens {
            CompilePhase::Lex
        } else if self.dump_ast {
            CompilePhase::Parse
        } else if self.dump_ir {
            CompilePhase::Lower
        } else {
            CompilePhase::Emit
        }
    }

    /// Where the assembly goes. `-o` wins, stdin compiles to stdout,
    /// and a file input defaults to its own name with an `.s` suffix.
    pub fn output_target(&self) -> Option<PathBuf> {
        if let Some(path) = &self.output {
            return Some(path.clone());
        }
        if self.reads_stdin() {
            return None;
        }
        Some(self.input.with_extension("s"))
    }

    pub fn reads_stdin(&self) -> bool {
        self.input == Path::new("-")
    }
}
