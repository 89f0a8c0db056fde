use std::path::PathBuf;

use clap::Parser as _;

use super::*;

#[test]
fn pipeline_produces_assembly() {
    let config = CompileConfig::from_source_code("int main(void) { return 0; }");
    let mut driver = CompilerDriver::from_config(config);
    let artifact = driver.run_pipeline(CompilePhase::Emit).expect("pipeline");
    assert!(!driver.has_errors());
    let assembly = artifact.assembly.expect("assembly output");
    assert!(assembly.contains("main:"));
    assert!(assembly.contains("\tret\n"));
}

#[test]
fn pipeline_stops_on_syntax_error() {
    let config = CompileConfig::from_source_code("int main(void) { return 0 }");
    let mut driver = CompilerDriver::from_config(config);
    let result = driver.run_pipeline(CompilePhase::Emit);
    assert!(matches!(result, Err(PipelineError::Fatal)));
    assert!(driver.has_errors());
}

#[test]
fn lex_phase_stops_before_parsing() {
    let config = CompileConfig::from_source_code("int x = 1;");
    let mut driver = CompilerDriver::from_config(config);
    let artifact = driver.run_pipeline(CompilePhase::Lex).expect("pipeline");
    let tokens = artifact.tokens.expect("token output");
    assert!(tokens.len() > 3);
    assert!(artifact.ast.is_none());
    assert!(artifact.assembly.is_none());
}

#[test]
fn ir_dump_renders_the_tac() {
    let config = CompileConfig::from_source_code("int add(int a, int b) { return a + b; }");
    let mut driver = CompilerDriver::from_config(config);
    let artifact = driver.run_pipeline(CompilePhase::Lower).expect("pipeline");
    let ir = artifact.ir.expect("ir output");
    assert!(ir.to_string().contains("add:"));
}

#[test]
fn long_string_initializers_warn_but_compile() {
    let config = CompileConfig::from_source_code("char s[2] = \"abc\";");
    let mut driver = CompilerDriver::from_config(config);
    let artifact = driver.run_pipeline(CompilePhase::Emit).expect("pipeline");
    assert!(!driver.has_errors());
    assert!(artifact.assembly.is_some());
}

#[test]
fn werror_promotes_the_same_warning() {
    let mut config = CompileConfig::from_source_code("char s[2] = \"abc\";");
    config.warnings_as_errors = true;
    let mut driver = CompilerDriver::from_config(config);
    let result = driver.run_pipeline(CompilePhase::Emit);
    assert!(matches!(result, Err(PipelineError::Fatal)));
    assert!(driver.has_errors());
}

#[test]
fn dump_flags_choose_the_stop_phase() {
    let mut config = CompileConfig::from_source_code("int x;");
    assert_eq!(config.stop_after(), CompilePhase::Emit);
    config.dump_ir = true;
    assert_eq!(config.stop_after(), CompilePhase::Lower);
    config.dump_ast = true;
    assert_eq!(config.stop_after(), CompilePhase::Parse);
    config.dump_tokens = true;
    assert_eq!(config.stop_after(), CompilePhase::Lex);
}

#[test]
fn output_defaults_to_the_input_with_an_s_suffix() {
    let cli = Cli::parse_from(["kolak", "prog.c"]);
    assert_eq!(cli.into_config().output_target(), Some(PathBuf::from("prog.s")));

    let cli = Cli::parse_from(["kolak", "-o", "out.s", "prog.c"]);
    assert_eq!(cli.into_config().output_target(), Some(PathBuf::from("out.s")));
}

#[test]
fn stdin_input_compiles_to_stdout() {
    let cli = Cli::parse_from(["kolak", "-"]);
    let config = cli.into_config();
    assert!(config.reads_stdin());
    assert_eq!(config.output_target(), None);
}

#[test]
fn werror_flag_promotes_warnings() {
    let cli = Cli::parse_from(["kolak", "-Werror", "prog.c"]);
    assert!(cli.into_config().warnings_as_errors);
}
