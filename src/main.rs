use clap::Parser;
use kolak::driver::{Cli, CompilerDriver};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::process::exit;

fn main() {
    if !run() {
        exit(1);
    }
}

/// Parse the command line, set up logging, and run the compiler.
fn run() -> bool {
    let cli = Cli::parse();
    configure_logging(cli.verbose);

    let mut driver = CompilerDriver::new(cli);
    match driver.run() {
        Ok(()) => true,
        Err(error) => {
            eprintln!("{}", error);
            false
        }
    }
}

fn configure_logging(verbosity: u8) {
    let level = match verbosity {
        0 => return,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
        .expect("Failed to configure logger.");
}
