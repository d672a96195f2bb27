use anyhow::{Context, Result};
use minish::Interpreter;
use minish::command::ExitCode;
use minish::line::EditorSource;
use minish::{logging, signal};
use tracing::error;

fn main() {
    logging::init();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{}: {:#}", env!("CARGO_PKG_NAME"), e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<ExitCode> {
    signal::install().context("cannot install signal handlers")?;
    let mut source = EditorSource::new().context("cannot initialize the line editor")?;
    let mut shell = Interpreter::default();
    shell.repl(&mut source)
}
