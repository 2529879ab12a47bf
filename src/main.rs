//! Entry point: parse flags, set up logging, and hand off to either a
//! single `-c` command or the interactive `ShellState` loop.
//!
//! A flat read-eval loop with an inline `ctrlc` handler has moved into
//! `shell.rs::ShellState::run`, leaving `main.rs` the thin dispatcher the
//! `cli.rs`/`config.rs` split already implies it should become.

use std::io::{self, Write};

use clap::Parser;

use zish::cli::Cli;
use zish::eval::{Evaluator, IoHandles};
use zish::parser;
use zish::shell::ShellState;

fn main() {
    init_logging();

    // Raw mode and job control each handle SIGINT where it matters (key
    // events at the prompt, default disposition in spawned children); this
    // only keeps a stray Ctrl-C between those two states from taking the
    // shell process down with it.
    let _ = ctrlc::set_handler(|| {});

    let cli = Cli::parse();

    let code = match &cli.command {
        Some(command) => run_command(command),
        None => run_interactive(cli.no_rc, cli.no_password),
    };

    std::process::exit(code);
}

fn init_logging() {
    let Ok(path) = std::env::var("ZISH_DEBUG_LOG") else {
        return;
    };
    let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };
    env_logger::Builder::from_default_env().target(env_logger::Target::Pipe(Box::new(file))).init();
}

fn run_command(command: &str) -> i32 {
    let (arena, root) = match parser::parse(command) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("zish: {e}");
            return 1;
        }
    };
    let mut eval = Evaluator::new();
    match eval.eval_ast(&arena, root, IoHandles::inherit()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("zish: {e}");
            1
        }
    }
}

fn run_interactive(no_rc: bool, no_password: bool) -> i32 {
    let mut shell = match ShellState::new(no_rc, no_password) {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("zish: {e}");
            return 1;
        }
    };
    let code = shell.run();
    let _ = io::stdout().flush();
    code
}
