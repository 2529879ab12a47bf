//! Command-line flags, via `clap`'s derive macro.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "zish")]
#[command(about = "A vi-modal interactive shell with encrypted command history")]
#[command(version)]
pub struct Cli {
    /// Run a single command non-interactively and exit.
    #[arg(short = 'c', value_name = "COMMAND")]
    pub command: Option<String>,

    /// Skip loading ~/.zishrc.
    #[arg(long)]
    pub no_rc: bool,

    /// Bypass the history vault's password prompt (also settable via
    /// ZISH_BYPASS_PASSWORD).
    #[arg(long)]
    pub no_password: bool,
}
