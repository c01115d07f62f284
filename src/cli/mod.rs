//! CLI module
//!
//! Offline inspection of a configuration and schema pair:
//! - ddl: CREATE statements of every expected object
//! - hash: schema hash of every expected object
//! - check: validate both files

mod args;
mod commands;
mod errors;
mod io;

use std::io::stdout;

pub use args::{Cli, Command, Inputs};
pub use commands::{check, ddl, hash, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};

/// Parse arguments and run the command against stdout
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let mut out = stdout().lock();
    run_command(cli.command, &mut out)
}
