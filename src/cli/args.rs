//! CLI argument definitions using clap
//!
//! Commands:
//! - entity-store ddl --config <path> --schema <path>
//! - entity-store hash --config <path> --schema <path>
//! - entity-store check --config <path> --schema <path>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Versioned entity store over a columnar database
#[derive(Parser, Debug)]
#[command(name = "entity-store")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Config and schema files every command reads
#[derive(Args, Debug, Clone)]
pub struct Inputs {
    /// Path to the store configuration file
    #[arg(long, default_value = "./entity-store.json")]
    pub config: PathBuf,

    /// Path to the schema file
    #[arg(long, default_value = "./schema.json")]
    pub schema: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the CREATE statement of every expected object
    Ddl {
        #[command(flatten)]
        inputs: Inputs,
    },

    /// Print the schema hash of every expected object
    Hash {
        #[command(flatten)]
        inputs: Inputs,
    },

    /// Validate the configuration and the schema
    Check {
        #[command(flatten)]
        inputs: Inputs,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
