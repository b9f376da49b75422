//! # Arbor CLI Module
//!
//! ## Available Commands
//!
//! - `replay` - Run a scenario and print actions, errors and the checksum
//! - `validate` - Check a scenario without running it
//! - `dump` - Run a scenario and write the canonical export
//! - `inspect` - Summarize a canonical export

mod commands;

use arbor_core::ArborError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Arbor - configuration tree replay
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a scenario file
    Replay {
        /// Path to the scenario (TOML)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Validate a scenario file without running it
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Replay a scenario and write the final tree in canonical format
    Dump {
        #[arg(short, long)]
        file: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Summarize a canonical export
    Inspect {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), ArborError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Replay { file } => cmd_replay(&file, json_mode),
        Commands::Validate { file } => cmd_validate(&file, json_mode),
        Commands::Dump { file, output } => cmd_dump(&file, &output),
        Commands::Inspect { input } => cmd_inspect(&input, json_mode),
    }
}
