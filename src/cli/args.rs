//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Kiln incremental build engine CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: kiln.toml)
    #[arg(short = 'C', long, default_value = "kiln.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile pending changes (everything on a first run)
    #[command(visible_alias = "b")]
    Build {
        /// Recompile every source unit
        #[arg(short, long)]
        full: bool,
    },

    /// Remove generated outputs, then rebuild from scratch
    #[command(visible_alias = "c")]
    Clean,

    /// Watch source folders and rebuild on change
    #[command(visible_alias = "w")]
    Watch,
}
