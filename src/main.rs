//! Kiln - an incremental project build engine.

#![allow(dead_code)]

mod builder;
mod cli;
mod content;
mod logger;
mod path;
mod project;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Build { full } => cli::build::run_build(&cli.config, *full),
        Commands::Clean => cli::build::run_clean(&cli.config),
        Commands::Watch => cli::watch::run_watch(&cli.config),
    }
}
