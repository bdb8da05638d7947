//! Kiln - an incremental build pipeline with dev-server orchestration.

#![allow(dead_code)]

mod bundler;
mod cache;
mod channel;
mod cli;
mod config;
mod error;
mod hash;
mod logger;
mod manifest;
mod paths;
mod pipeline;
mod session;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::{ProjectConfig, init_config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = init_config(ProjectConfig::load(&cli.config)?);

    match &cli.command {
        Commands::Build { build_args } => cli::build::run_build(config, build_args),
        Commands::Watch { build_args } => cli::watch::run_watch(config, build_args),
    }
}
