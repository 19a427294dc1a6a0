//! tilegen CLI - build graph generator for tiled many-core systems

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("tilegen=debug")
    } else {
        EnvFilter::new("tilegen=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Generate(args) => commands::generate::execute(args, cli.verbose),
        Commands::Check(args) => commands::check::execute(args, cli.verbose),
        Commands::Env(args) => commands::env::execute(args, cli.verbose),
    }
}
