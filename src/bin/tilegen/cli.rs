//! CLI definitions using clap.

use std::path::PathBuf;

use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand};

use tilegen::core::target::{BuildMode, Isa, Platform};
use tilegen::ops::OutputFormat;
use tilegen::util::config::BuildSettings;

/// tilegen - build graph generator for tiled many-core systems
#[derive(Parser)]
#[command(name = "tilegen")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(
        short,
        long,
        global = true,
        env = "TILEGEN_VERBOSE",
        value_parser = FalseyValueParser::new()
    )]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the build description
    Generate(GenerateArgs),

    /// Construct and validate the graph without writing it
    Check(CheckArgs),

    /// Print the constructed build environments as JSON
    Env(TargetArgs),
}

/// What to build. Every option can also come from the environment.
#[derive(Args)]
pub struct TargetArgs {
    /// Target platform (gem5, hw, hw22)
    #[arg(long = "target", env = "TILEGEN_TARGET")]
    pub platform: Platform,

    /// Target ISAs (x86_64, arm, riscv), comma-separated
    #[arg(long = "isa", env = "TILEGEN_ISA", value_delimiter = ',', default_value = "x86_64")]
    pub isas: Vec<Isa>,

    /// Build mode (debug, release, coverage)
    #[arg(long = "build", env = "TILEGEN_BUILD")]
    pub mode: BuildMode,

    /// Number of simulated compute tiles
    #[arg(long, env = "TILEGEN_TILES")]
    pub tiles: Option<u32>,

    /// Project root (defaults to current directory)
    #[arg(short = 'C', long = "project-dir", default_value = ".")]
    pub project_dir: PathBuf,
}

impl TargetArgs {
    pub fn settings(&self, verbose: bool) -> BuildSettings {
        let mut settings = BuildSettings::new(self.platform, self.isas.clone(), self.mode);
        settings.tiles = self.tiles;
        settings.verbose = verbose;
        settings
    }
}

#[derive(Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Output format (ninja, json)
    #[arg(long, default_value = "ninja")]
    pub format: OutputFormat,

    /// Write to this file instead of the build directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Do not check the cross compiler version
    #[arg(long)]
    pub skip_toolchain_check: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Do not check the cross compiler version
    #[arg(long)]
    pub skip_toolchain_check: bool,
}
