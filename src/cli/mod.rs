pub mod app;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gitkeeper")]
#[command(about = "Background maintenance host for a git object cache")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run maintenance until interrupted or a fatal error occurs
    Run {
        #[command(flatten)]
        target: TargetArgs,
        /// JSON file with configuration overrides
        #[arg(long)]
        config: Option<PathBuf>,
        /// Run each step once and exit
        #[arg(long)]
        once: bool,
    },
    /// Print pack inventory and last-run times as JSON
    Stats {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Repository working tree
    #[arg(long)]
    pub repo: PathBuf,
    /// Shared object cache directory
    #[arg(long)]
    pub object_cache: PathBuf,
}
