//! CLI command definitions and dispatch.

mod pull;
mod version;

use clap::{Parser, Subcommand};

/// ECI - Edge Container Image tool.
#[derive(Parser)]
#[command(name = "eci", version, about)]
pub struct Cli {
    /// Debug output
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Pull an ECI from a registry to a local directory
    Pull(pull::PullArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Pull(args) => pull::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
