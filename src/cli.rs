//! Command-line interface definition and dispatch.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, CreateArgs, RemoveArgs};

/// Cirrus — ephemeral cloud sandboxes for development teams.
#[derive(Debug, Parser)]
#[command(name = "cirrus", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Suppress non-error output.
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a sandbox, building the cluster network first if needed.
    Create(CreateArgs),
    /// Remove a sandbox, and optionally the cluster network.
    Remove(RemoveArgs),
    /// Show what is currently provisioned.
    Status,
}

impl Cli {
    /// Dispatch the parsed command.
    ///
    /// # Errors
    ///
    /// Propagates the command handler's error.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Create(args) => commands::create::run(&args, self.quiet).await,
            Command::Remove(args) => commands::remove::run(&args, self.quiet).await,
            Command::Status => commands::status::run().await,
        }
    }
}
