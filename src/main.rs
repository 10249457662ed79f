//! Cirrus CLI - Ephemeral cloud sandboxes for development teams

use clap::Parser;

use cirrus_cli::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
