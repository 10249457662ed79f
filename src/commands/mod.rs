//! Command handlers — one module per subcommand.

pub mod create;
pub mod remove;
pub mod status;

use clap::Args;

/// Arguments for `cirrus create`.
#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Name of the sandbox to create.
    pub name: String,

    /// Machine type backing the sandbox instance.
    #[arg(long)]
    pub machine_type: Option<String>,

    /// Region to provision in (overrides AWS_REGION and the config file).
    #[arg(long)]
    pub region: Option<String>,
}

/// Arguments for `cirrus remove`.
#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Name of the sandbox to remove.
    pub name: String,

    /// Also tear down the cluster's shared network once no sandboxes remain.
    #[arg(long)]
    pub network: bool,

    /// Region to provision in (overrides AWS_REGION and the config file).
    #[arg(long)]
    pub region: Option<String>,
}
