//! `cirrus status` — show the persisted state of every aggregate.
//!
//! Reads only the local state store; no account or provider access.

use anyhow::Result;
use owo_colors::OwoColorize as _;

use crate::application::ports::StateStore;
use crate::application::services::{network, sandbox};
use crate::infra::state::FileStateStore;

/// Run `cirrus status`.
///
/// # Errors
///
/// Returns an error if the state store cannot be read.
pub async fn run() -> Result<()> {
    let store = FileStateStore::new()?;
    let ids = store.list().await?;
    if ids.is_empty() {
        println!("Nothing provisioned. Create a sandbox: cirrus create <name>");
        return Ok(());
    }

    for id in ids {
        if let Some(cluster) = id.strip_prefix("network-") {
            let state = network::load_state(&store, &id).await?;
            println!("{} {}", "network".cyan(), cluster.bold());
            print_slot("network", state.network.as_ref().map(|r| r.id.clone()));
            print_slot("gateway", state.gateway.as_ref().map(|r| r.id.clone()));
            print_slot("subnet", state.subnet.as_ref().map(|r| r.id.clone()));
            print_slot(
                "route table",
                state.route_table.as_ref().map(|r| r.id.clone()),
            );
        } else if let Some(name) = id.strip_prefix("sandbox-") {
            let state = sandbox::load_state(&store, &id).await?;
            println!("{} {}", "sandbox".cyan(), name.bold());
            print_slot("instance", state.instance.as_ref().map(|r| r.id.clone()));
            print_slot(
                "address",
                state.public_address.as_ref().and_then(|a| {
                    a.attached_to_instance.then(|| a.address.clone())
                }),
            );
            print_slot(
                "security group",
                state.security_group.as_ref().map(|r| r.id.clone()),
            );
        }
    }
    Ok(())
}

fn print_slot(label: &str, value: Option<String>) {
    match value {
        Some(value) => println!("  {} {label}: {value}", "✓".green()),
        None => println!("  {} {label}: not created", "–".dimmed()),
    }
}
