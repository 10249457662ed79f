//! `cirrus remove <name> [--network]` — tear down a sandbox, and optionally
//! the cluster's shared network once it is the last one.

use anyhow::Result;

use crate::application::ports::{ProgressReporter, StateStore};
use crate::application::services::{account, network, sandbox};
use crate::commands::RemoveArgs;
use crate::domain::config::{DEFAULT_CLUSTER, validate_sandbox_name};
use crate::infra::cloud::CloudCliProvider;
use crate::infra::env::ProcessEnvVars;
use crate::infra::network::TokioTcpProbe;
use crate::infra::remote::SshExec;
use crate::infra::state::FileStateStore;
use crate::infra;
use crate::output::TerminalReporter;

/// Run `cirrus remove <name> [--network]`.
///
/// # Errors
///
/// Returns an error if the teardown fails. A teardown failure leaves
/// persisted partial state behind; re-running the command resumes from it.
pub async fn run(args: &RemoveArgs, quiet: bool) -> Result<()> {
    validate_sandbox_name(&args.name)?;

    let user_config = infra::fs::load_user_config()?;
    let account = account::resolve_account(
        &ProcessEnvVars,
        args.region.as_deref().or(user_config.region.as_deref()),
    )?;
    let cluster = user_config.cluster.as_deref().unwrap_or(DEFAULT_CLUSTER);

    let provider = CloudCliProvider::new(&account);
    let remote = SshExec::new();
    let probe = TokioTcpProbe;
    let store = FileStateStore::new()?;
    let reporter = TerminalReporter::new(quiet);

    sandbox::remove(
        &provider, &remote, &probe, &store, &reporter, cluster, &args.name,
    )
    .await?;
    infra::fs::remove_identity_file(&args.name)?;
    reporter.success(&format!("Sandbox '{}' removed.", args.name));

    if args.network {
        let remaining: Vec<String> = store
            .list()
            .await?
            .into_iter()
            .filter(|id| id.starts_with("sandbox-"))
            .collect();
        if remaining.is_empty() {
            network::remove(&provider, &store, &reporter, cluster).await?;
            reporter.success("Cluster network removed.");
        } else {
            reporter.warn(&format!(
                "Keeping the cluster network: {} sandbox(es) still use it.",
                remaining.len()
            ));
        }
    }
    Ok(())
}
