//! `cirrus create <name>` — provision a sandbox, building the cluster's
//! shared network first if it doesn't exist yet.

use anyhow::Result;

use crate::application::ports::ProgressReporter;
use crate::application::services::{account, network, sandbox};
use crate::commands::CreateArgs;
use crate::domain::config::{
    DEFAULT_CLUSTER, DEFAULT_MACHINE_TYPE, SANDBOX_SSH_PORT, validate_sandbox_name,
};
use crate::infra::cloud::CloudCliProvider;
use crate::infra::env::ProcessEnvVars;
use crate::infra::network::TokioTcpProbe;
use crate::infra::remote::SshExec;
use crate::infra::state::FileStateStore;
use crate::infra;
use crate::output::TerminalReporter;

/// Run `cirrus create <name>`.
///
/// # Errors
///
/// Returns an error if the name or account configuration is invalid, or if
/// provisioning fails. A provisioning failure leaves persisted partial
/// state behind; re-running the command resumes from it.
pub async fn run(args: &CreateArgs, quiet: bool) -> Result<()> {
    validate_sandbox_name(&args.name)?;

    let user_config = infra::fs::load_user_config()?;
    let account = account::resolve_account(
        &ProcessEnvVars,
        args.region.as_deref().or(user_config.region.as_deref()),
    )?;
    let cluster = user_config.cluster.as_deref().unwrap_or(DEFAULT_CLUSTER);
    let machine_type = args
        .machine_type
        .as_deref()
        .or(user_config.machine_type.as_deref())
        .unwrap_or(DEFAULT_MACHINE_TYPE);

    let provider = CloudCliProvider::new(&account);
    let remote = SshExec::new();
    let probe = TokioTcpProbe;
    let store = FileStateStore::new()?;
    let reporter = TerminalReporter::new(quiet);

    // Fail on a bad machine type before anything is created.
    sandbox::check_machine_type(&provider, machine_type, &account.region).await?;

    network::create(&provider, &store, &reporter, cluster).await?;
    let handle = sandbox::create(
        &provider,
        &remote,
        &probe,
        &store,
        &reporter,
        cluster,
        &args.name,
        machine_type,
    )
    .await?;

    let identity = infra::fs::write_identity_file(&args.name, &handle.private_key_pem)?;
    infra::fs::record_known_host(&handle.address, SANDBOX_SSH_PORT, &handle.host_keys)?;

    reporter.success(&format!("Sandbox '{}' is ready.", args.name));
    if !quiet {
        println!();
        println!(
            "Connect: ssh -i {} -p {SANDBOX_SSH_PORT} {}@{}",
            identity.display(),
            crate::domain::config::LOGIN_USER,
            handle.address,
        );
    }
    Ok(())
}
