//! The two-phase bootstrap readiness protocol.
//!
//! Once a compute instance exists, "ready" still means three different
//! things: the control plane reports it running, its address accepts
//! connections, and its bootstrap script has finished. This module bridges
//! the last two: Phase A waits for the administrative port to accept a TCP
//! connection (best-effort — Phase B's own timeout is authoritative), then
//! Phase B polls for the bootstrap report over the remote execution channel
//! and classifies it.

use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::application::ports::{RemoteExec, TcpProbe};
use crate::application::waiter::wait_until_ready;
use crate::domain::bootstrap::{
    BOOTSTRAP_LOG_PATH, BootstrapError, BootstrapReceipt, REPORT_PATH, classify_report,
};

/// How often each phase re-probes the instance.
pub const POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Upper bound of each phase, measured from its start.
pub const PHASE_TIMEOUT: Duration = Duration::from_secs(240);

/// Where and how to reach the instance being awaited.
pub struct InstanceEndpoint<'a> {
    pub host: &'a str,
    pub port: u16,
    pub user: &'a str,
    pub private_key_pem: &'a str,
}

/// Wait for the instance to finish bootstrapping and return the parsed
/// receipt.
///
/// # Errors
///
/// Returns a [`BootstrapError`]: `Report`/`Script`/`HostKeys` as soon as a
/// readable artifact classifies as such (a malformed artifact will not fix
/// itself, so polling stops immediately), or `Timeout` — enriched with a
/// best-effort fetch of the remote bootstrap log — when the report never
/// becomes readable in time.
pub async fn await_bootstrap(
    remote: &impl RemoteExec,
    probe: &impl TcpProbe,
    endpoint: &InstanceEndpoint<'_>,
) -> Result<BootstrapReceipt> {
    // Phase A. The instance may still be acquiring its address; an
    // unreachable port here is not yet a failure.
    let _ = await_reachable(probe, endpoint.host, endpoint.port).await;

    // Phase B. The channel failing to open or the report not existing yet
    // both read as "not ready"; only a readable artifact settles the outcome.
    let read_command = format!("cat {REPORT_PATH}");
    let read_report = wait_until_ready(
        || run_remote(remote, endpoint, &read_command),
        POLL_INTERVAL,
        PHASE_TIMEOUT,
    )
    .await;

    match read_report {
        Ok(raw) => Ok(classify_report(&raw)?),
        Err(last) => {
            let log = fetch_bootstrap_log(remote, endpoint).await;
            Err(BootstrapError::Timeout {
                last: format!("{last:#}"),
                log,
            }
            .into())
        }
    }
}

/// Wait until `host:port` accepts a TCP connection.
///
/// # Errors
///
/// Returns the last connection error once the deadline passes.
pub async fn await_reachable(probe: &impl TcpProbe, host: &str, port: u16) -> Result<()> {
    wait_until_ready(
        || async move {
            match probe.check_tcp(host, port).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(anyhow!("{host}:{port} is not accepting connections")),
                Err(err) => Err(err),
            }
        },
        POLL_INTERVAL,
        PHASE_TIMEOUT,
    )
    .await
}

/// Best-effort fetch of the remote bootstrap log to enrich a timeout error.
/// Fetch failures are folded into a placeholder rather than propagated; the
/// timeout is the error worth surfacing.
async fn fetch_bootstrap_log(remote: &impl RemoteExec, endpoint: &InstanceEndpoint<'_>) -> String {
    match run_remote(remote, endpoint, &format!("sudo cat {BOOTSTRAP_LOG_PATH}")).await {
        Ok(log) => log,
        Err(err) => format!("<bootstrap log unavailable> ({err:#})"),
    }
}

async fn run_remote(
    remote: &impl RemoteExec,
    endpoint: &InstanceEndpoint<'_>,
    command: &str,
) -> Result<String> {
    remote
        .run_command(
            endpoint.host,
            endpoint.port,
            endpoint.user,
            endpoint.private_key_pem,
            command,
        )
        .await
}
