//! Bootstrap readiness protocol classification and timeout enrichment.

use cirrus_cli::application::bootstrap::{InstanceEndpoint, await_bootstrap};
use cirrus_cli::domain::bootstrap::BootstrapError;

use crate::mocks::{CannedRemote, StaticProbe};

const ENDPOINT_HOST: &str = "203.0.113.9";

fn endpoint<'a>() -> InstanceEndpoint<'a> {
    InstanceEndpoint {
        host: ENDPOINT_HOST,
        port: 22,
        user: "ubuntu",
        private_key_pem: "PEM",
    }
}

fn good_report() -> String {
    serde_json::json!({
        "exit_code": "0",
        "ssh_host_keys": "ssh-ed25519 AAAAC3Nza",
        "bootstrap_logs": "done",
    })
    .to_string()
}

#[tokio::test(start_paused = true)]
async fn successful_bootstrap_returns_host_keys() {
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: true };
    let receipt = await_bootstrap(&remote, &probe, &endpoint())
        .await
        .expect("receipt");
    assert_eq!(receipt.host_keys.len(), 1);
    assert_eq!(receipt.host_keys[0].algorithm, "ssh-ed25519");
    // One report read, no log fetch.
    let commands = remote.commands.borrow();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].contains("cirrus-bootstrap-report"));
}

#[tokio::test(start_paused = true)]
async fn unparsable_report_fails_immediately_with_raw_text() {
    let remote = CannedRemote::with_report("boot still in progress");
    let probe = StaticProbe { open: true };
    let err = await_bootstrap(&remote, &probe, &endpoint())
        .await
        .expect_err("must fail");
    match err.downcast::<BootstrapError>().expect("typed error") {
        BootstrapError::Report { raw } => assert_eq!(raw, "boot still in progress"),
        other => panic!("expected Report error, got {other:?}"),
    }
    // A malformed artifact will not fix itself: exactly one read, no retries.
    assert_eq!(remote.commands.borrow().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn script_failure_carries_the_bootstrap_log() {
    let report = serde_json::json!({
        "exit_code": "1",
        "ssh_host_keys": "",
        "bootstrap_logs": "E: Unable to locate package",
    })
    .to_string();
    let remote = CannedRemote::with_report(&report);
    let probe = StaticProbe { open: true };
    let err = await_bootstrap(&remote, &probe, &endpoint())
        .await
        .expect_err("must fail");
    match err.downcast::<BootstrapError>().expect("typed error") {
        BootstrapError::Script { code, log } => {
            assert_eq!(code, "1");
            assert!(log.contains("Unable to locate package"));
        }
        other => panic!("expected Script error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_fetches_the_remote_log_best_effort() {
    let remote = CannedRemote::unreachable(Some("cloud-init tail"));
    let probe = StaticProbe { open: true };
    let err = await_bootstrap(&remote, &probe, &endpoint())
        .await
        .expect_err("must time out");
    match err.downcast::<BootstrapError>().expect("typed error") {
        BootstrapError::Timeout { last, log } => {
            assert!(last.contains("connection refused"));
            assert_eq!(log, "cloud-init tail");
        }
        other => panic!("expected Timeout error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_with_unfetchable_log_uses_a_placeholder() {
    let remote = CannedRemote::unreachable(None);
    let probe = StaticProbe { open: true };
    let err = await_bootstrap(&remote, &probe, &endpoint())
        .await
        .expect_err("must time out");
    match err.downcast::<BootstrapError>().expect("typed error") {
        BootstrapError::Timeout { log, .. } => {
            assert!(log.contains("<bootstrap log unavailable>"));
        }
        other => panic!("expected Timeout error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_admin_port_does_not_fail_the_protocol() {
    // Phase A times out quietly; Phase B still reads the report.
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: false };
    let receipt = await_bootstrap(&remote, &probe, &endpoint())
        .await
        .expect("receipt despite closed port");
    assert_eq!(receipt.host_keys.len(), 1);
}
