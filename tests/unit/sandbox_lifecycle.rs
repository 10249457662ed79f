//! Sandbox orchestrator: end-to-end creation with bootstrap, rollback,
//! resume, and reverse-order teardown.

use cirrus_cli::application::services::{network, sandbox};
use cirrus_cli::domain::resources::ResourceRole;

use crate::mocks::{CannedRemote, MemoryStore, NullReporter, ScriptedProvider, StaticProbe};

const CLUSTER: &str = "default";
const SANDBOX: &str = "api";
const AGGREGATE_ID: &str = "sandbox-api";

fn good_report() -> String {
    serde_json::json!({
        "exit_code": "0",
        "ssh_host_keys": "ssh-ed25519 AAAAC3Nza",
        "bootstrap_logs": "done",
    })
    .to_string()
}

async fn with_cluster(provider: &ScriptedProvider, store: &MemoryStore) {
    network::create(provider, store, &NullReporter, CLUSTER)
        .await
        .expect("cluster network");
    provider.reset_calls();
}

#[tokio::test(start_paused = true)]
async fn create_provisions_the_whole_environment() {
    let provider = ScriptedProvider::new();
    let store = MemoryStore::new();
    with_cluster(&provider, &store).await;
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: true };

    let handle = sandbox::create(
        &provider,
        &remote,
        &probe,
        &store,
        &NullReporter,
        CLUSTER,
        SANDBOX,
        "t2.medium",
    )
    .await
    .expect("sandbox creation");

    assert_eq!(handle.address, "198.51.100.7");
    assert_eq!(handle.host_keys.len(), 1);
    assert!(handle.private_key_pem.contains("PRIVATE KEY"));

    assert_eq!(
        provider.creation_ops(),
        vec![
            "create-security-group",
            "create-key-pair",
            "allocate-public-address",
            "create-network-interface",
            "create-instance",
        ]
    );

    let state = sandbox::load_state(&store, AGGREGATE_ID)
        .await
        .expect("persisted state");
    let instance = state.instance.expect("instance");
    assert!(instance.bootstrap.is_some());
    assert_eq!(
        instance.boot_address, None,
        "the boot address dies with the public address attachment"
    );
    let address = state.public_address.expect("address");
    assert!(address.attached_to_instance);
    assert!(address.association_id.is_some());
}

#[tokio::test(start_paused = true)]
async fn public_address_attaches_only_after_bootstrap() {
    let provider = ScriptedProvider::new();
    let store = MemoryStore::new();
    with_cluster(&provider, &store).await;
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: true };

    sandbox::create(
        &provider,
        &remote,
        &probe,
        &store,
        &NullReporter,
        CLUSTER,
        SANDBOX,
        "t2.medium",
    )
    .await
    .expect("sandbox creation");

    // The bootstrap report was read over the boot address...
    assert!(
        remote
            .commands
            .borrow()
            .iter()
            .any(|c| c.contains("cirrus-bootstrap-report"))
    );
    // ...and the attachment happened after the instance lookup that follows
    // the running-wait, never before.
    let ops = provider.ops();
    let lookup = ops
        .iter()
        .position(|op| op == "lookup-instance-address")
        .expect("boot address lookup");
    let attach = ops
        .iter()
        .position(|op| op == "attach-public-address")
        .expect("attachment");
    assert!(lookup < attach);
}

#[tokio::test(start_paused = true)]
async fn resumed_create_skips_the_bootstrap_wait() {
    let provider = ScriptedProvider::new();
    let store = MemoryStore::new();
    with_cluster(&provider, &store).await;
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: true };

    sandbox::create(
        &provider, &remote, &probe, &store, &NullReporter, CLUSTER, SANDBOX, "t2.medium",
    )
    .await
    .expect("first run");
    let remote_calls = remote.commands.borrow().len();
    let creations = provider.creation_ops().len();

    sandbox::create(
        &provider, &remote, &probe, &store, &NullReporter, CLUSTER, SANDBOX, "t2.medium",
    )
    .await
    .expect("second run");

    assert_eq!(
        remote.commands.borrow().len(),
        remote_calls,
        "a recorded bootstrap receipt must short-circuit the remote polling"
    );
    assert_eq!(provider.creation_ops().len(), creations);
}

#[tokio::test(start_paused = true)]
async fn instance_stabilization_failure_terminates_the_instance() {
    let provider = ScriptedProvider::new();
    let store = MemoryStore::new();
    with_cluster(&provider, &store).await;
    provider.never_stabilizes("instance-running");
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: true };

    let err = sandbox::create(
        &provider, &remote, &probe, &store, &NullReporter, CLUSTER, SANDBOX, "t2.medium",
    )
    .await
    .expect_err("must fail");
    assert!(err.to_string().contains("has not stabilized yet"));

    let calls = provider.calls.borrow().clone();
    assert!(
        calls.iter().any(|c| c.starts_with("terminate-instance i-")),
        "the unstable instance must be terminated, calls: {calls:?}"
    );

    // Everything before the instance survived in the persisted state; the
    // instance itself is untracked.
    let state = sandbox::load_state(&store, AGGREGATE_ID)
        .await
        .expect("persisted state");
    assert!(state.security_group.is_some());
    assert!(state.key_pair.is_some());
    assert!(state.network_interface.is_some());
    assert!(state.instance.is_none());
}

#[tokio::test(start_paused = true)]
async fn removal_detaches_before_terminating_and_deletes_in_reverse() {
    let provider = ScriptedProvider::new();
    let store = MemoryStore::new();
    with_cluster(&provider, &store).await;
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: true };
    sandbox::create(
        &provider, &remote, &probe, &store, &NullReporter, CLUSTER, SANDBOX, "t2.medium",
    )
    .await
    .expect("sandbox creation");
    provider.reset_calls();

    sandbox::remove(
        &provider, &remote, &probe, &store, &NullReporter, CLUSTER, SANDBOX,
    )
    .await
    .expect("removal");

    let ops = provider.ops();
    let detach = ops
        .iter()
        .position(|op| op == "detach-public-address")
        .expect("detach");
    let terminate = ops
        .iter()
        .position(|op| op == "terminate-instance")
        .expect("terminate");
    assert!(detach < terminate, "detach must precede termination");

    assert_eq!(
        provider.delete_ops(),
        vec![
            "terminate-instance",
            "delete-network-interface",
            "release-public-address",
            "delete-key-pair",
            "delete-security-group",
        ]
    );
    assert!(!store.blobs.borrow().contains_key(AGGREGATE_ID));
}

#[tokio::test(start_paused = true)]
async fn removal_of_a_never_created_sandbox_is_a_no_op() {
    let provider = ScriptedProvider::new();
    let store = MemoryStore::new();
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: true };

    sandbox::remove(
        &provider, &remote, &probe, &store, &NullReporter, CLUSTER, "ghost",
    )
    .await
    .expect("no-op removal");
    assert!(provider.delete_ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn orphaned_key_pair_is_reclaimed_before_recreation() {
    let provider = ScriptedProvider::new();
    let store = MemoryStore::new();
    with_cluster(&provider, &store).await;
    provider.plant_orphan(
        ResourceRole::KeyPair,
        "cirrus-default-api-key-pair",
        "key-orphan",
    );
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: true };

    sandbox::create(
        &provider, &remote, &probe, &store, &NullReporter, CLUSTER, SANDBOX, "t2.medium",
    )
    .await
    .expect("sandbox creation");

    let calls = provider.calls.borrow();
    let reclaim = calls
        .iter()
        .position(|c| c == "delete-key-pair key-orphan")
        .expect("orphan reclaimed");
    let create = calls
        .iter()
        .position(|c| c.starts_with("create-key-pair"))
        .expect("key pair created");
    assert!(reclaim < create);
}

#[tokio::test(start_paused = true)]
async fn create_requires_a_built_cluster_network() {
    let provider = ScriptedProvider::new();
    let store = MemoryStore::new();
    let remote = CannedRemote::with_report(&good_report());
    let probe = StaticProbe { open: true };

    let err = sandbox::create(
        &provider, &remote, &probe, &store, &NullReporter, CLUSTER, SANDBOX, "t2.medium",
    )
    .await
    .expect_err("must fail without a network");
    assert!(err.to_string().contains("cluster network"));
    assert!(provider.creation_ops().is_empty());
}
