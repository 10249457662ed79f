//! File-backed state store and process environment adapter.

use cirrus_cli::application::ports::{EnvVars, StateStore};
use cirrus_cli::infra::env::ProcessEnvVars;
use cirrus_cli::infra::state::FileStateStore;

#[tokio::test]
async fn save_load_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStateStore::with_dir(dir.path().to_path_buf());

    assert_eq!(store.load("network-default").await.expect("load"), None);
    store
        .save("network-default", r#"{"network":{"id":"net-1"}}"#)
        .await
        .expect("save");
    assert_eq!(
        store.load("network-default").await.expect("load"),
        Some(r#"{"network":{"id":"net-1"}}"#.to_string())
    );
}

#[tokio::test]
async fn save_overwrites_atomically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStateStore::with_dir(dir.path().to_path_buf());
    store.save("sandbox-api", "one").await.expect("save");
    store.save("sandbox-api", "two").await.expect("save");
    assert_eq!(
        store.load("sandbox-api").await.expect("load"),
        Some("two".to_string())
    );
    // No leftover temp file.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn clear_forgets_the_aggregate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStateStore::with_dir(dir.path().to_path_buf());
    store.save("sandbox-api", "blob").await.expect("save");
    store.clear("sandbox-api").await.expect("clear");
    assert_eq!(store.load("sandbox-api").await.expect("load"), None);
    // Clearing twice is fine.
    store.clear("sandbox-api").await.expect("clear again");
}

#[tokio::test]
async fn list_returns_sorted_aggregate_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStateStore::with_dir(dir.path().to_path_buf());
    assert!(store.list().await.expect("list").is_empty());
    store.save("sandbox-b", "x").await.expect("save");
    store.save("network-default", "x").await.expect("save");
    store.save("sandbox-a", "x").await.expect("save");
    assert_eq!(
        store.list().await.expect("list"),
        vec!["network-default", "sandbox-a", "sandbox-b"]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn state_files_are_owner_readable_only() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileStateStore::with_dir(dir.path().to_path_buf());
    store.save("sandbox-api", "blob").await.expect("save");
    let mode = std::fs::metadata(dir.path().join("sandbox-api.json"))
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn process_env_vars_reads_the_real_environment() {
    // PATH is present in any environment the tests run in; the other name
    // is never set. Mutating the process environment is off the table here
    // (unsafe in this edition), so presence and absence are asserted with
    // what the environment already provides.
    assert!(ProcessEnvVars.get("PATH").is_some());
    assert_eq!(ProcessEnvVars.get("CIRRUS_SURELY_UNSET_VARIABLE"), None);
}
