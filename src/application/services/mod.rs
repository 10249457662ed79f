//! Application services — the lifecycle orchestrators.
//!
//! Imports only from `crate::domain` and `crate::application`. All I/O is
//! routed through injected port traits.

pub mod account;
pub mod network;
pub mod sandbox;

use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::application::waiter::wait_until_ready;

/// How often a provider stabilization probe is retried.
pub(crate) const STABILIZE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound for a freshly created resource to reach a stable state.
pub(crate) const STABILIZE_TIMEOUT: Duration = Duration::from_secs(300);

/// Wait until `probe` reports the resource stable.
///
/// # Errors
///
/// On timeout, the last probe failure — a provider error, or a "not yet
/// stable" observation for `what` — is returned.
pub(crate) async fn wait_stable<F, Fut>(what: &str, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    wait_until_ready(
        || {
            let attempt = probe();
            async move {
                match attempt.await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(anyhow!("{what} has not stabilized yet")),
                    Err(err) => Err(err),
                }
            }
        },
        STABILIZE_POLL_INTERVAL,
        STABILIZE_TIMEOUT,
    )
    .await
}

/// Read a slot that earlier actions are guaranteed to have filled.
///
/// # Errors
///
/// Returns an error naming `what` if the slot is empty — persisted state
/// and the saga's stage order disagree.
pub(crate) fn require<'a, T>(slot: &'a Option<T>, what: &str) -> Result<&'a T> {
    slot.as_ref()
        .ok_or_else(|| anyhow!("infrastructure state is missing its {what} record"))
}

/// Mutable variant of [`require`].
pub(crate) fn require_mut<'a, T>(slot: &'a mut Option<T>, what: &str) -> Result<&'a mut T> {
    slot.as_mut()
        .ok_or_else(|| anyhow!("infrastructure state is missing its {what} record"))
}
