//! Bounded polling until an external condition holds.

use std::time::Duration;

use anyhow::Result;

/// Poll `probe` until it succeeds or `timeout` has elapsed since the call
/// began. The probe is invoked immediately, then every `poll_interval`.
///
/// On timeout the MOST RECENT probe error is returned, not a generic timeout
/// error, so diagnostics reflect the real blocking condition. The probe must
/// be safe to call repeatedly with no side effects beyond observation.
///
/// There is no cancellation channel beyond the deadline; callers needing to
/// cancel earlier should do so between polls at a higher level.
///
/// # Errors
///
/// Returns the last probe error once the deadline has passed.
pub async fn wait_until_ready<T, F, Fut>(
    mut probe: F,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_error;
    loop {
        match probe().await {
            Ok(value) => return Ok(value),
            Err(err) => last_error = err,
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(last_error);
        }
        tokio::time::sleep(poll_interval).await;
    }
}
