//! Readiness waiter timing and error semantics, on the paused tokio clock.

use std::cell::Cell;
use std::time::Duration;

use anyhow::{Result, anyhow};
use cirrus_cli::application::waiter::wait_until_ready;

#[tokio::test(start_paused = true)]
async fn immediate_success_returns_at_once() {
    let started = tokio::time::Instant::now();
    let value: Result<u32> = wait_until_ready(
        || async { Ok(7) },
        Duration::from_secs(4),
        Duration::from_secs(60),
    )
    .await;
    assert_eq!(value.expect("value"), 7);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn retries_until_probe_succeeds() {
    let attempts = Cell::new(0u32);
    let value: Result<&str> = wait_until_ready(
        || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                if n < 4 {
                    Err(anyhow!("not yet ({n})"))
                } else {
                    Ok("ready")
                }
            }
        },
        Duration::from_secs(4),
        Duration::from_secs(60),
    )
    .await;
    assert_eq!(value.expect("value"), "ready");
    assert_eq!(attempts.get(), 4);
}

#[tokio::test(start_paused = true)]
async fn timeout_returns_the_most_recent_probe_error() {
    let attempts = Cell::new(0u32);
    let started = tokio::time::Instant::now();
    let result: Result<()> = wait_until_ready(
        || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move { Err(anyhow!("blocked on attempt {n}")) }
        },
        Duration::from_secs(3),
        Duration::from_secs(10),
    )
    .await;
    let err = result.expect_err("must time out");
    // The error is the last probe's, not a generic timeout.
    assert_eq!(err.to_string(), format!("blocked on attempt {}", attempts.get()));
    // Bounded by the timeout, give or take one poll interval.
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() <= Duration::from_secs(13));
}

#[tokio::test(start_paused = true)]
async fn probe_is_invoked_immediately_before_any_sleep() {
    let attempts = Cell::new(0u32);
    let _: Result<()> = wait_until_ready(
        || {
            attempts.set(attempts.get() + 1);
            async { Err(anyhow!("no")) }
        },
        Duration::from_secs(3600),
        Duration::ZERO,
    )
    .await;
    assert_eq!(attempts.get(), 1);
}
