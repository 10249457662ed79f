//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

// ── State errors ──────────────────────────────────────────────────────────────

/// Errors raised when persisted infrastructure state cannot be interpreted.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("persisted state does not match the expected schema: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("infrastructure state could not be serialized: {0}")]
    Unserializable(#[source] serde_json::Error),
}

// ── Naming errors ─────────────────────────────────────────────────────────────

/// Errors related to sandbox and cluster naming.
#[derive(Debug, Error)]
pub enum NameError {
    #[error("Invalid sandbox name '{0}': must match ^[a-z0-9]([a-z0-9-]{{0,61}}[a-z0-9])?$")]
    InvalidSandboxName(String),

    #[error("Invalid cluster name '{0}': must match ^[a-z0-9]([a-z0-9-]{{0,61}}[a-z0-9])?$")]
    InvalidClusterName(String),
}

// ── Machine type errors ───────────────────────────────────────────────────────

/// Errors raised while resolving the machine type for a sandbox.
#[derive(Debug, Error)]
pub enum MachineTypeError {
    #[error("Machine type '{machine_type}' does not exist in region '{region}'.")]
    Unknown {
        machine_type: String,
        region: String,
    },

    #[error(
        "Machine type '{machine_type}' runs on an unsupported architecture (supported: {supported})."
    )]
    UnsupportedArch {
        machine_type: String,
        supported: String,
    },
}
