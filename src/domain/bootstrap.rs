//! Bootstrap report parsing and classification.
//!
//! A freshly created instance runs an embedded bootstrap script on first
//! boot and writes a small JSON report to a well-known path. Reading and
//! classifying that report is how the orchestrator decides whether the
//! instance actually finished booting, failed its setup, or produced
//! something unreadable.
//!
//! This module is intentionally free of I/O, async, and external layer imports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path of the report the bootstrap script writes on the instance.
pub const REPORT_PATH: &str = "/tmp/cirrus-bootstrap-report";

/// Path of the full bootstrap log on the instance.
pub const BOOTSTRAP_LOG_PATH: &str = "/var/log/cloud-init-output.log";

/// The report artifact exactly as written by the bootstrap script.
#[derive(Debug, Deserialize)]
pub struct RawBootstrapReport {
    pub exit_code: String,
    pub ssh_host_keys: String,
    pub bootstrap_logs: String,
}

/// One SSH host key published by the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostKey {
    pub algorithm: String,
    pub material: String,
}

/// The parsed outcome of a successful bootstrap, kept in the sandbox state
/// so re-runs skip the wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReceipt {
    pub host_keys: Vec<HostKey>,
}

/// Bootstrap failures, each carrying the diagnostic text an operator needs.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("The instance bootstrap report is not valid JSON.\n--- report ---\n{raw}")]
    Report { raw: String },

    #[error("The instance bootstrap script exited with code \"{code}\".\n--- bootstrap log ---\n{log}")]
    Script { code: String, log: String },

    #[error("The instance bootstrap report carries invalid host keys.\n--- host keys ---\n{raw}")]
    HostKeys { raw: String },

    #[error("Timed out waiting for the instance bootstrap to finish ({last}).\n--- bootstrap log ---\n{log}")]
    Timeout { last: String, log: String },
}

/// Classify a report artifact read from the instance.
///
/// A report that fails to parse, reports a non-zero exit code, or carries
/// host keys that do not parse is a terminal failure: the artifact will not
/// change on a retry, so the caller must stop polling.
///
/// # Errors
///
/// Returns the matching [`BootstrapError`] variant with diagnostic text.
pub fn classify_report(raw: &str) -> Result<BootstrapReceipt, BootstrapError> {
    let report: RawBootstrapReport =
        serde_json::from_str(raw).map_err(|_| BootstrapError::Report {
            raw: raw.to_string(),
        })?;

    if report.exit_code != "0" {
        return Err(BootstrapError::Script {
            code: report.exit_code,
            log: report.bootstrap_logs,
        });
    }

    let host_keys = parse_host_keys(&report.ssh_host_keys).ok_or(BootstrapError::HostKeys {
        raw: report.ssh_host_keys,
    })?;

    Ok(BootstrapReceipt { host_keys })
}

/// Parse host keys as published by the bootstrap script: one key per line in
/// the `<algorithm> <base64-material>` form. At least one key is required.
#[must_use]
pub fn parse_host_keys(text: &str) -> Option<Vec<HostKey>> {
    let mut keys = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let algorithm = parts.next()?;
        let material = parts.next()?;
        if !(algorithm.starts_with("ssh-") || algorithm.starts_with("ecdsa-")) {
            return None;
        }
        keys.push(HostKey {
            algorithm: algorithm.to_string(),
            material: material.to_string(),
        });
    }
    if keys.is_empty() { None } else { Some(keys) }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
