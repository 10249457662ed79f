//! Cloud account configuration and its resolution errors.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! The resolution itself lives in `application::services::account`, reading
//! through the `EnvVars` port so it can be tested without touching the real
//! environment.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Environment variable holding the account access key id.
pub const ACCESS_KEY_ENV_VAR: &str = "AWS_ACCESS_KEY_ID";

/// Environment variable holding the secret associated with the access key.
pub const SECRET_KEY_ENV_VAR: &str = "AWS_SECRET_ACCESS_KEY";

/// Environment variable holding the account region.
pub const REGION_ENV_VAR: &str = "AWS_REGION";

/// The credentials resolved for the cloud account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Credentials {
    /// True when both halves of the key set are present.
    #[must_use]
    pub fn has_keys(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }
}

/// The fully resolved account configuration consumed once per orchestrator
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub credentials: Credentials,
    pub region: String,
}

/// Errors raised while resolving the cloud account from the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("{SECRET_KEY_ENV_VAR} is set but {ACCESS_KEY_ENV_VAR} is missing.")]
    MissingAccessKey,

    #[error("{ACCESS_KEY_ENV_VAR} is set but {SECRET_KEY_ENV_VAR} is missing.")]
    MissingSecret,

    #[error(
        "No region configured. Set {REGION_ENV_VAR}, pass --region or add one to ~/.cirrus/config.yml."
    )]
    MissingRegion,

    #[error("No cloud account configured. Set {ACCESS_KEY_ENV_VAR} and {SECRET_KEY_ENV_VAR}.")]
    MissingConfig,

    #[error("'{0}' does not look like a region (expected something like \"eu-west-3\").")]
    InvalidRegion(String),
}

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
static REGION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2,3}(-[a-z]+)+-\d$").expect("valid regex"));

/// Validate the shape of a region name. The provider remains authoritative
/// on whether the region actually exists.
///
/// # Errors
///
/// Returns [`AccountError::InvalidRegion`] if the shape is off.
pub fn validate_region(region: &str) -> Result<(), AccountError> {
    if REGION_RE.is_match(region) {
        Ok(())
    } else {
        Err(AccountError::InvalidRegion(region.to_string()))
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
