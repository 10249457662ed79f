//! Account resolution — turning environment variables into a validated
//! account configuration.
//!
//! Resolution happens once per command, before any orchestrator is built.
//! Partial configurations return an adequate error rather than limping on.

use crate::application::ports::EnvVars;
use crate::domain::account::{
    ACCESS_KEY_ENV_VAR, AccountConfig, AccountError, Credentials, REGION_ENV_VAR,
    SECRET_KEY_ENV_VAR, validate_region,
};

/// Resolve the cloud account from the environment.
///
/// `region_override` (a flag or config-file value) takes precedence over the
/// region environment variable.
///
/// # Errors
///
/// Returns an [`AccountError`] describing exactly which half of the
/// configuration is missing or malformed.
pub fn resolve_account(
    env: &impl EnvVars,
    region_override: Option<&str>,
) -> Result<AccountConfig, AccountError> {
    let credentials = Credentials {
        access_key_id: env.get(ACCESS_KEY_ENV_VAR).unwrap_or_default(),
        secret_access_key: env.get(SECRET_KEY_ENV_VAR).unwrap_or_default(),
    };
    let region = region_override
        .map(str::to_owned)
        .or_else(|| env.get(REGION_ENV_VAR))
        .unwrap_or_default();

    if credentials.has_keys() {
        if region.is_empty() {
            return Err(AccountError::MissingRegion);
        }
        validate_region(&region)?;
        return Ok(AccountConfig {
            credentials,
            region,
        });
    }

    if credentials.access_key_id.is_empty() && !credentials.secret_access_key.is_empty() {
        return Err(AccountError::MissingAccessKey);
    }
    if !credentials.access_key_id.is_empty() && credentials.secret_access_key.is_empty() {
        return Err(AccountError::MissingSecret);
    }
    Err(AccountError::MissingConfig)
}
