//! Account resolution from environment variables.

use cirrus_cli::application::services::account::resolve_account;
use cirrus_cli::domain::account::AccountError;

use crate::mocks::MapEnv;

#[test]
fn full_environment_resolves() {
    let env = MapEnv::new(&[
        ("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE"),
        ("AWS_SECRET_ACCESS_KEY", "s3cret"),
        ("AWS_REGION", "eu-west-3"),
    ]);
    let account = resolve_account(&env, None).expect("account");
    assert_eq!(account.credentials.access_key_id, "AKIAEXAMPLE");
    assert_eq!(account.region, "eu-west-3");
}

#[test]
fn region_override_wins_over_the_environment() {
    let env = MapEnv::new(&[
        ("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE"),
        ("AWS_SECRET_ACCESS_KEY", "s3cret"),
        ("AWS_REGION", "eu-west-3"),
    ]);
    let account = resolve_account(&env, Some("us-east-1")).expect("account");
    assert_eq!(account.region, "us-east-1");
}

#[test]
fn keys_without_region_is_missing_region() {
    let env = MapEnv::new(&[
        ("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE"),
        ("AWS_SECRET_ACCESS_KEY", "s3cret"),
    ]);
    assert_eq!(
        resolve_account(&env, None).expect_err("error"),
        AccountError::MissingRegion
    );
}

#[test]
fn secret_without_access_key_is_missing_access_key() {
    let env = MapEnv::new(&[("AWS_SECRET_ACCESS_KEY", "s3cret")]);
    assert_eq!(
        resolve_account(&env, None).expect_err("error"),
        AccountError::MissingAccessKey
    );
}

#[test]
fn access_key_without_secret_is_missing_secret() {
    let env = MapEnv::new(&[("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE")]);
    assert_eq!(
        resolve_account(&env, None).expect_err("error"),
        AccountError::MissingSecret
    );
}

#[test]
fn empty_environment_is_missing_config() {
    let env = MapEnv::new(&[]);
    assert_eq!(
        resolve_account(&env, None).expect_err("error"),
        AccountError::MissingConfig
    );
}

#[test]
fn malformed_region_is_rejected() {
    let env = MapEnv::new(&[
        ("AWS_ACCESS_KEY_ID", "AKIAEXAMPLE"),
        ("AWS_SECRET_ACCESS_KEY", "s3cret"),
        ("AWS_REGION", "Paris"),
    ]);
    assert_eq!(
        resolve_account(&env, None).expect_err("error"),
        AccountError::InvalidRegion("Paris".to_string())
    );
}

#[test]
fn empty_variables_read_as_unset() {
    let env = MapEnv::new(&[
        ("AWS_ACCESS_KEY_ID", ""),
        ("AWS_SECRET_ACCESS_KEY", "s3cret"),
    ]);
    assert_eq!(
        resolve_account(&env, None).expect_err("error"),
        AccountError::MissingAccessKey
    );
}
