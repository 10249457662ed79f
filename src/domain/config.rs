//! Provisioning defaults, deterministic resource naming, and the optional
//! user config file.
//!
//! This module is intentionally free of I/O, async, and external layer imports.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::domain::error::NameError;
use crate::domain::resources::{IngressRule, ResourceRole};

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Cluster used when none is configured. One shared network per cluster.
pub const DEFAULT_CLUSTER: &str = "default";

/// Machine type used when none is configured.
pub const DEFAULT_MACHINE_TYPE: &str = "t2.medium";

/// Address block of the cluster network.
pub const NETWORK_CIDR: &str = "10.0.0.0/16";

/// Address block of the public subnet.
pub const SUBNET_CIDR: &str = "10.0.0.0/24";

/// Administrative SSH port the image boots with; used by the bootstrap wait.
pub const ADMIN_PORT: u16 = 22;

/// SSH port of the sandbox agent installed by the bootstrap script.
pub const SANDBOX_SSH_PORT: u16 = 2200;

/// Login user of the boot image.
pub const LOGIN_USER: &str = "ubuntu";

/// Root volume size of a sandbox instance, in gigabytes.
pub const ROOT_VOLUME_SIZE_GB: u32 = 16;

/// Inbound rules opened on every sandbox security group: administrative SSH,
/// the sandbox agent's SSH, and plain/TLS HTTP.
#[must_use]
pub fn sandbox_ingress_rules() -> Vec<IngressRule> {
    vec![
        IngressRule::tcp(ADMIN_PORT),
        IngressRule::tcp(SANDBOX_SSH_PORT),
        IngressRule::tcp(80),
        IngressRule::tcp(443),
    ]
}

// ── Names ─────────────────────────────────────────────────────────────────────

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex"));

/// Validate a sandbox name.
///
/// # Errors
///
/// Returns [`NameError::InvalidSandboxName`] if the name doesn't match the
/// expected format.
pub fn validate_sandbox_name(name: &str) -> Result<(), NameError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(NameError::InvalidSandboxName(name.to_string()))
    }
}

/// Validate a cluster name.
///
/// # Errors
///
/// Returns [`NameError::InvalidClusterName`] if the name doesn't match the
/// expected format.
pub fn validate_cluster_name(name: &str) -> Result<(), NameError> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(NameError::InvalidClusterName(name.to_string()))
    }
}

/// Deterministic resource names for one aggregate.
///
/// Every resource is created under `cirrus-<cluster>[-<sandbox>]-<role>`.
/// Names never change between runs of the same aggregate, which is what
/// makes orphan lookup after a crash possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    prefix: String,
}

impl ResourceNames {
    /// Names for a cluster's shared network resources.
    #[must_use]
    pub fn for_cluster(cluster: &str) -> Self {
        Self {
            prefix: format!("cirrus-{cluster}"),
        }
    }

    /// Names for a single sandbox's resources.
    #[must_use]
    pub fn for_sandbox(cluster: &str, sandbox: &str) -> Self {
        Self {
            prefix: format!("cirrus-{cluster}-{sandbox}"),
        }
    }

    /// The full name of the resource playing `role` in this aggregate.
    #[must_use]
    pub fn resource(&self, role: ResourceRole) -> String {
        format!("{}-{}", self.prefix, role.slug())
    }
}

/// State-store key of a cluster's network aggregate.
#[must_use]
pub fn network_aggregate_id(cluster: &str) -> String {
    format!("network-{cluster}")
}

/// State-store key of a sandbox aggregate.
#[must_use]
pub fn sandbox_aggregate_id(sandbox: &str) -> String {
    format!("sandbox-{sandbox}")
}

// ── User config file ──────────────────────────────────────────────────────────

/// Optional defaults read from `~/.cirrus/config.yml`. Flags and environment
/// variables take precedence over everything in here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
}

impl UserConfig {
    /// Parse the config file content.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML does not match the expected schema.
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
