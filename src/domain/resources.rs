//! Resource descriptors — the identifying records returned by the resource
//! provider for each piece of cloud infrastructure a sandbox depends on.
//!
//! Descriptors carry readiness sub-flags (`attached_to_network`,
//! `associated_to_subnet`, `attached_to_instance`) alongside the resource id
//! because creating a resource and wiring it to its dependents are separate
//! provider calls that can fail and be resumed independently.
//!
//! This module is intentionally free of I/O, async, and external layer imports.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::bootstrap::BootstrapReceipt;

// ── Roles ─────────────────────────────────────────────────────────────────────

/// The role a resource plays within an aggregate. Used for deterministic
/// naming and for orphan lookup at the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRole {
    Network,
    Gateway,
    Subnet,
    RouteTable,
    SecurityGroup,
    KeyPair,
    NetworkInterface,
    PublicAddress,
    Instance,
}

impl ResourceRole {
    /// The role's slug, used as the suffix of the deterministic resource name.
    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Gateway => "gateway",
            Self::Subnet => "subnet",
            Self::RouteTable => "route-table",
            Self::SecurityGroup => "security-group",
            Self::KeyPair => "key-pair",
            Self::NetworkInterface => "network-interface",
            Self::PublicAddress => "public-address",
            Self::Instance => "instance",
        }
    }
}

impl std::fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

// ── Descriptors ───────────────────────────────────────────────────────────────

/// The isolated network backing a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub id: String,
}

/// The internet gateway giving the network outbound connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayDescriptor {
    pub id: String,
    pub attached_to_network: bool,
}

/// The public subnet sandbox instances are placed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetDescriptor {
    pub id: String,
}

/// The route table carrying the subnet's default route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableDescriptor {
    pub id: String,
    pub associated_to_subnet: bool,
}

/// The default route through the gateway. The route has no id of its own;
/// it lives and dies with its route table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {}

/// The security group attached to a sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupDescriptor {
    pub id: String,
}

/// The key pair authenticating remote access to a sandbox instance.
///
/// `private_key_pem` is only returned by the provider at creation time and
/// cannot be looked up again afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPairDescriptor {
    pub id: String,
    pub name: String,
    pub private_key_pem: String,
}

/// The network interface attaching a sandbox instance to the subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceDescriptor {
    pub id: String,
}

/// The static public address a sandbox is reached at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAddressDescriptor {
    pub id: String,
    pub address: String,
    pub attached_to_instance: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association_id: Option<String>,
}

/// The compute instance backing a sandbox.
///
/// `boot_address` is the provider-assigned address the instance boots with;
/// it is only valid until the public address is attached and is cleared at
/// that point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub id: String,
    pub machine_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapReceipt>,
}

// ── Machine selection ─────────────────────────────────────────────────────────

/// Processor architecture of a machine type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineArch {
    X86_64,
    Arm64,
}

impl MachineArch {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        }
    }
}

/// Capability metadata for a machine type, resolved before instance creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineTypeInfo {
    pub name: String,
    pub arch: MachineArch,
}

/// The boot image selected for a sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineImage {
    pub id: String,
    pub root_user: String,
    pub root_device: String,
}

/// A boot image candidate as listed by the provider, before recency selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub id: String,
    pub root_device: String,
    /// RFC 3339 creation timestamp as reported by the provider.
    pub created_at: String,
}

/// Pick the most recently created image among `candidates`.
///
/// # Errors
///
/// Returns an error if `candidates` is empty or a creation timestamp cannot
/// be parsed as RFC 3339.
pub fn most_recent_image(candidates: &[ImageCandidate]) -> Result<&ImageCandidate> {
    let mut chosen: Option<(&ImageCandidate, DateTime<Utc>)> = None;
    for candidate in candidates {
        let created_at: DateTime<Utc> = candidate
            .created_at
            .parse()
            .with_context(|| format!("parsing creation date of image {}", candidate.id))?;
        match chosen {
            Some((_, best)) if created_at <= best => {}
            _ => chosen = Some((candidate, created_at)),
        }
    }
    chosen
        .map(|(candidate, _)| candidate)
        .ok_or_else(|| anyhow::anyhow!("no boot image matched the architecture and filters"))
}

// ── Ingress ───────────────────────────────────────────────────────────────────

/// A single inbound rule on a sandbox security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub protocol: &'static str,
    pub port: u16,
    pub cidr: &'static str,
}

impl IngressRule {
    /// TCP, open to anywhere.
    #[must_use]
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: "tcp",
            port,
            cidr: "0.0.0.0/0",
        }
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
