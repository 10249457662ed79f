//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::process::Output;

use anyhow::Result;

use crate::domain::resources::{
    GatewayDescriptor, ImageCandidate, IngressRule, InstanceDescriptor, KeyPairDescriptor,
    MachineArch, MachineImage, MachineTypeInfo, NetworkDescriptor, NetworkInterfaceDescriptor,
    PublicAddressDescriptor, ResourceRole, RouteDescriptor, RouteTableDescriptor,
    SecurityGroupDescriptor, SubnetDescriptor,
};

// ── Value Types ───────────────────────────────────────────────────────────────

/// Parameters for creating a sandbox compute instance.
pub struct InstanceSpec<'a> {
    /// Deterministic resource name tagged onto the instance.
    pub name: &'a str,
    /// Boot image id.
    pub image_id: &'a str,
    /// Root device name of the boot image, e.g. `"/dev/sda1"`.
    pub root_device: &'a str,
    /// Machine type, e.g. `"t2.medium"`.
    pub machine_type: &'a str,
    /// Network interface the instance attaches to at device index 0.
    pub network_interface_id: &'a str,
    /// Name of the key pair authorizing remote access.
    pub key_pair_name: &'a str,
    /// Bootstrap script passed as instance user data.
    pub user_data: &'a str,
}

// ── Resource Provider Port ────────────────────────────────────────────────────

/// The cloud resource provider: per-role create/delete, stabilization probes,
/// attribute and attachment operations, and the lookups used to select
/// compute parameters.
///
/// Probes (`*_available`, `*_present`, `instance_*`) observe without side
/// effects and are safe to call repeatedly; a resource the provider no longer
/// knows about reports `false`, not an error.
#[allow(async_fn_in_trait)]
pub trait ResourceProvider {
    // Network aggregate.
    async fn create_network(&self, name: &str, cidr: &str) -> Result<NetworkDescriptor>;
    async fn network_available(&self, id: &str) -> Result<bool>;
    /// The provider forbids combining the two DNS attribute changes in one
    /// request; they are separate calls by contract.
    async fn enable_network_dns_support(&self, id: &str) -> Result<()>;
    async fn enable_network_dns_hostnames(&self, id: &str) -> Result<()>;
    async fn delete_network(&self, id: &str) -> Result<()>;

    async fn create_gateway(&self, name: &str) -> Result<GatewayDescriptor>;
    async fn gateway_present(&self, id: &str) -> Result<bool>;
    async fn attach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()>;
    async fn detach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()>;
    async fn delete_gateway(&self, id: &str) -> Result<()>;

    async fn create_subnet(&self, name: &str, cidr: &str, network_id: &str)
    -> Result<SubnetDescriptor>;
    async fn subnet_available(&self, id: &str) -> Result<bool>;
    async fn enable_subnet_public_addresses(&self, id: &str) -> Result<()>;
    async fn delete_subnet(&self, id: &str) -> Result<()>;

    async fn create_route_table(&self, name: &str, network_id: &str)
    -> Result<RouteTableDescriptor>;
    async fn delete_route_table(&self, id: &str) -> Result<()>;
    async fn create_route(&self, gateway_id: &str, route_table_id: &str)
    -> Result<RouteDescriptor>;
    async fn delete_route(&self, route_table_id: &str) -> Result<()>;
    async fn associate_route_table(&self, subnet_id: &str, route_table_id: &str) -> Result<()>;

    // Sandbox aggregate.
    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<SecurityGroupDescriptor>;
    async fn security_group_present(&self, id: &str) -> Result<bool>;
    async fn authorize_ingress(&self, id: &str, rules: &[IngressRule]) -> Result<()>;
    async fn delete_security_group(&self, id: &str) -> Result<()>;

    async fn create_key_pair(&self, name: &str) -> Result<KeyPairDescriptor>;
    async fn key_pair_present(&self, id: &str) -> Result<bool>;
    async fn delete_key_pair(&self, id: &str) -> Result<()>;

    async fn create_network_interface(
        &self,
        name: &str,
        description: &str,
        subnet_id: &str,
        security_group_ids: &[String],
    ) -> Result<NetworkInterfaceDescriptor>;
    async fn network_interface_available(&self, id: &str) -> Result<bool>;
    async fn delete_network_interface(&self, id: &str) -> Result<()>;

    async fn allocate_public_address(&self, name: &str) -> Result<PublicAddressDescriptor>;
    /// Returns the association id recording the attachment.
    async fn attach_public_address(&self, allocation_id: &str, instance_id: &str)
    -> Result<String>;
    async fn detach_public_address(&self, association_id: &str) -> Result<()>;
    async fn release_public_address(&self, id: &str) -> Result<()>;

    async fn create_instance(&self, spec: &InstanceSpec<'_>) -> Result<InstanceDescriptor>;
    async fn instance_running(&self, id: &str) -> Result<bool>;
    async fn instance_terminated(&self, id: &str) -> Result<bool>;
    /// The boot address is only assigned once the instance is running.
    async fn lookup_instance_address(&self, id: &str) -> Result<String>;
    async fn terminate_instance(&self, id: &str) -> Result<()>;

    // Selection lookups.
    async fn lookup_machine_type(&self, name: &str) -> Result<MachineTypeInfo>;
    /// Candidates matching the architecture and image filters; the caller
    /// picks the most recent.
    async fn list_machine_images(&self, arch: MachineArch) -> Result<Vec<ImageCandidate>>;

    /// Look up an existing resource by its deterministic name. Used to
    /// reclaim resources created by a run that crashed before persisting.
    async fn find_resource(&self, role: ResourceRole, name: &str) -> Result<Option<String>>;
}

/// Convenience wrapper: the most recent image for `arch`.
///
/// # Errors
///
/// Returns an error if no image matches or the listing fails.
pub async fn lookup_machine_image(
    provider: &impl ResourceProvider,
    arch: MachineArch,
) -> Result<MachineImage> {
    let candidates = provider.list_machine_images(arch).await?;
    let chosen = crate::domain::resources::most_recent_image(&candidates)?;
    Ok(MachineImage {
        id: chosen.id.clone(),
        root_user: crate::domain::config::LOGIN_USER.to_string(),
        root_device: chosen.root_device.clone(),
    })
}

// ── State Store Port ──────────────────────────────────────────────────────────

/// Durable persistence of partial infrastructure state. The blob is opaque
/// to the store; only the orchestrator that produced it understands it.
#[allow(async_fn_in_trait)]
pub trait StateStore {
    /// Load the blob persisted for `aggregate_id`, `None` if never saved.
    async fn load(&self, aggregate_id: &str) -> Result<Option<String>>;
    /// Persist `blob` for `aggregate_id`.
    async fn save(&self, aggregate_id: &str, blob: &str) -> Result<()>;
    /// Forget `aggregate_id` entirely.
    async fn clear(&self, aggregate_id: &str) -> Result<()>;
    /// All aggregate ids with persisted state.
    async fn list(&self) -> Result<Vec<String>>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
/// Purely observational; never affects control flow.
pub trait ProgressReporter {
    /// Announce a saga stage as it starts.
    fn announce_stage(&self, label: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Remote Execution Port ─────────────────────────────────────────────────────

/// A secure remote-command channel into a sandbox instance, authenticated by
/// the sandbox's key pair.
#[allow(async_fn_in_trait)]
pub trait RemoteExec {
    /// Run `command` on the instance and return its stdout. A channel that
    /// cannot be opened, or a command exiting non-zero, is an error.
    async fn run_command(
        &self,
        host: &str,
        port: u16,
        user: &str,
        private_key_pem: &str,
        command: &str,
    ) -> Result<String>;
}

// ── Network Probe Port ────────────────────────────────────────────────────────

/// Abstracts network connectivity checks so readiness waits can be tested
/// without real network access.
#[allow(async_fn_in_trait)]
pub trait TcpProbe {
    /// Check TCP connectivity to the given host and port.
    async fn check_tcp(&self, host: &str, port: u16) -> Result<bool>;
}

// ── Environment Port ──────────────────────────────────────────────────────────

/// Abstracts environment variable access for account resolution.
pub trait EnvVars {
    /// The variable's value, `None` when unset or empty.
    fn get(&self, name: &str) -> Option<String>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output, under the runner's default
    /// timeout. On timeout the child process must be killed, not orphaned.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Like [`Self::run`], with extra environment variables for the child.
    async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, String)],
    ) -> Result<Output>;
}
