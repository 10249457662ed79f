//! Sandbox lifecycle — one compute environment per developer sandbox.
//!
//! Creation builds, in dependency order: security group, key pair, public
//! address allocation, network interface, machine type and boot image
//! selection, compute instance, bootstrap wait, public address attachment,
//! and the final reachability wait. The public address is deliberately
//! attached only after bootstrap completes so the instance's address never
//! changes under an in-flight remote-execution channel.
//!
//! Removal mirrors the protocol in reverse: detach the public address, wait
//! for the instance's termination to be confirmed, then release everything
//! else in the exact reverse order of the creation calls.

use anyhow::{Context, Result, anyhow};

use crate::application::bootstrap::{InstanceEndpoint, await_bootstrap, await_reachable};
use crate::application::ports::{
    InstanceSpec, ProgressReporter, RemoteExec, ResourceProvider, StateStore, TcpProbe,
    lookup_machine_image,
};
use crate::application::saga::{Action, ActionFuture, Saga, Stage};
use crate::application::services::{network, require, require_mut, wait_stable};
use crate::domain::config::{
    ADMIN_PORT, LOGIN_USER, ResourceNames, SANDBOX_SSH_PORT, network_aggregate_id,
    sandbox_aggregate_id, sandbox_ingress_rules, validate_sandbox_name,
};
use crate::domain::bootstrap::HostKey;
use crate::domain::error::MachineTypeError;
use crate::domain::resources::ResourceRole;
use crate::domain::state::SandboxState;

/// The bootstrap script every sandbox instance runs on first boot.
const BOOTSTRAP_SCRIPT: &str = include_str!("../../../assets/bootstrap.sh");

/// Where a sandbox is placed: the cluster network it joins and the machine
/// type it requested. Only creation actions read it; removal works from the
/// persisted state alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxPlacement {
    pub machine_type: String,
    pub network_id: String,
    pub subnet_id: String,
}

/// Everything the sandbox actions read besides the state itself.
pub struct SandboxCtx<'a, P, R, N> {
    pub provider: &'a P,
    pub remote: &'a R,
    pub probe: &'a N,
    pub names: ResourceNames,
    pub placement: SandboxPlacement,
}

type SandboxAction<'a, P, R, N> = Action<SandboxCtx<'a, P, R, N>, SandboxState>;

/// What a caller needs to reach a freshly created sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxHandle {
    pub address: String,
    pub host_keys: Vec<HostKey>,
    pub private_key_pem: String,
}

/// Verify that `machine_type` exists and runs on a supported architecture.
/// A pre-saga gate: it fails before anything is created.
///
/// # Errors
///
/// Returns [`MachineTypeError`] for an unknown type or unsupported
/// architecture, or the provider's error as-is.
pub async fn check_machine_type(
    provider: &impl ResourceProvider,
    machine_type: &str,
    region: &str,
) -> Result<()> {
    provider
        .lookup_machine_type(machine_type)
        .await
        .map(|_| ())
        .map_err(|err| match err.downcast::<MachineTypeError>() {
            Ok(typed) => anyhow::Error::from(typed),
            Err(other) => other.context(format!(
                "checking machine type '{machine_type}' in region '{region}'"
            )),
        })
}

/// Create (or finish creating) a sandbox in the cluster's network.
///
/// # Errors
///
/// Returns the first failing action's error; the partially built state is
/// persisted before the error is surfaced.
pub async fn create(
    provider: &impl ResourceProvider,
    remote: &impl RemoteExec,
    probe: &impl TcpProbe,
    store: &impl StateStore,
    reporter: &impl ProgressReporter,
    cluster: &str,
    name: &str,
    machine_type: &str,
) -> Result<SandboxHandle> {
    validate_sandbox_name(name)?;
    let cluster_state = network::load_state(store, &network_aggregate_id(cluster)).await?;
    let network_id = require(&cluster_state.network, "cluster network")?.id.clone();
    let subnet_id = require(&cluster_state.subnet, "cluster subnet")?.id.clone();

    let aggregate_id = sandbox_aggregate_id(name);
    let mut state = load_state(store, &aggregate_id).await?;

    let ctx = SandboxCtx {
        provider,
        remote,
        probe,
        names: ResourceNames::for_sandbox(cluster, name),
        placement: SandboxPlacement {
            machine_type: machine_type.to_string(),
            network_id,
            subnet_id,
        },
    };
    let run = creation_saga().run(&ctx, &mut state, reporter).await;

    persist(store, &aggregate_id, &state, run).await?;
    handle_from_state(&state)
}

/// Remove (or finish removing) a sandbox.
///
/// # Errors
///
/// Returns the first failing action's error; whatever still exists is
/// persisted so a re-run resumes the teardown.
pub async fn remove(
    provider: &impl ResourceProvider,
    remote: &impl RemoteExec,
    probe: &impl TcpProbe,
    store: &impl StateStore,
    reporter: &impl ProgressReporter,
    cluster: &str,
    name: &str,
) -> Result<()> {
    validate_sandbox_name(name)?;
    let aggregate_id = sandbox_aggregate_id(name);
    let mut state = load_state(store, &aggregate_id).await?;

    let ctx = SandboxCtx {
        provider,
        remote,
        probe,
        names: ResourceNames::for_sandbox(cluster, name),
        placement: SandboxPlacement::default(),
    };
    let run = removal_saga().run(&ctx, &mut state, reporter).await;

    if run.is_ok() && state.is_empty() {
        store
            .clear(&aggregate_id)
            .await
            .with_context(|| format!("clearing state of '{aggregate_id}'"))?;
        return Ok(());
    }
    persist(store, &aggregate_id, &state, run).await
}

/// Load the aggregate's persisted state, empty if never persisted.
pub async fn load_state(store: &impl StateStore, aggregate_id: &str) -> Result<SandboxState> {
    let blob = store
        .load(aggregate_id)
        .await
        .with_context(|| format!("loading state of '{aggregate_id}'"))?;
    let state = SandboxState::from_optional_blob(blob.as_deref())
        .with_context(|| format!("reading persisted state of '{aggregate_id}'"))?;
    Ok(state)
}

async fn persist(
    store: &impl StateStore,
    aggregate_id: &str,
    state: &SandboxState,
    run: Result<()>,
) -> Result<()> {
    let saved = async {
        let blob = state.to_blob()?;
        store.save(aggregate_id, &blob).await
    }
    .await
    .with_context(|| format!("persisting state of '{aggregate_id}'"));
    run?;
    saved
}

fn handle_from_state(state: &SandboxState) -> Result<SandboxHandle> {
    let address = require(&state.public_address, "public address")?;
    let instance = require(&state.instance, "instance")?;
    let receipt = instance
        .bootstrap
        .as_ref()
        .ok_or_else(|| anyhow!("instance record is missing its bootstrap receipt"))?;
    let key_pair = require(&state.key_pair, "key pair")?;
    Ok(SandboxHandle {
        address: address.address.clone(),
        host_keys: receipt.host_keys.clone(),
        private_key_pem: key_pair.private_key_pem.clone(),
    })
}

// ── Creation ──────────────────────────────────────────────────────────────────

fn creation_saga<'a, P, R, N>() -> Saga<SandboxCtx<'a, P, R, N>, SandboxState>
where
    P: ResourceProvider,
    R: RemoteExec,
    N: TcpProbe,
{
    let base: Vec<SandboxAction<'a, P, R, N>> = vec![
        create_security_group as SandboxAction<'a, P, R, N>,
        create_key_pair as SandboxAction<'a, P, R, N>,
        allocate_public_address as SandboxAction<'a, P, R, N>,
    ];
    let interface: Vec<SandboxAction<'a, P, R, N>> = vec![create_network_interface];
    let machine: Vec<SandboxAction<'a, P, R, N>> = vec![lookup_machine_type];
    let image: Vec<SandboxAction<'a, P, R, N>> = vec![lookup_boot_image];
    let instance: Vec<SandboxAction<'a, P, R, N>> = vec![create_instance];
    let bootstrap: Vec<SandboxAction<'a, P, R, N>> = vec![wait_for_bootstrap];
    let attach: Vec<SandboxAction<'a, P, R, N>> = vec![attach_public_address];
    let reachable: Vec<SandboxAction<'a, P, R, N>> = vec![wait_public_address_reachable];
    Saga::new(vec![
        Stage::new(
            "Creating the security group, the key pair and the public address",
            base,
        ),
        Stage::new("Creating the network interface", interface),
        Stage::new("Selecting the machine type", machine),
        Stage::new("Selecting the boot image", image),
        Stage::new("Creating the compute instance", instance),
        Stage::new("Waiting for the instance to finish bootstrapping", bootstrap),
        Stage::new("Attaching the public address to the instance", attach),
        Stage::new("Waiting for the public address to be reachable", reachable),
    ])
}

fn create_security_group<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.security_group.is_some() {
            return Ok(());
        }
        let name = ctx.names.resource(ResourceRole::SecurityGroup);
        reclaim_orphan(ctx, ResourceRole::SecurityGroup, &name).await?;

        let group = ctx
            .provider
            .create_security_group(
                &name,
                "The security group attached to your sandbox",
                &ctx.placement.network_id,
            )
            .await?;
        let settle = async {
            wait_stable("the security group", || {
                ctx.provider.security_group_present(&group.id)
            })
            .await?;
            ctx.provider
                .authorize_ingress(&group.id, &sandbox_ingress_rules())
                .await
        };
        if let Err(err) = settle.await {
            let _ = ctx.provider.delete_security_group(&group.id).await;
            return Err(err);
        }
        state.security_group = Some(group);
        Ok(())
    })
}

fn create_key_pair<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.key_pair.is_some() {
            return Ok(());
        }
        let name = ctx.names.resource(ResourceRole::KeyPair);
        reclaim_orphan(ctx, ResourceRole::KeyPair, &name).await?;

        let key_pair = ctx.provider.create_key_pair(&name).await?;
        if let Err(err) = wait_stable("the key pair", || {
            ctx.provider.key_pair_present(&key_pair.id)
        })
        .await
        {
            let _ = ctx.provider.delete_key_pair(&key_pair.id).await;
            return Err(err);
        }
        state.key_pair = Some(key_pair);
        Ok(())
    })
}

fn allocate_public_address<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.public_address.is_some() {
            return Ok(());
        }
        let name = ctx.names.resource(ResourceRole::PublicAddress);
        reclaim_orphan(ctx, ResourceRole::PublicAddress, &name).await?;

        let address = ctx.provider.allocate_public_address(&name).await?;
        state.public_address = Some(address);
        Ok(())
    })
}

fn create_network_interface<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.network_interface.is_some() {
            return Ok(());
        }
        let group_id = require(&state.security_group, "security group")?.id.clone();
        let name = ctx.names.resource(ResourceRole::NetworkInterface);
        reclaim_orphan(ctx, ResourceRole::NetworkInterface, &name).await?;

        let interface = ctx
            .provider
            .create_network_interface(
                &name,
                "The network interface attached to your sandbox",
                &ctx.placement.subnet_id,
                &[group_id],
            )
            .await?;
        if let Err(err) = wait_stable("the network interface", || {
            ctx.provider.network_interface_available(&interface.id)
        })
        .await
        {
            let _ = ctx.provider.delete_network_interface(&interface.id).await;
            return Err(err);
        }
        state.network_interface = Some(interface);
        Ok(())
    })
}

fn lookup_machine_type<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.machine_type.is_some() {
            return Ok(());
        }
        let info = ctx.provider.lookup_machine_type(&ctx.placement.machine_type).await?;
        state.machine_type = Some(info);
        Ok(())
    })
}

fn lookup_boot_image<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.machine_image.is_some() {
            return Ok(());
        }
        let arch = require(&state.machine_type, "machine type")?.arch;
        let image = lookup_machine_image(ctx.provider, arch).await?;
        state.machine_image = Some(image);
        Ok(())
    })
}

fn create_instance<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.instance.is_some() {
            return Ok(());
        }
        let machine_type = require(&state.machine_type, "machine type")?.name.clone();
        let image = require(&state.machine_image, "boot image")?.clone();
        let interface_id = require(&state.network_interface, "network interface")?
            .id
            .clone();
        let key_pair_name = require(&state.key_pair, "key pair")?.name.clone();
        let name = ctx.names.resource(ResourceRole::Instance);
        reclaim_orphan(ctx, ResourceRole::Instance, &name).await?;

        let mut instance = ctx
            .provider
            .create_instance(&InstanceSpec {
                name: &name,
                image_id: &image.id,
                root_device: &image.root_device,
                machine_type: &machine_type,
                network_interface_id: &interface_id,
                key_pair_name: &key_pair_name,
                user_data: BOOTSTRAP_SCRIPT,
            })
            .await?;
        let settle = async {
            wait_stable("the instance", || ctx.provider.instance_running(&instance.id)).await?;
            // The boot address only exists once the instance is running.
            ctx.provider.lookup_instance_address(&instance.id).await
        };
        match settle.await {
            Ok(boot_address) => {
                instance.boot_address = Some(boot_address);
                state.instance = Some(instance);
                Ok(())
            }
            Err(err) => {
                let _ = ctx.provider.terminate_instance(&instance.id).await;
                Err(err)
            }
        }
    })
}

fn wait_for_bootstrap<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let private_key_pem = require(&state.key_pair, "key pair")?.private_key_pem.clone();
        let instance = require_mut(&mut state.instance, "instance")?;
        if instance.bootstrap.is_some() {
            return Ok(());
        }
        let host = instance
            .boot_address
            .clone()
            .ok_or_else(|| anyhow!("instance record is missing its boot address"))?;
        let receipt = await_bootstrap(
            ctx.remote,
            ctx.probe,
            &InstanceEndpoint {
                host: &host,
                port: ADMIN_PORT,
                user: LOGIN_USER,
                private_key_pem: &private_key_pem,
            },
        )
        .await?;
        instance.bootstrap = Some(receipt);
        Ok(())
    })
}

fn attach_public_address<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let instance_id = require(&state.instance, "instance")?.id.clone();
        let address = require_mut(&mut state.public_address, "public address")?;
        if address.attached_to_instance {
            return Ok(());
        }
        let association_id = ctx
            .provider
            .attach_public_address(&address.id, &instance_id)
            .await?;
        address.association_id = Some(association_id);
        address.attached_to_instance = true;
        // The boot address is reassigned by the provider on attachment and
        // must not be used again.
        if let Some(instance) = state.instance.as_mut() {
            instance.boot_address = None;
        }
        Ok(())
    })
}

fn wait_public_address_reachable<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let address = require(&state.public_address, "public address")?;
        // The instance was already reachable once on its boot address, so an
        // unreachable public address is a real failure here.
        await_reachable(ctx.probe, &address.address, SANDBOX_SSH_PORT).await
    })
}

// ── Removal ───────────────────────────────────────────────────────────────────

fn removal_saga<'a, P, R, N>() -> Saga<SandboxCtx<'a, P, R, N>, SandboxState>
where
    P: ResourceProvider,
    R: RemoteExec,
    N: TcpProbe,
{
    let instance: Vec<SandboxAction<'a, P, R, N>> = vec![
        detach_public_address as SandboxAction<'a, P, R, N>,
        terminate_instance as SandboxAction<'a, P, R, N>,
    ];
    let interface: Vec<SandboxAction<'a, P, R, N>> = vec![remove_network_interface];
    let address: Vec<SandboxAction<'a, P, R, N>> = vec![release_public_address];
    let key_pair: Vec<SandboxAction<'a, P, R, N>> = vec![remove_key_pair];
    let group: Vec<SandboxAction<'a, P, R, N>> = vec![remove_security_group];
    Saga::new(vec![
        Stage::new(
            "Detaching the public address and terminating the instance",
            instance,
        ),
        Stage::new("Removing the network interface", interface),
        Stage::new("Releasing the public address", address),
        Stage::new("Removing the key pair", key_pair),
        Stage::new("Removing the security group", group),
    ])
}

fn detach_public_address<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(address) = state.public_address.as_mut() else {
            return Ok(());
        };
        if !address.attached_to_instance {
            return Ok(());
        }
        let association_id = address
            .association_id
            .clone()
            .ok_or_else(|| anyhow!("public address record is missing its association id"))?;
        ctx.provider.detach_public_address(&association_id).await?;
        address.association_id = None;
        address.attached_to_instance = false;
        Ok(())
    })
}

fn terminate_instance<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(instance) = state.instance.as_ref() else {
            return Ok(());
        };
        ctx.provider.terminate_instance(&instance.id).await?;
        // Dependent resources (the network interface in particular) cannot
        // be released until the termination is confirmed.
        wait_stable("the instance termination", || {
            ctx.provider.instance_terminated(&instance.id)
        })
        .await?;
        state.instance = None;
        Ok(())
    })
}

fn remove_network_interface<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(interface) = state.network_interface.as_ref() else {
            return Ok(());
        };
        ctx.provider.delete_network_interface(&interface.id).await?;
        state.network_interface = None;
        Ok(())
    })
}

fn release_public_address<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(address) = state.public_address.as_ref() else {
            return Ok(());
        };
        ctx.provider.release_public_address(&address.id).await?;
        state.public_address = None;
        Ok(())
    })
}

fn remove_key_pair<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(key_pair) = state.key_pair.as_ref() else {
            return Ok(());
        };
        ctx.provider.delete_key_pair(&key_pair.id).await?;
        state.key_pair = None;
        Ok(())
    })
}

fn remove_security_group<'r, P: ResourceProvider, R: RemoteExec, N: TcpProbe>(
    ctx: &'r SandboxCtx<'_, P, R, N>,
    state: &'r mut SandboxState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(group) = state.security_group.as_ref() else {
            return Ok(());
        };
        ctx.provider.delete_security_group(&group.id).await?;
        state.security_group = None;
        // A removed sandbox's state reads like a never-created one.
        state.machine_type = None;
        state.machine_image = None;
        Ok(())
    })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Delete an untracked resource already carrying this aggregate's name — the
/// leftover of a run that crashed after the provider call but before the
/// state was persisted. A half-created key pair's secret material cannot be
/// recovered, and an untracked resource never has dependents, so deleting
/// and recreating is the one policy that works for every role.
async fn reclaim_orphan<P: ResourceProvider, R, N>(
    ctx: &SandboxCtx<'_, P, R, N>,
    role: ResourceRole,
    name: &str,
) -> Result<()> {
    if let Some(orphan_id) = ctx.provider.find_resource(role, name).await? {
        match role {
            ResourceRole::SecurityGroup => ctx.provider.delete_security_group(&orphan_id).await?,
            ResourceRole::KeyPair => ctx.provider.delete_key_pair(&orphan_id).await?,
            ResourceRole::NetworkInterface => {
                ctx.provider.delete_network_interface(&orphan_id).await?;
            }
            ResourceRole::PublicAddress => ctx.provider.release_public_address(&orphan_id).await?,
            ResourceRole::Instance => ctx.provider.terminate_instance(&orphan_id).await?,
            _ => {}
        }
    }
    Ok(())
}
