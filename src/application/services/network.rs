//! Cluster network lifecycle — the shared network every sandbox in a
//! cluster plugs into.
//!
//! Creation builds, in dependency order: network, internet gateway, gateway
//! attachment, subnet, route table, default route, route table association.
//! Removal deletes in the exact reverse order of the creation calls. Both
//! directions are resumable: every action guards on the persisted state and
//! the state is persisted again after every run, success or failure.

use anyhow::{Context, Result};

use crate::application::ports::{ProgressReporter, ResourceProvider, StateStore};
use crate::application::saga::{Action, ActionFuture, Saga, Stage};
use crate::application::services::{require, require_mut, wait_stable};
use crate::domain::config::{
    NETWORK_CIDR, ResourceNames, SUBNET_CIDR, network_aggregate_id, validate_cluster_name,
};
use crate::domain::resources::ResourceRole;
use crate::domain::state::NetworkState;

/// Everything the network actions read besides the state itself.
pub struct NetworkCtx<'a, P> {
    pub provider: &'a P,
    pub names: ResourceNames,
}

type NetworkAction<'a, P> = Action<NetworkCtx<'a, P>, NetworkState>;

/// Create (or finish creating) the cluster's shared network.
///
/// # Errors
///
/// Returns the first failing action's error; the partially built state is
/// persisted before the error is surfaced.
pub async fn create(
    provider: &impl ResourceProvider,
    store: &impl StateStore,
    reporter: &impl ProgressReporter,
    cluster: &str,
) -> Result<NetworkState> {
    validate_cluster_name(cluster)?;
    let aggregate_id = network_aggregate_id(cluster);
    let mut state = load_state(store, &aggregate_id).await?;

    let ctx = NetworkCtx {
        provider,
        names: ResourceNames::for_cluster(cluster),
    };
    let run = creation_saga().run(&ctx, &mut state, reporter).await;

    persist(store, &aggregate_id, &state, run).await?;
    Ok(state)
}

/// Remove (or finish removing) the cluster's shared network.
///
/// # Errors
///
/// Returns the first failing action's error; whatever still exists is
/// persisted so a re-run resumes the teardown.
pub async fn remove(
    provider: &impl ResourceProvider,
    store: &impl StateStore,
    reporter: &impl ProgressReporter,
    cluster: &str,
) -> Result<()> {
    validate_cluster_name(cluster)?;
    let aggregate_id = network_aggregate_id(cluster);
    let mut state = load_state(store, &aggregate_id).await?;

    let ctx = NetworkCtx {
        provider,
        names: ResourceNames::for_cluster(cluster),
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
pub async fn load_state(store: &impl StateStore, aggregate_id: &str) -> Result<NetworkState> {
    let blob = store
        .load(aggregate_id)
        .await
        .with_context(|| format!("loading state of '{aggregate_id}'"))?;
    let state = NetworkState::from_optional_blob(blob.as_deref())
        .with_context(|| format!("reading persisted state of '{aggregate_id}'"))?;
    Ok(state)
}

async fn persist(
    store: &impl StateStore,
    aggregate_id: &str,
    state: &NetworkState,
    run: Result<()>,
) -> Result<()> {
    let saved = async {
        let blob = state.to_blob()?;
        store.save(aggregate_id, &blob).await
    }
    .await
    .with_context(|| format!("persisting state of '{aggregate_id}'"));
    // A failed saga is the actionable error; a failed save only matters on
    // the success path.
    run?;
    saved
}

// ── Creation ──────────────────────────────────────────────────────────────────

fn creation_saga<'a, P: ResourceProvider>() -> Saga<NetworkCtx<'a, P>, NetworkState> {
    let first: Vec<NetworkAction<'a, P>> = vec![create_network as NetworkAction<'a, P>, create_gateway as NetworkAction<'a, P>];
    let second: Vec<NetworkAction<'a, P>> = vec![
        attach_gateway as NetworkAction<'a, P>,
        create_subnet as NetworkAction<'a, P>,
        create_route_table as NetworkAction<'a, P>,
    ];
    let third: Vec<NetworkAction<'a, P>> = vec![
        create_route as NetworkAction<'a, P>,
        associate_route_table as NetworkAction<'a, P>,
    ];
    Saga::new(vec![
        Stage::new("Creating a network and an internet gateway", first),
        Stage::new("Creating a subnet and a route table", second),
        Stage::new("Adding a route to the route table", third),
    ])
}

fn create_network<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.network.is_some() {
            return Ok(());
        }
        let name = ctx.names.resource(ResourceRole::Network);
        reclaim_orphan(ctx, ResourceRole::Network, &name).await?;

        let network = ctx.provider.create_network(&name, NETWORK_CIDR).await?;
        let settle = async {
            wait_stable("the network", || {
                ctx.provider.network_available(&network.id)
            })
            .await?;
            // The provider forbids combining the two attribute changes in one
            // request, so they fly together.
            tokio::try_join!(
                ctx.provider.enable_network_dns_support(&network.id),
                ctx.provider.enable_network_dns_hostnames(&network.id),
            )?;
            Ok::<(), anyhow::Error>(())
        };
        if let Err(err) = settle.await {
            let _ = ctx.provider.delete_network(&network.id).await;
            return Err(err);
        }
        state.network = Some(network);
        Ok(())
    })
}

fn create_gateway<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.gateway.is_some() {
            return Ok(());
        }
        let name = ctx.names.resource(ResourceRole::Gateway);
        reclaim_orphan(ctx, ResourceRole::Gateway, &name).await?;

        let gateway = ctx.provider.create_gateway(&name).await?;
        if let Err(err) = wait_stable("the internet gateway", || {
            ctx.provider.gateway_present(&gateway.id)
        })
        .await
        {
            let _ = ctx.provider.delete_gateway(&gateway.id).await;
            return Err(err);
        }
        state.gateway = Some(gateway);
        Ok(())
    })
}

fn attach_gateway<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let network_id = require(&state.network, "network")?.id.clone();
        let gateway = require_mut(&mut state.gateway, "internet gateway")?;
        if gateway.attached_to_network {
            return Ok(());
        }
        ctx.provider.attach_gateway(&gateway.id, &network_id).await?;
        gateway.attached_to_network = true;
        Ok(())
    })
}

fn create_subnet<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.subnet.is_some() {
            return Ok(());
        }
        let network_id = require(&state.network, "network")?.id.clone();
        let name = ctx.names.resource(ResourceRole::Subnet);
        reclaim_orphan(ctx, ResourceRole::Subnet, &name).await?;

        let subnet = ctx
            .provider
            .create_subnet(&name, SUBNET_CIDR, &network_id)
            .await?;
        let settle = async {
            wait_stable("the subnet", || ctx.provider.subnet_available(&subnet.id)).await?;
            // Instances launched here get a boot address; the stable public
            // address only arrives after bootstrap.
            ctx.provider
                .enable_subnet_public_addresses(&subnet.id)
                .await
        };
        if let Err(err) = settle.await {
            let _ = ctx.provider.delete_subnet(&subnet.id).await;
            return Err(err);
        }
        state.subnet = Some(subnet);
        Ok(())
    })
}

fn create_route_table<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.route_table.is_some() {
            return Ok(());
        }
        let network_id = require(&state.network, "network")?.id.clone();
        let name = ctx.names.resource(ResourceRole::RouteTable);
        reclaim_orphan(ctx, ResourceRole::RouteTable, &name).await?;

        let route_table = ctx.provider.create_route_table(&name, &network_id).await?;
        state.route_table = Some(route_table);
        Ok(())
    })
}

fn create_route<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.route.is_some() {
            return Ok(());
        }
        let gateway_id = require(&state.gateway, "internet gateway")?.id.clone();
        let route_table_id = require(&state.route_table, "route table")?.id.clone();
        let route = ctx
            .provider
            .create_route(&gateway_id, &route_table_id)
            .await?;
        state.route = Some(route);
        Ok(())
    })
}

fn associate_route_table<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let subnet_id = require(&state.subnet, "subnet")?.id.clone();
        let route_table = require_mut(&mut state.route_table, "route table")?;
        if route_table.associated_to_subnet {
            return Ok(());
        }
        ctx.provider
            .associate_route_table(&subnet_id, &route_table.id)
            .await?;
        route_table.associated_to_subnet = true;
        Ok(())
    })
}

// ── Removal ───────────────────────────────────────────────────────────────────

fn removal_saga<'a, P: ResourceProvider>() -> Saga<NetworkCtx<'a, P>, NetworkState> {
    let first: Vec<NetworkAction<'a, P>> = vec![
        remove_route as NetworkAction<'a, P>,
        remove_route_table as NetworkAction<'a, P>,
    ];
    let second: Vec<NetworkAction<'a, P>> = vec![remove_subnet];
    let third: Vec<NetworkAction<'a, P>> = vec![
        detach_gateway as NetworkAction<'a, P>,
        remove_gateway as NetworkAction<'a, P>,
    ];
    let fourth: Vec<NetworkAction<'a, P>> = vec![remove_network];
    Saga::new(vec![
        Stage::new("Removing the route and the route table", first),
        Stage::new("Removing the subnet", second),
        Stage::new("Detaching and removing the internet gateway", third),
        Stage::new("Removing the network", fourth),
    ])
}

fn remove_route<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        if state.route.is_none() {
            return Ok(());
        }
        let route_table_id = require(&state.route_table, "route table")?.id.clone();
        ctx.provider.delete_route(&route_table_id).await?;
        state.route = None;
        Ok(())
    })
}

fn remove_route_table<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(route_table) = state.route_table.as_ref() else {
            return Ok(());
        };
        ctx.provider.delete_route_table(&route_table.id).await?;
        state.route_table = None;
        Ok(())
    })
}

fn remove_subnet<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(subnet) = state.subnet.as_ref() else {
            return Ok(());
        };
        ctx.provider.delete_subnet(&subnet.id).await?;
        state.subnet = None;
        Ok(())
    })
}

fn detach_gateway<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let network_id = match state.network.as_ref() {
            Some(network) => network.id.clone(),
            None => return Ok(()),
        };
        let Some(gateway) = state.gateway.as_mut() else {
            return Ok(());
        };
        if !gateway.attached_to_network {
            return Ok(());
        }
        ctx.provider.detach_gateway(&gateway.id, &network_id).await?;
        gateway.attached_to_network = false;
        Ok(())
    })
}

fn remove_gateway<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(gateway) = state.gateway.as_ref() else {
            return Ok(());
        };
        ctx.provider.delete_gateway(&gateway.id).await?;
        state.gateway = None;
        Ok(())
    })
}

fn remove_network<'r, P: ResourceProvider>(
    ctx: &'r NetworkCtx<'_, P>,
    state: &'r mut NetworkState,
) -> ActionFuture<'r> {
    Box::pin(async move {
        let Some(network) = state.network.as_ref() else {
            return Ok(());
        };
        ctx.provider.delete_network(&network.id).await?;
        state.network = None;
        Ok(())
    })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Delete an untracked resource already carrying this aggregate's name — the
/// leftover of a run that crashed after the provider call but before the
/// state was persisted. Untracked resources have no dependents, so deleting
/// and recreating is always safe.
async fn reclaim_orphan<P: ResourceProvider>(
    ctx: &NetworkCtx<'_, P>,
    role: ResourceRole,
    name: &str,
) -> Result<()> {
    if let Some(orphan_id) = ctx.provider.find_resource(role, name).await? {
        match role {
            ResourceRole::Network => ctx.provider.delete_network(&orphan_id).await?,
            ResourceRole::Gateway => ctx.provider.delete_gateway(&orphan_id).await?,
            ResourceRole::Subnet => ctx.provider.delete_subnet(&orphan_id).await?,
            ResourceRole::RouteTable => ctx.provider.delete_route_table(&orphan_id).await?,
            _ => {}
        }
    }
    Ok(())
}
