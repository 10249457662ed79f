//! Partial infrastructure state — what has actually been built so far.
//!
//! One state value exists per managed aggregate: [`NetworkState`] for a
//! cluster's shared network, [`SandboxState`] for a single sandbox's compute
//! environment. Every slot is an `Option`: absence means "not yet created"
//! or "already removed"; presence means "created, possibly not yet wired
//! into its dependents" (the descriptor's sub-flags track the wiring).
//!
//! During creation, slots only go from `None` to `Some` and sub-flags from
//! `false` to `true`; during removal the same transitions happen in reverse.
//! Saga actions are the only writers.

use serde::{Deserialize, Serialize};

use crate::domain::error::StateError;
use crate::domain::resources::{
    GatewayDescriptor, InstanceDescriptor, KeyPairDescriptor, MachineImage, MachineTypeInfo,
    NetworkDescriptor, NetworkInterfaceDescriptor, PublicAddressDescriptor, RouteDescriptor,
    RouteTableDescriptor, SecurityGroupDescriptor, SubnetDescriptor,
};

/// Partial state of a cluster's shared network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<SubnetDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table: Option<RouteTableDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteDescriptor>,
}

/// Partial state of a single sandbox's compute environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group: Option<SecurityGroupDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_pair: Option<KeyPairDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<PublicAddressDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_interface: Option<NetworkInterfaceDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<MachineTypeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_image: Option<MachineImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceDescriptor>,
}

macro_rules! blob_round_trip {
    ($state:ty) => {
        impl $state {
            /// Serialize into the opaque blob handed to the state store.
            ///
            /// # Errors
            ///
            /// Returns [`StateError::Unserializable`] on serialization failure.
            pub fn to_blob(&self) -> Result<String, StateError> {
                serde_json::to_string_pretty(self).map_err(StateError::Unserializable)
            }

            /// Deserialize from a blob previously produced by [`Self::to_blob`].
            ///
            /// # Errors
            ///
            /// Returns [`StateError::Corrupt`] if the blob does not match the
            /// expected schema.
            pub fn from_blob(blob: &str) -> Result<Self, StateError> {
                serde_json::from_str(blob).map_err(StateError::Corrupt)
            }

            /// Deserialize from an optional blob, yielding the empty state
            /// when no blob was ever persisted.
            ///
            /// # Errors
            ///
            /// Returns [`StateError::Corrupt`] if a present blob is invalid.
            pub fn from_optional_blob(blob: Option<&str>) -> Result<Self, StateError> {
                match blob {
                    Some(blob) if !blob.is_empty() => Self::from_blob(blob),
                    _ => Ok(Self::default()),
                }
            }
        }
    };
}

blob_round_trip!(NetworkState);
blob_round_trip!(SandboxState);

impl NetworkState {
    /// True once every slot is absent — the aggregate no longer exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.network.is_none()
            && self.gateway.is_none()
            && self.subnet.is_none()
            && self.route_table.is_none()
            && self.route.is_none()
    }
}

impl SandboxState {
    /// True once every slot is absent — the aggregate no longer exists.
    ///
    /// The machine type and image lookups are pure selections, not cloud
    /// resources, but clearing them with the rest keeps a removed sandbox's
    /// state indistinguishable from a never-created one.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.security_group.is_none()
            && self.key_pair.is_none()
            && self.public_address.is_none()
            && self.network_interface.is_none()
            && self.instance.is_none()
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
