//! Infrastructure implementation of the `ResourceProvider` port.
//!
//! `CloudCliProvider<R>` routes every call through the cloud vendor's CLI
//! (`aws ec2 ...`) via a `CommandRunner`, parsing `--output json` responses
//! with `serde_json`. Generic over `R: CommandRunner` so tests can inject a
//! mock runner without spawning real processes.
//!
//! Credentials are injected as environment variables of the child process
//! and never appear on a command line.

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::application::ports::{CommandRunner, InstanceSpec, ResourceProvider};
use crate::domain::account::AccountConfig;
use crate::domain::config::ROOT_VOLUME_SIZE_GB;
use crate::domain::error::MachineTypeError;
use crate::domain::resources::{
    GatewayDescriptor, ImageCandidate, IngressRule, InstanceDescriptor, KeyPairDescriptor,
    MachineArch, MachineTypeInfo, NetworkDescriptor, NetworkInterfaceDescriptor,
    PublicAddressDescriptor, ResourceRole, RouteDescriptor, RouteTableDescriptor,
    SecurityGroupDescriptor, SubnetDescriptor,
};

use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner};

/// Publisher account of the canonical Ubuntu images.
const UBUNTU_IMAGE_OWNER: &str = "099720109477";

const UBUNTU_IMAGE_PATTERN_X86_64: &str =
    "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-amd64-server-*";
const UBUNTU_IMAGE_PATTERN_ARM64: &str = "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-arm64-server-*";

/// Infrastructure adapter speaking to the cloud through its CLI.
pub struct CloudCliProvider<R: CommandRunner> {
    runner: R,
    region: String,
    envs: Vec<(&'static str, String)>,
}

impl CloudCliProvider<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn new(account: &AccountConfig) -> Self {
        Self::with_runner(TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT), account)
    }
}

impl<R: CommandRunner> CloudCliProvider<R> {
    /// Create a provider with an explicit runner instance.
    pub fn with_runner(runner: R, account: &AccountConfig) -> Self {
        Self {
            runner,
            region: account.region.clone(),
            envs: vec![
                ("AWS_ACCESS_KEY_ID", account.credentials.access_key_id.clone()),
                (
                    "AWS_SECRET_ACCESS_KEY",
                    account.credentials.secret_access_key.clone(),
                ),
            ],
        }
    }

    /// The runner behind this provider. Exposed for tests that assert on
    /// the recorded invocations.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run one `aws ec2` subcommand and parse its JSON output.
    async fn ec2(&self, args: &[&str]) -> Result<Value> {
        let mut full: Vec<&str> = vec!["ec2"];
        full.extend_from_slice(args);
        full.extend_from_slice(&["--region", &self.region, "--output", "json"]);
        let output = self
            .runner
            .run_with_env("aws", &full, &self.envs)
            .await
            .with_context(|| format!("aws ec2 {}", args.first().unwrap_or(&"")))?;
        if !output.status.success() {
            bail!(
                "aws ec2 {} failed: {}",
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(stdout.trim())
            .with_context(|| format!("parsing aws ec2 {} output", args.first().unwrap_or(&"")))
    }

    /// Like [`Self::ec2`], but a provider "not found" failure reads as
    /// `None` rather than an error. Used by probes and lookups.
    async fn ec2_lookup(&self, args: &[&str]) -> Result<Option<Value>> {
        match self.ec2(args).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.to_string().contains("NotFound") => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn str_at(value: &Value, pointer: &str) -> Result<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .with_context(|| format!("missing '{pointer}' in provider response"))
}

fn tag_spec(resource_type: &str, name: &str) -> String {
    format!("ResourceType={resource_type},Tags=[{{Key=Name,Value={name}}}]")
}

fn ip_permission(rule: &IngressRule) -> String {
    format!(
        "IpProtocol={},FromPort={port},ToPort={port},IpRanges=[{{CidrIp={}}}]",
        rule.protocol,
        rule.cidr,
        port = rule.port,
    )
}

impl<R: CommandRunner> ResourceProvider for CloudCliProvider<R> {
    // ── Network ───────────────────────────────────────────────────────────────

    async fn create_network(&self, name: &str, cidr: &str) -> Result<NetworkDescriptor> {
        let spec = tag_spec("vpc", name);
        let resp = self
            .ec2(&[
                "create-vpc",
                "--cidr-block",
                cidr,
                "--tag-specifications",
                &spec,
            ])
            .await?;
        Ok(NetworkDescriptor {
            id: str_at(&resp, "/Vpc/VpcId")?,
        })
    }

    async fn network_available(&self, id: &str) -> Result<bool> {
        let Some(resp) = self.ec2_lookup(&["describe-vpcs", "--vpc-ids", id]).await? else {
            return Ok(false);
        };
        Ok(resp.pointer("/Vpcs/0/State").and_then(Value::as_str) == Some("available"))
    }

    async fn enable_network_dns_support(&self, id: &str) -> Result<()> {
        self.ec2(&[
            "modify-vpc-attribute",
            "--vpc-id",
            id,
            "--enable-dns-support",
            "Value=true",
        ])
        .await?;
        Ok(())
    }

    async fn enable_network_dns_hostnames(&self, id: &str) -> Result<()> {
        self.ec2(&[
            "modify-vpc-attribute",
            "--vpc-id",
            id,
            "--enable-dns-hostnames",
            "Value=true",
        ])
        .await?;
        Ok(())
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        self.ec2(&["delete-vpc", "--vpc-id", id]).await?;
        Ok(())
    }

    // ── Gateway ───────────────────────────────────────────────────────────────

    async fn create_gateway(&self, name: &str) -> Result<GatewayDescriptor> {
        let spec = tag_spec("internet-gateway", name);
        let resp = self
            .ec2(&["create-internet-gateway", "--tag-specifications", &spec])
            .await?;
        Ok(GatewayDescriptor {
            id: str_at(&resp, "/InternetGateway/InternetGatewayId")?,
            attached_to_network: false,
        })
    }

    async fn gateway_present(&self, id: &str) -> Result<bool> {
        let resp = self
            .ec2_lookup(&["describe-internet-gateways", "--internet-gateway-ids", id])
            .await?;
        Ok(resp.is_some_and(|r| r.pointer("/InternetGateways/0/InternetGatewayId").is_some()))
    }

    async fn attach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()> {
        self.ec2(&[
            "attach-internet-gateway",
            "--internet-gateway-id",
            gateway_id,
            "--vpc-id",
            network_id,
        ])
        .await?;
        Ok(())
    }

    async fn detach_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()> {
        self.ec2(&[
            "detach-internet-gateway",
            "--internet-gateway-id",
            gateway_id,
            "--vpc-id",
            network_id,
        ])
        .await?;
        Ok(())
    }

    async fn delete_gateway(&self, id: &str) -> Result<()> {
        self.ec2(&["delete-internet-gateway", "--internet-gateway-id", id])
            .await?;
        Ok(())
    }

    // ── Subnet ────────────────────────────────────────────────────────────────

    async fn create_subnet(
        &self,
        name: &str,
        cidr: &str,
        network_id: &str,
    ) -> Result<SubnetDescriptor> {
        let spec = tag_spec("subnet", name);
        let resp = self
            .ec2(&[
                "create-subnet",
                "--cidr-block",
                cidr,
                "--vpc-id",
                network_id,
                "--tag-specifications",
                &spec,
            ])
            .await?;
        Ok(SubnetDescriptor {
            id: str_at(&resp, "/Subnet/SubnetId")?,
        })
    }

    async fn subnet_available(&self, id: &str) -> Result<bool> {
        let Some(resp) = self
            .ec2_lookup(&["describe-subnets", "--subnet-ids", id])
            .await?
        else {
            return Ok(false);
        };
        Ok(resp.pointer("/Subnets/0/State").and_then(Value::as_str) == Some("available"))
    }

    async fn enable_subnet_public_addresses(&self, id: &str) -> Result<()> {
        self.ec2(&[
            "modify-subnet-attribute",
            "--subnet-id",
            id,
            "--map-public-ip-on-launch",
        ])
        .await?;
        Ok(())
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        self.ec2(&["delete-subnet", "--subnet-id", id]).await?;
        Ok(())
    }

    // ── Route table and route ─────────────────────────────────────────────────

    async fn create_route_table(
        &self,
        name: &str,
        network_id: &str,
    ) -> Result<RouteTableDescriptor> {
        let spec = tag_spec("route-table", name);
        let resp = self
            .ec2(&[
                "create-route-table",
                "--vpc-id",
                network_id,
                "--tag-specifications",
                &spec,
            ])
            .await?;
        Ok(RouteTableDescriptor {
            id: str_at(&resp, "/RouteTable/RouteTableId")?,
            associated_to_subnet: false,
        })
    }

    async fn delete_route_table(&self, id: &str) -> Result<()> {
        self.ec2(&["delete-route-table", "--route-table-id", id])
            .await?;
        Ok(())
    }

    async fn create_route(
        &self,
        gateway_id: &str,
        route_table_id: &str,
    ) -> Result<RouteDescriptor> {
        self.ec2(&[
            "create-route",
            "--route-table-id",
            route_table_id,
            "--destination-cidr-block",
            "0.0.0.0/0",
            "--gateway-id",
            gateway_id,
        ])
        .await?;
        Ok(RouteDescriptor {})
    }

    async fn delete_route(&self, route_table_id: &str) -> Result<()> {
        self.ec2(&[
            "delete-route",
            "--route-table-id",
            route_table_id,
            "--destination-cidr-block",
            "0.0.0.0/0",
        ])
        .await?;
        Ok(())
    }

    async fn associate_route_table(&self, subnet_id: &str, route_table_id: &str) -> Result<()> {
        self.ec2(&[
            "associate-route-table",
            "--subnet-id",
            subnet_id,
            "--route-table-id",
            route_table_id,
        ])
        .await?;
        Ok(())
    }

    // ── Security group ────────────────────────────────────────────────────────

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        network_id: &str,
    ) -> Result<SecurityGroupDescriptor> {
        let spec = tag_spec("security-group", name);
        let resp = self
            .ec2(&[
                "create-security-group",
                "--group-name",
                name,
                "--description",
                description,
                "--vpc-id",
                network_id,
                "--tag-specifications",
                &spec,
            ])
            .await?;
        Ok(SecurityGroupDescriptor {
            id: str_at(&resp, "/GroupId")?,
        })
    }

    async fn security_group_present(&self, id: &str) -> Result<bool> {
        let resp = self
            .ec2_lookup(&["describe-security-groups", "--group-ids", id])
            .await?;
        Ok(resp.is_some_and(|r| r.pointer("/SecurityGroups/0/GroupId").is_some()))
    }

    async fn authorize_ingress(&self, id: &str, rules: &[IngressRule]) -> Result<()> {
        let permissions: Vec<String> = rules.iter().map(ip_permission).collect();
        let mut args: Vec<&str> = vec![
            "authorize-security-group-ingress",
            "--group-id",
            id,
            "--ip-permissions",
        ];
        args.extend(permissions.iter().map(String::as_str));
        self.ec2(&args).await?;
        Ok(())
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        self.ec2(&["delete-security-group", "--group-id", id])
            .await?;
        Ok(())
    }

    // ── Key pair ──────────────────────────────────────────────────────────────

    async fn create_key_pair(&self, name: &str) -> Result<KeyPairDescriptor> {
        let spec = tag_spec("key-pair", name);
        let resp = self
            .ec2(&[
                "create-key-pair",
                "--key-name",
                name,
                "--key-type",
                "ed25519",
                "--tag-specifications",
                &spec,
            ])
            .await?;
        Ok(KeyPairDescriptor {
            id: str_at(&resp, "/KeyPairId")?,
            name: str_at(&resp, "/KeyName")?,
            private_key_pem: str_at(&resp, "/KeyMaterial")?,
        })
    }

    async fn key_pair_present(&self, id: &str) -> Result<bool> {
        let resp = self
            .ec2_lookup(&["describe-key-pairs", "--key-pair-ids", id])
            .await?;
        Ok(resp.is_some_and(|r| r.pointer("/KeyPairs/0/KeyPairId").is_some()))
    }

    async fn delete_key_pair(&self, id: &str) -> Result<()> {
        self.ec2(&["delete-key-pair", "--key-pair-id", id]).await?;
        Ok(())
    }

    // ── Network interface ─────────────────────────────────────────────────────

    async fn create_network_interface(
        &self,
        name: &str,
        description: &str,
        subnet_id: &str,
        security_group_ids: &[String],
    ) -> Result<NetworkInterfaceDescriptor> {
        let spec = tag_spec("network-interface", name);
        let mut args: Vec<&str> = vec![
            "create-network-interface",
            "--subnet-id",
            subnet_id,
            "--description",
            description,
            "--tag-specifications",
            &spec,
            "--groups",
        ];
        args.extend(security_group_ids.iter().map(String::as_str));
        let resp = self.ec2(&args).await?;
        Ok(NetworkInterfaceDescriptor {
            id: str_at(&resp, "/NetworkInterface/NetworkInterfaceId")?,
        })
    }

    async fn network_interface_available(&self, id: &str) -> Result<bool> {
        let Some(resp) = self
            .ec2_lookup(&["describe-network-interfaces", "--network-interface-ids", id])
            .await?
        else {
            return Ok(false);
        };
        Ok(resp
            .pointer("/NetworkInterfaces/0/Status")
            .and_then(Value::as_str)
            == Some("available"))
    }

    async fn delete_network_interface(&self, id: &str) -> Result<()> {
        self.ec2(&["delete-network-interface", "--network-interface-id", id])
            .await?;
        Ok(())
    }

    // ── Public address ────────────────────────────────────────────────────────

    async fn allocate_public_address(&self, name: &str) -> Result<PublicAddressDescriptor> {
        let spec = tag_spec("elastic-ip", name);
        let resp = self
            .ec2(&[
                "allocate-address",
                "--domain",
                "vpc",
                "--tag-specifications",
                &spec,
            ])
            .await?;
        Ok(PublicAddressDescriptor {
            id: str_at(&resp, "/AllocationId")?,
            address: str_at(&resp, "/PublicIp")?,
            attached_to_instance: false,
            association_id: None,
        })
    }

    async fn attach_public_address(
        &self,
        allocation_id: &str,
        instance_id: &str,
    ) -> Result<String> {
        let resp = self
            .ec2(&[
                "associate-address",
                "--allocation-id",
                allocation_id,
                "--instance-id",
                instance_id,
            ])
            .await?;
        str_at(&resp, "/AssociationId")
    }

    async fn detach_public_address(&self, association_id: &str) -> Result<()> {
        self.ec2(&["disassociate-address", "--association-id", association_id])
            .await?;
        Ok(())
    }

    async fn release_public_address(&self, id: &str) -> Result<()> {
        self.ec2(&["release-address", "--allocation-id", id]).await?;
        Ok(())
    }

    // ── Instance ──────────────────────────────────────────────────────────────

    async fn create_instance(&self, spec: &InstanceSpec<'_>) -> Result<InstanceDescriptor> {
        let tags = tag_spec("instance", spec.name);
        let interface = format!(
            "DeviceIndex=0,NetworkInterfaceId={}",
            spec.network_interface_id
        );
        let block_device = format!(
            "DeviceName={},Ebs={{VolumeSize={ROOT_VOLUME_SIZE_GB}}}",
            spec.root_device
        );
        let resp = self
            .ec2(&[
                "run-instances",
                "--image-id",
                spec.image_id,
                "--instance-type",
                spec.machine_type,
                "--count",
                "1",
                "--network-interfaces",
                &interface,
                "--key-name",
                spec.key_pair_name,
                "--user-data",
                spec.user_data,
                "--block-device-mappings",
                &block_device,
                "--tag-specifications",
                &tags,
            ])
            .await?;
        Ok(InstanceDescriptor {
            id: str_at(&resp, "/Instances/0/InstanceId")?,
            machine_type: spec.machine_type.to_string(),
            boot_address: None,
            bootstrap: None,
        })
    }

    async fn instance_running(&self, id: &str) -> Result<bool> {
        let Some(resp) = self
            .ec2_lookup(&["describe-instances", "--instance-ids", id])
            .await?
        else {
            return Ok(false);
        };
        Ok(resp
            .pointer("/Reservations/0/Instances/0/State/Name")
            .and_then(Value::as_str)
            == Some("running"))
    }

    async fn instance_terminated(&self, id: &str) -> Result<bool> {
        // An instance the provider has already forgotten is as terminated
        // as it gets.
        let Some(resp) = self
            .ec2_lookup(&["describe-instances", "--instance-ids", id])
            .await?
        else {
            return Ok(true);
        };
        Ok(resp
            .pointer("/Reservations/0/Instances/0/State/Name")
            .and_then(Value::as_str)
            == Some("terminated"))
    }

    async fn lookup_instance_address(&self, id: &str) -> Result<String> {
        let resp = self.ec2(&["describe-instances", "--instance-ids", id]).await?;
        str_at(&resp, "/Reservations/0/Instances/0/PublicIpAddress")
            .context("instance has no public boot address yet")
    }

    async fn terminate_instance(&self, id: &str) -> Result<()> {
        self.ec2(&["terminate-instances", "--instance-ids", id])
            .await?;
        Ok(())
    }

    // ── Selection lookups ─────────────────────────────────────────────────────

    async fn lookup_machine_type(&self, name: &str) -> Result<MachineTypeInfo> {
        let result = self
            .ec2(&[
                "describe-instance-types",
                "--instance-types",
                name,
                "--filters",
                "Name=processor-info.supported-architecture,Values=x86_64,arm64",
                "Name=supported-root-device-type,Values=ebs",
                "Name=supported-usage-class,Values=on-demand",
            ])
            .await;
        let resp = match result {
            Ok(resp) => resp,
            Err(err) if err.to_string().contains("InvalidInstanceType") => {
                return Err(MachineTypeError::Unknown {
                    machine_type: name.to_string(),
                    region: self.region.clone(),
                }
                .into());
            }
            Err(err) => return Err(err),
        };
        let types = resp
            .pointer("/InstanceTypes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if types.is_empty() {
            return Err(MachineTypeError::UnsupportedArch {
                machine_type: name.to_string(),
                supported: "x86_64, arm64".to_string(),
            }
            .into());
        }
        let arm = resp
            .pointer("/InstanceTypes/0/ProcessorInfo/SupportedArchitectures")
            .and_then(Value::as_array)
            .is_some_and(|archs| archs.iter().any(|a| a.as_str() == Some("arm64")));
        Ok(MachineTypeInfo {
            name: name.to_string(),
            arch: if arm {
                MachineArch::Arm64
            } else {
                MachineArch::X86_64
            },
        })
    }

    async fn list_machine_images(&self, arch: MachineArch) -> Result<Vec<ImageCandidate>> {
        let pattern = match arch {
            MachineArch::X86_64 => UBUNTU_IMAGE_PATTERN_X86_64,
            MachineArch::Arm64 => UBUNTU_IMAGE_PATTERN_ARM64,
        };
        let name_filter = format!("Name=name,Values={pattern}");
        let arch_filter = format!("Name=architecture,Values={}", arch.as_str());
        let resp = self
            .ec2(&[
                "describe-images",
                "--owners",
                UBUNTU_IMAGE_OWNER,
                "--filters",
                &name_filter,
                &arch_filter,
                "Name=root-device-type,Values=ebs",
                "Name=virtualization-type,Values=hvm",
            ])
            .await?;
        let images = resp
            .pointer("/Images")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        images
            .iter()
            .map(|image| {
                Ok(ImageCandidate {
                    id: str_at(image, "/ImageId")?,
                    root_device: str_at(image, "/RootDeviceName")?,
                    created_at: str_at(image, "/CreationDate")?,
                })
            })
            .collect()
    }

    // ── Reconciliation ────────────────────────────────────────────────────────

    async fn find_resource(&self, role: ResourceRole, name: &str) -> Result<Option<String>> {
        let tag_filter = format!("Name=tag:Name,Values={name}");
        let (args, pointer): (Vec<&str>, &str) = match role {
            ResourceRole::Network => (
                vec!["describe-vpcs", "--filters", &tag_filter],
                "/Vpcs/0/VpcId",
            ),
            ResourceRole::Gateway => (
                vec!["describe-internet-gateways", "--filters", &tag_filter],
                "/InternetGateways/0/InternetGatewayId",
            ),
            ResourceRole::Subnet => (
                vec!["describe-subnets", "--filters", &tag_filter],
                "/Subnets/0/SubnetId",
            ),
            ResourceRole::RouteTable => (
                vec!["describe-route-tables", "--filters", &tag_filter],
                "/RouteTables/0/RouteTableId",
            ),
            ResourceRole::SecurityGroup => (
                vec!["describe-security-groups", "--filters", &tag_filter],
                "/SecurityGroups/0/GroupId",
            ),
            ResourceRole::KeyPair => (
                vec!["describe-key-pairs", "--filters", &tag_filter],
                "/KeyPairs/0/KeyPairId",
            ),
            ResourceRole::NetworkInterface => (
                vec!["describe-network-interfaces", "--filters", &tag_filter],
                "/NetworkInterfaces/0/NetworkInterfaceId",
            ),
            ResourceRole::PublicAddress => (
                vec!["describe-addresses", "--filters", &tag_filter],
                "/Addresses/0/AllocationId",
            ),
            ResourceRole::Instance => (
                vec![
                    "describe-instances",
                    "--filters",
                    &tag_filter,
                    "Name=instance-state-name,Values=pending,running",
                ],
                "/Reservations/0/Instances/0/InstanceId",
            ),
        };
        let Some(resp) = self.ec2_lookup(&args).await? else {
            return Ok(None);
        };
        Ok(resp
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_owned))
    }
}
