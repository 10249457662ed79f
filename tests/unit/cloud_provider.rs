//! Cloud CLI provider: argument construction, JSON parsing, and not-found
//! semantics, against a mock command runner.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::Output;

use anyhow::Result;
use cirrus_cli::application::ports::{CommandRunner, ResourceProvider};
use cirrus_cli::domain::account::{AccountConfig, Credentials};
use cirrus_cli::domain::error::MachineTypeError;
use cirrus_cli::domain::resources::{MachineArch, ResourceRole};
use cirrus_cli::infra::cloud::CloudCliProvider;

use crate::helpers::{err_output, ok_output};

#[derive(Default)]
struct MockRunner {
    calls: RefCell<Vec<(String, Vec<String>, Vec<(String, String)>)>>,
    responses: RefCell<VecDeque<Output>>,
}

impl MockRunner {
    fn new() -> Self {
        Self::default()
    }

    fn respond_json(&self, json: &str) {
        self.responses
            .borrow_mut()
            .push_back(ok_output(json.as_bytes()));
    }

    fn respond_err(&self, stderr: &str) {
        self.responses
            .borrow_mut()
            .push_back(err_output(254, stderr.as_bytes()));
    }

    fn last_args(&self) -> Vec<String> {
        self.calls.borrow().last().expect("at least one call").1.clone()
    }
}

impl CommandRunner for MockRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_env(program, args, &[]).await
    }

    async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        envs: &[(&str, String)],
    ) -> Result<Output> {
        self.calls.borrow_mut().push((
            program.to_string(),
            args.iter().map(|a| (*a).to_string()).collect(),
            envs.iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        ));
        Ok(self
            .responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ok_output(b"{}")))
    }
}

fn account() -> AccountConfig {
    AccountConfig {
        credentials: Credentials {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "s3cret".to_string(),
        },
        region: "eu-west-3".to_string(),
    }
}

fn provider(runner: MockRunner) -> CloudCliProvider<MockRunner> {
    CloudCliProvider::with_runner(runner, &account())
}

#[tokio::test]
async fn create_network_builds_the_expected_invocation() {
    let runner = MockRunner::new();
    runner.respond_json(r#"{"Vpc": {"VpcId": "vpc-123"}}"#);
    let provider = provider(runner);

    let network = provider
        .create_network("cirrus-default-network", "10.0.0.0/16")
        .await
        .expect("network");
    assert_eq!(network.id, "vpc-123");
}

#[tokio::test]
async fn every_invocation_is_scoped_to_the_region_with_json_output() {
    let runner = MockRunner::new();
    runner.respond_json(r#"{"Vpc": {"VpcId": "vpc-123"}}"#);
    let provider = provider(runner);
    provider
        .create_network("cirrus-default-network", "10.0.0.0/16")
        .await
        .expect("network");

    let (program, args, envs) = provider_calls(&provider)[0].clone();
    assert_eq!(program, "aws");
    assert_eq!(args[0], "ec2");
    assert_eq!(args[1], "create-vpc");
    assert!(contains_pair(&args, "--cidr-block", "10.0.0.0/16"));
    assert!(contains_pair(&args, "--region", "eu-west-3"));
    assert!(contains_pair(&args, "--output", "json"));
    assert!(
        args.iter()
            .any(|a| a.contains("Key=Name,Value=cirrus-default-network"))
    );
    // Credentials travel as environment variables, never on the command line.
    assert!(envs.iter().any(|(k, _)| k == "AWS_ACCESS_KEY_ID"));
    assert!(!args.iter().any(|a| a.contains("s3cret")));
}

#[tokio::test]
async fn probe_reads_not_found_as_not_stable() {
    let runner = MockRunner::new();
    runner.respond_err("An error occurred (InvalidVpcID.NotFound) when calling DescribeVpcs");
    let provider = provider(runner);
    assert!(!provider.network_available("vpc-404").await.expect("probe"));
}

#[tokio::test]
async fn probe_reads_available_state() {
    let runner = MockRunner::new();
    runner.respond_json(r#"{"Vpcs": [{"VpcId": "vpc-1", "State": "available"}]}"#);
    let provider = provider(runner);
    assert!(provider.network_available("vpc-1").await.expect("probe"));
}

#[tokio::test]
async fn probe_propagates_other_provider_failures() {
    let runner = MockRunner::new();
    runner.respond_err("An error occurred (AuthFailure)");
    let provider = provider(runner);
    assert!(provider.network_available("vpc-1").await.is_err());
}

#[tokio::test]
async fn a_forgotten_instance_reads_as_terminated() {
    let runner = MockRunner::new();
    runner.respond_err("An error occurred (InvalidInstanceID.NotFound)");
    let provider = provider(runner);
    assert!(provider.instance_terminated("i-404").await.expect("probe"));
}

#[tokio::test]
async fn find_resource_returns_none_when_nothing_matches() {
    let runner = MockRunner::new();
    runner.respond_json(r#"{"Vpcs": []}"#);
    let provider = provider(runner);
    assert_eq!(
        provider
            .find_resource(ResourceRole::Network, "cirrus-default-network")
            .await
            .expect("lookup"),
        None
    );
}

#[tokio::test]
async fn find_resource_filters_by_the_deterministic_name() {
    let runner = MockRunner::new();
    runner.respond_json(r#"{"Vpcs": [{"VpcId": "vpc-orphan"}]}"#);
    let provider = provider(runner);
    let found = provider
        .find_resource(ResourceRole::Network, "cirrus-default-network")
        .await
        .expect("lookup");
    assert_eq!(found.as_deref(), Some("vpc-orphan"));
    let args = last_provider_args(&provider);
    assert!(
        args.iter()
            .any(|a| a == "Name=tag:Name,Values=cirrus-default-network")
    );
}

#[tokio::test]
async fn unknown_machine_type_is_a_typed_error() {
    let runner = MockRunner::new();
    runner.respond_err("An error occurred (InvalidInstanceType)");
    let provider = provider(runner);
    let err = provider
        .lookup_machine_type("t9.gigantic")
        .await
        .expect_err("must fail");
    match err.downcast::<MachineTypeError>().expect("typed error") {
        MachineTypeError::Unknown {
            machine_type,
            region,
        } => {
            assert_eq!(machine_type, "t9.gigantic");
            assert_eq!(region, "eu-west-3");
        }
        other => panic!("expected Unknown, got {other:?}"),
    }
}

#[tokio::test]
async fn machine_type_with_no_match_is_unsupported_arch() {
    let runner = MockRunner::new();
    runner.respond_json(r#"{"InstanceTypes": []}"#);
    let provider = provider(runner);
    let err = provider
        .lookup_machine_type("mac2.metal")
        .await
        .expect_err("must fail");
    assert!(matches!(
        err.downcast::<MachineTypeError>().expect("typed error"),
        MachineTypeError::UnsupportedArch { .. }
    ));
}

#[tokio::test]
async fn machine_type_arch_is_read_from_the_response() {
    let runner = MockRunner::new();
    runner.respond_json(
        r#"{"InstanceTypes": [{"ProcessorInfo": {"SupportedArchitectures": ["arm64"]}}]}"#,
    );
    let provider = provider(runner);
    let info = provider.lookup_machine_type("t4g.small").await.expect("info");
    assert_eq!(info.arch, MachineArch::Arm64);
}

#[tokio::test]
async fn machine_images_are_listed_with_their_creation_dates() {
    let runner = MockRunner::new();
    runner.respond_json(
        r#"{"Images": [
            {"ImageId": "img-old", "RootDeviceName": "/dev/sda1", "CreationDate": "2023-01-01T00:00:00Z"},
            {"ImageId": "img-new", "RootDeviceName": "/dev/sda1", "CreationDate": "2024-01-01T00:00:00Z"}
        ]}"#,
    );
    let provider = provider(runner);
    let candidates = provider
        .list_machine_images(MachineArch::X86_64)
        .await
        .expect("candidates");
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[1].id, "img-new");
    let args = last_provider_args(&provider);
    assert!(args.iter().any(|a| a.contains("amd64-server")));
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn provider_calls(
    provider: &CloudCliProvider<MockRunner>,
) -> Vec<(String, Vec<String>, Vec<(String, String)>)> {
    provider.runner().calls.borrow().clone()
}

fn last_provider_args(provider: &CloudCliProvider<MockRunner>) -> Vec<String> {
    provider.runner().last_args()
}

fn contains_pair(args: &[String], flag: &str, value: &str) -> bool {
    args.windows(2)
        .any(|pair| pair[0] == flag && pair[1] == value)
}
