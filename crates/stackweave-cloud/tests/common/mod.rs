use stackweave_cloud::{ExecutorOptions, InMemoryProvider, PollConfig, RetryConfig, resolve_lookups};
use stackweave_core::{LookupKind, ResourceKind, Topology, TopologyBuilder, lookup_requests, parse_stack_string};
use std::sync::Arc;
use std::time::Duration;

pub const STACK: &str = "TestAwsManagedPL";

/// Network adopted by lookup, a web server behind a load balancer with an
/// HTTPS listener, and an edge distribution with an alias record.
pub const SOURCE_STACK: &str = r#"
stack "TestAwsManagedPL"

options {
    vpc-id "vpc-21d8cd46"
    subnets "subnet-d9b34abf" "subnet-de0de396"
    domain-name "test-pl.example.org"
    main-domain-name "example.org"
    instance-type "small"
    instance-class "t3"
    ami "bitnami-nginx-1.20.2"
    key-name "staging-key"
    region "ap-southeast-1"
}

network "vpc"

security-group "ec2-sg" {
    network "vpc"
    ingress protocol="tcp" port=80 peer="172.31.0.0/16"
}

security-group "alb-sg" {
    network "vpc"
    ingress protocol="tcp" port=443 peer="0.0.0.0/0"
}

compute "ec2" {
    network "vpc"
    security-group "ec2-sg"
}

target-group "tg" {
    network "vpc"
    target "ec2"
    port 80
}

load-balancer "alb" {
    security-group "alb-sg"
}

certificate "alb-cert"

certificate "edge-cert" region="global"

listener "https" {
    load-balancer "alb"
    certificate "alb-cert"
    target-group "tg"
}

distribution "cdn" {
    load-balancer "alb"
    certificate "edge-cert"
}

dns-record "alias" {
    distribution "cdn"
}
"#;

/// Two listeners whose certificates resolve to the same key
pub const SHARED_CERT_STACK: &str = r#"
stack "shared"

options {
    region "r1"
    domain-name "app.example.org"
    subnets "subnet-1"
}

security-group "sg" {
    ingress protocol="tcp" port=443 peer="0.0.0.0/0"
}

compute "web"

target-group "tg" {
    target "web"
}

load-balancer "lb" {
    security-group "sg"
}

certificate "cert-a"
certificate "cert-b"

listener "a" {
    load-balancer "lb"
    certificate "cert-a"
    target-group "tg"
}

listener "b" {
    load-balancer "lb"
    certificate "cert-b"
    target-group "tg"
    port 8443
}
"#;

/// Namespaced node id
pub fn id(local: &str) -> String {
    format!("{}-{}", STACK, local)
}

pub fn provider() -> InMemoryProvider {
    InMemoryProvider::new()
        .with_lookup(ResourceKind::Network, "vpc-21d8cd46", "vpc-21d8cd46")
        .with_lookup(LookupKind::MachineImage, "bitnami-nginx-1.20.2", "ami-0f7719e8b7ba25c61")
        .with_lookup(LookupKind::HostedZone, "example.org", "Z2FDTNDATAQYW2")
}

pub fn options() -> ExecutorOptions {
    ExecutorOptions {
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            backoff_multiplier: 2.0,
        },
        deployment: PollConfig::new(Duration::from_secs(1), Duration::from_secs(60)),
        certificate: PollConfig::new(Duration::from_secs(5), Duration::from_secs(120)),
        max_concurrency: None,
    }
}

pub async fn topology(provider: &InMemoryProvider, kdl: &str) -> Arc<Topology> {
    let stack = parse_stack_string(kdl, "default".to_string()).unwrap();
    let requests = lookup_requests(&stack.resources, &stack.options);
    let lookups = resolve_lookups(provider, &requests).await.unwrap();
    let topology = TopologyBuilder::for_stack(&stack)
        .with_lookups(lookups)
        .build_stack(&stack)
        .unwrap();
    Arc::new(topology)
}
