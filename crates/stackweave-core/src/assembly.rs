//! Target and load-balancer assembly
//!
//! Builds provider configs for target groups, load balancers and HTTPS
//! listeners. Routing is forward-only to a single target group.

use crate::error::ValidationError;
use crate::model::CertificateHandle;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;

pub const DEFAULT_TARGET_PORT: u16 = 80;
pub const DEFAULT_LISTENER_PORT: u16 = 443;
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicationProtocol {
    Http,
    Https,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Ip,
}

/// Target group settings, read from the node config with defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TargetGroupSpec {
    pub port: u16,
    pub protocol: ApplicationProtocol,
    pub target_type: TargetType,
    pub health_check_path: String,
}

impl Default for TargetGroupSpec {
    fn default() -> Self {
        Self {
            port: DEFAULT_TARGET_PORT,
            protocol: ApplicationProtocol::Http,
            target_type: TargetType::Ip,
            health_check_path: DEFAULT_HEALTH_CHECK_PATH.to_string(),
        }
    }
}

impl TargetGroupSpec {
    /// Read the recognised keys of a target group config
    pub fn from_config(node: &str, config: &Map<String, Value>) -> Result<Self, ValidationError> {
        let known: Map<String, Value> = config
            .iter()
            .filter(|(key, _)| {
                matches!(
                    key.as_str(),
                    "port" | "protocol" | "target-type" | "health-check-path"
                )
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(Value::Object(known)).map_err(|e| ValidationError::InvalidField {
            node: node.to_string(),
            field: "target-group".to_string(),
            reason: e.to_string(),
        })
    }
}

/// A compute address registered in a target group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetBinding {
    pub address: IpAddr,
    pub port: u16,
}

/// Bind a compute node's private address to a target group
pub fn bind_target(
    node: &str,
    address: &str,
    spec: &TargetGroupSpec,
) -> Result<TargetBinding, ValidationError> {
    let address: IpAddr = address.parse().map_err(|_| ValidationError::InvalidField {
        node: node.to_string(),
        field: "target".to_string(),
        reason: format!("'{}' is not an IP address", address),
    })?;
    Ok(TargetBinding {
        address,
        port: spec.port,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoadBalancerConfig {
    pub subnets: Vec<String>,
    pub security_group: String,
    pub internet_facing: bool,
}

/// Load balancer config over de-duplicated subnets
pub fn load_balancer_config(
    node: &str,
    subnets: &[String],
    security_group: &str,
    internet_facing: bool,
) -> Result<LoadBalancerConfig, ValidationError> {
    let mut unique: Vec<String> = Vec::with_capacity(subnets.len());
    for subnet in subnets {
        if !unique.contains(subnet) {
            unique.push(subnet.clone());
        }
    }
    if unique.is_empty() {
        return Err(ValidationError::InvalidField {
            node: node.to_string(),
            field: "subnets".to_string(),
            reason: "a load balancer needs at least one subnet".to_string(),
        });
    }
    if security_group.is_empty() {
        return Err(ValidationError::InvalidField {
            node: node.to_string(),
            field: "security-group".to_string(),
            reason: "a load balancer needs a security group".to_string(),
        });
    }

    Ok(LoadBalancerConfig {
        subnets: unique,
        security_group: security_group.to_string(),
        internet_facing,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListenerConfig {
    pub load_balancer: String,
    pub port: u16,
    pub protocol: ApplicationProtocol,
    pub certificate: String,
    /// Forward target; exactly one target group
    pub target_group: String,
    /// Listeners never open the load balancer's security group themselves
    pub open: bool,
}

/// HTTPS listener forwarding to one target group
///
/// The certificate must be issued and live in the load balancer's region.
pub fn listener_config(
    node: &str,
    lb_region: &str,
    load_balancer: &str,
    certificate: &CertificateHandle,
    target_group: &str,
    port: Option<u16>,
) -> Result<ListenerConfig, ValidationError> {
    if certificate.region != lb_region {
        return Err(ValidationError::RegionMismatch {
            node: node.to_string(),
            certificate: certificate.provider_id.clone(),
            expected: lb_region.to_string(),
            actual: certificate.region.clone(),
        });
    }
    if !certificate.is_issued() {
        return Err(ValidationError::CertificateNotIssued(
            certificate.provider_id.clone(),
        ));
    }

    Ok(ListenerConfig {
        load_balancer: load_balancer.to_string(),
        port: port.unwrap_or(DEFAULT_LISTENER_PORT),
        protocol: ApplicationProtocol::Https,
        certificate: certificate.provider_id.clone(),
        target_group: target_group.to_string(),
        open: false,
    })
}
