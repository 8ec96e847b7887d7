//! Edge distribution and DNS alias binding

use crate::error::ValidationError;
use crate::model::{CertificateHandle, NodeState, ResourceOutputs, field};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllowedMethods {
    GetHead,
    GetHeadOptions,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachedMethods {
    GetHead,
    GetHeadOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewerProtocolPolicy {
    AllowAll,
    HttpsOnly,
    RedirectToHttps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DistributionConfig {
    /// Load balancer endpoint used as the origin
    pub origin: String,
    pub certificate: String,
    pub domain_names: Vec<String>,
    pub allowed_methods: AllowedMethods,
    pub cached_methods: CachedMethods,
    pub origin_request_policy: String,
    pub viewer_protocol_policy: ViewerProtocolPolicy,
    pub enable_ipv6: bool,
}

/// Distribution in front of a load balancer
///
/// The certificate must be issued in the edge region.
pub fn distribution_config(
    node: &str,
    lb_endpoint: &str,
    certificate: &CertificateHandle,
    edge_region: &str,
    domain_names: Vec<String>,
) -> Result<DistributionConfig, ValidationError> {
    if lb_endpoint.is_empty() {
        return Err(ValidationError::InvalidField {
            node: node.to_string(),
            field: "origin".to_string(),
            reason: "load balancer exposes no endpoint".to_string(),
        });
    }
    if certificate.region != edge_region {
        return Err(ValidationError::RegionMismatch {
            node: node.to_string(),
            certificate: certificate.provider_id.clone(),
            expected: edge_region.to_string(),
            actual: certificate.region.clone(),
        });
    }
    if !certificate.is_issued() {
        return Err(ValidationError::CertificateNotIssued(
            certificate.provider_id.clone(),
        ));
    }

    let domain_names = if domain_names.is_empty() {
        vec![certificate.domain.clone()]
    } else {
        domain_names
    };

    Ok(DistributionConfig {
        origin: lb_endpoint.to_string(),
        certificate: certificate.provider_id.clone(),
        domain_names,
        allowed_methods: AllowedMethods::All,
        cached_methods: CachedMethods::GetHeadOptions,
        origin_request_policy: "all-viewer".to_string(),
        viewer_protocol_policy: ViewerProtocolPolicy::RedirectToHttps,
        enable_ipv6: false,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[default]
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            other => Err(format!("unsupported alias record type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AliasRecord {
    pub zone: String,
    /// Record name; the zone apex when absent
    pub record_name: Option<String>,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Edge endpoint of the distribution
    pub target: String,
}

/// Alias record pointing at a ready distribution
pub fn alias_record(
    node: &str,
    distribution: &ResourceOutputs,
    zone: &str,
    record_name: Option<&str>,
    record_type: RecordType,
) -> Result<AliasRecord, ValidationError> {
    if distribution.state != NodeState::Ready {
        return Err(ValidationError::DependencyNotReady {
            node: node.to_string(),
            dependency: distribution.node_id.clone(),
        });
    }
    let target = distribution
        .attribute_str(field::DOMAIN_NAME)
        .ok_or_else(|| ValidationError::InvalidField {
            node: node.to_string(),
            field: "distribution".to_string(),
            reason: format!("{} exposes no domain name", distribution.node_id),
        })?;
    if zone.is_empty() {
        return Err(ValidationError::InvalidField {
            node: node.to_string(),
            field: "zone".to_string(),
            reason: "alias record needs a hosted zone".to_string(),
        });
    }

    Ok(AliasRecord {
        zone: zone.to_string(),
        record_name: record_name.map(str::to_string),
        record_type,
        target: target.to_string(),
    })
}
