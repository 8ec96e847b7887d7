//! Resource kinds

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of managed resource a node declares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Subnet,
    SecurityGroup,
    Compute,
    Certificate,
    TargetGroup,
    LoadBalancer,
    Listener,
    Distribution,
    DnsRecord,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Network,
        ResourceKind::Subnet,
        ResourceKind::SecurityGroup,
        ResourceKind::Compute,
        ResourceKind::Certificate,
        ResourceKind::TargetGroup,
        ResourceKind::LoadBalancer,
        ResourceKind::Listener,
        ResourceKind::Distribution,
        ResourceKind::DnsRecord,
    ];

    /// Name used in stack files and in provider calls
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::Compute => "compute",
            ResourceKind::Certificate => "certificate",
            ResourceKind::TargetGroup => "target-group",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::Listener => "listener",
            ResourceKind::Distribution => "distribution",
            ResourceKind::DnsRecord => "dns-record",
        }
    }

    /// Accepts both kebab-case and snake_case names
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
    }

    /// Distributions and DNS records live at the edge rather than in a region
    pub fn is_global(&self) -> bool {
        matches!(self, ResourceKind::Distribution | ResourceKind::DnsRecord)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ValidationError::UnknownKind(s.to_string()))
    }
}

/// What a pre-build lookup searches the provider for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LookupKind {
    /// An existing resource adopted as a node
    Resource(ResourceKind),
    /// A machine image referenced by name from a compute node
    MachineImage,
    /// A hosted zone referenced by domain
    HostedZone,
}

impl From<ResourceKind> for LookupKind {
    fn from(kind: ResourceKind) -> Self {
        LookupKind::Resource(kind)
    }
}

impl std::fmt::Display for LookupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupKind::Resource(kind) => write!(f, "{}", kind),
            LookupKind::MachineImage => f.write_str("machine-image"),
            LookupKind::HostedZone => f.write_str("hosted-zone"),
        }
    }
}
