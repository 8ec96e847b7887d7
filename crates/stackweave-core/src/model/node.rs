//! Resource nodes and their lifecycle state

use super::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Config keys the engine itself reads or writes
pub mod field {
    pub const NAME: &str = "name";
    pub const REGION: &str = "region";
    pub const LOOKUP: &str = "lookup";
    pub const PROVIDER_ID: &str = "provider-id";
    pub const INGRESS: &str = "ingress";
    pub const POLICY: &str = "policy";
    pub const DOMAIN: &str = "domain";
    pub const SAN: &str = "san";
    pub const AMI: &str = "ami";
    pub const ZONE: &str = "zone";

    // Ids of looked-up references
    pub const IMAGE_ID: &str = "image-id";
    pub const ZONE_ID: &str = "zone-id";

    // Output attributes
    pub const PRIVATE_IP: &str = "private-ip";
    pub const DNS_NAME: &str = "dns-name";
    pub const DOMAIN_NAME: &str = "domain-name";
    pub const FQDN: &str = "fqdn";
    pub const TARGET: &str = "target";
}

/// Lifecycle state of a node during a provisioning run
///
/// ```text
/// Pending -> Resolving -> Provisioning -> Validating -> Ready
///               |              |              |
///               v              v              v
///            Blocked        Failed         Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Resolving,
    Provisioning,
    Validating,
    Ready,
    Blocked,
    Failed,
}

impl NodeState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Pending, Resolving)
                | (Resolving, Provisioning)
                | (Resolving, Blocked)
                | (Provisioning, Validating)
                | (Provisioning, Failed)
                | (Validating, Ready)
                | (Validating, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Ready | NodeState::Blocked | NodeState::Failed)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeState::Pending => "pending",
            NodeState::Resolving => "resolving",
            NodeState::Provisioning => "provisioning",
            NodeState::Validating => "validating",
            NodeState::Ready => "ready",
            NodeState::Blocked => "blocked",
            NodeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A single managed resource's declared intent plus lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Namespaced, unique node id
    pub id: String,

    pub kind: ResourceKind,

    pub region: String,

    /// Kind-specific configuration
    pub config: Map<String, Value>,

    /// Ids of the nodes this node depends on
    pub depends_on: BTreeSet<String>,

    pub state: NodeState,
}

impl ResourceNode {
    pub fn new(id: impl Into<String>, kind: ResourceKind, region: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            region: region.into(),
            config: Map::new(),
            depends_on: BTreeSet::new(),
            state: NodeState::Pending,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Filter used to adopt an existing provider resource instead of creating one
    pub fn lookup_filter(&self) -> Option<&str> {
        self.config_str(field::LOOKUP)
    }

    pub fn is_lookup(&self) -> bool {
        self.lookup_filter().is_some()
    }
}

/// Directed edge `dependent -> dependency`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent: String,
    pub dependency: String,
}

/// What a node exposes to its dependents once it is ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutputs {
    pub node_id: String,
    pub kind: ResourceKind,
    pub region: String,
    pub state: NodeState,
    pub provider_id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ResourceOutputs {
    pub fn ready(node: &ResourceNode, provider_id: impl Into<String>) -> Self {
        Self {
            node_id: node.id.clone(),
            kind: node.kind,
            region: node.region.clone(),
            state: NodeState::Ready,
            provider_id: provider_id.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}
