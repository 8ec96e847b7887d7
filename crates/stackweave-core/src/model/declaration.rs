//! Stack declarations
//!
//! The static description a topology is built from.

use super::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A single resource as written in the stack file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    /// Local id (not yet namespaced)
    pub id: String,

    pub kind: ResourceKind,

    /// Region override; falls back to the stack region
    pub region: Option<String>,

    /// Explicit dependencies by local id
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub config: Map<String, Value>,
}

impl Declaration {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            region: None,
            depends_on: Vec::new(),
            config: Map::new(),
        }
    }

    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// How the stack selects its network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkSelector {
    VpcId(String),
    Default,
}

/// Top-level stack options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackOptions {
    pub network: Option<NetworkSelector>,

    /// External subnet ids used by load balancers that declare none
    #[serde(default)]
    pub subnets: Vec<String>,

    /// Public domain served by the stack (e.g. "app.example.org")
    pub domain_name: Option<String>,

    /// Hosted zone domain (e.g. "example.org")
    pub main_domain_name: Option<String>,

    /// Instance size, e.g. "small"
    pub instance_type: Option<String>,

    /// Instance family, e.g. "t3"
    pub instance_class: Option<String>,

    pub ami_reference: Option<String>,

    pub key_name: Option<String>,

    /// Default region for regional resources
    pub region: Option<String>,

    /// Region that hosts certificates for edge distributions
    pub edge_region: Option<String>,
}

impl StackOptions {
    /// Combined instance spec such as "t3.small"
    pub fn instance_spec(&self) -> Option<String> {
        match (&self.instance_class, &self.instance_type) {
            (Some(class), Some(size)) => Some(format!("{}.{}", class, size)),
            (None, Some(size)) => Some(size.clone()),
            (Some(class), None) => Some(class.clone()),
            (None, None) => None,
        }
    }

    /// Fill config keys a declaration left out from the stack options
    pub fn apply_defaults(&self, kind: ResourceKind, config: &mut Map<String, Value>) {
        let mut default = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                config.entry(key.to_string()).or_insert(value);
            }
        };

        match kind {
            ResourceKind::Network => {
                let lookup = match &self.network {
                    Some(NetworkSelector::VpcId(id)) => Some(json!(id)),
                    Some(NetworkSelector::Default) => Some(json!("default")),
                    None => None,
                };
                default("lookup", lookup);
            }
            ResourceKind::Compute => {
                default("instance-type", self.instance_spec().map(Value::from));
                default("ami", self.ami_reference.clone().map(Value::from));
                default("key-name", self.key_name.clone().map(Value::from));
            }
            ResourceKind::Certificate => {
                default("domain", self.domain_name.clone().map(Value::from));
                default("zone", self.main_domain_name.clone().map(Value::from));
            }
            ResourceKind::LoadBalancer => {
                if !self.subnets.is_empty() {
                    default("subnets", Some(json!(self.subnets)));
                }
            }
            ResourceKind::Distribution => {
                default(
                    "domain-names",
                    self.domain_name.clone().map(|d| json!([d])),
                );
            }
            ResourceKind::DnsRecord => {
                default("zone", self.main_domain_name.clone().map(Value::from));
                default("record-name", self.domain_name.clone().map(Value::from));
            }
            _ => {}
        }
    }
}

/// A parsed stack file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackDeclaration {
    /// Stack name, used as the node id namespace
    pub name: String,

    pub options: StackOptions,

    /// Resources in declaration order
    pub resources: Vec<Declaration>,
}
