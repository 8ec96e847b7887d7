//! Execution reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stackweave_core::{CertificateHandle, NodeState, ResourceKind, field};
use std::collections::BTreeMap;

/// One recorded state change
///
/// `seq` is global across the run, so transitions of different nodes can be
/// ordered against each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub seq: u64,
    pub node: String,
    pub from: NodeState,
    pub to: NodeState,
    pub at: DateTime<Utc>,
}

/// Final result of a single node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node_id: String,
    pub kind: ResourceKind,
    pub region: String,
    pub state: NodeState,
    pub provider_id: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Provider calls made to create the resource, retries included
    pub attempts: u32,
    pub error: Option<String>,
    /// Failed or blocked dependency that stopped this node
    pub blocked_by: Option<String>,
    /// Blocked because the run was aborted
    #[serde(default)]
    pub cancelled: bool,
}

impl NodeOutcome {
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Public endpoints produced by a run, keyed by node id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub load_balancers: BTreeMap<String, String>,
    pub distributions: BTreeMap<String, String>,
    pub records: BTreeMap<String, String>,
}

impl Endpoints {
    pub fn is_empty(&self) -> bool {
        self.load_balancers.is_empty() && self.distributions.is_empty() && self.records.is_empty()
    }
}

impl std::fmt::Display for Endpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (node, dns) in &self.load_balancers {
            writeln!(f, "load balancer  {}  {}", node, dns)?;
        }
        for (node, domain) in &self.distributions {
            writeln!(f, "distribution   {}  {}", node, domain)?;
        }
        for (node, target) in &self.records {
            writeln!(f, "record         {}  {}", node, target)?;
        }
        Ok(())
    }
}

/// Result of a provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub stack: String,

    /// Outcomes in creation order
    pub outcomes: Vec<NodeOutcome>,

    /// Every state change, ordered by `seq`
    pub transitions: Vec<Transition>,

    pub certificates: Vec<CertificateHandle>,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ExecutionReport {
    /// Whether every node reached `Ready`
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.state == NodeState::Ready)
    }

    pub fn outcome(&self, node_id: &str) -> Option<&NodeOutcome> {
        self.outcomes.iter().find(|o| o.node_id == node_id)
    }

    pub fn state(&self, node_id: &str) -> Option<NodeState> {
        self.outcome(node_id).map(|o| o.state)
    }

    pub fn failed(&self) -> Vec<&NodeOutcome> {
        self.with_state(NodeState::Failed)
    }

    pub fn blocked(&self) -> Vec<&NodeOutcome> {
        self.with_state(NodeState::Blocked)
    }

    pub fn cancelled(&self) -> Vec<&NodeOutcome> {
        self.outcomes.iter().filter(|o| o.cancelled).collect()
    }

    fn with_state(&self, state: NodeState) -> Vec<&NodeOutcome> {
        self.outcomes.iter().filter(|o| o.state == state).collect()
    }

    /// Transitions of one node in order
    pub fn transitions_of(&self, node_id: &str) -> Vec<&Transition> {
        self.transitions.iter().filter(|t| t.node == node_id).collect()
    }

    /// Sequence number at which a node entered `state`
    pub fn entered_at(&self, node_id: &str, state: NodeState) -> Option<u64> {
        self.transitions
            .iter()
            .find(|t| t.node == node_id && t.to == state)
            .map(|t| t.seq)
    }

    /// Load balancer DNS names, distribution domains and alias record targets
    pub fn endpoints(&self) -> Endpoints {
        let mut endpoints = Endpoints::default();
        for outcome in self.outcomes.iter().filter(|o| o.state == NodeState::Ready) {
            let (map, key) = match outcome.kind {
                ResourceKind::LoadBalancer => (&mut endpoints.load_balancers, field::DNS_NAME),
                ResourceKind::Distribution => (&mut endpoints.distributions, field::DOMAIN_NAME),
                ResourceKind::DnsRecord => (&mut endpoints.records, field::TARGET),
                _ => continue,
            };
            if let Some(value) = outcome.attribute_str(key) {
                map.insert(outcome.node_id.clone(), value.to_string());
            }
        }
        endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(id: &str, kind: ResourceKind, state: NodeState) -> NodeOutcome {
        NodeOutcome {
            node_id: id.to_string(),
            kind,
            region: "r1".to_string(),
            state,
            provider_id: None,
            attributes: Map::new(),
            attempts: 0,
            error: None,
            blocked_by: None,
            cancelled: false,
        }
    }

    fn report(outcomes: Vec<NodeOutcome>) -> ExecutionReport {
        let now = Utc::now();
        ExecutionReport {
            stack: "shop".to_string(),
            outcomes,
            transitions: Vec::new(),
            certificates: Vec::new(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_success_requires_every_node_ready() {
        let ok = report(vec![outcome("a", ResourceKind::Network, NodeState::Ready)]);
        assert!(ok.is_success());

        let failed = report(vec![
            outcome("a", ResourceKind::Network, NodeState::Failed),
            outcome("b", ResourceKind::Subnet, NodeState::Blocked),
        ]);
        assert!(!failed.is_success());
        assert_eq!(failed.failed().len(), 1);
        assert_eq!(failed.blocked()[0].node_id, "b");
    }

    #[test]
    fn test_endpoints() {
        let mut lb = outcome("lb", ResourceKind::LoadBalancer, NodeState::Ready);
        lb.attributes
            .insert("dns-name".to_string(), json!("lb-1.r1.elb.example.net"));
        let mut dist = outcome("dist", ResourceKind::Distribution, NodeState::Failed);
        dist.attributes
            .insert("domain-name".to_string(), json!("d1.edge.example.net"));

        let endpoints = report(vec![lb, dist]).endpoints();
        assert_eq!(endpoints.load_balancers["lb"], "lb-1.r1.elb.example.net");
        assert!(endpoints.distributions.is_empty());
        assert!(endpoints.to_string().contains("lb-1.r1.elb.example.net"));
    }

    #[test]
    fn test_record_endpoint_is_alias_target() {
        let mut alias = outcome("alias", ResourceKind::DnsRecord, NodeState::Ready);
        alias
            .attributes
            .insert("fqdn".to_string(), json!("test-pl.example.org"));
        alias
            .attributes
            .insert("target".to_string(), json!("d1.edge.example.net"));

        let endpoints = report(vec![alias]).endpoints();
        assert_eq!(endpoints.records["alias"], "d1.edge.example.net");
    }
}
