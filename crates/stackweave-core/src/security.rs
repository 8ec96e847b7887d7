//! Security policy resolver
//!
//! Compiles the ingress rules declared on security groups into validated
//! policies. Rules are never narrowed implicitly: risky but well-formed rules
//! compile and are reported as [`PolicyWarning`]s.

use crate::error::ValidationError;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::str::FromStr;

/// Ports that should not normally be reachable from any address
pub const SENSITIVE_PORTS: [u16; 6] = [22, 3389, 3306, 5432, 6379, 27017];

/// A rule as declared, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityRuleSpec {
    #[serde(default)]
    pub group_id: String,
    pub direction: Option<String>,
    #[serde(default)]
    pub protocol: String,
    pub port: Option<i64>,
    pub from_port: Option<i64>,
    pub to_port: Option<i64>,
    #[serde(default)]
    pub peer: String,
}

impl SecurityRuleSpec {
    pub fn tcp(group_id: impl Into<String>, port: u16, peer: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            protocol: "tcp".to_string(),
            port: Some(i64::from(port)),
            peer: peer.into(),
            ..Default::default()
        }
    }

    /// Read a rule from a security group's `ingress` config entry
    pub fn from_value(group_id: &str, value: &Value) -> Result<Self, ValidationError> {
        let mut spec: SecurityRuleSpec =
            serde_json::from_value(value.clone()).map_err(|e| ValidationError::InvalidField {
                node: group_id.to_string(),
                field: "ingress".to_string(),
                reason: e.to_string(),
            })?;
        spec.group_id = group_id.to_string();
        Ok(spec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

impl Protocol {
    fn uses_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" | "6" => Ok(Protocol::Tcp),
            "udp" | "17" => Ok(Protocol::Udp),
            "icmp" | "1" => Ok(Protocol::Icmp),
            "all" | "-1" => Ok(Protocol::All),
            _ => Err(()),
        }
    }
}

/// Inclusive port range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub low: u16,
    pub high: u16,
}

impl PortRange {
    pub const ALL: PortRange = PortRange {
        low: 0,
        high: u16::MAX,
    };

    pub fn single(port: u16) -> Self {
        Self {
            low: port,
            high: port,
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.low..=self.high).contains(&port)
    }

    pub fn overlaps(&self, other: &PortRange) -> bool {
        self.low <= other.high && other.low <= self.high
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

/// Source of allowed traffic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Peer {
    Cidr(IpNetwork),
    PrefixList(String),
}

impl Peer {
    /// Parse a peer: a CIDR block (`a.b.c.d/n`, IPv6 too) or a prefix list id (`pl-…`)
    pub fn parse(group_id: &str, raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValidationError::EmptyPeer {
                group_id: group_id.to_string(),
            });
        }

        let malformed = || ValidationError::MalformedPeer {
            group_id: group_id.to_string(),
            peer: raw.to_string(),
        };

        if let Some(suffix) = raw.strip_prefix("pl-") {
            if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Ok(Peer::PrefixList(raw.to_string()));
            }
            return Err(malformed());
        }

        // A bare address parses as a host network; a peer must spell its prefix
        if !raw.contains('/') {
            return Err(malformed());
        }
        raw.parse::<IpNetwork>()
            .map(Peer::Cidr)
            .map_err(|_| malformed())
    }

    /// Whether the peer admits every address
    pub fn is_world(&self) -> bool {
        matches!(self, Peer::Cidr(network) if network.prefix() == 0)
    }
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Peer::Cidr(network) => write!(f, "{}", network),
            Peer::PrefixList(id) => f.write_str(id),
        }
    }
}

impl Serialize for Peer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A validated ingress rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecurityRule {
    pub group_id: String,
    pub direction: &'static str,
    pub protocol: Protocol,
    pub ports: PortRange,
    pub peer: Peer,
}

/// Accepted but risky policy choices
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PolicyWarning {
    /// A sensitive port is reachable from any address
    WorldOpenSensitivePort { group_id: String, port: u16 },

    /// One port is open to the world while another is restricted to a narrower peer
    MixedExposure {
        group_id: String,
        open: PortRange,
        restricted: PortRange,
    },
}

impl std::fmt::Display for PolicyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyWarning::WorldOpenSensitivePort { group_id, port } => {
                write!(f, "{}: port {} is open to any address", group_id, port)
            }
            PolicyWarning::MixedExposure {
                group_id,
                open,
                restricted,
            } => write!(
                f,
                "{}: port {} is open to any address while port {} is restricted",
                group_id, open, restricted
            ),
        }
    }
}

/// Compiled rules of one security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPolicy {
    pub group_id: String,
    pub rules: Vec<SecurityRule>,
    pub warnings: Vec<PolicyWarning>,
}

/// Validate a single rule
pub fn compile_rule(spec: &SecurityRuleSpec) -> Result<SecurityRule, ValidationError> {
    let group_id = spec.group_id.as_str();

    if let Some(direction) = &spec.direction
        && !direction.eq_ignore_ascii_case("ingress")
    {
        return Err(ValidationError::UnsupportedDirection {
            group_id: group_id.to_string(),
            direction: direction.clone(),
        });
    }

    let protocol: Protocol =
        spec.protocol
            .parse()
            .map_err(|_| ValidationError::UnknownProtocol {
                group_id: group_id.to_string(),
                protocol: spec.protocol.clone(),
            })?;

    let ports = if protocol.uses_ports() {
        let (low, high) = match (spec.port, spec.from_port, spec.to_port) {
            (Some(port), None, None) => (port, port),
            (None, Some(low), Some(high)) => (low, high),
            (None, Some(low), None) => (low, low),
            (None, None, None) => {
                return Err(ValidationError::MissingPort {
                    group_id: group_id.to_string(),
                    protocol: spec.protocol.clone(),
                });
            }
            (port, low, high) => {
                return Err(ValidationError::InvalidField {
                    node: group_id.to_string(),
                    field: "port".to_string(),
                    reason: format!(
                        "ambiguous port specification (port={:?}, from-port={:?}, to-port={:?})",
                        port, low, high
                    ),
                });
            }
        };
        let invalid = || ValidationError::InvalidPortRange {
            group_id: group_id.to_string(),
            low,
            high,
        };
        let low_port = u16::try_from(low).map_err(|_| invalid())?;
        let high_port = u16::try_from(high).map_err(|_| invalid())?;
        if high_port < low_port {
            return Err(invalid());
        }
        PortRange {
            low: low_port,
            high: high_port,
        }
    } else {
        PortRange::ALL
    };

    let peer = Peer::parse(group_id, &spec.peer)?;

    Ok(SecurityRule {
        group_id: group_id.to_string(),
        direction: "ingress",
        protocol,
        ports,
        peer,
    })
}

/// Compile rules into one policy per security group
///
/// Groups appear in the order their first rule was declared. The first
/// invalid rule aborts compilation.
pub fn compile(rules: &[SecurityRuleSpec]) -> Result<Vec<CompiledPolicy>, ValidationError> {
    let mut policies: Vec<CompiledPolicy> = Vec::new();

    for spec in rules {
        let rule = compile_rule(spec)?;
        let index = match policies.iter().position(|p| p.group_id == rule.group_id) {
            Some(index) => index,
            None => {
                policies.push(CompiledPolicy {
                    group_id: rule.group_id.clone(),
                    rules: Vec::new(),
                    warnings: Vec::new(),
                });
                policies.len() - 1
            }
        };
        let policy = &mut policies[index];
        if !policy.rules.contains(&rule) {
            policy.rules.push(rule);
        }
    }

    for policy in &mut policies {
        policy.warnings = audit(&policy.group_id, &policy.rules);
        for warning in &policy.warnings {
            tracing::warn!(group = %policy.group_id, "Policy warning: {}", warning);
        }
    }

    Ok(policies)
}

fn audit(group_id: &str, rules: &[SecurityRule]) -> Vec<PolicyWarning> {
    let mut warnings = Vec::new();

    let open: Vec<&SecurityRule> = rules.iter().filter(|r| r.peer.is_world()).collect();
    let restricted: Vec<&SecurityRule> = rules.iter().filter(|r| !r.peer.is_world()).collect();

    for rule in &open {
        for port in SENSITIVE_PORTS {
            if rule.ports.contains(port) {
                warnings.push(PolicyWarning::WorldOpenSensitivePort {
                    group_id: group_id.to_string(),
                    port,
                });
            }
        }
    }

    for open_rule in &open {
        for narrow in &restricted {
            if !open_rule.ports.overlaps(&narrow.ports) {
                warnings.push(PolicyWarning::MixedExposure {
                    group_id: group_id.to_string(),
                    open: open_rule.ports,
                    restricted: narrow.ports,
                });
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_source_topology_rules() {
        let rules = vec![
            SecurityRuleSpec::tcp("ec2-sg", 80, "172.31.0.0/16"),
            SecurityRuleSpec::tcp("ec2-sg", 22, "0.0.0.0/0"),
            SecurityRuleSpec::tcp("lb-sg", 80, "pl-31a34658"),
        ];

        let policies = compile(&rules).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].group_id, "ec2-sg");
        assert_eq!(policies[0].rules.len(), 2);
        assert_eq!(
            policies[1].rules[0].peer,
            Peer::PrefixList("pl-31a34658".to_string())
        );

        assert!(policies[0].warnings.contains(&PolicyWarning::WorldOpenSensitivePort {
            group_id: "ec2-sg".to_string(),
            port: 22,
        }));
        assert!(policies[0].warnings.contains(&PolicyWarning::MixedExposure {
            group_id: "ec2-sg".to_string(),
            open: PortRange::single(22),
            restricted: PortRange::single(80),
        }));
        assert!(policies[1].warnings.is_empty());
    }

    #[test]
    fn test_empty_peer_rejected() {
        let err = compile(&[SecurityRuleSpec::tcp("sg", 80, "")]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyPeer {
                group_id: "sg".to_string()
            }
        );

        let err = compile(&[SecurityRuleSpec::tcp("sg", 80, "   ")]).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPeer { .. }));
    }

    #[test]
    fn test_malformed_peers_rejected() {
        for peer in ["172.31.0.0", "172.31.0.0/40", "not-a-cidr/8", "pl-", "pl-ab_cd"] {
            let err = compile(&[SecurityRuleSpec::tcp("sg", 80, peer)]).unwrap_err();
            assert!(
                matches!(err, ValidationError::MalformedPeer { .. }),
                "peer {:?} gave {:?}",
                peer,
                err
            );
        }
    }

    #[test]
    fn test_ipv6_peer_accepted() {
        let policies = compile(&[SecurityRuleSpec::tcp("sg", 443, "::/0")]).unwrap();
        assert!(policies[0].rules[0].peer.is_world());
    }

    #[test]
    fn test_inverted_port_range_rejected() {
        let spec = SecurityRuleSpec {
            group_id: "sg".to_string(),
            protocol: "tcp".to_string(),
            from_port: Some(9000),
            to_port: Some(8000),
            peer: "10.0.0.0/8".to_string(),
            ..Default::default()
        };
        assert_eq!(
            compile_rule(&spec).unwrap_err(),
            ValidationError::InvalidPortRange {
                group_id: "sg".to_string(),
                low: 9000,
                high: 8000
            }
        );
    }

    #[test]
    fn test_out_of_range_port_rejected() {
        let spec = SecurityRuleSpec {
            port: Some(70000),
            ..SecurityRuleSpec::tcp("sg", 0, "10.0.0.0/8")
        };
        assert!(matches!(
            compile_rule(&spec),
            Err(ValidationError::InvalidPortRange { .. })
        ));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let spec = SecurityRuleSpec {
            protocol: "sctp".to_string(),
            ..SecurityRuleSpec::tcp("sg", 80, "10.0.0.0/8")
        };
        assert!(matches!(
            compile_rule(&spec),
            Err(ValidationError::UnknownProtocol { .. })
        ));
    }

    #[test]
    fn test_egress_rejected() {
        let spec = SecurityRuleSpec {
            direction: Some("egress".to_string()),
            ..SecurityRuleSpec::tcp("sg", 80, "10.0.0.0/8")
        };
        assert!(matches!(
            compile_rule(&spec),
            Err(ValidationError::UnsupportedDirection { .. })
        ));
    }

    #[test]
    fn test_icmp_needs_no_port() {
        let spec = SecurityRuleSpec {
            group_id: "sg".to_string(),
            protocol: "icmp".to_string(),
            peer: "10.0.0.0/8".to_string(),
            ..Default::default()
        };
        assert_eq!(compile_rule(&spec).unwrap().ports, PortRange::ALL);
    }

    #[test]
    fn test_tcp_without_port_rejected() {
        let spec = SecurityRuleSpec {
            group_id: "sg".to_string(),
            protocol: "tcp".to_string(),
            peer: "10.0.0.0/8".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            compile_rule(&spec),
            Err(ValidationError::MissingPort { .. })
        ));
    }

    #[test]
    fn test_duplicate_rules_collapse() {
        let rules = vec![
            SecurityRuleSpec::tcp("sg", 80, "10.0.0.0/8"),
            SecurityRuleSpec::tcp("sg", 80, "10.0.0.0/8"),
        ];
        assert_eq!(compile(&rules).unwrap()[0].rules.len(), 1);
    }

    #[test]
    fn test_rule_from_config_value() {
        let value = serde_json::json!({"protocol": "tcp", "port": 80, "peer": "pl-31a34658"});
        let spec = SecurityRuleSpec::from_value("lb-sg", &value).unwrap();
        assert_eq!(spec.group_id, "lb-sg");
        assert_eq!(spec.port, Some(80));
    }
}
