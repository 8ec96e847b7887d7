//! Node wiring
//!
//! Computes the provider config of a node from its declared config and the
//! outputs of its ready dependencies.

use crate::assembly::{self, TargetBinding, TargetGroupSpec};
use crate::edge::{self, RecordType};
use crate::error::ValidationError;
use crate::model::{CertificateHandle, NodeState, ResourceKind, ResourceNode, ResourceOutputs, field};
use crate::topology::REFERENCE_FIELDS;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Final provider config of `node`
///
/// Every dependency must already be `Ready` in `outputs`. References to
/// dependencies are replaced by their provider ids.
pub fn resolve_config(
    node: &ResourceNode,
    outputs: &HashMap<String, ResourceOutputs>,
    edge_region: &str,
) -> Result<Map<String, Value>, ValidationError> {
    let mut deps = Vec::with_capacity(node.depends_on.len());
    for dependency in &node.depends_on {
        match outputs.get(dependency) {
            Some(output) if output.state == NodeState::Ready => deps.push(output),
            _ => {
                return Err(ValidationError::DependencyNotReady {
                    node: node.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let wiring = Wiring { node, deps };
    let mut config = node.config.clone();
    wiring.substitute_references(&mut config);
    config.insert(field::NAME.to_string(), Value::from(node.id.clone()));
    config.insert(field::REGION.to_string(), Value::from(node.region.clone()));

    match node.kind {
        ResourceKind::TargetGroup => {
            let spec = TargetGroupSpec::from_config(&node.id, &config)?;
            let targets = wiring
                .deps_of_kind(ResourceKind::Compute)
                .map(|compute| {
                    let address = compute.attribute_str(field::PRIVATE_IP).ok_or_else(|| {
                        wiring.invalid("target", format!("{} has no private address", compute.node_id))
                    })?;
                    assembly::bind_target(&node.id, address, &spec)
                })
                .collect::<Result<Vec<TargetBinding>, _>>()?;
            merge(&mut config, &node.id, &spec)?;
            config.insert("targets".to_string(), to_value(&node.id, &targets)?);
        }
        ResourceKind::LoadBalancer => {
            let subnets = string_list(config.get("subnets"));
            let security_group = config
                .get("security-group")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let internet_facing = config
                .get("internet-facing")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let lb = assembly::load_balancer_config(&node.id, &subnets, &security_group, internet_facing)?;
            merge(&mut config, &node.id, &lb)?;
        }
        ResourceKind::Listener => {
            let lb = wiring.single(ResourceKind::LoadBalancer)?;
            let certificate = CertificateHandle::from_outputs(wiring.single(ResourceKind::Certificate)?)?;
            let target_group = wiring.single(ResourceKind::TargetGroup)?;
            let port = match config.get("port") {
                Some(value) => Some(
                    value
                        .as_u64()
                        .and_then(|p| u16::try_from(p).ok())
                        .ok_or_else(|| wiring.invalid("port", "expected a port number".to_string()))?,
                ),
                None => None,
            };
            let listener = assembly::listener_config(
                &node.id,
                &lb.region,
                &lb.provider_id,
                &certificate,
                &target_group.provider_id,
                port,
            )?;
            merge(&mut config, &node.id, &listener)?;
        }
        ResourceKind::Distribution => {
            let lb = wiring.single(ResourceKind::LoadBalancer)?;
            let certificate = CertificateHandle::from_outputs(wiring.single(ResourceKind::Certificate)?)?;
            let endpoint = lb.attribute_str(field::DNS_NAME).unwrap_or_default();
            let domain_names = string_list(config.get("domain-names"));
            let distribution =
                edge::distribution_config(&node.id, endpoint, &certificate, edge_region, domain_names)?;
            merge(&mut config, &node.id, &distribution)?;
        }
        ResourceKind::DnsRecord => {
            let distribution = wiring.single(ResourceKind::Distribution)?;
            let zone = config.get("zone").and_then(Value::as_str).unwrap_or_default();
            let record_name = config.get("record-name").and_then(Value::as_str);
            let record_type = match config.get("type").and_then(Value::as_str) {
                Some(raw) => raw
                    .parse::<RecordType>()
                    .map_err(|reason| wiring.invalid("type", reason))?,
                None => RecordType::default(),
            };
            let record = edge::alias_record(&node.id, distribution, zone, record_name, record_type)?;
            merge(&mut config, &node.id, &record)?;
        }
        _ => {}
    }

    Ok(config)
}

struct Wiring<'a> {
    node: &'a ResourceNode,
    deps: Vec<&'a ResourceOutputs>,
}

impl<'a> Wiring<'a> {
    fn deps_of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &'a ResourceOutputs> + '_ {
        self.deps.iter().copied().filter(move |d| d.kind == kind)
    }

    fn single(&self, kind: ResourceKind) -> Result<&'a ResourceOutputs, ValidationError> {
        let mut matching = self.deps_of_kind(kind);
        match (matching.next(), matching.next()) {
            (Some(output), None) => Ok(output),
            (None, _) => Err(ValidationError::MissingReference {
                node: self.node.id.clone(),
                kind,
            }),
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousReference {
                node: self.node.id.clone(),
                kind,
            }),
        }
    }

    fn invalid(&self, field: &str, reason: String) -> ValidationError {
        ValidationError::InvalidField {
            node: self.node.id.clone(),
            field: field.to_string(),
            reason,
        }
    }

    fn substitute_references(&self, config: &mut Map<String, Value>) {
        let provider_id = |reference: &str| {
            self.deps
                .iter()
                .find(|d| d.node_id == reference)
                .map(|d| d.provider_id.clone())
        };

        for name in REFERENCE_FIELDS {
            match config.get_mut(name) {
                Some(Value::String(reference)) => {
                    if let Some(id) = provider_id(reference) {
                        *reference = id;
                    }
                }
                Some(Value::Array(items)) => {
                    for item in items {
                        if let Value::String(reference) = item
                            && let Some(id) = provider_id(reference)
                        {
                            *reference = id;
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn to_value<T: Serialize>(node: &str, value: &T) -> Result<Value, ValidationError> {
    serde_json::to_value(value).map_err(|e| ValidationError::InvalidField {
        node: node.to_string(),
        field: "config".to_string(),
        reason: e.to_string(),
    })
}

fn merge<T: Serialize>(
    config: &mut Map<String, Value>,
    node: &str,
    value: &T,
) -> Result<(), ValidationError> {
    if let Value::Object(entries) = to_value(node, value)? {
        config.extend(entries);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CertificateKey, ValidationState};
    use serde_json::json;

    fn ready(id: &str, kind: ResourceKind, region: &str, provider_id: &str) -> ResourceOutputs {
        ResourceOutputs::ready(&ResourceNode::new(id, kind, region), provider_id)
    }

    fn certificate(id: &str, region: &str, state: ValidationState) -> ResourceOutputs {
        let key = CertificateKey::new("test-pl.example.org", region, &[]);
        let mut handle = CertificateHandle::new(&key, format!("{}-arn", id));
        handle.validation_state = state;
        let mut outputs = ready(id, ResourceKind::Certificate, region, &handle.provider_id);
        outputs.attributes = handle.to_attributes();
        outputs
    }

    fn index(outputs: Vec<ResourceOutputs>) -> HashMap<String, ResourceOutputs> {
        outputs.into_iter().map(|o| (o.node_id.clone(), o)).collect()
    }

    fn node(id: &str, kind: ResourceKind, region: &str, deps: &[&str]) -> ResourceNode {
        let mut node = ResourceNode::new(id, kind, region);
        node.depends_on = deps.iter().map(|d| d.to_string()).collect();
        node
    }

    #[test]
    fn test_target_group_binds_compute_address() {
        let outputs = index(vec![
            ready("ec2", ResourceKind::Compute, "r1", "i-0001")
                .with_attribute(field::PRIVATE_IP, json!("172.31.5.10")),
        ]);
        let tg = node("tg", ResourceKind::TargetGroup, "r1", &["ec2"]).with_config("target", json!("ec2"));

        let config = resolve_config(&tg, &outputs, "us-east-1").unwrap();
        assert_eq!(config["target"], json!("i-0001"));
        assert_eq!(config["targets"], json!([{"address": "172.31.5.10", "port": 80}]));
        assert_eq!(config["protocol"], json!("HTTP"));
        assert_eq!(config["name"], json!("tg"));
        assert_eq!(config["region"], json!("r1"));
    }

    #[test]
    fn test_load_balancer_substitutes_security_group() {
        let outputs = index(vec![ready("lb-sg", ResourceKind::SecurityGroup, "r1", "sg-0001")]);
        let lb = node("lb", ResourceKind::LoadBalancer, "r1", &["lb-sg"])
            .with_config("security-group", json!("lb-sg"))
            .with_config("subnets", json!(["subnet-a", "subnet-a", "subnet-b"]));

        let config = resolve_config(&lb, &outputs, "us-east-1").unwrap();
        assert_eq!(config["security-group"], json!("sg-0001"));
        assert_eq!(config["subnets"], json!(["subnet-a", "subnet-b"]));
        assert_eq!(config["internet-facing"], json!(true));
    }

    #[test]
    fn test_listener_wiring() {
        let outputs = index(vec![
            ready("lb", ResourceKind::LoadBalancer, "r1", "lb-0001"),
            certificate("lb-cert", "r1", ValidationState::Issued),
            ready("tg", ResourceKind::TargetGroup, "r1", "tg-0001"),
        ]);
        let listener = node("https", ResourceKind::Listener, "r1", &["lb", "lb-cert", "tg"])
            .with_config("load-balancer", json!("lb"))
            .with_config("certificate", json!("lb-cert"))
            .with_config("target-group", json!("tg"));

        let config = resolve_config(&listener, &outputs, "us-east-1").unwrap();
        assert_eq!(config["load-balancer"], json!("lb-0001"));
        assert_eq!(config["certificate"], json!("lb-cert-arn"));
        assert_eq!(config["target-group"], json!("tg-0001"));
        assert_eq!(config["port"], json!(443));
    }

    #[test]
    fn test_listener_with_pending_certificate_is_rejected() {
        let outputs = index(vec![
            ready("lb", ResourceKind::LoadBalancer, "r1", "lb-0001"),
            certificate("lb-cert", "r1", ValidationState::PendingValidation),
            ready("tg", ResourceKind::TargetGroup, "r1", "tg-0001"),
        ]);
        let listener = node("https", ResourceKind::Listener, "r1", &["lb", "lb-cert", "tg"]);
        assert!(matches!(
            resolve_config(&listener, &outputs, "us-east-1"),
            Err(ValidationError::CertificateNotIssued(_))
        ));
    }

    #[test]
    fn test_unready_dependency_is_rejected() {
        let mut lb = ready("lb", ResourceKind::LoadBalancer, "r1", "lb-0001");
        lb.state = NodeState::Provisioning;
        let outputs = index(vec![lb]);
        let dist = node("dist", ResourceKind::Distribution, "us-east-1", &["lb"]);

        assert_eq!(
            resolve_config(&dist, &outputs, "us-east-1"),
            Err(ValidationError::DependencyNotReady {
                node: "dist".to_string(),
                dependency: "lb".to_string(),
            })
        );
    }

    #[test]
    fn test_distribution_and_alias_wiring() {
        let outputs = index(vec![
            ready("lb", ResourceKind::LoadBalancer, "r1", "lb-0001")
                .with_attribute(field::DNS_NAME, json!("lb-0001.r1.elb.example.net")),
            certificate("edge-cert", "us-east-1", ValidationState::Issued),
        ]);
        let dist = node("dist", ResourceKind::Distribution, "us-east-1", &["lb", "edge-cert"])
            .with_config("domain-names", json!(["test-pl.example.org"]));

        let config = resolve_config(&dist, &outputs, "us-east-1").unwrap();
        assert_eq!(config["origin"], json!("lb-0001.r1.elb.example.net"));
        assert_eq!(config["certificate"], json!("edge-cert-arn"));
        assert_eq!(config["enable-ipv6"], json!(false));

        let outputs = index(vec![
            ready("dist", ResourceKind::Distribution, "us-east-1", "dist-0001")
                .with_attribute(field::DOMAIN_NAME, json!("d111.edge.example.net")),
        ]);
        let alias = node("alias", ResourceKind::DnsRecord, "us-east-1", &["dist"])
            .with_config("zone", json!("example.org"))
            .with_config("record-name", json!("test-pl.example.org"));

        let config = resolve_config(&alias, &outputs, "us-east-1").unwrap();
        assert_eq!(config["target"], json!("d111.edge.example.net"));
        assert_eq!(config["type"], json!("AAAA"));
        assert_eq!(config["record-name"], json!("test-pl.example.org"));
    }
}
