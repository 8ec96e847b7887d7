//! Topology builder
//!
//! Turns ordered declarations into a frozen [`Topology`]:
//! 1. namespace ids and reject duplicates
//! 2. resolve explicit and implicit dependency edges
//! 3. adopt looked-up resources and compile security groups
//! 4. reject cycles and compute the creation order
//! 5. check kind-specific references and region pairing

use super::Topology;
use super::lookup::{LookupTable, reference_lookups};
use crate::error::{BuildError, Result, ValidationError};
use crate::model::{
    DEFAULT_EDGE_REGION, Declaration, GLOBAL_REGION_ALIAS, ResourceKind, ResourceNode,
    StackDeclaration, StackOptions, field,
};
use crate::security::{self, SecurityRuleSpec};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Config fields whose values may name another declared resource
pub const REFERENCE_FIELDS: [&str; 10] = [
    "network",
    "subnet",
    "subnets",
    "security-group",
    "target",
    "target-group",
    "load-balancer",
    "certificate",
    "distribution",
    "origin",
];

/// Prefix applied to every node id of a stack
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// No prefix: node ids equal local ids
    pub fn none() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn qualify(&self, local: &str) -> String {
        if self.0.is_empty() {
            local.to_string()
        } else {
            format!("{}-{}", self.0, local)
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kinds a node must reference exactly once
fn required_references(kind: ResourceKind) -> &'static [ResourceKind] {
    match kind {
        ResourceKind::Listener => &[
            ResourceKind::LoadBalancer,
            ResourceKind::Certificate,
            ResourceKind::TargetGroup,
        ],
        ResourceKind::Distribution => &[ResourceKind::LoadBalancer, ResourceKind::Certificate],
        ResourceKind::DnsRecord => &[ResourceKind::Distribution],
        _ => &[],
    }
}

#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    namespace: Namespace,
    options: StackOptions,
    lookups: LookupTable,
    edge_region: String,
}

impl TopologyBuilder {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            options: StackOptions::default(),
            lookups: LookupTable::new(),
            edge_region: DEFAULT_EDGE_REGION.to_string(),
        }
    }

    /// Builder namespaced by the stack name and configured from its options
    pub fn for_stack(stack: &StackDeclaration) -> Self {
        Self::new(Namespace::new(stack.name.clone())).with_options(stack.options.clone())
    }

    pub fn with_options(mut self, options: StackOptions) -> Self {
        if let Some(edge_region) = &options.edge_region {
            self.edge_region = edge_region.clone();
        }
        self.options = options;
        self
    }

    pub fn with_lookups(mut self, lookups: LookupTable) -> Self {
        self.lookups = lookups;
        self
    }

    pub fn with_edge_region(mut self, region: impl Into<String>) -> Self {
        self.edge_region = region.into();
        self
    }

    /// Build the topology of a parsed stack file
    pub fn build_stack(&self, stack: &StackDeclaration) -> Result<Topology> {
        self.build(&stack.resources)
    }

    #[instrument(skip_all, fields(namespace = %self.namespace, declarations = declarations.len()))]
    pub fn build(&self, declarations: &[Declaration]) -> Result<Topology> {
        let mut local_index: HashMap<&str, usize> = HashMap::new();
        for (i, decl) in declarations.iter().enumerate() {
            if decl.id.trim().is_empty() {
                return Err(BuildError::InvalidDeclaration(format!(
                    "{} declared without an id",
                    decl.kind
                )));
            }
            if local_index.insert(decl.id.as_str(), i).is_some() {
                return Err(BuildError::DuplicateId(self.namespace.qualify(&decl.id)));
            }
        }

        let mut nodes = Vec::with_capacity(declarations.len());
        let mut dependencies = Vec::with_capacity(declarations.len());
        let mut warnings = Vec::new();

        for decl in declarations {
            let id = self.namespace.qualify(&decl.id);
            let mut config = decl.config.clone();
            self.options.apply_defaults(decl.kind, &mut config);

            let region = self.resolve_region(&id, decl)?;
            let deps = self.collect_dependencies(&id, decl, &mut config, &local_index)?;

            let lookup = config
                .get(field::LOOKUP)
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(filter) = lookup {
                let provider_id =
                    self.lookups
                        .resolve(decl.kind, &filter)
                        .ok_or_else(|| BuildError::Lookup {
                            node: id.clone(),
                            kind: decl.kind.into(),
                            filter: filter.clone(),
                        })?;
                debug!(node = %id, provider_id, "Adopted existing resource");
                config.insert(field::PROVIDER_ID.to_string(), Value::from(provider_id));
            }

            for reference in reference_lookups(decl.kind) {
                let Some(filter) = config.get(reference.key).and_then(Value::as_str) else {
                    continue;
                };
                let provider_id = self.lookups.resolve(reference.kind, filter).ok_or_else(|| {
                    BuildError::Lookup {
                        node: id.clone(),
                        kind: reference.kind,
                        filter: filter.to_string(),
                    }
                })?;
                debug!(node = %id, key = reference.key, provider_id, "Resolved reference lookup");
                config.insert(reference.resolved_key.to_string(), Value::from(provider_id));
            }

            if decl.kind == ResourceKind::SecurityGroup {
                let policy = compile_group(&id, &config)?;
                warnings.extend(policy.warnings.iter().cloned());
                let value = serde_json::to_value(&policy)
                    .map_err(|e| BuildError::InvalidDeclaration(e.to_string()))?;
                config.insert(field::POLICY.to_string(), value);
            }

            let mut node = ResourceNode::new(id, decl.kind, region);
            node.config = config;
            node.depends_on = deps
                .iter()
                .map(|&d| self.namespace.qualify(&declarations[d].id))
                .collect();
            nodes.push(node);
            dependencies.push(deps);
        }

        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let order = topological_order(&ids, &dependencies)?;

        self.check_references(&mut nodes, &dependencies)?;

        let mut depth = vec![0; nodes.len()];
        for &i in &order {
            depth[i] = dependencies[i]
                .iter()
                .map(|&d| depth[d] + 1)
                .max()
                .unwrap_or(0);
        }

        let mut dependents = vec![Vec::new(); nodes.len()];
        for (i, deps) in dependencies.iter().enumerate() {
            for &d in deps {
                dependents[d].push(i);
            }
        }

        let index = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        info!(
            nodes = nodes.len(),
            warnings = warnings.len(),
            "Topology built"
        );

        Ok(Topology {
            namespace: self.namespace.clone(),
            edge_region: self.edge_region.clone(),
            nodes,
            index,
            dependencies,
            dependents,
            order,
            depth,
            warnings,
        })
    }

    fn normalize_region(&self, region: &str) -> String {
        if region == GLOBAL_REGION_ALIAS {
            self.edge_region.clone()
        } else {
            region.to_string()
        }
    }

    fn resolve_region(
        &self,
        id: &str,
        decl: &Declaration,
    ) -> std::result::Result<String, ValidationError> {
        let region = match &decl.region {
            Some(region) => region.clone(),
            None if decl.kind.is_global() => self.edge_region.clone(),
            None => self
                .options
                .region
                .clone()
                .ok_or_else(|| ValidationError::MissingRegion(id.to_string()))?,
        };
        Ok(self.normalize_region(&region))
    }

    /// Explicit `depends_on` entries plus references found in config fields
    ///
    /// References to declared resources are rewritten to namespaced ids;
    /// anything else is left as an external provider id.
    fn collect_dependencies(
        &self,
        id: &str,
        decl: &Declaration,
        config: &mut Map<String, Value>,
        local_index: &HashMap<&str, usize>,
    ) -> std::result::Result<Vec<usize>, ValidationError> {
        let mut deps = Vec::new();

        for dependency in &decl.depends_on {
            if dependency == &decl.id {
                return Err(ValidationError::SelfDependency(id.to_string()));
            }
            let index = local_index.get(dependency.as_str()).ok_or_else(|| {
                ValidationError::UnknownDependency {
                    node: id.to_string(),
                    dependency: dependency.clone(),
                }
            })?;
            if !deps.contains(index) {
                deps.push(*index);
            }
        }

        for name in REFERENCE_FIELDS {
            let Some(value) = config.get_mut(name) else {
                continue;
            };
            let references: Vec<&mut String> = match value {
                Value::String(s) => vec![s],
                Value::Array(items) => items
                    .iter_mut()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            for reference in references {
                let Some(&index) = local_index.get(reference.as_str()) else {
                    continue;
                };
                if reference.as_str() == decl.id {
                    return Err(ValidationError::SelfDependency(id.to_string()));
                }
                *reference = self.namespace.qualify(reference);
                if !deps.contains(&index) {
                    deps.push(index);
                }
            }
        }

        deps.sort_unstable();
        Ok(deps)
    }

    fn check_references(
        &self,
        nodes: &mut [ResourceNode],
        dependencies: &[Vec<usize>],
    ) -> std::result::Result<(), ValidationError> {
        for i in 0..nodes.len() {
            let kind = nodes[i].kind;
            let mut referenced = HashMap::new();
            for required in required_references(kind) {
                let mut matching = dependencies[i]
                    .iter()
                    .copied()
                    .filter(|&d| nodes[d].kind == *required);
                let found = matching.next().ok_or_else(|| ValidationError::MissingReference {
                    node: nodes[i].id.clone(),
                    kind: *required,
                })?;
                if matching.next().is_some() {
                    return Err(ValidationError::AmbiguousReference {
                        node: nodes[i].id.clone(),
                        kind: *required,
                    });
                }
                referenced.insert(*required, found);
            }

            let certificate = referenced.get(&ResourceKind::Certificate).copied();
            let load_balancer = referenced.get(&ResourceKind::LoadBalancer).copied();

            match (kind, certificate, load_balancer) {
                (ResourceKind::Listener, Some(cert), Some(lb)) => {
                    // A listener lives in its load balancer's region
                    let lb_region = nodes[lb].region.clone();
                    if nodes[cert].region != lb_region {
                        return Err(ValidationError::RegionMismatch {
                            node: nodes[i].id.clone(),
                            certificate: nodes[cert].id.clone(),
                            expected: lb_region,
                            actual: nodes[cert].region.clone(),
                        });
                    }
                    nodes[i].region = lb_region;
                }
                (ResourceKind::Distribution, Some(cert), _) => {
                    if nodes[cert].region != self.edge_region {
                        return Err(ValidationError::RegionMismatch {
                            node: nodes[i].id.clone(),
                            certificate: nodes[cert].id.clone(),
                            expected: self.edge_region.clone(),
                            actual: nodes[cert].region.clone(),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn compile_group(
    id: &str,
    config: &Map<String, Value>,
) -> std::result::Result<security::CompiledPolicy, ValidationError> {
    let specs = match config.get(field::INGRESS) {
        Some(Value::Array(rules)) => rules
            .iter()
            .map(|rule| SecurityRuleSpec::from_value(id, rule))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        Some(rule @ Value::Object(_)) => vec![SecurityRuleSpec::from_value(id, rule)?],
        Some(_) => {
            return Err(ValidationError::InvalidField {
                node: id.to_string(),
                field: field::INGRESS.to_string(),
                reason: "expected a rule or a list of rules".to_string(),
            });
        }
        None => Vec::new(),
    };

    let policy = security::compile(&specs)?
        .into_iter()
        .next()
        .unwrap_or_else(|| security::CompiledPolicy {
            group_id: id.to_string(),
            rules: Vec::new(),
            warnings: Vec::new(),
        });
    Ok(policy)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    InProgress,
    Done,
}

/// DFS post-order with roots and dependencies visited in declaration order
///
/// Meeting a node that is still in progress means the path back to it is a
/// cycle.
fn topological_order(ids: &[String], dependencies: &[Vec<usize>]) -> Result<Vec<usize>> {
    let mut marks = vec![Mark::New; ids.len()];
    let mut order = Vec::with_capacity(ids.len());
    let mut path = Vec::new();

    for root in 0..ids.len() {
        visit(root, ids, dependencies, &mut marks, &mut path, &mut order)?;
    }
    Ok(order)
}

fn visit(
    node: usize,
    ids: &[String],
    dependencies: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<()> {
    match marks[node] {
        Mark::Done => return Ok(()),
        Mark::InProgress => {
            let start = path.iter().position(|&n| n == node).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|&n| ids[n].clone()).collect();
            cycle.push(ids[node].clone());
            return Err(BuildError::Cycle(cycle));
        }
        Mark::New => {}
    }

    marks[node] = Mark::InProgress;
    path.push(node);
    for &dependency in &dependencies[node] {
        visit(dependency, ids, dependencies, marks, path, order)?;
    }
    path.pop();
    marks[node] = Mark::Done;
    order.push(node);
    Ok(())
}
