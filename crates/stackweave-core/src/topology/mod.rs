//! Topology graph
//!
//! A [`Topology`] is the frozen dependency graph of one stack. It is produced
//! by [`TopologyBuilder`] and is read-only afterwards; the executor shares it
//! behind an `Arc` for the whole run.

mod builder;
mod lookup;

pub use builder::{Namespace, REFERENCE_FIELDS, TopologyBuilder};
pub use lookup::{LookupRequest, LookupTable, ReferenceLookup, lookup_requests, reference_lookups};

use crate::model::{DependencyEdge, ResourceNode};
use crate::security::PolicyWarning;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct Topology {
    namespace: Namespace,
    edge_region: String,
    /// Declaration order
    nodes: Vec<ResourceNode>,
    index: HashMap<String, usize>,
    /// Per node, dependency indices in declaration order
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    /// DFS post-order over `nodes`
    order: Vec<usize>,
    /// Longest dependency chain below each node
    depth: Vec<usize>,
    warnings: Vec<PolicyWarning>,
}

impl Topology {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn edge_region(&self) -> &str {
        &self.edge_region
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Node ids in creation order; every dependency precedes its dependents
    pub fn order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.nodes[i].id.as_str())
            .collect()
    }

    pub fn ordered_nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.order.iter().map(|&i| &self.nodes[i])
    }

    /// Reverse of the creation order
    pub fn teardown_order(&self) -> Vec<&str> {
        let mut order = self.order();
        order.reverse();
        order
    }

    /// Direct dependencies of a node, in declaration order
    pub fn dependencies(&self, id: &str) -> Vec<&ResourceNode> {
        self.index
            .get(id)
            .map(|&i| {
                self.dependencies[i]
                    .iter()
                    .map(|&d| &self.nodes[d])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes that directly depend on a node, in declaration order
    pub fn dependents(&self, id: &str) -> Vec<&ResourceNode> {
        self.index
            .get(id)
            .map(|&i| self.dependents[i].iter().map(|&d| &self.nodes[d]).collect())
            .unwrap_or_default()
    }

    /// Every node reachable through dependent edges, in creation order
    pub fn transitive_dependents(&self, id: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for &dependent in &self.dependents[current] {
                if seen.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }

        self.order
            .iter()
            .filter(|i| seen.contains(*i))
            .map(|&i| self.nodes[i].id.as_str())
            .collect()
    }

    /// Nodes grouped by dependency depth
    ///
    /// Every node in wave `n` only depends on nodes in earlier waves, so each
    /// wave can be provisioned concurrently once the previous ones are ready.
    pub fn waves(&self) -> Vec<Vec<&str>> {
        let levels = self.depth.iter().copied().max().map_or(0, |max| max + 1);
        let mut waves = vec![Vec::new(); levels];
        for &i in &self.order {
            waves[self.depth[i]].push(self.nodes[i].id.as_str());
        }
        waves
    }

    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.dependencies
            .iter()
            .enumerate()
            .flat_map(|(i, deps)| {
                deps.iter().map(move |&d| DependencyEdge {
                    dependent: self.nodes[i].id.clone(),
                    dependency: self.nodes[d].id.clone(),
                })
            })
            .collect()
    }

    /// Policy warnings collected while compiling security groups
    pub fn warnings(&self) -> &[PolicyWarning] {
        &self.warnings
    }
}
