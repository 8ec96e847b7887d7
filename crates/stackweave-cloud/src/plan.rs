//! Provisioning plans
//!
//! A plan is the read-only preview of a run: every node in creation order,
//! grouped into waves that may be provisioned concurrently.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stackweave_core::{ResourceKind, Topology, field};

/// Represents a planned action for a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Node id
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    pub kind: ResourceKind,

    pub region: String,

    /// Wave the node belongs to
    pub wave: usize,

    pub depends_on: Vec<String>,

    /// Description of the action
    pub description: String,

    /// Declared config, before wiring
    pub details: Map<String, Value>,
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Adopt an existing resource found by lookup
    Adopt,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Adopt => write!(f, "adopt"),
        }
    }
}

/// Plan containing all actions of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Stack namespace
    pub stack: String,

    /// Actions in creation order
    pub actions: Vec<Action>,

    /// Node ids grouped by dependency depth
    pub waves: Vec<Vec<String>>,

    /// Security policy warnings
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn from_topology(topology: &Topology) -> Self {
        let waves: Vec<Vec<String>> = topology
            .waves()
            .into_iter()
            .map(|wave| wave.into_iter().map(str::to_string).collect())
            .collect();
        let wave_of = |id: &str| {
            waves
                .iter()
                .position(|wave| wave.iter().any(|w| w == id))
                .unwrap_or(0)
        };

        let actions = topology
            .ordered_nodes()
            .map(|node| {
                let (action_type, description) = match node.lookup_filter() {
                    Some(filter) => (
                        ActionType::Adopt,
                        format!("adopt existing {} matching '{}'", node.kind, filter),
                    ),
                    None => (
                        ActionType::Create,
                        format!("create {} in {}", node.kind, node.region),
                    ),
                };
                let mut details = node.config.clone();
                details.remove(field::POLICY);
                Action {
                    id: node.id.clone(),
                    action_type,
                    kind: node.kind,
                    region: node.region.clone(),
                    wave: wave_of(&node.id),
                    depends_on: node.depends_on.iter().cloned().collect(),
                    description,
                    details,
                }
            })
            .collect();

        Self {
            stack: topology.namespace().to_string(),
            actions,
            waves,
            warnings: topology.warnings().iter().map(|w| w.to_string()).collect(),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.action_type == ActionType::Create)
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            adopt: self.actions_by_type(ActionType::Adopt).len(),
            waves: self.waves.len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub adopt: usize,
    pub waves: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to adopt, {} waves",
            self.create, self.adopt, self.waves
        )
    }
}
