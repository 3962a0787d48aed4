//! Simulation graph data models.
//!
//! - [`BranchCondition`]: why a node exists - the predicate distinguishing it
//!   from its siblings
//! - [`TreeNode`]: one world state, its provenance, and its diffs
//! - [`SimulationTree`]: the complete DAG with traversal and statistics

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::DiffEntry;
use crate::snapshot::{SnapshotValue, WorldSnapshot};

/// Status of the action execution that produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Action succeeded.
    Ok,
    /// Precondition failed.
    Rejected,
    /// State reached, but a dependency constraint is broken.
    ConstraintViolated,
    /// Referenced action does not exist; terminal for this branch.
    Error,
}

impl NodeStatus {
    /// Whether this status counts as a failure.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Rejected | Self::ConstraintViolated | Self::Error)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Rejected => write!(f, "rejected"),
            Self::ConstraintViolated => write!(f, "constraint_violated"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Which rule family a branch condition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchSource {
    /// A precondition partition (success/fail).
    Precondition,
    /// A conditional-effect partition (if/elif/else).
    Postcondition,
}

/// Which side of its partition a branch is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    /// First clause of a conditional effect.
    If,
    /// A later clause.
    Elif,
    /// The remainder clause.
    Else,
    /// Preconditions hold.
    Success,
    /// Preconditions fail.
    Fail,
}

/// Boolean combinator of a compound branch condition.
///
/// A materialized fail branch always combines with `And`: disjunctive failure
/// is represented as sibling nodes, never nested inside one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchCombinator {
    /// All sub-conditions hold together.
    And,
    /// Any sub-condition holds.
    Or,
}

/// The predicate that selects a node among its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BranchCondition {
    /// A single attribute constrained to a value or value-set.
    Simple {
        /// Constrained attribute path.
        attribute: String,
        /// `equals` for a single value, `in` for a set.
        operator: String,
        /// The selecting value(s).
        value: SnapshotValue,
        /// Originating rule family.
        source: BranchSource,
        /// Partition side.
        kind: BranchKind,
    },
    /// Several attributes constrained together.
    Compound {
        /// Boolean combinator over the sub-conditions.
        combinator: BranchCombinator,
        /// Originating rule family.
        source: BranchSource,
        /// Partition side.
        kind: BranchKind,
        /// One sub-condition per constrained attribute.
        conditions: Vec<BranchCondition>,
    },
}

impl BranchCondition {
    /// Builds a simple condition for one attribute.
    #[must_use]
    pub fn simple(
        attribute: impl Into<String>,
        values: &[String],
        source: BranchSource,
        kind: BranchKind,
    ) -> Self {
        let operator = if values.len() > 1 { "in" } else { "equals" };
        Self::Simple {
            attribute: attribute.into(),
            operator: operator.to_string(),
            value: SnapshotValue::from_values(values),
            source,
            kind,
        }
    }

    /// Builds an `and` compound over `(attribute, values)` pairs, collapsing a
    /// single entry to a simple condition.
    #[must_use]
    pub fn compound_and(
        constraints: &BTreeMap<String, Vec<String>>,
        source: BranchSource,
        kind: BranchKind,
    ) -> Option<Self> {
        let mut conditions: Vec<BranchCondition> = constraints
            .iter()
            .map(|(attr, values)| Self::simple(attr.as_str(), values, source, kind))
            .collect();
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Self::Compound {
                combinator: BranchCombinator::And,
                source,
                kind,
                conditions,
            }),
        }
    }

    /// Partition side of this condition.
    #[must_use]
    pub const fn kind(&self) -> BranchKind {
        match self {
            Self::Simple { kind, .. } | Self::Compound { kind, .. } => *kind,
        }
    }

    /// Originating rule family.
    #[must_use]
    pub const fn source(&self) -> BranchSource {
        match self {
            Self::Simple { source, .. } | Self::Compound { source, .. } => *source,
        }
    }

    /// Whether this is a compound condition.
    #[must_use]
    pub const fn is_compound(&self) -> bool {
        matches!(self, Self::Compound { .. })
    }

    /// Whether a concrete level would select this branch.
    ///
    /// Compound conditions check the sub-condition for the level's attribute;
    /// attributes not mentioned do not constrain.
    #[must_use]
    pub fn matches_value(&self, attribute: &str, level: &str) -> bool {
        match self {
            Self::Simple {
                attribute: attr,
                value,
                ..
            } => {
                if attr != attribute {
                    return true;
                }
                match value {
                    SnapshotValue::Level(v) => v == level,
                    SnapshotValue::Set(vs) => vs.iter().any(|v| v == level),
                    SnapshotValue::Unknown => true,
                }
            }
            Self::Compound { conditions, .. } => conditions
                .iter()
                .all(|c| c.matches_value(attribute, level)),
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Simple {
                attribute,
                operator,
                value,
                ..
            } => format!("{attribute} {operator} {value}"),
            Self::Compound {
                combinator,
                conditions,
                ..
            } => {
                let joiner = match combinator {
                    BranchCombinator::And => " AND ",
                    BranchCombinator::Or => " OR ",
                };
                let parts: Vec<String> = conditions.iter().map(BranchCondition::describe).collect();
                format!("({})", parts.join(joiner))
            }
        }
    }
}

/// Sequential node identifier, root first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state{}", self.0)
    }
}

/// An additional incoming edge recorded when branches merge on one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingEdge {
    /// The additional parent.
    pub parent_id: NodeId,
    /// Action applied along this edge.
    pub action_name: String,
    /// Parameter values of that action.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Status along this edge.
    pub status: NodeStatus,
    /// Error message along this edge, if any.
    #[serde(default)]
    pub error: Option<String>,
    /// Branch condition along this edge.
    #[serde(default)]
    pub branch_condition: Option<BranchCondition>,
    /// Diffs relative to this edge's parent.
    #[serde(default)]
    pub changes: Vec<DiffEntry>,
}

/// One world state in the simulation graph.
///
/// The primary (first) parent's transition metadata lives on the node itself;
/// further parents each contribute an [`IncomingEdge`]. A node is never
/// mutated after creation except to append incoming edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// This node's id.
    pub id: NodeId,
    /// The world state.
    pub snapshot: WorldSnapshot,
    /// All parents; more than one means a merged node.
    #[serde(default)]
    pub parent_ids: Vec<NodeId>,
    /// All children.
    #[serde(default)]
    pub children_ids: Vec<NodeId>,
    /// Edges beyond the primary parent.
    #[serde(default)]
    pub incoming_edges: Vec<IncomingEdge>,
    /// Action that produced this node; absent for the root.
    #[serde(default)]
    pub action_name: Option<String>,
    /// Parameters of that action.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Status of the primary transition.
    pub status: NodeStatus,
    /// Error message, if any.
    #[serde(default)]
    pub error: Option<String>,
    /// Predicate selecting this node among its siblings.
    #[serde(default)]
    pub branch_condition: Option<BranchCondition>,
    /// Ordered diffs against the primary parent.
    #[serde(default)]
    pub changes: Vec<DiffEntry>,
}

impl TreeNode {
    /// Whether this is the root node.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// The primary parent, if any.
    #[must_use]
    pub fn primary_parent(&self) -> Option<NodeId> {
        self.parent_ids.first().copied()
    }

    /// Whether several branches merged into this node.
    #[must_use]
    pub fn has_multiple_parents(&self) -> bool {
        self.parent_ids.len() > 1
    }

    /// Whether this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children_ids.is_empty()
    }

    /// Whether the primary transition succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == NodeStatus::Ok && !self.is_root()
    }

    /// Human-readable one-line description.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.is_root() {
            return format!("[{}] Initial State", self.id);
        }
        let mut desc = format!(
            "[{}] {}",
            self.id,
            self.action_name.as_deref().unwrap_or("unknown")
        );
        if self.status != NodeStatus::Ok {
            desc.push_str(&format!(" ({})", self.status));
        }
        if let Some(bc) = &self.branch_condition {
            desc.push_str(&format!(" | {}", bc.describe()));
        }
        desc
    }
}

/// Aggregate statistics over a simulation graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStatistics {
    /// Total node count.
    pub total_nodes: usize,
    /// Longest root-to-leaf path length, counted in nodes.
    pub depth: usize,
    /// Largest number of nodes at any depth.
    pub width: usize,
    /// Number of leaves.
    pub leaf_nodes: usize,
    /// Nodes with more than one child.
    pub branch_points: usize,
    /// Nodes whose primary transition succeeded.
    pub successful_actions: usize,
    /// Nodes whose primary transition failed.
    pub failed_actions: usize,
    /// Nodes with more than one parent.
    pub merged_nodes: usize,
    /// Total edge count (every parent link).
    pub edges: usize,
}

/// The complete simulation graph.
///
/// Grows monotonically: nodes are appended, edges are appended, nothing is
/// ever deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationTree {
    /// Identifier of this run.
    pub simulation_id: String,
    /// Simulated device type.
    pub device_type: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// The action names executed, in order.
    #[serde(default)]
    pub actions: Vec<String>,
    /// The root node id, once created.
    #[serde(default)]
    pub root_id: Option<NodeId>,
    /// All nodes keyed by id.
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, TreeNode>,
    next_id: u64,
}

impl SimulationTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new(
        simulation_id: impl Into<String>,
        device_type: impl Into<String>,
        actions: Vec<String>,
    ) -> Self {
        Self {
            simulation_id: simulation_id.into(),
            device_type: device_type.into(),
            created_at: Utc::now(),
            actions,
            root_id: None,
            nodes: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub(crate) fn next_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Inserts the root node and returns its id.
    pub(crate) fn add_root(&mut self, snapshot: WorldSnapshot) -> NodeId {
        let id = self.next_node_id();
        self.nodes.insert(
            id,
            TreeNode {
                id,
                snapshot,
                parent_ids: Vec::new(),
                children_ids: Vec::new(),
                incoming_edges: Vec::new(),
                action_name: None,
                parameters: BTreeMap::new(),
                status: NodeStatus::Ok,
                error: None,
                branch_condition: None,
                changes: Vec::new(),
            },
        );
        self.root_id = Some(id);
        id
    }

    pub(crate) fn insert_node(&mut self, node: TreeNode) {
        for pid in node.parent_ids.clone() {
            if let Some(parent) = self.nodes.get_mut(&pid) {
                if !parent.children_ids.contains(&node.id) {
                    parent.children_ids.push(node.id);
                }
            }
        }
        self.nodes.insert(node.id, node);
    }

    /// Attaches an extra incoming edge to an already-materialized node.
    pub(crate) fn add_edge_to_existing(&mut self, existing: NodeId, edge: IncomingEdge) {
        let parent_id = edge.parent_id;
        if let Some(node) = self.nodes.get_mut(&existing) {
            if !node.parent_ids.contains(&parent_id) {
                node.parent_ids.push(parent_id);
            }
            node.incoming_edges.push(edge);
        }
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            if !parent.children_ids.contains(&existing) {
                parent.children_ids.push(existing);
            }
        }
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> Option<&TreeNode> {
        self.root_id.and_then(|id| self.nodes.get(&id))
    }

    /// A node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    /// Total number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All leaves (nodes with no children).
    #[must_use]
    pub fn leaves(&self) -> Vec<&TreeNode> {
        self.nodes.values().filter(|n| n.is_leaf()).collect()
    }

    /// Direct children of a node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<&TreeNode> {
        self.nodes.get(&id).map_or_else(Vec::new, |n| {
            n.children_ids
                .iter()
                .filter_map(|cid| self.nodes.get(cid))
                .collect()
        })
    }

    /// Siblings of a node under its primary parent.
    #[must_use]
    pub fn siblings(&self, id: NodeId) -> Vec<&TreeNode> {
        let Some(parent_id) = self.nodes.get(&id).and_then(TreeNode::primary_parent) else {
            return Vec::new();
        };
        self.children(parent_id)
            .into_iter()
            .filter(|n| n.id != id)
            .collect()
    }

    /// Path from the root to a node along primary parents.
    #[must_use]
    pub fn path_to(&self, id: NodeId) -> Vec<&TreeNode> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(&id);
        while let Some(node) = current {
            path.push(node);
            current = node.primary_parent().and_then(|pid| self.nodes.get(&pid));
        }
        path.reverse();
        path
    }

    /// Depth of a node (root = 1), along primary parents.
    #[must_use]
    pub fn depth_of(&self, id: NodeId) -> usize {
        self.path_to(id).len()
    }

    /// Aggregate statistics.
    #[must_use]
    pub fn statistics(&self) -> TreeStatistics {
        let mut level_counts: BTreeMap<usize, usize> = BTreeMap::new();
        let mut depth = 0;
        for id in self.nodes.keys() {
            let d = self.depth_of(*id);
            depth = depth.max(d);
            *level_counts.entry(d).or_insert(0) += 1;
        }
        TreeStatistics {
            total_nodes: self.nodes.len(),
            depth,
            width: level_counts.values().copied().max().unwrap_or(0),
            leaf_nodes: self.nodes.values().filter(|n| n.is_leaf()).count(),
            branch_points: self
                .nodes
                .values()
                .filter(|n| n.children_ids.len() > 1)
                .count(),
            successful_actions: self.nodes.values().filter(|n| n.succeeded()).count(),
            failed_actions: self
                .nodes
                .values()
                .filter(|n| n.status.is_failure())
                .count(),
            merged_nodes: self
                .nodes
                .values()
                .filter(|n| n.has_multiple_parents())
                .count(),
            edges: self.nodes.values().map(|n| n.parent_ids.len()).sum(),
        }
    }
}
