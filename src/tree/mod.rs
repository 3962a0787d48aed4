//! Branching simulation: snapshots become nodes, actions become edges.
//!
//! The tree layer turns the deterministic evaluator into a branching engine:
//! whenever an action's preconditions or conditional-effect guards reference
//! an attribute whose value is unknown (or known only to lie within a
//! value-set), every distinct reachable world state is materialized as a node,
//! tagged with the condition that selects it, and structurally identical
//! states are merged into a shared node of a DAG.

mod demorgan;
mod detect;
mod factory;
mod model;
mod runner;

pub use model::{
    BranchCombinator, BranchCondition, BranchKind, BranchSource, IncomingEdge, NodeId, NodeStatus,
    SimulationTree, TreeNode, TreeStatistics,
};
pub use runner::{RunOptions, TreeRunner};

pub(crate) use demorgan::Configuration;
