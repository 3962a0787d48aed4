//! # Qualsim - Qualitative Device Simulation
//!
//! Qualsim models discrete devices (a flashlight, a kettle) as typed attribute
//! graphs and simulates how sequences of parameterized actions transform their
//! state under a small declarative rule language: preconditions, effects, and
//! dependency constraints evaluated over finite ordered value domains.
//!
//! ## Core Concepts
//!
//! - **OrderedDomain**: a finite, totally ordered set of named levels
//! - **DeviceInstance**: a live device whose attributes hold levels, trends, and
//!   residual uncertainty
//! - **Action**: preconditions + effects, optionally gated by capabilities
//! - **TransitionEngine**: the deterministic single-step evaluator
//! - **TreeRunner**: the branching engine - when a referenced attribute is
//!   unknown, every distinct reachable world state becomes a node in a
//!   deduplicated simulation graph
//!
//! ## Usage
//!
//! ```rust,ignore
//! use qualsim::{ActionRequest, Catalog, RunOptions, TreeRunner};
//!
//! let catalog: Catalog = build_catalog()?;
//! let runner = TreeRunner::new(&catalog);
//! let tree = runner.run(
//!     "flashlight",
//!     &[ActionRequest::new("turn_on")],
//!     RunOptions::default().unknown("battery.level"),
//! )?;
//! assert!(tree.node_count() > 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Definition layer: domains, attributes, conditions, effects, actions, devices
pub mod action;
pub mod attribute;
pub mod capability;
pub mod catalog;
pub mod condition;
pub mod constraint;
pub mod device;
pub mod domain;
pub mod effect;
pub mod error;
pub mod path;

// Evaluation layer: deterministic transitions and linear sessions
pub mod engine;
pub mod history;

// Branching layer: snapshots, De Morgan branch computation, the simulation graph
pub mod snapshot;
pub mod tree;

// Re-export primary types at crate root for convenience
pub use action::{Action, ActionRequest, ParameterSpec};
pub use attribute::{AttributeInstance, AttributeSpec, AttributeValue, TrendDirection};
pub use capability::CapabilityDef;
pub use catalog::{Catalog, CatalogBuilder};
pub use condition::{CompareOp, Condition, ConditionValue};
pub use constraint::DependencyConstraint;
pub use device::{DeviceInstance, DeviceType, PartSpec};
pub use domain::OrderedDomain;
pub use effect::Effect;
pub use error::{DefinitionError, ExecutionError, SimError, SimResult};
pub use path::AttributePath;

pub use engine::{DiffEntry, DiffKind, TransitionEngine, TransitionResult, TransitionStatus};
pub use history::{SessionRunner, SimulationHistory, SimulationStep};
pub use snapshot::{AttributeState, SnapshotValue, WorldSnapshot};
pub use tree::{
    BranchCondition, BranchKind, BranchSource, IncomingEdge, NodeId, NodeStatus, RunOptions,
    SimulationTree, TreeNode, TreeRunner, TreeStatistics,
};
