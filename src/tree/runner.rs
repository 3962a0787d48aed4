//! The branching orchestrator.
//!
//! [`TreeRunner`] drives an action sequence layer by layer. Every open branch
//! applies the next action; where a referenced attribute is unknown, the
//! precondition partition (success/fail, via the De Morgan transform) is
//! combined with the postcondition partition (if/elif/else) - intersecting
//! when both constrain the same attribute, taking the Cartesian product when
//! they are disjoint - and each resulting configuration becomes one node,
//! deduplicated per layer by snapshot hash.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use uuid::Uuid;

use crate::action::{Action, ActionRequest};
use crate::attribute::AttributeValue;
use crate::catalog::Catalog;
use crate::condition::Condition;
use crate::constraint::enforce_on_snapshot;
use crate::device::DeviceInstance;
use crate::engine::{DiffKind, TransitionEngine, TransitionStatus};
use crate::error::{ExecutionError, SimResult};
use crate::path::AttributePath;
use crate::snapshot::{SnapshotValue, WorldSnapshot};
use crate::tree::demorgan::{branch_configs, BranchCtx, Configuration, Outcome};
use crate::tree::detect::{
    postcondition_branching, postcondition_options, precondition_unknowns, PostconditionBranching,
};
use crate::tree::factory::{create_or_merge, narrowing_diffs, LayerCache, NodeSeed};
use crate::tree::model::{
    BranchCondition, BranchKind, BranchSource, NodeId, NodeStatus, SimulationTree, TreeNode,
};

/// Options for one simulation run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit simulation id; generated when absent.
    pub simulation_id: Option<String>,
    /// Initial value overrides, `path -> level` (or the literal `unknown`).
    pub initial_values: BTreeMap<String, String>,
    /// Attributes pre-set to unknown.
    pub unknown_attributes: Vec<String>,
}

impl RunOptions {
    /// Sets the simulation id.
    #[must_use]
    pub fn simulation_id(mut self, id: impl Into<String>) -> Self {
        self.simulation_id = Some(id.into());
        self
    }

    /// Overrides an initial attribute value.
    #[must_use]
    pub fn with_initial(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.initial_values.insert(path.into(), value.into());
        self
    }

    /// Pre-sets an attribute to unknown.
    #[must_use]
    pub fn unknown(mut self, path: impl Into<String>) -> Self {
        self.unknown_attributes.push(path.into());
        self
    }
}

/// The branching simulation engine.
#[derive(Debug, Clone, Copy)]
pub struct TreeRunner<'a> {
    catalog: &'a Catalog,
    engine: TransitionEngine<'a>,
}

impl<'a> TreeRunner<'a> {
    /// Creates a runner over the given catalog.
    #[must_use]
    pub const fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            engine: TransitionEngine::new(catalog),
        }
    }

    /// Runs an action sequence and returns the simulation graph.
    pub fn run(
        &self,
        device_type: &str,
        requests: &[ActionRequest],
        options: RunOptions,
    ) -> SimResult<SimulationTree> {
        let mut instance = self.catalog.instantiate(device_type)?;
        self.apply_initial_state(&mut instance, &options)?;

        let simulation_id = options
            .simulation_id
            .unwrap_or_else(|| format!("sim_{}", Uuid::new_v4().simple()));
        let mut tree = SimulationTree::new(
            simulation_id,
            device_type,
            requests.iter().map(|r| r.name.clone()).collect(),
        );

        let root_snapshot = WorldSnapshot::capture(&instance, self.catalog, None);
        let root = tree.add_root(root_snapshot);
        debug!(root = %root, "created root node");

        let mut leaves: Vec<(NodeId, DeviceInstance)> = vec![(root, instance)];
        for request in requests {
            let mut cache = LayerCache::new();
            let mut next_leaves: Vec<(NodeId, DeviceInstance)> = Vec::new();
            let mut seen: BTreeSet<NodeId> = BTreeSet::new();

            for (parent_id, parent_instance) in &leaves {
                let results = self.process_action(
                    &mut tree,
                    &mut cache,
                    *parent_id,
                    parent_instance,
                    request,
                )?;
                for (node_id, node_instance) in results {
                    if !seen.insert(node_id) {
                        continue;
                    }
                    // Error nodes are terminal for their branch; rejected
                    // branches stay live - the world exists even though the
                    // action was refused.
                    let terminal = tree
                        .node(node_id)
                        .is_some_and(|n| n.status == NodeStatus::Error);
                    if !terminal {
                        next_leaves.push((node_id, node_instance));
                    }
                }
            }

            debug!(
                action = request.name.as_str(),
                leaves = next_leaves.len(),
                "layer complete"
            );
            leaves = next_leaves;
        }

        Ok(tree)
    }

    fn apply_initial_state(
        &self,
        instance: &mut DeviceInstance,
        options: &RunOptions,
    ) -> SimResult<()> {
        for (path_str, value) in &options.initial_values {
            let path = AttributePath::parse(path_str)?;
            if value == "unknown" {
                let ai = instance.attribute_mut(&path)?;
                ai.mark_unknown();
                ai.last_known_value = None;
                continue;
            }
            let domain = self
                .catalog
                .domain_of(instance, &path)
                .ok_or_else(|| ExecutionError::AttributeNotFound {
                    path: path_str.clone(),
                })?;
            if !domain.has(value) {
                return Err(ExecutionError::InvalidLevel {
                    value: value.clone(),
                    path: path_str.clone(),
                    levels: domain.levels().to_vec(),
                }
                .into());
            }
            instance.attribute_mut(&path)?.write_value(value);
        }
        for path_str in &options.unknown_attributes {
            let path = AttributePath::parse(path_str)?;
            let ai = instance.attribute_mut(&path)?;
            ai.mark_unknown();
            ai.last_known_value = None;
        }
        Ok(())
    }

    /// Applies one action below one parent node, branching as needed.
    fn process_action(
        &self,
        tree: &mut SimulationTree,
        cache: &mut LayerCache,
        parent_id: NodeId,
        instance: &DeviceInstance,
        request: &ActionRequest,
    ) -> SimResult<Vec<(NodeId, DeviceInstance)>> {
        let parent_snapshot = match tree.node(parent_id) {
            Some(node) => node.snapshot.clone(),
            None => return Ok(Vec::new()),
        };

        let action = match self.catalog.action_for(&instance.type_name, &request.name) {
            Ok(action) => action,
            Err(e) => {
                let id = error_node(
                    tree,
                    parent_id,
                    &parent_snapshot,
                    &request.name,
                    &request.parameters,
                    e.to_string(),
                );
                return Ok(vec![(id, instance.clone())]);
            }
        };
        let parameters = &request.parameters;
        let ctx = BranchCtx {
            catalog: self.catalog,
            instance,
            parent: &parent_snapshot,
            parameters,
        };

        let pre_unknowns = precondition_unknowns(&action, &ctx);
        let post = postcondition_branching(&action, &ctx);

        if pre_unknowns.is_empty() && post == PostconditionBranching::None {
            return self.apply_linear(
                tree,
                cache,
                parent_id,
                &parent_snapshot,
                instance,
                &action,
                parameters,
            );
        }
        debug!(
            action = action.name.as_str(),
            precondition_unknowns = pre_unknowns.len(),
            postcondition = ?post,
            "branch point detected"
        );

        let combined = Condition::all(action.preconditions.iter().cloned());
        let satisfy = branch_configs(&combined, &ctx, false);
        if satisfy == Outcome::Certain(false) {
            // The precondition fails in every possible world: one rejected
            // node, nothing narrowed.
            return self.apply_linear(
                tree,
                cache,
                parent_id,
                &parent_snapshot,
                instance,
                &action,
                parameters,
            );
        }
        let fail = branch_configs(&combined, &ctx, true);

        let mut results: Vec<(NodeId, DeviceInstance)> = Vec::new();

        // Success side, each precondition configuration crossed with the
        // postcondition partition.
        let success_configs = match satisfy {
            Outcome::Certain(true) => vec![Configuration::default()],
            Outcome::Certain(false) => Vec::new(),
            Outcome::Branches(configs) => configs,
        };
        for success in &success_configs {
            results.extend(self.expand_success_config(
                tree,
                cache,
                parent_id,
                &parent_snapshot,
                instance,
                &action,
                parameters,
                &ctx,
                success,
                &post,
            )?);
        }

        // Fail side: one rejected sibling per De Morgan configuration.
        if let Outcome::Branches(configs) = fail {
            for config in &configs {
                results.push(self.build_fail_node(
                    tree,
                    cache,
                    parent_id,
                    &parent_snapshot,
                    instance,
                    &action,
                    parameters,
                    config,
                )?);
            }
        }

        Ok(results)
    }

    /// Expands one precondition success configuration across the
    /// postcondition partition.
    #[allow(clippy::too_many_arguments)]
    fn expand_success_config(
        &self,
        tree: &mut SimulationTree,
        cache: &mut LayerCache,
        parent_id: NodeId,
        parent_snapshot: &WorldSnapshot,
        instance: &DeviceInstance,
        action: &Action,
        parameters: &BTreeMap<String, String>,
        ctx: &BranchCtx<'_>,
        success: &Configuration,
        post: &PostconditionBranching,
    ) -> SimResult<Vec<(NodeId, DeviceInstance)>> {
        let mut out = Vec::new();
        match post {
            PostconditionBranching::Flat { attribute } => {
                let options = postcondition_options(action, attribute, ctx);
                let possible = ctx.possible_values(attribute).map(|(values, _)| values);
                let Some(possible) = possible else {
                    out.push(self.success_node(
                        tree, cache, parent_id, parent_snapshot, instance, action, parameters, success,
                    )?);
                    return Ok(out);
                };
                if options.is_empty() {
                    out.push(self.success_node(
                        tree, cache, parent_id, parent_snapshot, instance, action, parameters, success,
                    )?);
                    return Ok(out);
                }
                for (clause_values, kind) in options {
                    let clause: Vec<String> = clause_values
                        .into_iter()
                        .filter(|v| possible.contains(v))
                        .collect();
                    if clause.is_empty() {
                        continue;
                    }
                    let mut clause_config = Configuration::default();
                    clause_config.0.insert(attribute.clone(), clause);
                    let Some(merged) = success.merged_with(&clause_config) else {
                        continue;
                    };
                    let values = merged.0.get(attribute).cloned().unwrap_or_default();
                    let bc = BranchCondition::simple(
                        attribute.as_str(),
                        &values,
                        BranchSource::Postcondition,
                        kind,
                    );
                    out.push(self.build_applied_node(
                        tree,
                        cache,
                        parent_id,
                        parent_snapshot,
                        instance,
                        action,
                        parameters,
                        &merged,
                        Some(bc),
                        kind == BranchKind::Else,
                    )?);
                }
            }

            PostconditionBranching::Compound { condition } => {
                let then_out = branch_configs(condition, ctx, false);
                let else_out = branch_configs(condition, ctx, true);

                match then_out {
                    Outcome::Certain(true) => {
                        out.push(self.success_node(
                            tree, cache, parent_id, parent_snapshot, instance, action, parameters, success,
                        )?);
                    }
                    Outcome::Certain(false) => {}
                    Outcome::Branches(configs) => {
                        for config in &configs {
                            let Some(merged) = success.merged_with(config) else {
                                continue;
                            };
                            let bc = BranchCondition::compound_and(
                                &config.0,
                                BranchSource::Postcondition,
                                BranchKind::If,
                            );
                            out.push(self.build_applied_node(
                                tree,
                                cache,
                                parent_id,
                                parent_snapshot,
                                instance,
                                action,
                                parameters,
                                &merged,
                                bc,
                                false,
                            )?);
                        }
                    }
                }

                match else_out {
                    Outcome::Certain(true) => {
                        out.push(self.build_applied_node(
                            tree,
                            cache,
                            parent_id,
                            parent_snapshot,
                            instance,
                            action,
                            parameters,
                            success,
                            success_branch_condition(success),
                            true,
                        )?);
                    }
                    Outcome::Certain(false) => {}
                    Outcome::Branches(configs) => {
                        for config in &configs {
                            let Some(merged) = success.merged_with(config) else {
                                continue;
                            };
                            let bc = BranchCondition::compound_and(
                                &config.0,
                                BranchSource::Postcondition,
                                BranchKind::Else,
                            );
                            out.push(self.build_applied_node(
                                tree,
                                cache,
                                parent_id,
                                parent_snapshot,
                                instance,
                                action,
                                parameters,
                                &merged,
                                bc,
                                true,
                            )?);
                        }
                    }
                }
            }

            PostconditionBranching::None => {
                out.push(self.success_node(
                    tree, cache, parent_id, parent_snapshot, instance, action, parameters, success,
                )?);
            }
        }
        Ok(out)
    }

    /// A plain success node for one precondition configuration.
    #[allow(clippy::too_many_arguments)]
    fn success_node(
        &self,
        tree: &mut SimulationTree,
        cache: &mut LayerCache,
        parent_id: NodeId,
        parent_snapshot: &WorldSnapshot,
        instance: &DeviceInstance,
        action: &Action,
        parameters: &BTreeMap<String, String>,
        success: &Configuration,
    ) -> SimResult<(NodeId, DeviceInstance)> {
        self.build_applied_node(
            tree,
            cache,
            parent_id,
            parent_snapshot,
            instance,
            action,
            parameters,
            success,
            success_branch_condition(success),
            false,
        )
    }

    /// Builds one applied-action node: constrain, run the engine, snapshot.
    #[allow(clippy::too_many_arguments)]
    fn build_applied_node(
        &self,
        tree: &mut SimulationTree,
        cache: &mut LayerCache,
        parent_id: NodeId,
        parent_snapshot: &WorldSnapshot,
        instance: &DeviceInstance,
        action: &Action,
        parameters: &BTreeMap<String, String>,
        config: &Configuration,
        branch_condition: Option<BranchCondition>,
        guard_failure_ok: bool,
    ) -> SimResult<(NodeId, DeviceInstance)> {
        let constrained = constrain_instance(instance, config);
        let result = match self.engine.apply(&constrained, action, parameters) {
            Ok(result) => result,
            Err(e) => {
                let id = error_node(
                    tree,
                    parent_id,
                    parent_snapshot,
                    &action.name,
                    parameters,
                    e.to_string(),
                );
                return Ok((id, constrained));
            }
        };

        let guard_rejection = result.status == TransitionStatus::Rejected
            && result
                .reason
                .as_deref()
                .is_some_and(|r| r.starts_with("Postcondition failed"));
        let (status, error, effect_changes, after) = match result.status {
            TransitionStatus::Ok => (NodeStatus::Ok, None, result.changes, result.after),
            TransitionStatus::Rejected if guard_failure_ok && guard_rejection => {
                // The else side of a guard with no else effects: the world
                // exists, nothing was written.
                (NodeStatus::Ok, None, Vec::new(), None)
            }
            TransitionStatus::Rejected => {
                (NodeStatus::Rejected, result.reason, Vec::new(), None)
            }
            TransitionStatus::ConstraintViolated => (
                NodeStatus::ConstraintViolated,
                result.reason,
                result.changes,
                result.after,
            ),
        };

        let result_instance = after.unwrap_or(constrained);
        let mut snapshot =
            WorldSnapshot::capture(&result_instance, self.catalog, Some(parent_snapshot));

        // Re-impose branch constraints on attributes the effects did not
        // write: an explicit write always survives, as does a trend-produced
        // value-set.
        let written: BTreeSet<&str> = effect_changes
            .iter()
            .filter(|c| c.kind == DiffKind::Value)
            .map(|c| c.attribute.as_str())
            .collect();
        for (attr, values) in &config.0 {
            if written.contains(attr.as_str()) {
                continue;
            }
            let Ok(path) = AttributePath::parse(attr) else {
                continue;
            };
            if snapshot.value(&path).is_some_and(SnapshotValue::is_value_set) {
                continue;
            }
            snapshot.set_value(&path, SnapshotValue::from_values(values));
        }

        let mut changes = narrowing_diffs(parent_snapshot, config);
        changes.extend(effect_changes);

        let (id, created) = create_or_merge(
            tree,
            cache,
            parent_id,
            parent_snapshot,
            snapshot,
            NodeSeed {
                action_name: action.name.clone(),
                parameters: parameters.clone(),
                status,
                error,
                branch_condition,
                changes,
            },
        );
        if !created {
            debug!(node = %id, "merged into existing state");
        }
        Ok((id, result_instance))
    }

    /// Builds one rejected node for a De Morgan fail configuration.
    #[allow(clippy::too_many_arguments)]
    fn build_fail_node(
        &self,
        tree: &mut SimulationTree,
        cache: &mut LayerCache,
        parent_id: NodeId,
        parent_snapshot: &WorldSnapshot,
        instance: &DeviceInstance,
        action: &Action,
        parameters: &BTreeMap<String, String>,
        config: &Configuration,
    ) -> SimResult<(NodeId, DeviceInstance)> {
        let mut snapshot = parent_snapshot.clone();
        let mut changes = narrowing_diffs(parent_snapshot, config);
        for (attr, values) in &config.0 {
            if let Ok(path) = AttributePath::parse(attr) {
                snapshot.narrow(&path, values);
            }
        }
        changes.extend(enforce_on_snapshot(&mut snapshot, self.catalog));

        let branch_condition =
            BranchCondition::compound_and(&config.0, BranchSource::Precondition, BranchKind::Fail);
        let error = fail_error(action, config);

        let (id, _) = create_or_merge(
            tree,
            cache,
            parent_id,
            parent_snapshot,
            snapshot,
            NodeSeed {
                action_name: action.name.clone(),
                parameters: parameters.clone(),
                status: NodeStatus::Rejected,
                error: Some(error),
                branch_condition,
                changes,
            },
        );
        Ok((id, constrain_instance(instance, config)))
    }

    /// Applies the action with no branching: one node, status per outcome.
    #[allow(clippy::too_many_arguments)]
    fn apply_linear(
        &self,
        tree: &mut SimulationTree,
        cache: &mut LayerCache,
        parent_id: NodeId,
        parent_snapshot: &WorldSnapshot,
        instance: &DeviceInstance,
        action: &Action,
        parameters: &BTreeMap<String, String>,
    ) -> SimResult<Vec<(NodeId, DeviceInstance)>> {
        let result = match self.engine.apply(instance, action, parameters) {
            Ok(result) => result,
            Err(e) => {
                let id = error_node(
                    tree,
                    parent_id,
                    parent_snapshot,
                    &action.name,
                    parameters,
                    e.to_string(),
                );
                return Ok(vec![(id, instance.clone())]);
            }
        };

        let (status, error, snapshot, after, branch_condition) = match result.status {
            TransitionStatus::Ok => {
                let after = result.after.unwrap_or_else(|| instance.clone());
                let snapshot = WorldSnapshot::capture(&after, self.catalog, Some(parent_snapshot));
                let bc = linear_postcondition_branch(action, instance);
                (NodeStatus::Ok, None, snapshot, after, bc)
            }
            TransitionStatus::Rejected => {
                let bc = linear_precondition_failure(action, instance);
                (
                    NodeStatus::Rejected,
                    result.reason,
                    parent_snapshot.clone(),
                    instance.clone(),
                    bc,
                )
            }
            TransitionStatus::ConstraintViolated => {
                let after = result.after.unwrap_or_else(|| instance.clone());
                let snapshot = WorldSnapshot::capture(&after, self.catalog, Some(parent_snapshot));
                (
                    NodeStatus::ConstraintViolated,
                    result.reason,
                    snapshot,
                    after,
                    None,
                )
            }
        };

        let changes = if status == NodeStatus::Rejected {
            Vec::new()
        } else {
            result.changes
        };
        let (id, _) = create_or_merge(
            tree,
            cache,
            parent_id,
            parent_snapshot,
            snapshot,
            NodeSeed {
                action_name: action.name.clone(),
                parameters: parameters.clone(),
                status,
                error,
                branch_condition,
                changes,
            },
        );
        Ok(vec![(id, after)])
    }
}

/// Clones an instance with each configured attribute pinned to the first
/// value of its set; trend bookkeeping is left untouched so snapshots can
/// still tell a branch constraint from an explicit write.
fn constrain_instance(instance: &DeviceInstance, config: &Configuration) -> DeviceInstance {
    let mut clone = instance.clone();
    for (attr, values) in &config.0 {
        let Ok(path) = AttributePath::parse(attr) else {
            continue;
        };
        if let (Ok(ai), Some(first)) = (clone.attribute_mut(&path), values.first()) {
            ai.current_value = AttributeValue::Level(first.clone());
        }
    }
    clone
}

fn success_branch_condition(config: &Configuration) -> Option<BranchCondition> {
    BranchCondition::compound_and(&config.0, BranchSource::Precondition, BranchKind::Success)
}

/// The rejection message for a fail configuration, reconstructed from the
/// action's own preconditions where a single attribute is to blame.
fn fail_error(action: &Action, config: &Configuration) -> String {
    if config.0.len() == 1 {
        if let Some((attr, values)) = config.0.iter().next() {
            for condition in &action.preconditions {
                if let Some(message) = leaf_failure_message(condition, attr, values) {
                    return format!("Precondition failed: {message}");
                }
            }
            let actual = SnapshotValue::from_values(values);
            return format!("Precondition failed: {attr} (actual: {actual})");
        }
    }
    let combined = Condition::all(action.preconditions.iter().cloned());
    format!("Precondition failed: {}", combined.describe())
}

fn leaf_failure_message(condition: &Condition, attr: &str, values: &[String]) -> Option<String> {
    match condition {
        Condition::Attribute {
            target,
            operator,
            value,
        } if target.to_string() == attr => {
            let actual = SnapshotValue::from_values(values);
            Some(format!(
                "{target} {} {value}, but got {actual}",
                operator.failure_phrase()
            ))
        }
        Condition::All { conditions } | Condition::Any { conditions } => conditions
            .iter()
            .find_map(|c| leaf_failure_message(c, attr, values)),
        Condition::Not { condition } => leaf_failure_message(condition, attr, values),
        Condition::Implies { when, then } => leaf_failure_message(when, attr, values)
            .or_else(|| leaf_failure_message(then, attr, values)),
        _ => None,
    }
}

/// Branch condition recorded on a linear success node: which postcondition
/// clause the concrete state selected, if any.
fn linear_postcondition_branch(
    action: &Action,
    instance: &DeviceInstance,
) -> Option<BranchCondition> {
    for effect in &action.effects {
        let crate::effect::Effect::Conditional { condition, .. } = effect else {
            continue;
        };
        let Condition::Attribute { target, .. } = condition else {
            continue;
        };
        let actual = instance
            .try_attribute(target)?
            .current_value
            .as_level()?
            .to_string();
        return Some(BranchCondition::simple(
            target.to_string(),
            &[actual],
            BranchSource::Postcondition,
            BranchKind::If,
        ));
    }
    None
}

/// Branch condition recorded on a linear rejected node: the first attribute
/// precondition with its actual value.
fn linear_precondition_failure(
    action: &Action,
    instance: &DeviceInstance,
) -> Option<BranchCondition> {
    for condition in &action.preconditions {
        let Condition::Attribute { target, .. } = condition else {
            continue;
        };
        let Some(ai) = instance.try_attribute(target) else {
            continue;
        };
        let Some(actual) = ai.current_value.as_level() else {
            continue;
        };
        return Some(BranchCondition::simple(
            target.to_string(),
            &[actual.to_string()],
            BranchSource::Precondition,
            BranchKind::Fail,
        ));
    }
    None
}

fn error_node(
    tree: &mut SimulationTree,
    parent_id: NodeId,
    parent_snapshot: &WorldSnapshot,
    action_name: &str,
    parameters: &BTreeMap<String, String>,
    message: String,
) -> NodeId {
    let id = tree.next_node_id();
    tree.insert_node(TreeNode {
        id,
        snapshot: parent_snapshot.clone(),
        parent_ids: vec![parent_id],
        children_ids: Vec::new(),
        incoming_edges: Vec::new(),
        action_name: Some(action_name.to_string()),
        parameters: parameters.clone(),
        status: NodeStatus::Error,
        error: Some(message),
        branch_condition: None,
        changes: Vec::new(),
    });
    id
}
