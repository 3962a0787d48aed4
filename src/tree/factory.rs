//! Node creation with layer-scoped deduplication.
//!
//! All branch construction funnels through [`create_or_merge`]: the new
//! snapshot's content hash is looked up in the current layer's cache, and on a
//! hit the existing node gains an incoming edge instead of a duplicate node.
//! The cache lives for exactly one layer - the set of nodes produced while
//! advancing one action across all open branches - and is rebuilt for the
//! next action.

use std::collections::{BTreeMap, HashMap};

use crate::engine::DiffEntry;
use crate::snapshot::{SnapshotValue, WorldSnapshot};
use crate::tree::model::{
    BranchCondition, IncomingEdge, NodeId, NodeStatus, SimulationTree, TreeNode,
};
use crate::tree::Configuration;

/// Snapshot-hash -> node cache, scoped to one expansion layer.
#[derive(Debug, Default)]
pub(crate) struct LayerCache {
    by_hash: HashMap<String, NodeId>,
}

impl LayerCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

/// Everything a new node needs besides its snapshot.
#[derive(Debug)]
pub(crate) struct NodeSeed {
    pub action_name: String,
    pub parameters: BTreeMap<String, String>,
    pub status: NodeStatus,
    pub error: Option<String>,
    pub branch_condition: Option<BranchCondition>,
    /// Changes recorded so far (narrowing first, then effect diffs).
    pub changes: Vec<DiffEntry>,
}

/// Creates a node for `snapshot` under `parent_id`, or merges into an
/// existing node of the current layer with the same state hash.
///
/// Returns the node id and whether a new node was created.
pub(crate) fn create_or_merge(
    tree: &mut SimulationTree,
    cache: &mut LayerCache,
    parent_id: NodeId,
    parent_snapshot: &WorldSnapshot,
    snapshot: WorldSnapshot,
    seed: NodeSeed,
) -> (NodeId, bool) {
    let full_changes = augment_with_snapshot_diff(parent_snapshot, &snapshot, seed.changes);
    let hash = snapshot.state_hash();

    if let Some(&existing) = cache.by_hash.get(&hash) {
        tree.add_edge_to_existing(
            existing,
            IncomingEdge {
                parent_id,
                action_name: seed.action_name,
                parameters: seed.parameters,
                status: seed.status,
                error: seed.error,
                branch_condition: seed.branch_condition,
                changes: full_changes,
            },
        );
        return (existing, false);
    }

    let id = tree.next_node_id();
    tree.insert_node(TreeNode {
        id,
        snapshot,
        parent_ids: vec![parent_id],
        children_ids: Vec::new(),
        incoming_edges: Vec::new(),
        action_name: Some(seed.action_name),
        parameters: seed.parameters,
        status: seed.status,
        error: seed.error,
        branch_condition: seed.branch_condition,
        changes: full_changes,
    });
    cache.by_hash.insert(hash, id);
    (id, true)
}

/// The narrowing diff for one attribute, when constraining actually narrows.
pub(crate) fn narrowing_diff(
    parent: &WorldSnapshot,
    path_str: &str,
    values: &[String],
) -> Option<DiffEntry> {
    let path = crate::path::AttributePath::parse(path_str).ok()?;
    let before = parent.value(&path)?.clone();
    if before.is_known() {
        return None;
    }
    let after = SnapshotValue::from_values(values);
    if after == before {
        return None;
    }
    Some(DiffEntry::narrowing(path_str, before, after))
}

/// Narrowing diffs for every attribute of a configuration, in path order.
pub(crate) fn narrowing_diffs(parent: &WorldSnapshot, config: &Configuration) -> Vec<DiffEntry> {
    config
        .0
        .iter()
        .filter_map(|(path, values)| narrowing_diff(parent, path, values))
        .collect()
}

/// Prepends value diffs for attributes that changed between the two snapshots
/// but are not yet covered by the recorded changes.
fn augment_with_snapshot_diff(
    parent: &WorldSnapshot,
    new: &WorldSnapshot,
    base: Vec<DiffEntry>,
) -> Vec<DiffEntry> {
    let mut additional = Vec::new();
    for path in parent.attribute_paths() {
        let path_str = path.to_string();
        if base.iter().any(|c| c.attribute == path_str) {
            continue;
        }
        let (Some(before), Some(after)) = (parent.value(&path), new.value(&path)) else {
            continue;
        };
        if before != after {
            additional.push(DiffEntry::value(path_str, before.clone(), after.clone()));
        }
    }
    additional.extend(base);
    additional
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeSpec;
    use crate::catalog::Catalog;
    use crate::device::{DeviceType, PartSpec};
    use crate::domain::OrderedDomain;
    use crate::engine::DiffKind;
    use crate::path::AttributePath;

    fn catalog() -> Catalog {
        Catalog::builder()
            .domain(
                OrderedDomain::new("battery_level", ["empty", "low", "medium", "high", "full"])
                    .unwrap(),
            )
            .device(DeviceType::new("probe").with_part(PartSpec::new(
                "battery",
                [AttributeSpec::new("level", "battery_level", "full")],
            )))
            .build()
            .unwrap()
    }

    fn seed(name: &str) -> NodeSeed {
        NodeSeed {
            action_name: name.to_string(),
            parameters: BTreeMap::new(),
            status: NodeStatus::Ok,
            error: None,
            branch_condition: None,
            changes: Vec::new(),
        }
    }

    #[test]
    fn identical_snapshots_merge_within_a_layer() {
        let catalog = catalog();
        let instance = catalog.instantiate("probe").unwrap();
        let snapshot = WorldSnapshot::capture(&instance, &catalog, None);
        let mut tree = SimulationTree::new("sim", "probe", vec![]);
        let root = tree.add_root(snapshot.clone());
        let mut cache = LayerCache::new();

        let (a, created_a) =
            create_or_merge(&mut tree, &mut cache, root, &snapshot, snapshot.clone(), seed("act"));
        let (b, created_b) =
            create_or_merge(&mut tree, &mut cache, root, &snapshot, snapshot.clone(), seed("act"));

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
        assert_eq!(tree.node_count(), 2);
        assert_eq!(tree.node(a).unwrap().incoming_edges.len(), 1);
    }

    #[test]
    fn a_fresh_layer_does_not_merge() {
        let catalog = catalog();
        let instance = catalog.instantiate("probe").unwrap();
        let snapshot = WorldSnapshot::capture(&instance, &catalog, None);
        let mut tree = SimulationTree::new("sim", "probe", vec![]);
        let root = tree.add_root(snapshot.clone());

        let mut layer1 = LayerCache::new();
        let (a, _) =
            create_or_merge(&mut tree, &mut layer1, root, &snapshot, snapshot.clone(), seed("act"));
        let mut layer2 = LayerCache::new();
        let (b, created) =
            create_or_merge(&mut tree, &mut layer2, a, &snapshot, snapshot.clone(), seed("act"));
        assert!(created);
        assert_ne!(a, b);
    }

    #[test]
    fn narrowing_diff_skips_known_values() {
        let catalog = catalog();
        let instance = catalog.instantiate("probe").unwrap();
        let mut snapshot = WorldSnapshot::capture(&instance, &catalog, None);
        let path = AttributePath::part("battery", "level");

        // Known level: narrowing records nothing.
        assert!(narrowing_diff(&snapshot, "battery.level", &["full".to_string()]).is_none());

        snapshot.set_value(
            &path,
            SnapshotValue::Set(vec!["low".to_string(), "medium".to_string(), "high".to_string()]),
        );
        let diff = narrowing_diff(
            &snapshot,
            "battery.level",
            &["low".to_string(), "medium".to_string()],
        )
        .unwrap();
        assert_eq!(diff.kind, DiffKind::Narrowing);
        assert_eq!(
            diff.after,
            SnapshotValue::Set(vec!["low".to_string(), "medium".to_string()])
        );
    }

    #[test]
    fn snapshot_diff_augments_untracked_changes() {
        let catalog = catalog();
        let instance = catalog.instantiate("probe").unwrap();
        let parent = WorldSnapshot::capture(&instance, &catalog, None);
        let mut new = parent.clone();
        new.set_value(
            &AttributePath::part("battery", "level"),
            SnapshotValue::Level("low".to_string()),
        );
        let out = augment_with_snapshot_diff(&parent, &new, Vec::new());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].attribute, "battery.level");
        assert_eq!(out[0].kind, DiffKind::Value);
    }
}
