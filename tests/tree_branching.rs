//! End-to-end branching tests over the public API.

use qualsim::{
    Action, ActionRequest, AttributePath, AttributeSpec, BranchKind, Catalog, CompareOp, Condition,
    ConditionValue, DependencyConstraint, DeviceType, Effect, NodeStatus, OrderedDomain, PartSpec,
    RunOptions, SnapshotValue, TreeRunner, TrendDirection,
};

fn level() -> AttributePath {
    AttributePath::part("battery", "level")
}

/// A flashlight whose turn_on postcondition is a full if/elif/else chain.
fn flashlight_catalog() -> Catalog {
    let brightness = AttributePath::part("bulb", "brightness");
    let chain = Effect::Conditional {
        condition: Condition::attr(level(), CompareOp::Equals, ConditionValue::literal("full")),
        then_effects: vec![Effect::set(brightness.clone(), "high")],
        else_effects: vec![Effect::Conditional {
            condition: Condition::attr(
                level(),
                CompareOp::In,
                ConditionValue::set(["low", "medium", "high"]),
            ),
            then_effects: vec![Effect::set(brightness.clone(), "medium")],
            else_effects: vec![Effect::set(brightness, "none")],
        }],
    };

    Catalog::builder()
        .domain(
            OrderedDomain::new("battery_level", ["empty", "low", "medium", "high", "full"])
                .unwrap(),
        )
        .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
        .domain(OrderedDomain::new("brightness_level", ["none", "medium", "high"]).unwrap())
        .action(
            Action::new("turn_on")
                .with_precondition(Condition::attr(
                    level(),
                    CompareOp::NotEquals,
                    ConditionValue::literal("empty"),
                ))
                .with_effect(Effect::set(AttributePath::part("bulb", "state"), "on"))
                .with_effect(chain),
        )
        .action(
            Action::new("turn_off")
                .with_effect(Effect::set(AttributePath::part("bulb", "state"), "off"))
                .with_effect(Effect::set(AttributePath::part("bulb", "brightness"), "none")),
        )
        .action(
            Action::new("recharge")
                .with_precondition(Condition::attr(
                    level(),
                    CompareOp::NotEquals,
                    ConditionValue::literal("full"),
                ))
                .with_effect(Effect::set(level(), "full")),
        )
        .action(
            Action::new("drain")
                .with_effect(Effect::set(AttributePath::part("bulb", "state"), "off"))
                .with_effect(Effect::set(AttributePath::part("bulb", "brightness"), "none"))
                .with_effect(Effect::set(level(), "empty")),
        )
        .device(
            DeviceType::new("flashlight")
                .with_part(PartSpec::new(
                    "battery",
                    [AttributeSpec::new("level", "battery_level", "full")],
                ))
                .with_part(PartSpec::new(
                    "bulb",
                    [
                        AttributeSpec::new("state", "binary_state", "off"),
                        AttributeSpec::new("brightness", "brightness_level", "none"),
                    ],
                ))
                .with_constraint(
                    DependencyConstraint::new(
                        Condition::attr(
                            AttributePath::part("bulb", "state"),
                            CompareOp::Equals,
                            ConditionValue::literal("on"),
                        ),
                        Condition::attr(
                            level(),
                            CompareOp::NotEquals,
                            ConditionValue::literal("empty"),
                        ),
                    )
                    .with_reset(AttributePath::part("bulb", "brightness"), "none"),
                ),
        )
        .build()
        .unwrap()
}

/// A slot machine for compound-precondition shapes.
fn slot_catalog() -> Catalog {
    let reel = |n: u8| AttributePath::part(format!("reel{n}"), "symbol");
    let seven = |n: u8| {
        Condition::attr(reel(n), CompareOp::Equals, ConditionValue::literal("seven"))
    };

    Catalog::builder()
        .domain(OrderedDomain::new("symbol", ["cherry", "bar", "seven"]).unwrap())
        .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
        .action(
            Action::new("check_jackpot")
                .with_precondition(Condition::all([seven(1), seven(2), seven(3)]))
                .with_effect(Effect::set(AttributePath::global("jackpot"), "on")),
        )
        .action(
            Action::new("check_pair_or_lucky")
                .with_precondition(Condition::any([
                    Condition::all([seven(1), seven(2)]),
                    seven(3),
                ]))
                .with_effect(Effect::set(AttributePath::global("jackpot"), "on")),
        )
        .device(
            DeviceType::new("slot_machine")
                .with_part(PartSpec::new(
                    "reel1",
                    [AttributeSpec::new("symbol", "symbol", "cherry")],
                ))
                .with_part(PartSpec::new(
                    "reel2",
                    [AttributeSpec::new("symbol", "symbol", "cherry")],
                ))
                .with_part(PartSpec::new(
                    "reel3",
                    [AttributeSpec::new("symbol", "symbol", "cherry")],
                ))
                .with_global(AttributeSpec::new("jackpot", "binary_state", "off")),
        )
        .build()
        .unwrap()
}

fn children_by_status(
    tree: &qualsim::SimulationTree,
    status: NodeStatus,
) -> Vec<&qualsim::TreeNode> {
    let root = tree.root().unwrap();
    tree.children(root.id)
        .into_iter()
        .filter(|n| n.status == status)
        .collect()
}

#[test]
fn unknown_battery_splits_into_fail_and_two_successes() {
    let catalog = flashlight_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "flashlight",
            &[ActionRequest::new("turn_on")],
            RunOptions::default().unknown("battery.level"),
        )
        .unwrap();

    // Root + 1 fail (empty) + success for full and for {low, medium, high}.
    assert_eq!(tree.node_count(), 4);
    let fails = children_by_status(&tree, NodeStatus::Rejected);
    let successes = children_by_status(&tree, NodeStatus::Ok);
    assert_eq!(fails.len(), 1);
    assert_eq!(successes.len(), 2);

    let fail = fails[0];
    assert_eq!(
        fail.snapshot.value(&level()),
        Some(&SnapshotValue::Level("empty".to_string()))
    );
    assert!(fail.error.as_deref().unwrap().contains("battery.level"));

    let brightness = AttributePath::part("bulb", "brightness");
    let full_branch = successes
        .iter()
        .find(|n| n.snapshot.value(&level()) == Some(&SnapshotValue::Level("full".to_string())))
        .expect("branch for battery.level == full");
    assert_eq!(
        full_branch.snapshot.value(&brightness),
        Some(&SnapshotValue::Level("high".to_string()))
    );

    let mid_branch = successes
        .iter()
        .find(|n| {
            n.snapshot.value(&level())
                == Some(&SnapshotValue::Set(vec![
                    "low".to_string(),
                    "medium".to_string(),
                    "high".to_string(),
                ]))
        })
        .expect("branch for battery.level in {low, medium, high}");
    assert_eq!(
        mid_branch.snapshot.value(&brightness),
        Some(&SnapshotValue::Level("medium".to_string()))
    );

    // Branch kinds follow the clause structure.
    assert_eq!(
        full_branch.branch_condition.as_ref().unwrap().kind(),
        BranchKind::If
    );
    assert_eq!(
        mid_branch.branch_condition.as_ref().unwrap().kind(),
        BranchKind::Elif
    );
}

#[test]
fn and_of_three_unknowns_one_success_three_fails() {
    let catalog = slot_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "slot_machine",
            &[ActionRequest::new("check_jackpot")],
            RunOptions::default()
                .unknown("reel1.symbol")
                .unknown("reel2.symbol")
                .unknown("reel3.symbol"),
        )
        .unwrap();

    let successes = children_by_status(&tree, NodeStatus::Ok);
    let fails = children_by_status(&tree, NodeStatus::Rejected);
    assert_eq!(successes.len(), 1);
    assert_eq!(fails.len(), 3);

    // The success branch pins every reel to seven and applies the effect.
    let success = successes[0];
    for n in 1..=3u8 {
        assert_eq!(
            success
                .snapshot
                .value(&AttributePath::part(format!("reel{n}"), "symbol")),
            Some(&SnapshotValue::Level("seven".to_string()))
        );
    }
    assert_eq!(
        success.snapshot.value(&AttributePath::global("jackpot")),
        Some(&SnapshotValue::Level("on".to_string()))
    );

    // Each fail branch narrows exactly one reel to the complement and leaves
    // the others at their prior uncertainty.
    for fail in fails {
        let narrowed: Vec<_> = (1..=3u8)
            .filter(|n| {
                fail.snapshot
                    .value(&AttributePath::part(format!("reel{n}"), "symbol"))
                    == Some(&SnapshotValue::Set(vec![
                        "cherry".to_string(),
                        "bar".to_string(),
                    ]))
            })
            .collect();
        assert_eq!(narrowed.len(), 1);
    }
}

#[test]
fn nested_and_or_produces_two_successes_and_two_fails() {
    let catalog = slot_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "slot_machine",
            &[ActionRequest::new("check_pair_or_lucky")],
            RunOptions::default()
                .unknown("reel1.symbol")
                .unknown("reel2.symbol")
                .unknown("reel3.symbol"),
        )
        .unwrap();

    let successes = children_by_status(&tree, NodeStatus::Ok);
    let fails = children_by_status(&tree, NodeStatus::Rejected);
    assert_eq!(successes.len(), 2);
    assert_eq!(fails.len(), 2);

    let reel = |n: u8| AttributePath::part(format!("reel{n}"), "symbol");
    let not_seven = SnapshotValue::Set(vec!["cherry".to_string(), "bar".to_string()]);

    // One fail fixes reel1's complement and reel3's, leaving reel2 uncertain;
    // the other fixes reel2's and reel3's, leaving reel1 uncertain.
    let fail_r1 = fails
        .iter()
        .find(|n| n.snapshot.value(&reel(1)) == Some(&not_seven))
        .expect("fail branch constraining reel1");
    assert_eq!(fail_r1.snapshot.value(&reel(3)), Some(&not_seven));
    assert_eq!(
        fail_r1.snapshot.value(&reel(2)),
        Some(&SnapshotValue::Unknown)
    );

    let fail_r2 = fails
        .iter()
        .find(|n| n.snapshot.value(&reel(2)) == Some(&not_seven))
        .expect("fail branch constraining reel2");
    assert_eq!(fail_r2.snapshot.value(&reel(3)), Some(&not_seven));
    assert_eq!(
        fail_r2.snapshot.value(&reel(1)),
        Some(&SnapshotValue::Unknown)
    );
}

#[test]
fn known_satisfying_disjunct_suppresses_every_fail_branch() {
    let catalog = slot_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "slot_machine",
            &[ActionRequest::new("check_pair_or_lucky")],
            RunOptions::default()
                .unknown("reel1.symbol")
                .unknown("reel2.symbol")
                .with_initial("reel3.symbol", "seven"),
        )
        .unwrap();

    // reel3 == seven already satisfies the OR: one success, no fail nodes.
    let successes = children_by_status(&tree, NodeStatus::Ok);
    let fails = children_by_status(&tree, NodeStatus::Rejected);
    assert_eq!(successes.len(), 1);
    assert!(fails.is_empty());
}

#[test]
fn constraint_fixup_runs_on_fail_branches() {
    let catalog = flashlight_catalog();
    let runner = TreeRunner::new(&catalog);
    // Start with the bulb on, battery unknown: the empty-battery fail branch
    // violates the dependency and gets fixed up deterministically.
    let tree = runner
        .run(
            "flashlight",
            &[ActionRequest::new("turn_on")],
            RunOptions::default()
                .unknown("battery.level")
                .with_initial("bulb.state", "on")
                .with_initial("bulb.brightness", "medium"),
        )
        .unwrap();

    let fails = children_by_status(&tree, NodeStatus::Rejected);
    assert_eq!(fails.len(), 1);
    let fail = fails[0];
    assert_eq!(
        fail.snapshot.value(&AttributePath::part("bulb", "state")),
        Some(&SnapshotValue::Level("off".to_string()))
    );
    assert_eq!(
        fail.snapshot
            .value(&AttributePath::part("bulb", "brightness")),
        Some(&SnapshotValue::Level("none".to_string()))
    );
}

#[test]
fn identical_states_merge_within_a_layer() {
    let catalog = flashlight_catalog();
    let runner = TreeRunner::new(&catalog);
    // Layer 1 branches on the unknown battery into three distinct worlds;
    // layer 2's drain writes every divergent attribute, so all three land on
    // the same state and must merge into a single node.
    let tree = runner
        .run(
            "flashlight",
            &[ActionRequest::new("turn_on"), ActionRequest::new("drain")],
            RunOptions::default().unknown("battery.level"),
        )
        .unwrap();

    // Root + 3 branches + 1 merged drain node.
    assert_eq!(tree.node_count(), 5);
    let stats = tree.statistics();
    assert_eq!(stats.merged_nodes, 1);

    let merged = tree
        .nodes
        .values()
        .find(|n| n.has_multiple_parents())
        .expect("a merged node");
    assert_eq!(merged.parent_ids.len(), 3);
    // One incoming edge per extra parent, each with its own diffs.
    assert_eq!(merged.incoming_edges.len(), 2);
    assert_eq!(
        merged.snapshot.value(&level()),
        Some(&SnapshotValue::Level("empty".to_string()))
    );
}

#[test]
fn rejected_branches_stay_live_for_later_actions() {
    let catalog = flashlight_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "flashlight",
            &[ActionRequest::new("turn_on"), ActionRequest::new("turn_off")],
            RunOptions::default().unknown("battery.level"),
        )
        .unwrap();

    // The empty-battery rejection must have a turn_off child.
    let rejected = tree
        .nodes
        .values()
        .find(|n| n.status == NodeStatus::Rejected)
        .expect("a rejected branch");
    assert!(!rejected.children_ids.is_empty());
}

#[test]
fn explicit_write_survives_branch_narrowing() {
    let catalog = flashlight_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "flashlight",
            &[ActionRequest::new("recharge")],
            RunOptions::default().unknown("battery.level"),
        )
        .unwrap();

    // The success branch narrows the battery to everything below full, then
    // the effect writes "full" concretely - the write wins in the snapshot.
    // That makes the success world coincide with the already-full fail world,
    // so the two branches merge into a single node with two edges.
    let root = tree.root().unwrap();
    let children = tree.children(root.id);
    assert_eq!(children.len(), 1);

    let node = children[0];
    assert_eq!(
        node.snapshot.value(&level()),
        Some(&SnapshotValue::Level("full".to_string()))
    );
    assert_eq!(node.status, NodeStatus::Ok);
    assert_eq!(node.incoming_edges.len(), 1);
    assert_eq!(node.incoming_edges[0].status, NodeStatus::Rejected);
}

#[test]
fn missing_action_creates_terminal_error_node() {
    let catalog = flashlight_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "flashlight",
            &[ActionRequest::new("warp")],
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(tree.node_count(), 2);
    let node = tree
        .nodes
        .values()
        .find(|n| !n.is_root())
        .expect("error node");
    assert_eq!(node.status, NodeStatus::Error);
    assert!(node.error.as_deref().unwrap().contains("warp"));
}

#[test]
fn trend_expands_then_later_action_branches_over_the_set() {
    let catalog = {
        // turn_on drains the battery: a trend, not a concrete write.
        let brightness = AttributePath::part("bulb", "brightness");
        Catalog::builder()
            .domain(
                OrderedDomain::new("battery_level", ["empty", "low", "medium", "high", "full"])
                    .unwrap(),
            )
            .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
            .domain(OrderedDomain::new("brightness_level", ["none", "medium", "high"]).unwrap())
            .action(
                Action::new("turn_on")
                    .with_precondition(Condition::attr(
                        level(),
                        CompareOp::NotEquals,
                        ConditionValue::literal("empty"),
                    ))
                    .with_effect(Effect::set(AttributePath::part("bulb", "state"), "on"))
                    .with_effect(Effect::trend(level(), TrendDirection::Down)),
            )
            .action(
                Action::new("check_level")
                    .with_precondition(Condition::attr(
                        level(),
                        CompareOp::Gte,
                        ConditionValue::literal("medium"),
                    ))
                    .with_effect(Effect::set(brightness, "high")),
            )
            .device(
                DeviceType::new("flashlight")
                    .with_part(PartSpec::new(
                        "battery",
                        [AttributeSpec::new("level", "battery_level", "medium")],
                    ))
                    .with_part(PartSpec::new(
                        "bulb",
                        [
                            AttributeSpec::new("state", "binary_state", "off"),
                            AttributeSpec::new("brightness", "brightness_level", "none"),
                        ],
                    )),
            )
            .build()
            .unwrap()
    };

    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "flashlight",
            &[
                ActionRequest::new("turn_on"),
                ActionRequest::new("check_level"),
            ],
            RunOptions::default(),
        )
        .unwrap();

    // Layer 1 is linear (battery known "medium"); the trend expands the
    // snapshot into {empty, low, medium}.
    let root = tree.root().unwrap();
    let layer1 = tree.children(root.id);
    assert_eq!(layer1.len(), 1);
    assert_eq!(
        layer1[0].snapshot.value(&level()),
        Some(&SnapshotValue::Set(vec![
            "empty".to_string(),
            "low".to_string(),
            "medium".to_string()
        ]))
    );

    // Layer 2 branches over the value-set: >= medium passes only for medium.
    let layer2 = tree.children(layer1[0].id);
    let ok: Vec<_> = layer2
        .iter()
        .filter(|n| n.status == NodeStatus::Ok)
        .collect();
    let rejected: Vec<_> = layer2
        .iter()
        .filter(|n| n.status == NodeStatus::Rejected)
        .collect();
    assert_eq!(ok.len(), 1);
    assert_eq!(rejected.len(), 1);

    // The drain trend is still active on the success branch, so its snapshot
    // re-expands from the narrowed reading; the branch condition records the
    // narrowing to "medium".
    assert_eq!(
        ok[0].snapshot.value(&level()),
        Some(&SnapshotValue::Set(vec![
            "empty".to_string(),
            "low".to_string(),
            "medium".to_string()
        ]))
    );
    assert_eq!(
        ok[0]
            .snapshot
            .value(&AttributePath::part("bulb", "brightness")),
        Some(&SnapshotValue::Level("high".to_string()))
    );
    assert!(ok[0]
        .branch_condition
        .as_ref()
        .unwrap()
        .matches_value("battery.level", "medium"));
    assert_eq!(
        rejected[0].snapshot.value(&level()),
        Some(&SnapshotValue::Set(vec![
            "empty".to_string(),
            "low".to_string()
        ]))
    );
}

/// A coffee machine for compound postcondition guards.
fn coffee_catalog() -> Catalog {
    let water = AttributePath::part("water_tank", "level");
    let temp = AttributePath::part("heater", "temperature");
    Catalog::builder()
        .domain(OrderedDomain::new("liquid_amount", ["empty", "low", "medium", "full"]).unwrap())
        .domain(OrderedDomain::new("temperature_level", ["cold", "warm", "hot"]).unwrap())
        .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
        .action(Action::new("check_ready").with_effect(Effect::when(
            Condition::all([
                Condition::attr(water.clone(), CompareOp::Gte, ConditionValue::literal("low")),
                Condition::attr(temp.clone(), CompareOp::Equals, ConditionValue::literal("hot")),
            ]),
            vec![Effect::set(AttributePath::part("status", "ready"), "on")],
        )))
        .action(Action::new("signal_any").with_effect(Effect::when(
            Condition::any([
                Condition::attr(water.clone(), CompareOp::Equals, ConditionValue::literal("full")),
                Condition::attr(temp.clone(), CompareOp::Equals, ConditionValue::literal("hot")),
            ]),
            vec![Effect::set(AttributePath::part("status", "ready"), "on")],
        )))
        .device(
            DeviceType::new("coffee_machine")
                .with_part(PartSpec::new(
                    "water_tank",
                    [AttributeSpec::new("level", "liquid_amount", "full")],
                ))
                .with_part(PartSpec::new(
                    "heater",
                    [AttributeSpec::new("temperature", "temperature_level", "cold")],
                ))
                .with_part(PartSpec::new(
                    "status",
                    [AttributeSpec::new("ready", "binary_state", "off")],
                )),
        )
        .build()
        .unwrap()
}

#[test]
fn and_postcondition_one_then_two_else_branches() {
    let catalog = coffee_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "coffee_machine",
            &[ActionRequest::new("check_ready")],
            RunOptions::default()
                .unknown("water_tank.level")
                .unknown("heater.temperature"),
        )
        .unwrap();

    let root = tree.root().unwrap();
    let children = tree.children(root.id);
    assert_eq!(children.len(), 3);

    let then_branches: Vec<_> = children
        .iter()
        .filter(|n| n.branch_condition.as_ref().is_some_and(|bc| bc.kind() == BranchKind::If))
        .collect();
    let else_branches: Vec<_> = children
        .iter()
        .filter(|n| n.branch_condition.as_ref().is_some_and(|bc| bc.kind() == BranchKind::Else))
        .collect();
    assert_eq!(then_branches.len(), 1);
    assert_eq!(else_branches.len(), 2);

    let ready = AttributePath::part("status", "ready");
    // Then branch: both conjuncts narrowed, effect applied.
    let then_node = then_branches[0];
    assert_eq!(
        then_node.snapshot.value(&ready),
        Some(&SnapshotValue::Level("on".to_string()))
    );
    assert_eq!(
        then_node
            .snapshot
            .value(&AttributePath::part("heater", "temperature")),
        Some(&SnapshotValue::Level("hot".to_string()))
    );

    // Else branches: the guard fails, the effect is withheld, the world is ok.
    for node in else_branches {
        assert_eq!(node.status, NodeStatus::Ok);
        assert_eq!(
            node.snapshot.value(&ready),
            Some(&SnapshotValue::Level("off".to_string()))
        );
    }
}

#[test]
fn or_postcondition_two_then_one_else_branch() {
    let catalog = coffee_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "coffee_machine",
            &[ActionRequest::new("signal_any")],
            RunOptions::default()
                .unknown("water_tank.level")
                .unknown("heater.temperature"),
        )
        .unwrap();

    let root = tree.root().unwrap();
    let children = tree.children(root.id);
    assert_eq!(children.len(), 3);

    let then_count = children
        .iter()
        .filter(|n| n.branch_condition.as_ref().is_some_and(|bc| bc.kind() == BranchKind::If))
        .count();
    let else_nodes: Vec<_> = children
        .iter()
        .filter(|n| n.branch_condition.as_ref().is_some_and(|bc| bc.kind() == BranchKind::Else))
        .collect();
    assert_eq!(then_count, 2);
    assert_eq!(else_nodes.len(), 1);

    // The else branch pins both disjuncts to their complements.
    let else_node = else_nodes[0];
    assert_eq!(
        else_node
            .snapshot
            .value(&AttributePath::part("water_tank", "level")),
        Some(&SnapshotValue::Set(vec![
            "empty".to_string(),
            "low".to_string(),
            "medium".to_string()
        ]))
    );
    assert_eq!(
        else_node
            .snapshot
            .value(&AttributePath::part("heater", "temperature")),
        Some(&SnapshotValue::Set(vec![
            "cold".to_string(),
            "warm".to_string()
        ]))
    );
}

#[test]
fn narrowing_changes_are_recorded_before_effect_diffs() {
    let catalog = flashlight_catalog();
    let runner = TreeRunner::new(&catalog);
    let tree = runner
        .run(
            "flashlight",
            &[ActionRequest::new("turn_on")],
            RunOptions::default().unknown("battery.level"),
        )
        .unwrap();

    let success = children_by_status(&tree, NodeStatus::Ok)
        .into_iter()
        .find(|n| n.snapshot.value(&level()) == Some(&SnapshotValue::Level("full".to_string())))
        .unwrap();

    let kinds: Vec<_> = success.changes.iter().map(|c| c.kind).collect();
    let first_narrowing = kinds
        .iter()
        .position(|k| *k == qualsim::DiffKind::Narrowing)
        .expect("a narrowing diff");
    let first_value = kinds
        .iter()
        .position(|k| *k == qualsim::DiffKind::Value)
        .expect("a value diff");
    assert!(first_narrowing < first_value);
}
