//! Branch-point detection.
//!
//! Walks an action's preconditions and the first level of its conditional
//! effects to find attributes that are unknown for branching purposes: the
//! instance value is the unknown sentinel, or the parent snapshot holds a
//! value-set of size greater than one. Attributes nested inside already-known
//! literals do not trigger branching.

use crate::action::Action;
use crate::condition::{CompareOp, Condition, ConditionValue};
use crate::effect::Effect;
use crate::tree::demorgan::BranchCtx;
use crate::tree::model::BranchKind;

/// Attribute paths that are branching-unknown anywhere in `condition`.
///
/// Recurses through the combinators; parameter conditions reference no
/// attributes. Paths appear once each, in first-reference order.
pub(crate) fn condition_unknowns(condition: &Condition, ctx: &BranchCtx<'_>) -> Vec<String> {
    let mut out = Vec::new();
    collect_unknowns(condition, ctx, &mut out);
    out
}

fn collect_unknowns(condition: &Condition, ctx: &BranchCtx<'_>, out: &mut Vec<String>) {
    match condition {
        Condition::Attribute { target, .. } => {
            let path = target.to_string();
            if !out.contains(&path) && ctx.is_branching_unknown(&path) {
                out.push(path);
            }
        }
        Condition::All { conditions } | Condition::Any { conditions } => {
            for sub in conditions {
                collect_unknowns(sub, ctx, out);
            }
        }
        Condition::Not { condition } => collect_unknowns(condition, ctx, out),
        Condition::Implies { when, then } => {
            collect_unknowns(when, ctx, out);
            collect_unknowns(then, ctx, out);
        }
        Condition::ParameterEquals { .. } | Condition::ParameterValid { .. } => {}
    }
}

/// Branching-unknown attributes across all of an action's preconditions.
pub(crate) fn precondition_unknowns(action: &Action, ctx: &BranchCtx<'_>) -> Vec<String> {
    let mut out = Vec::new();
    for condition in &action.preconditions {
        for path in condition_unknowns(condition, ctx) {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    out
}

/// How an action's postconditions branch, if at all.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PostconditionBranching {
    /// No conditional-effect guard references an unknown attribute.
    None,
    /// A flat if/elif chain over one unknown guard attribute.
    Flat {
        /// The guard attribute.
        attribute: String,
    },
    /// A compound (`all`/`any`) guard with unknowns; handled by the same
    /// De Morgan machinery as preconditions, with then/else in place of
    /// success/fail.
    Compound {
        /// The compound guard.
        condition: Condition,
    },
}

/// Inspects the first level of conditional effects for branch points.
///
/// The first guard with unknowns decides: a leaf attribute guard selects flat
/// if/elif/else branching, a compound guard selects De Morgan branching.
pub(crate) fn postcondition_branching(action: &Action, ctx: &BranchCtx<'_>) -> PostconditionBranching {
    for effect in &action.effects {
        let Effect::Conditional { condition, .. } = effect else {
            continue;
        };
        match condition {
            Condition::Attribute { target, .. } => {
                let path = target.to_string();
                if ctx.is_branching_unknown(&path) {
                    return PostconditionBranching::Flat { attribute: path };
                }
            }
            Condition::All { .. } | Condition::Any { .. } => {
                if !condition_unknowns(condition, ctx).is_empty() {
                    return PostconditionBranching::Compound {
                        condition: condition.clone(),
                    };
                }
            }
            Condition::Not { .. }
            | Condition::Implies { .. }
            | Condition::ParameterEquals { .. }
            | Condition::ParameterValid { .. } => {}
        }
    }
    PostconditionBranching::None
}

/// The if/elif/else partition of a flat postcondition over `guard_attr`.
///
/// Clauses are collected from every top-level conditional guarding
/// `guard_attr` and from nested else-chains (an `elif` is a conditional that
/// is the sole content of its parent's else branch). Each clause contributes
/// its satisfying value-set over the full domain; the remainder of the domain
/// becomes the `else` entry. The caller intersects every entry with the
/// attribute's current candidate set.
pub(crate) fn postcondition_options(
    action: &Action,
    guard_attr: &str,
    ctx: &BranchCtx<'_>,
) -> Vec<(Vec<String>, BranchKind)> {
    let Ok(path) = crate::path::AttributePath::parse(guard_attr) else {
        return Vec::new();
    };
    let Some(domain) = ctx.catalog.domain_of(ctx.instance, &path) else {
        return Vec::new();
    };

    let mut clauses: Vec<Vec<String>> = Vec::new();
    for effect in &action.effects {
        collect_clauses(effect, guard_attr, domain, &mut clauses);
    }

    let mut options: Vec<(Vec<String>, BranchKind)> = Vec::new();
    let mut used: Vec<String> = Vec::new();
    for (index, clause_values) in clauses.into_iter().enumerate() {
        let kind = if index == 0 {
            BranchKind::If
        } else {
            BranchKind::Elif
        };
        for v in &clause_values {
            if !used.contains(v) {
                used.push(v.clone());
            }
        }
        options.push((clause_values, kind));
    }

    if !used.is_empty() {
        let remaining: Vec<String> = domain
            .levels()
            .iter()
            .filter(|v| !used.contains(v))
            .cloned()
            .collect();
        if !remaining.is_empty() {
            options.push((remaining, BranchKind::Else));
        }
    }

    options
}

fn collect_clauses(
    effect: &Effect,
    guard_attr: &str,
    domain: &crate::domain::OrderedDomain,
    clauses: &mut Vec<Vec<String>>,
) {
    let Effect::Conditional {
        condition,
        else_effects,
        ..
    } = effect
    else {
        return;
    };
    let Condition::Attribute {
        target,
        operator,
        value,
    } = condition
    else {
        return;
    };
    if target.to_string() != guard_attr {
        return;
    }

    let clause_values: Option<Vec<String>> = match (operator, value) {
        (CompareOp::Equals, ConditionValue::Literal(v)) => Some(vec![v.clone()]),
        (CompareOp::In | CompareOp::Equals, ConditionValue::Set(vs)) => Some(vs.clone()),
        (
            CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte,
            ConditionValue::Literal(v),
        ) => domain.values_for_comparison(v, *operator),
        _ => None,
    };
    if let Some(values) = clause_values {
        if !values.is_empty() {
            clauses.push(values);
        }
    }

    // An elif chain nests as the sole conditional of the else branch.
    if let [inner @ Effect::Conditional { .. }] = else_effects.as_slice() {
        collect_clauses(inner, guard_attr, domain, clauses);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeSpec;
    use crate::catalog::Catalog;
    use crate::condition::{CompareOp, ConditionValue};
    use crate::device::{DeviceInstance, DeviceType, PartSpec};
    use crate::domain::OrderedDomain;
    use crate::path::AttributePath;
    use crate::snapshot::WorldSnapshot;
    use std::collections::BTreeMap;

    fn catalog() -> Catalog {
        Catalog::builder()
            .domain(
                OrderedDomain::new("battery_level", ["empty", "low", "medium", "high", "full"])
                    .unwrap(),
            )
            .domain(OrderedDomain::new("brightness_level", ["none", "medium", "high"]).unwrap())
            .device(
                DeviceType::new("flashlight")
                    .with_part(PartSpec::new(
                        "battery",
                        [AttributeSpec::new("level", "battery_level", "full")],
                    ))
                    .with_part(PartSpec::new(
                        "bulb",
                        [AttributeSpec::new("brightness", "brightness_level", "none")],
                    )),
            )
            .build()
            .unwrap()
    }

    fn level() -> AttributePath {
        AttributePath::part("battery", "level")
    }

    fn lit(op: CompareOp, v: &str) -> Condition {
        Condition::attr(level(), op, ConditionValue::literal(v))
    }

    struct Fixture {
        catalog: Catalog,
        instance: DeviceInstance,
        snapshot: WorldSnapshot,
        parameters: BTreeMap<String, String>,
    }

    impl Fixture {
        fn unknown_level() -> Self {
            let catalog = catalog();
            let mut instance = catalog.instantiate("flashlight").unwrap();
            instance.attribute_mut(&level()).unwrap().mark_unknown();
            let snapshot = WorldSnapshot::capture(&instance, &catalog, None);
            Self {
                catalog,
                instance,
                snapshot,
                parameters: BTreeMap::new(),
            }
        }

        fn ctx(&self) -> BranchCtx<'_> {
            BranchCtx {
                catalog: &self.catalog,
                instance: &self.instance,
                parent: &self.snapshot,
                parameters: &self.parameters,
            }
        }
    }

    fn battery_action() -> Action {
        Action::new("turn_on")
            .with_precondition(lit(CompareOp::NotEquals, "empty"))
            .with_effect(Effect::when(
                lit(CompareOp::Equals, "full"),
                vec![Effect::set(AttributePath::part("bulb", "brightness"), "high")],
            ))
            .with_effect(Effect::when(
                Condition::attr(
                    level(),
                    CompareOp::In,
                    ConditionValue::set(["low", "medium", "high"]),
                ),
                vec![Effect::set(
                    AttributePath::part("bulb", "brightness"),
                    "medium",
                )],
            ))
    }

    #[test]
    fn detects_unknown_precondition_attribute() {
        let fx = Fixture::unknown_level();
        let unknowns = precondition_unknowns(&battery_action(), &fx.ctx());
        assert_eq!(unknowns, vec!["battery.level"]);
    }

    #[test]
    fn known_attributes_do_not_branch() {
        let fx = {
            let catalog = catalog();
            let instance = catalog.instantiate("flashlight").unwrap();
            let snapshot = WorldSnapshot::capture(&instance, &catalog, None);
            Fixture {
                catalog,
                instance,
                snapshot,
                parameters: BTreeMap::new(),
            }
        };
        assert!(precondition_unknowns(&battery_action(), &fx.ctx()).is_empty());
        assert_eq!(
            postcondition_branching(&battery_action(), &fx.ctx()),
            PostconditionBranching::None
        );
    }

    #[test]
    fn flat_guard_detected() {
        let fx = Fixture::unknown_level();
        assert_eq!(
            postcondition_branching(&battery_action(), &fx.ctx()),
            PostconditionBranching::Flat {
                attribute: "battery.level".to_string()
            }
        );
    }

    #[test]
    fn compound_guard_detected() {
        let fx = Fixture::unknown_level();
        let action = Action::new("check").with_effect(Effect::when(
            Condition::all([lit(CompareOp::NotEquals, "empty"), lit(CompareOp::Lt, "full")]),
            vec![Effect::set(AttributePath::part("bulb", "brightness"), "medium")],
        ));
        assert!(matches!(
            postcondition_branching(&action, &fx.ctx()),
            PostconditionBranching::Compound { .. }
        ));
    }

    #[test]
    fn options_partition_if_elif_else() {
        let fx = Fixture::unknown_level();
        let options = postcondition_options(&battery_action(), "battery.level", &fx.ctx());
        assert_eq!(options.len(), 3);
        assert_eq!(options[0], (vec!["full".to_string()], BranchKind::If));
        assert_eq!(
            options[1],
            (
                vec!["low".to_string(), "medium".to_string(), "high".to_string()],
                BranchKind::Elif
            )
        );
        assert_eq!(options[2], (vec!["empty".to_string()], BranchKind::Else));
    }

    #[test]
    fn ordered_clause_expands_through_domain() {
        let fx = Fixture::unknown_level();
        let action = Action::new("check").with_effect(Effect::when(
            lit(CompareOp::Gte, "high"),
            vec![Effect::set(AttributePath::part("bulb", "brightness"), "high")],
        ));
        let options = postcondition_options(&action, "battery.level", &fx.ctx());
        assert_eq!(
            options[0],
            (vec!["high".to_string(), "full".to_string()], BranchKind::If)
        );
        assert_eq!(
            options[1],
            (
                vec!["empty".to_string(), "low".to_string(), "medium".to_string()],
                BranchKind::Else
            )
        );
    }
}
