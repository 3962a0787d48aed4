//! Recursive De Morgan branch computation.
//!
//! The branching engine needs, for a composite condition `C` over partially
//! unknown attributes, the complete partition of possible worlds into those
//! where `C` holds and those where it fails. Both sides are expressed as lists
//! of [`Configuration`]s - one configuration per sibling branch, each mapping
//! an attribute to the value-set that selects the branch.
//!
//! One pure function serves both polarities. Satisfying an `all` cross-merges
//! its operands (one branch, every attribute constrained together); satisfying
//! an `any` unions them (one branch per disjunct). Negation flips the
//! combinators - De Morgan's law - so failing an `all` unions the negated
//! operands and failing an `any` cross-merges them. Operands decided by known
//! values fold away to [`Outcome::Certain`] before recursion: a known-true
//! disjunct makes the whole disjunction certain and suppresses every fail
//! branch, preserving the known-satisfies tie-break.

use std::collections::BTreeMap;

use tracing::warn;

use crate::catalog::{resolve_value, Catalog};
use crate::condition::Condition;
use crate::device::DeviceInstance;
use crate::snapshot::WorldSnapshot;

/// One way a condition can hold (or fail): attribute path -> selecting values.
///
/// Values keep their domain order. A configuration is never empty-valued: a
/// branch with no satisfying values is simply not produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Configuration(pub BTreeMap<String, Vec<String>>);

impl Configuration {
    /// Merges two configurations by intersecting shared attributes.
    ///
    /// Returns `None` when any shared attribute's intersection is empty - the
    /// combined branch would be unsatisfiable and is dropped.
    #[must_use]
    pub(crate) fn merged_with(&self, other: &Configuration) -> Option<Configuration> {
        let mut merged = self.0.clone();
        for (attr, values) in &other.0 {
            match merged.get_mut(attr) {
                Some(existing) => {
                    existing.retain(|v| values.contains(v));
                    if existing.is_empty() {
                        return None;
                    }
                }
                None => {
                    merged.insert(attr.clone(), values.clone());
                }
            }
        }
        Some(Configuration(merged))
    }

    fn single(attr: String, values: Vec<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(attr, values);
        Self(map)
    }
}

/// Result of partitioning a condition under one polarity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The polarity is decided by known values alone; no branch narrows state.
    Certain(bool),
    /// One configuration per sibling branch.
    Branches(Vec<Configuration>),
}

/// Everything leaf-level value computation needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BranchCtx<'a> {
    pub catalog: &'a Catalog,
    pub instance: &'a DeviceInstance,
    pub parent: &'a WorldSnapshot,
    pub parameters: &'a BTreeMap<String, String>,
}

impl BranchCtx<'_> {
    /// The candidate levels for an attribute and whether the value is already
    /// definitively known.
    ///
    /// The parent snapshot rules: a value-set constrains the candidates, a
    /// concrete level is a domain of size one, and an unknown falls back to
    /// the full domain. Returns `None` when the attribute or its domain cannot
    /// be resolved; the caller then excludes the attribute from branching and
    /// the anomaly is logged, not raised.
    pub(crate) fn possible_values(&self, path_str: &str) -> Option<(Vec<String>, bool)> {
        let path = crate::path::AttributePath::parse(path_str).ok()?;
        let Some(ai) = self.instance.try_attribute(&path) else {
            warn!(attribute = path_str, "unresolvable attribute excluded from branching");
            return None;
        };
        let Some(domain) = self.catalog.domain(&ai.spec.domain_id) else {
            warn!(
                attribute = path_str,
                domain = %ai.spec.domain_id,
                "unknown domain; attribute excluded from branching"
            );
            return None;
        };
        match self.parent.value(&path) {
            Some(value) => match value.candidates() {
                Some(candidates) => Some((candidates, value.is_known())),
                None => Some((domain.levels().to_vec(), false)),
            },
            None => Some((domain.levels().to_vec(), false)),
        }
    }

    /// Whether the attribute counts as unknown for branching purposes.
    pub(crate) fn is_branching_unknown(&self, path_str: &str) -> bool {
        self.possible_values(path_str)
            .is_some_and(|(_, known)| !known)
    }
}

/// Computes the branch configurations of `condition` under one polarity.
///
/// `negate = false` yields the configurations under which the condition
/// holds; `negate = true` yields those under which it fails. Pure: no graph
/// state is touched, which keeps the transform unit-testable in isolation.
pub(crate) fn branch_configs(condition: &Condition, ctx: &BranchCtx<'_>, negate: bool) -> Outcome {
    match condition {
        Condition::Attribute {
            target,
            operator,
            value,
        } => leaf_configs(&target.to_string(), *operator, value, ctx, negate),

        // all: cross-merge to satisfy, union (De Morgan) to fail.
        Condition::All { conditions } => {
            let subs = conditions.iter().map(|c| branch_configs(c, ctx, negate));
            if negate {
                union(subs)
            } else {
                cross(subs)
            }
        }

        // any: union to satisfy, cross-merge (De Morgan) to fail.
        Condition::Any { conditions } => {
            let subs = conditions.iter().map(|c| branch_configs(c, ctx, negate));
            if negate {
                cross(subs)
            } else {
                union(subs)
            }
        }

        Condition::Not { condition } => branch_configs(condition, ctx, !negate),

        // A -> B is (not A) or B.
        Condition::Implies { when, then } => {
            let parts = [
                branch_configs(when, ctx, !negate),
                branch_configs(then, ctx, negate),
            ];
            if negate {
                cross(parts.into_iter())
            } else {
                union(parts.into_iter())
            }
        }

        Condition::ParameterEquals { parameter, value } => Outcome::Certain(
            (ctx.parameters.get(parameter).is_some_and(|v| v == value)) != negate,
        ),

        Condition::ParameterValid {
            parameter,
            valid_values,
        } => Outcome::Certain(
            (ctx.parameters
                .get(parameter)
                .is_some_and(|v| valid_values.contains(v)))
                != negate,
        ),
    }
}

fn leaf_configs(
    attr: &str,
    operator: crate::condition::CompareOp,
    value: &crate::condition::ConditionValue,
    ctx: &BranchCtx<'_>,
    negate: bool,
) -> Outcome {
    let Ok(path) = crate::path::AttributePath::parse(attr) else {
        return Outcome::Certain(!negate);
    };
    let Some((possible, is_known)) = ctx.possible_values(attr) else {
        // Excluded from branching: behaves as an already-satisfied operand.
        return Outcome::Certain(!negate);
    };
    let Some(rhs) = resolve_value(value, ctx.parameters) else {
        // A dangling parameter reference never matches.
        return Outcome::Certain(negate);
    };
    let Some(domain) = ctx.catalog.domain_of(ctx.instance, &path) else {
        return Outcome::Certain(!negate);
    };

    let mut selected = Vec::new();
    for candidate in &possible {
        match rhs.satisfies(operator, domain, candidate) {
            Some(sat) if sat != negate => selected.push(candidate.clone()),
            Some(_) => {}
            None => {
                warn!(
                    attribute = attr,
                    candidate = candidate.as_str(),
                    "comparison undecidable; attribute excluded from branching"
                );
                return Outcome::Certain(!negate);
            }
        }
    }

    if is_known {
        // Known operands fold away: they participate as already satisfied or
        // already violated, never as a branch.
        return Outcome::Certain(!selected.is_empty());
    }
    if selected.is_empty() {
        return Outcome::Certain(false);
    }
    if selected.len() == possible.len() {
        // Holds for every candidate: certain, no narrowing gained.
        return Outcome::Certain(true);
    }
    Outcome::Branches(vec![Configuration::single(attr.to_string(), selected)])
}

/// Disjunctive combination: one sibling branch per operand branch.
///
/// A certain-true operand decides the whole disjunction (the known-satisfies
/// tie-break); certain-false operands fold away.
fn union(outcomes: impl Iterator<Item = Outcome>) -> Outcome {
    let mut branches: Vec<Configuration> = Vec::new();
    for outcome in outcomes {
        match outcome {
            Outcome::Certain(true) => return Outcome::Certain(true),
            Outcome::Certain(false) => {}
            Outcome::Branches(configs) => branches.extend(configs),
        }
    }
    if branches.is_empty() {
        Outcome::Certain(false)
    } else {
        Outcome::Branches(branches)
    }
}

/// Conjunctive combination: the Cartesian product of operand branch lists,
/// merging each pairing and dropping pairings with empty intersections.
///
/// A certain-false operand decides the whole conjunction; certain-true
/// operands are identities.
fn cross(outcomes: impl Iterator<Item = Outcome>) -> Outcome {
    let mut acc: Vec<Configuration> = vec![Configuration::default()];
    let mut saw_branches = false;
    for outcome in outcomes {
        match outcome {
            Outcome::Certain(false) => return Outcome::Certain(false),
            Outcome::Certain(true) => {}
            Outcome::Branches(configs) => {
                saw_branches = true;
                let mut next = Vec::with_capacity(acc.len() * configs.len());
                for existing in &acc {
                    for config in &configs {
                        if let Some(merged) = existing.merged_with(config) {
                            next.push(merged);
                        }
                    }
                }
                if next.is_empty() {
                    return Outcome::Certain(false);
                }
                acc = next;
            }
        }
    }
    if saw_branches {
        Outcome::Branches(acc)
    } else {
        Outcome::Certain(true)
    }
}
