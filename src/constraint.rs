//! Dependency constraints.
//!
//! A [`DependencyConstraint`] states an invariant of the form `if condition
//! then requirement`. The transition evaluator reports violations without
//! blocking state construction; the branching engine additionally *enforces*
//! constraints on narrowed snapshots by deterministically falsifying the
//! condition and applying the constraint's declared resets.

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::condition::{CompareOp, Condition, ConditionValue};
use crate::device::DeviceInstance;
use crate::engine::{evaluate_static, DiffEntry, EvalReport};
use crate::path::AttributePath;
use crate::snapshot::{SnapshotValue, WorldSnapshot};

/// A declarative reset applied when constraint fixup fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintReset {
    /// Attribute to reset.
    pub target: AttributePath,
    /// Level to reset it to.
    pub value: String,
}

/// `if condition then requirement`, with optional fixup resets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyConstraint {
    /// The triggering condition.
    pub condition: Condition,
    /// What must hold whenever the condition holds.
    pub requires: Condition,
    /// Attributes reset alongside the condition when fixup fires.
    #[serde(default)]
    pub resets: Vec<ConstraintReset>,
}

impl DependencyConstraint {
    /// Creates a constraint without resets.
    #[must_use]
    pub fn new(condition: Condition, requires: Condition) -> Self {
        Self {
            condition,
            requires,
            resets: Vec::new(),
        }
    }

    /// Adds a fixup reset.
    #[must_use]
    pub fn with_reset(mut self, target: AttributePath, value: impl Into<String>) -> Self {
        self.resets.push(ConstraintReset {
            target,
            value: value.into(),
        });
        self
    }

    /// Human-readable rendering.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "If {} then {}",
            self.condition.describe(),
            self.requires.describe()
        )
    }

    /// Checks this constraint against a live instance.
    ///
    /// Returns a violation message when the condition provably holds and the
    /// requirement provably does not. Unknown values never count as a
    /// violation.
    #[must_use]
    pub fn violation(&self, instance: &DeviceInstance, catalog: &Catalog) -> Option<String> {
        let condition_holds = matches!(
            evaluate_static(&self.condition, instance, catalog),
            Ok(EvalReport::True)
        );
        if !condition_holds {
            return None;
        }
        match evaluate_static(&self.requires, instance, catalog) {
            Ok(EvalReport::False) => Some(format!("Constraint violated: {}", self.describe())),
            Ok(EvalReport::True | EvalReport::Unknown(_)) => None,
            Err(e) => Some(format!(
                "Error evaluating constraint '{}': {e}",
                self.describe()
            )),
        }
    }
}

/// Enforces all of a device type's constraints on a snapshot, in place.
///
/// For each violated constraint whose condition is a leaf equality check, the
/// condition attribute is set to the first domain level that falsifies it and
/// the constraint's resets are applied (resets also clear the attribute's
/// trend). This is a fixed, total fixup, not a search. Returns the changes
/// made, in application order.
pub(crate) fn enforce_on_snapshot(snapshot: &mut WorldSnapshot, catalog: &Catalog) -> Vec<DiffEntry> {
    let Some(device_type) = catalog.device(&snapshot.device_type) else {
        return Vec::new();
    };
    let mut changes = Vec::new();

    for constraint in &device_type.constraints {
        let Condition::Attribute {
            target,
            operator: CompareOp::Equals,
            value: ConditionValue::Literal(trigger_value),
        } = &constraint.condition
        else {
            continue;
        };
        if !snapshot_condition_met(snapshot, &constraint.condition)
            || snapshot_condition_met(snapshot, &constraint.requires)
        {
            continue;
        }

        // Violated: falsify the condition deterministically.
        let Some(state) = snapshot.get(target) else {
            continue;
        };
        let Some(domain) = catalog.domain(&state.domain_id) else {
            continue;
        };
        let Some(replacement) = domain.first_other(trigger_value) else {
            continue;
        };
        let before = state.value.clone();
        let after = SnapshotValue::Level(replacement.to_string());
        if before != after {
            snapshot.set_value(target, after.clone());
            changes.push(DiffEntry::constraint(target.to_string(), before, after));
        }

        for reset in &constraint.resets {
            let Some(state) = snapshot.get_mut(&reset.target) else {
                continue;
            };
            let before = state.value.clone();
            let after = SnapshotValue::Level(reset.value.clone());
            state.trend = crate::attribute::TrendDirection::None;
            if before != after {
                state.value = after.clone();
                changes.push(DiffEntry::constraint(reset.target.to_string(), before, after));
            }
        }
    }

    changes
}

/// Whether a leaf condition is met by a snapshot's (possibly set-valued) state.
///
/// A value-set meets an equality when it still contains the expected level; it
/// meets an inequality when any member differs. Compound conditions and
/// non-equality leaves are treated as met (they are validated on instances,
/// not fixed up on snapshots).
fn snapshot_condition_met(snapshot: &WorldSnapshot, condition: &Condition) -> bool {
    let Condition::Attribute {
        target,
        operator,
        value: ConditionValue::Literal(expected),
    } = condition
    else {
        return true;
    };
    let Some(state) = snapshot.get(target) else {
        return true;
    };
    match (&state.value, operator) {
        (SnapshotValue::Level(v), CompareOp::Equals) => v == expected,
        (SnapshotValue::Level(v), CompareOp::NotEquals) => v != expected,
        (SnapshotValue::Set(vs), CompareOp::Equals) => vs.contains(expected),
        (SnapshotValue::Set(vs), CompareOp::NotEquals) => {
            vs.len() > 1 || vs.first().is_some_and(|v| v != expected)
        }
        (SnapshotValue::Unknown, _) => true,
        _ => true,
    }
}
