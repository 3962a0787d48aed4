//! Deterministic transition evaluator.
//!
//! [`TransitionEngine::apply`] takes one action against one fully-concrete
//! device instance: it validates parameters, evaluates preconditions, applies
//! effects in declared order (each write visible to subsequent effect
//! evaluation), checks dependency constraints on the result, and returns an
//! outcome with an ordered list of attribute diffs.
//!
//! This evaluator never branches. When a referenced attribute is literally
//! unknown it rejects with a clarification question; enumerating every answer
//! is the business of [`crate::tree::TreeRunner`].

mod apply;
mod eval;

pub(crate) use apply::{apply_effects, EffectOutcome};
pub(crate) use eval::{evaluate, evaluate_static, render_failure, EvalReport};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::catalog::Catalog;
use crate::device::DeviceInstance;
use crate::error::ExecutionError;
use crate::snapshot::SnapshotValue;

/// Kind of a single attribute diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// A value write.
    Value,
    /// A trend change.
    Trend,
    /// A value-set narrowed by a branch constraint.
    Narrowing,
    /// A change forced by constraint fixup.
    Constraint,
}

/// One attribute difference between two world states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Dotted attribute path (trend diffs carry a `.trend` suffix).
    pub attribute: String,
    /// Value before the transition.
    pub before: SnapshotValue,
    /// Value after the transition.
    pub after: SnapshotValue,
    /// What kind of change this is.
    pub kind: DiffKind,
}

impl DiffEntry {
    /// A plain value diff.
    #[must_use]
    pub fn value(attribute: impl Into<String>, before: SnapshotValue, after: SnapshotValue) -> Self {
        Self {
            attribute: attribute.into(),
            before,
            after,
            kind: DiffKind::Value,
        }
    }

    /// A trend diff (directions stored as levels).
    #[must_use]
    pub fn trend(attribute: impl Into<String>, before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            before: SnapshotValue::Level(before.into()),
            after: SnapshotValue::Level(after.into()),
            kind: DiffKind::Trend,
        }
    }

    /// A narrowing diff.
    #[must_use]
    pub fn narrowing(attribute: impl Into<String>, before: SnapshotValue, after: SnapshotValue) -> Self {
        Self {
            attribute: attribute.into(),
            before,
            after,
            kind: DiffKind::Narrowing,
        }
    }

    /// A constraint-fixup diff.
    #[must_use]
    pub fn constraint(attribute: impl Into<String>, before: SnapshotValue, after: SnapshotValue) -> Self {
        Self {
            attribute: attribute.into(),
            before,
            after,
            kind: DiffKind::Constraint,
        }
    }

    /// Whether before and after coincide.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.attribute, self.before, self.after)
    }
}

/// Outcome status of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStatus {
    /// Preconditions held, effects applied, constraints satisfied.
    Ok,
    /// A precondition failed or required information is missing.
    Rejected,
    /// The state was built but a dependency constraint is broken.
    ConstraintViolated,
}

/// Result of applying one action to one device instance.
#[derive(Debug)]
pub struct TransitionResult {
    /// Outcome status.
    pub status: TransitionStatus,
    /// Human-readable rejection or violation summary.
    pub reason: Option<String>,
    /// The instance after the action; `None` when rejected.
    pub after: Option<DeviceInstance>,
    /// Ordered attribute diffs (no-ops filtered).
    pub changes: Vec<DiffEntry>,
    /// Constraint violation messages.
    pub violations: Vec<String>,
    /// Clarification questions of the form `What is <attribute path>?`.
    pub clarifications: Vec<String>,
}

impl TransitionResult {
    fn rejected(reason: impl Into<String>, clarifications: Vec<String>) -> Self {
        Self {
            status: TransitionStatus::Rejected,
            reason: Some(reason.into()),
            after: None,
            changes: Vec::new(),
            violations: Vec::new(),
            clarifications,
        }
    }

    fn success(after: DeviceInstance, changes: Vec<DiffEntry>) -> Self {
        Self {
            status: TransitionStatus::Ok,
            reason: None,
            after: Some(after),
            changes,
            violations: Vec::new(),
            clarifications: Vec::new(),
        }
    }

    fn constraint_violated(
        after: DeviceInstance,
        changes: Vec<DiffEntry>,
        violations: Vec<String>,
    ) -> Self {
        let reason = violations.join("; ");
        Self {
            status: TransitionStatus::ConstraintViolated,
            reason: Some(reason),
            after: Some(after),
            changes,
            violations,
            clarifications: Vec::new(),
        }
    }

    /// Whether the action was applied.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == TransitionStatus::Ok
    }
}

/// The deterministic single-step evaluator.
#[derive(Debug, Clone, Copy)]
pub struct TransitionEngine<'a> {
    catalog: &'a Catalog,
}

impl<'a> TransitionEngine<'a> {
    /// Creates an engine over the given catalog.
    #[must_use]
    pub const fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Applies `action` to `instance` with the given parameter values.
    ///
    /// The input instance is never mutated; a successful transition returns a
    /// deep-cloned `after` instance. Hard reference errors (missing attribute
    /// or domain) surface as `Err` and become terminal error nodes upstream.
    pub fn apply(
        &self,
        instance: &DeviceInstance,
        action: &Action,
        parameters: &BTreeMap<String, String>,
    ) -> Result<TransitionResult, ExecutionError> {
        // Phase 1: parameters, fail fast with no mutation.
        if let Some(reason) = validate_parameters(action, parameters) {
            return Ok(TransitionResult::rejected(reason, Vec::new()));
        }

        // Phase 2: preconditions against a read-only view.
        for condition in &action.preconditions {
            let report = evaluate(condition, instance, parameters, self.catalog)?;
            match report {
                EvalReport::True => {}
                EvalReport::False => {
                    let message = render_failure(condition, instance, parameters, self.catalog);
                    return Ok(TransitionResult::rejected(
                        format!("Precondition failed: {message}"),
                        Vec::new(),
                    ));
                }
                EvalReport::Unknown(questions) => {
                    return Ok(TransitionResult::rejected(
                        "Precondition requires clarification",
                        questions,
                    ));
                }
            }
        }

        // Phase 3: conditional-effect guards must be answerable before any
        // mutation happens.
        let questions = unresolved_guard_questions(&action.effects, instance, parameters, self.catalog)?;
        if !questions.is_empty() {
            return Ok(TransitionResult::rejected(
                "Postcondition requires clarification",
                questions,
            ));
        }

        // Phase 4: effects, in declared order, each write visible to the next.
        let mut after = instance.clone();
        let outcome = apply_effects(&action.effects, &mut after, parameters, self.catalog)?;
        let changes = match outcome {
            EffectOutcome::Applied(changes) => changes,
            EffectOutcome::GuardFailed(reason) => {
                return Ok(TransitionResult::rejected(
                    format!("Postcondition failed: {reason}"),
                    Vec::new(),
                ));
            }
        };
        let changes: Vec<DiffEntry> = changes.into_iter().filter(|c| !c.is_noop()).collect();

        // Phase 5: dependency constraints on the resulting state. A violation
        // is reported, not fatal - the state still exists.
        let device_type = self
            .catalog
            .device(&after.type_name)
            .ok_or_else(|| ExecutionError::DeviceTypeNotFound {
                name: after.type_name.clone(),
            })?;
        let mut violations = Vec::new();
        for constraint in &device_type.constraints {
            if let Some(message) = constraint.violation(&after, self.catalog) {
                violations.push(message);
            }
        }
        if violations.is_empty() {
            Ok(TransitionResult::success(after, changes))
        } else {
            Ok(TransitionResult::constraint_violated(after, changes, violations))
        }
    }

    /// The catalog this engine evaluates against.
    #[must_use]
    pub const fn catalog(&self) -> &'a Catalog {
        self.catalog
    }
}

fn validate_parameters(action: &Action, parameters: &BTreeMap<String, String>) -> Option<String> {
    for (name, spec) in &action.parameters {
        if spec.required && !parameters.contains_key(name) {
            return Some(format!("Missing required parameter: {name}"));
        }
        if let (Some(choices), Some(value)) = (&spec.choices, parameters.get(name)) {
            if !choices.contains(value) {
                return Some(format!("Parameter {name} must be one of {choices:?}"));
            }
        }
    }
    None
}

fn unresolved_guard_questions(
    effects: &[crate::effect::Effect],
    instance: &DeviceInstance,
    parameters: &BTreeMap<String, String>,
    catalog: &Catalog,
) -> Result<Vec<String>, ExecutionError> {
    use crate::effect::Effect;

    let mut questions: Vec<String> = Vec::new();
    for effect in effects {
        if let Effect::Conditional {
            condition,
            then_effects,
            else_effects,
        } = effect
        {
            if let EvalReport::Unknown(qs) = evaluate(condition, instance, parameters, catalog)? {
                for q in qs {
                    if !questions.contains(&q) {
                        questions.push(q);
                    }
                }
            }
            // Both arms are scanned: which one runs is not yet decided.
            let nested = unresolved_guard_questions(then_effects, instance, parameters, catalog)?
                .into_iter()
                .chain(unresolved_guard_questions(else_effects, instance, parameters, catalog)?);
            for q in nested {
                if !questions.contains(&q) {
                    questions.push(q);
                }
            }
        }
    }
    Ok(questions)
}
