//! Tri-state condition evaluation.
//!
//! Conditions over a live instance evaluate to true, false, or unknown. The
//! unknown case carries the clarification questions an external caller could
//! answer to make the condition decidable, using short-circuit logic: a
//! disjunct that is already true makes the whole `any` true regardless of
//! unknown siblings.

use std::collections::BTreeMap;

use tracing::warn;

use crate::catalog::{resolve_value, Catalog};
use crate::condition::{CompareOp, Condition};
use crate::device::DeviceInstance;
use crate::error::ExecutionError;
use crate::path::AttributePath;

/// Result of evaluating a condition against possibly-unknown state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EvalReport {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// Not decidable; answering these questions would decide it.
    Unknown(Vec<String>),
}

impl EvalReport {
    fn from_bool(b: bool) -> Self {
        if b {
            Self::True
        } else {
            Self::False
        }
    }

    fn negated(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Unknown(qs) => Self::Unknown(qs),
        }
    }
}

/// The standard clarification question for an attribute.
pub(crate) fn question_for(path: &AttributePath) -> String {
    format!("What is {path}?")
}

/// Evaluates a condition against an instance, short-circuiting over unknowns.
pub(crate) fn evaluate(
    condition: &Condition,
    instance: &DeviceInstance,
    parameters: &BTreeMap<String, String>,
    catalog: &Catalog,
) -> Result<EvalReport, ExecutionError> {
    match condition {
        Condition::Attribute {
            target,
            operator,
            value,
        } => evaluate_attribute(target, *operator, value, instance, parameters, catalog),

        // Kleene logic: a definite decision beats an unknown operand, so an
        // `any` with one true disjunct holds even when a sibling is unknown.
        Condition::All { conditions } => {
            let mut pending: Option<Vec<String>> = None;
            for sub in conditions {
                match evaluate(sub, instance, parameters, catalog)? {
                    EvalReport::True => {}
                    EvalReport::False => return Ok(EvalReport::False),
                    EvalReport::Unknown(qs) => {
                        pending.get_or_insert(qs);
                    }
                }
            }
            Ok(match pending {
                Some(qs) => EvalReport::Unknown(qs),
                None => EvalReport::True,
            })
        }

        Condition::Any { conditions } => {
            let mut pending: Option<Vec<String>> = None;
            for sub in conditions {
                match evaluate(sub, instance, parameters, catalog)? {
                    EvalReport::True => return Ok(EvalReport::True),
                    EvalReport::False => {}
                    EvalReport::Unknown(qs) => {
                        pending.get_or_insert(qs);
                    }
                }
            }
            Ok(match pending {
                Some(qs) => EvalReport::Unknown(qs),
                None => EvalReport::False,
            })
        }

        Condition::Not { condition } => {
            Ok(evaluate(condition, instance, parameters, catalog)?.negated())
        }

        Condition::Implies { when, then } => {
            match evaluate(when, instance, parameters, catalog)? {
                EvalReport::False => Ok(EvalReport::True),
                EvalReport::True => evaluate(then, instance, parameters, catalog),
                EvalReport::Unknown(qs) => {
                    // A true consequent settles the implication regardless of
                    // the antecedent.
                    match evaluate(then, instance, parameters, catalog)? {
                        EvalReport::True => Ok(EvalReport::True),
                        EvalReport::False | EvalReport::Unknown(_) => Ok(EvalReport::Unknown(qs)),
                    }
                }
            }
        }

        Condition::ParameterEquals { parameter, value } => Ok(EvalReport::from_bool(
            parameters.get(parameter).is_some_and(|v| v == value),
        )),

        Condition::ParameterValid {
            parameter,
            valid_values,
        } => Ok(EvalReport::from_bool(
            parameters
                .get(parameter)
                .is_some_and(|v| valid_values.contains(v)),
        )),
    }
}

fn evaluate_attribute(
    target: &AttributePath,
    operator: CompareOp,
    value: &crate::condition::ConditionValue,
    instance: &DeviceInstance,
    parameters: &BTreeMap<String, String>,
    catalog: &Catalog,
) -> Result<EvalReport, ExecutionError> {
    let ai = instance.attribute(target)?;
    let Some(lhs) = ai.current_value.as_level() else {
        return Ok(EvalReport::Unknown(vec![question_for(target)]));
    };
    let Some(rhs) = resolve_value(value, parameters) else {
        // A dangling parameter reference cannot match anything.
        return Ok(EvalReport::False);
    };
    let domain = catalog
        .domain(&ai.spec.domain_id)
        .ok_or_else(|| ExecutionError::DomainNotFound {
            id: ai.spec.domain_id.clone(),
        })?;
    match rhs.satisfies(operator, domain, lhs) {
        Some(result) => Ok(EvalReport::from_bool(result)),
        None => {
            warn!(
                attribute = %target,
                operator = operator.symbol(),
                "ordered comparison against a level outside the domain; treating as failed"
            );
            Ok(EvalReport::False)
        }
    }
}

/// Renders a human-readable failure message with resolved operands.
pub(crate) fn render_failure(
    condition: &Condition,
    instance: &DeviceInstance,
    parameters: &BTreeMap<String, String>,
    catalog: &Catalog,
) -> String {
    match condition {
        Condition::Attribute {
            target,
            operator,
            value,
        } => {
            let actual = instance
                .try_attribute(target)
                .map_or_else(|| "missing".to_string(), |ai| ai.current_value.to_string());
            let expected = resolve_value(value, parameters)
                .map_or_else(|| value.to_string(), |v| v.to_string());
            format!(
                "{target} {} {expected}, but got {actual}",
                operator.failure_phrase()
            )
        }
        Condition::ParameterEquals { parameter, value } => {
            let actual = parameters
                .get(parameter)
                .map_or("<missing>", String::as_str);
            format!("parameter '{parameter}' should be '{value}', but got '{actual}'")
        }
        Condition::ParameterValid {
            parameter,
            valid_values,
        } => {
            let actual = parameters
                .get(parameter)
                .map_or("<missing>", String::as_str);
            format!("parameter '{parameter}' should be one of {valid_values:?}, but got '{actual}'")
        }
        // Nested combinators fall back to the structural description.
        Condition::All { .. }
        | Condition::Any { .. }
        | Condition::Not { .. }
        | Condition::Implies { .. } => condition.describe(),
    }
}

/// Evaluates a condition with no action parameters in scope.
///
/// Used for dependency constraints, which cannot reference parameters.
pub(crate) fn evaluate_static(
    condition: &Condition,
    instance: &DeviceInstance,
    catalog: &Catalog,
) -> Result<EvalReport, ExecutionError> {
    evaluate(condition, instance, &BTreeMap::new(), catalog)
}
