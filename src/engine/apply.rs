//! Effect application.
//!
//! Effects mutate a cloned instance in declared order; each write is visible
//! to every subsequent effect evaluation. Conditional effects re-evaluate
//! their guard against the evolving state.

use std::collections::BTreeMap;

use crate::catalog::{resolve_value, Catalog};
use crate::condition::ResolvedValue;
use crate::device::DeviceInstance;
use crate::effect::Effect;
use crate::engine::eval::{evaluate, EvalReport};
use crate::engine::{DiffEntry, DiffKind};
use crate::error::ExecutionError;
use crate::path::AttributePath;
use crate::snapshot::SnapshotValue;

/// What applying a list of effects produced.
#[derive(Debug)]
pub(crate) enum EffectOutcome {
    /// All effects applied; the recorded diffs, in application order.
    Applied(Vec<DiffEntry>),
    /// A guard with no else branch evaluated false; carries its description.
    GuardFailed(String),
}

/// Applies `effects` to `instance` in order.
pub(crate) fn apply_effects(
    effects: &[Effect],
    instance: &mut DeviceInstance,
    parameters: &BTreeMap<String, String>,
    catalog: &Catalog,
) -> Result<EffectOutcome, ExecutionError> {
    let mut changes = Vec::new();
    match apply_into(effects, instance, parameters, catalog, &mut changes)? {
        Some(reason) => Ok(EffectOutcome::GuardFailed(reason)),
        None => Ok(EffectOutcome::Applied(changes)),
    }
}

fn apply_into(
    effects: &[Effect],
    instance: &mut DeviceInstance,
    parameters: &BTreeMap<String, String>,
    catalog: &Catalog,
    changes: &mut Vec<DiffEntry>,
) -> Result<Option<String>, ExecutionError> {
    for effect in effects {
        match effect {
            Effect::SetAttribute { target, value } => {
                let resolved = resolve_value(value, parameters).ok_or_else(|| {
                    ExecutionError::InvalidLevel {
                        value: value.to_string(),
                        path: target.to_string(),
                        levels: Vec::new(),
                    }
                })?;
                let ResolvedValue::Level(new_value) = resolved else {
                    return Err(ExecutionError::InvalidLevel {
                        value: resolved.to_string(),
                        path: target.to_string(),
                        levels: Vec::new(),
                    });
                };
                changes.push(write_value(instance, target, &new_value, catalog)?);
            }

            Effect::SetTrend { target, direction } => {
                let ai = instance.attribute_mut(target)?;
                let before = ai.trend;
                ai.write_trend(*direction);
                changes.push(DiffEntry {
                    attribute: format!("{target}.trend"),
                    before: SnapshotValue::Level(before.to_string()),
                    after: SnapshotValue::Level(direction.to_string()),
                    kind: DiffKind::Trend,
                });
            }

            Effect::Conditional {
                condition,
                then_effects,
                else_effects,
            } => {
                let holds = match evaluate(condition, instance, parameters, catalog)? {
                    EvalReport::True => true,
                    // Guards were screened for unknowns before application
                    // started; an unknown here means an earlier effect erased
                    // the information, which counts as a failed guard.
                    EvalReport::False | EvalReport::Unknown(_) => false,
                };
                if holds {
                    if let Some(reason) =
                        apply_into(then_effects, instance, parameters, catalog, changes)?
                    {
                        return Ok(Some(reason));
                    }
                } else if else_effects.is_empty() {
                    return Ok(Some(condition.describe()));
                } else if let Some(reason) =
                    apply_into(else_effects, instance, parameters, catalog, changes)?
                {
                    return Ok(Some(reason));
                }
            }
        }
    }
    Ok(None)
}

fn write_value(
    instance: &mut DeviceInstance,
    target: &AttributePath,
    value: &str,
    catalog: &Catalog,
) -> Result<DiffEntry, ExecutionError> {
    let domain_id = instance.attribute(target)?.spec.domain_id.clone();
    let domain = catalog
        .domain(&domain_id)
        .ok_or_else(|| ExecutionError::DomainNotFound { id: domain_id })?;
    if !domain.has(value) {
        return Err(ExecutionError::InvalidLevel {
            value: value.to_string(),
            path: target.to_string(),
            levels: domain.levels().to_vec(),
        });
    }
    let ai = instance.attribute_mut(target)?;
    let before = match ai.current_value.as_level() {
        Some(v) => SnapshotValue::Level(v.to_string()),
        None => SnapshotValue::Unknown,
    };
    ai.write_value(value);
    Ok(DiffEntry {
        attribute: target.to_string(),
        before,
        after: SnapshotValue::Level(value.to_string()),
        kind: DiffKind::Value,
    })
}
