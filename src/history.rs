//! Linear simulation sessions.
//!
//! A [`SessionRunner`] executes an action list without branching, tracking a
//! step-by-step [`SimulationHistory`]. When the evaluator rejects because an
//! attribute is literally unknown, the session surfaces the clarification
//! question (`What is <attribute path>?`); a resolver callback may supply an
//! answer from the attribute's domain, which is written back before the
//! action is retried. The branching engine never uses this protocol - it
//! enumerates every answer instead.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionRequest;
use crate::attribute::TrendDirection;
use crate::catalog::Catalog;
use crate::device::DeviceInstance;
use crate::engine::{DiffEntry, TransitionEngine, TransitionStatus};
use crate::error::SimResult;
use crate::path::AttributePath;
use crate::snapshot::WorldSnapshot;
use crate::tree::{NodeStatus, RunOptions};

/// One executed step of a linear session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationStep {
    /// Zero-based step index.
    pub step_number: usize,
    /// Action applied at this step.
    pub action_name: String,
    /// Parameter values.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Outcome status.
    pub status: NodeStatus,
    /// Rejection or violation message, if any.
    #[serde(default)]
    pub error: Option<String>,
    /// Unanswered clarification questions, if the step stayed rejected.
    #[serde(default)]
    pub clarifications: Vec<String>,
    /// World state before the step.
    pub state_before: WorldSnapshot,
    /// World state after the step (equals `state_before` on rejection).
    pub state_after: WorldSnapshot,
    /// Ordered diffs applied by the step.
    #[serde(default)]
    pub changes: Vec<DiffEntry>,
}

/// Complete record of a linear session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationHistory {
    /// Identifier of this session.
    pub simulation_id: String,
    /// Simulated device type.
    pub device_type: String,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// Session completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Executed steps, in order.
    #[serde(default)]
    pub steps: Vec<SimulationStep>,
}

impl SimulationHistory {
    /// The state after the final step, if any step ran.
    #[must_use]
    pub fn final_state(&self) -> Option<&WorldSnapshot> {
        self.steps.last().map(|s| &s.state_after)
    }

    /// Steps that completed successfully.
    #[must_use]
    pub fn successful_steps(&self) -> Vec<&SimulationStep> {
        self.steps
            .iter()
            .filter(|s| s.status == NodeStatus::Ok)
            .collect()
    }

    /// Steps that failed.
    #[must_use]
    pub fn failed_steps(&self) -> Vec<&SimulationStep> {
        self.steps
            .iter()
            .filter(|s| s.status.is_failure())
            .collect()
    }

    /// Steps that executed a specific action.
    #[must_use]
    pub fn steps_for_action(&self, action_name: &str) -> Vec<&SimulationStep> {
        self.steps
            .iter()
            .filter(|s| s.action_name == action_name)
            .collect()
    }
}

/// Answers clarification questions during a session.
///
/// Receives the attribute path and the levels it may currently take (trend
/// bookkeeping narrows the choices when a trend produced the uncertainty).
/// Returning `None` leaves the step rejected.
pub type ClarificationResolver<'r> = dyn FnMut(&AttributePath, &[String]) -> Option<String> + 'r;

/// Executes action lists linearly, one world at a time.
#[derive(Debug, Clone, Copy)]
pub struct SessionRunner<'a> {
    catalog: &'a Catalog,
    engine: TransitionEngine<'a>,
}

impl<'a> SessionRunner<'a> {
    /// Creates a session runner over the given catalog.
    #[must_use]
    pub const fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            engine: TransitionEngine::new(catalog),
        }
    }

    /// Runs the actions with no clarification resolver.
    pub fn run(
        &self,
        device_type: &str,
        requests: &[ActionRequest],
        options: RunOptions,
    ) -> SimResult<SimulationHistory> {
        self.run_with_resolver(device_type, requests, options, &mut |_, _| None)
    }

    /// Runs the actions, consulting `resolver` whenever the evaluator rejects
    /// for lack of a concrete value.
    pub fn run_with_resolver(
        &self,
        device_type: &str,
        requests: &[ActionRequest],
        options: RunOptions,
        resolver: &mut ClarificationResolver<'_>,
    ) -> SimResult<SimulationHistory> {
        let mut instance = self.catalog.instantiate(device_type)?;
        apply_overrides(&mut instance, self.catalog, &options)?;

        let mut history = SimulationHistory {
            simulation_id: options
                .simulation_id
                .clone()
                .unwrap_or_else(|| format!("sim_{}", Uuid::new_v4().simple())),
            device_type: device_type.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
        };

        for (step_number, request) in requests.iter().enumerate() {
            let state_before = WorldSnapshot::capture(&instance, self.catalog, None);
            let step = self.run_step(&mut instance, request, resolver)?;
            let state_after = WorldSnapshot::capture(&instance, self.catalog, None);
            history.steps.push(SimulationStep {
                step_number,
                action_name: request.name.clone(),
                parameters: request.parameters.clone(),
                status: step.status,
                error: step.error,
                clarifications: step.clarifications,
                state_before,
                state_after,
                changes: step.changes,
            });
        }

        history.completed_at = Some(Utc::now());
        Ok(history)
    }

    fn run_step(
        &self,
        instance: &mut DeviceInstance,
        request: &ActionRequest,
        resolver: &mut ClarificationResolver<'_>,
    ) -> SimResult<StepOutcome> {
        let action = match self.catalog.action_for(&instance.type_name, &request.name) {
            Ok(action) => action,
            Err(e) => {
                return Ok(StepOutcome {
                    status: NodeStatus::Error,
                    error: Some(e.to_string()),
                    clarifications: Vec::new(),
                    changes: Vec::new(),
                })
            }
        };

        loop {
            let result = self.engine.apply(instance, &action, &request.parameters)?;
            match result.status {
                TransitionStatus::Ok => {
                    if let Some(after) = result.after {
                        *instance = after;
                    }
                    return Ok(StepOutcome {
                        status: NodeStatus::Ok,
                        error: None,
                        clarifications: Vec::new(),
                        changes: result.changes,
                    });
                }
                TransitionStatus::ConstraintViolated => {
                    if let Some(after) = result.after {
                        *instance = after;
                    }
                    return Ok(StepOutcome {
                        status: NodeStatus::ConstraintViolated,
                        error: result.reason,
                        clarifications: Vec::new(),
                        changes: result.changes,
                    });
                }
                TransitionStatus::Rejected => {
                    if result.clarifications.is_empty() {
                        return Ok(StepOutcome {
                            status: NodeStatus::Rejected,
                            error: result.reason,
                            clarifications: Vec::new(),
                            changes: Vec::new(),
                        });
                    }
                    let mut answered = false;
                    for question in &result.clarifications {
                        if let Some(path) = path_from_question(question) {
                            let choices = allowed_levels(instance, self.catalog, &path);
                            if let Some(answer) = resolver(&path, &choices) {
                                if choices.contains(&answer) {
                                    instance.attribute_mut(&path)?.write_value(answer);
                                    answered = true;
                                }
                            }
                        }
                    }
                    if !answered {
                        return Ok(StepOutcome {
                            status: NodeStatus::Rejected,
                            error: result.reason,
                            clarifications: result.clarifications,
                            changes: Vec::new(),
                        });
                    }
                    // Retry with the written-back answers.
                }
            }
        }
    }
}

#[derive(Debug)]
struct StepOutcome {
    status: NodeStatus,
    error: Option<String>,
    clarifications: Vec<String>,
    changes: Vec<DiffEntry>,
}

fn apply_overrides(
    instance: &mut DeviceInstance,
    catalog: &Catalog,
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
        if let Some(domain) = catalog.domain_of(instance, &path) {
            if !domain.has(value) {
                return Err(crate::error::ExecutionError::InvalidLevel {
                    value: value.clone(),
                    path: path_str.clone(),
                    levels: domain.levels().to_vec(),
                }
                .into());
            }
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

/// Parses the attribute path out of a `What is <path>?` question.
fn path_from_question(question: &str) -> Option<AttributePath> {
    let inner = question.strip_prefix("What is ")?.strip_suffix('?')?;
    AttributePath::parse(inner).ok()
}

/// The levels an unknown attribute may currently take.
///
/// When a trend produced the uncertainty, only levels reachable in the
/// trend's direction from the last known value remain selectable.
#[must_use]
pub fn allowed_levels(
    instance: &DeviceInstance,
    catalog: &Catalog,
    path: &AttributePath,
) -> Vec<String> {
    let Some(ai) = instance.try_attribute(path) else {
        return Vec::new();
    };
    let Some(domain) = catalog.domain(&ai.spec.domain_id) else {
        return Vec::new();
    };
    let direction = ai.last_trend_direction.unwrap_or(ai.trend);
    if direction.is_active() && ai.current_value.is_unknown() {
        if let Some(last_known) = &ai.last_known_value {
            let constrained = domain.reachable(last_known, direction);
            if !constrained.is_empty() {
                return constrained;
            }
        }
    }
    domain.levels().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeSpec;
    use crate::condition::{CompareOp, Condition, ConditionValue};
    use crate::device::{DeviceType, PartSpec};
    use crate::domain::OrderedDomain;
    use crate::effect::Effect;
    use crate::Action;

    fn catalog() -> Catalog {
        Catalog::builder()
            .domain(
                OrderedDomain::new("battery_level", ["empty", "low", "medium", "high", "full"])
                    .unwrap(),
            )
            .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
            .action(
                Action::new("turn_on")
                    .with_precondition(Condition::attr(
                        AttributePath::part("battery", "level"),
                        CompareOp::NotEquals,
                        ConditionValue::literal("empty"),
                    ))
                    .with_effect(Effect::set(AttributePath::part("bulb", "state"), "on"))
                    .with_effect(Effect::trend(
                        AttributePath::part("battery", "level"),
                        TrendDirection::Down,
                    )),
            )
            .action(
                Action::new("turn_off")
                    .with_effect(Effect::set(AttributePath::part("bulb", "state"), "off"))
                    .with_effect(Effect::trend(
                        AttributePath::part("battery", "level"),
                        TrendDirection::None,
                    )),
            )
            .device(
                DeviceType::new("flashlight")
                    .with_part(PartSpec::new(
                        "battery",
                        [AttributeSpec::new("level", "battery_level", "full")],
                    ))
                    .with_part(PartSpec::new(
                        "bulb",
                        [AttributeSpec::new("state", "binary_state", "off")],
                    )),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn linear_session_records_steps() {
        let catalog = catalog();
        let runner = SessionRunner::new(&catalog);
        let history = runner
            .run(
                "flashlight",
                &[ActionRequest::new("turn_on"), ActionRequest::new("turn_off")],
                RunOptions::default(),
            )
            .unwrap();

        assert_eq!(history.steps.len(), 2);
        assert_eq!(history.successful_steps().len(), 2);
        assert!(history.completed_at.is_some());
        assert_eq!(history.steps_for_action("turn_on").len(), 1);
    }

    #[test]
    fn rejected_step_keeps_state_and_questions() {
        let catalog = catalog();
        let runner = SessionRunner::new(&catalog);
        let history = runner
            .run(
                "flashlight",
                &[ActionRequest::new("turn_on")],
                RunOptions::default().with_initial("battery.level", "unknown"),
            )
            .unwrap();

        let step = &history.steps[0];
        assert_eq!(step.status, NodeStatus::Rejected);
        assert_eq!(step.clarifications, vec!["What is battery.level?"]);
        assert_eq!(step.state_before, step.state_after);
    }

    #[test]
    fn resolver_answer_is_written_back_and_retried() {
        let catalog = catalog();
        let runner = SessionRunner::new(&catalog);
        let mut asked: Vec<String> = Vec::new();
        let history = runner
            .run_with_resolver(
                "flashlight",
                &[ActionRequest::new("turn_on")],
                RunOptions::default().with_initial("battery.level", "unknown"),
                &mut |path, choices| {
                    asked.push(path.to_string());
                    assert!(choices.contains(&"high".to_string()));
                    Some("high".to_string())
                },
            )
            .unwrap();

        assert_eq!(asked, vec!["battery.level"]);
        assert_eq!(history.steps[0].status, NodeStatus::Ok);
    }

    #[test]
    fn trend_limits_clarification_choices() {
        let catalog = catalog();
        let mut instance = catalog.instantiate("flashlight").unwrap();
        let path = AttributePath::part("battery", "level");
        let ai = instance.attribute_mut(&path).unwrap();
        ai.write_value("medium");
        ai.write_trend(TrendDirection::Down);

        let choices = allowed_levels(&instance, &catalog, &path);
        assert_eq!(choices, vec!["empty", "low", "medium"]);
    }

    #[test]
    fn missing_action_is_an_error_step() {
        let catalog = catalog();
        let runner = SessionRunner::new(&catalog);
        let history = runner
            .run(
                "flashlight",
                &[ActionRequest::new("self_destruct")],
                RunOptions::default(),
            )
            .unwrap();
        assert_eq!(history.steps[0].status, NodeStatus::Error);
    }
}
