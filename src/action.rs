//! Action definitions and invocation requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::effect::Effect;

/// Specification of a single action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name.
    pub name: String,
    /// Allowed values; `None` accepts any value.
    #[serde(default)]
    pub choices: Option<Vec<String>>,
    /// Whether the parameter must be supplied.
    #[serde(default = "default_required")]
    pub required: bool,
}

const fn default_required() -> bool {
    true
}

impl ParameterSpec {
    /// A required parameter restricted to the given choices.
    #[must_use]
    pub fn choice(
        name: impl Into<String>,
        choices: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            choices: Some(choices.into_iter().map(Into::into).collect()),
            required: true,
        }
    }
}

/// A declarative action: preconditions gate it, effects transform state.
///
/// Preconditions are combined conjunctively. Effects apply in declaration
/// order; later effects observe earlier writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Action name, unique within the catalog.
    pub name: String,
    /// Restricts the action to one device type; `None` means generic.
    #[serde(default)]
    pub device_type: Option<String>,
    /// Capabilities a device type must expose for this action to apply.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Parameter specifications keyed by name.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    /// Ordered preconditions, conjunctively combined.
    #[serde(default)]
    pub preconditions: Vec<Condition>,
    /// Ordered effects.
    #[serde(default)]
    pub effects: Vec<Effect>,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl Action {
    /// Creates a generic action with no parameters, preconditions, or effects.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_type: None,
            capabilities: Vec::new(),
            parameters: BTreeMap::new(),
            preconditions: Vec::new(),
            effects: Vec::new(),
            description: None,
        }
    }

    /// Binds the action to a single device type.
    #[must_use]
    pub fn for_device(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    /// Adds a parameter spec.
    #[must_use]
    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.parameters.insert(spec.name.clone(), spec);
        self
    }

    /// Adds a precondition.
    #[must_use]
    pub fn with_precondition(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    /// Adds an effect.
    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Requires a capability.
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }
}

/// One entry of the orchestrator's input: an action name plus parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Name of the action to apply.
    pub name: String,
    /// Parameter values keyed by parameter name.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ActionRequest {
    /// A request with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Adds a parameter value.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}
