//! The immutable configuration bundle.
//!
//! A [`Catalog`] holds every definition a simulation needs: ordered domains,
//! device types, actions, and capability definitions. It is built once through
//! a validating [`CatalogBuilder`], then passed by reference into the
//! evaluator and the orchestrators. There is no ambient global registry:
//! everything the core consumes arrives through this bundle.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::capability::CapabilityDef;
use crate::condition::{Condition, ConditionValue};
use crate::device::{DeviceInstance, DeviceType};
use crate::domain::OrderedDomain;
use crate::error::{DefinitionError, ExecutionError};
use crate::path::AttributePath;

/// Immutable, validated definition tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    domains: BTreeMap<String, OrderedDomain>,
    devices: BTreeMap<String, DeviceType>,
    actions: BTreeMap<String, Action>,
    capabilities: BTreeMap<String, CapabilityDef>,
}

impl Catalog {
    /// Starts building a catalog.
    #[must_use]
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Looks up a domain by id.
    #[must_use]
    pub fn domain(&self, id: &str) -> Option<&OrderedDomain> {
        self.domains.get(id)
    }

    /// Looks up a device type by name.
    #[must_use]
    pub fn device(&self, name: &str) -> Option<&DeviceType> {
        self.devices.get(name)
    }

    /// Looks up an action definition by name.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    /// The capabilities a device type structurally supports.
    #[must_use]
    pub fn detect_capabilities(&self, device_type: &DeviceType) -> BTreeSet<String> {
        self.capabilities
            .values()
            .filter(|cap| cap.supported_by(device_type))
            .map(|cap| cap.name.clone())
            .collect()
    }

    /// Instantiates a device type with default attribute values.
    pub fn instantiate(&self, device_type: &str) -> Result<DeviceInstance, ExecutionError> {
        let dt = self
            .device(device_type)
            .ok_or_else(|| ExecutionError::DeviceTypeNotFound {
                name: device_type.to_string(),
            })?;
        Ok(DeviceInstance::instantiate(dt))
    }

    /// Resolves the effective action for a device type.
    ///
    /// The base action must exist and be eligible for the device: either it
    /// names no capabilities, or the device supports all of them. Device
    /// behavior overrides then replace the action's preconditions and/or
    /// effects wholesale.
    pub fn action_for(&self, device_type: &str, action_name: &str) -> Result<Action, ExecutionError> {
        let dt = self
            .device(device_type)
            .ok_or_else(|| ExecutionError::DeviceTypeNotFound {
                name: device_type.to_string(),
            })?;
        let not_found = || ExecutionError::ActionNotFound {
            action: action_name.to_string(),
            device: device_type.to_string(),
        };
        let base = self.action(action_name).ok_or_else(not_found)?;

        if base
            .device_type
            .as_deref()
            .is_some_and(|bound| bound != device_type)
        {
            return Err(not_found());
        }
        if !base.capabilities.is_empty() {
            let supported = self.detect_capabilities(dt);
            if !base.capabilities.iter().all(|c| supported.contains(c)) {
                return Err(not_found());
            }
        }

        let mut action = base.clone();
        if let Some(behavior) = dt.behaviors.get(action_name) {
            if let Some(preconditions) = &behavior.preconditions {
                action.preconditions = preconditions.clone();
            }
            if let Some(effects) = &behavior.effects {
                action.effects = effects.clone();
            }
        }
        Ok(action)
    }

    /// The domain of an attribute, resolved through the owning instance's type.
    #[must_use]
    pub fn domain_of(&self, instance: &DeviceInstance, path: &AttributePath) -> Option<&OrderedDomain> {
        let ai = instance.try_attribute(path)?;
        self.domain(&ai.spec.domain_id)
    }
}

/// Builder for [`Catalog`] that validates every cross-reference.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    domains: Vec<OrderedDomain>,
    devices: Vec<DeviceType>,
    actions: Vec<Action>,
    capabilities: Vec<CapabilityDef>,
}

impl CatalogBuilder {
    /// Adds a domain.
    #[must_use]
    pub fn domain(mut self, domain: OrderedDomain) -> Self {
        self.domains.push(domain);
        self
    }

    /// Adds a device type.
    #[must_use]
    pub fn device(mut self, device: DeviceType) -> Self {
        self.devices.push(device);
        self
    }

    /// Adds an action.
    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Adds a capability definition.
    #[must_use]
    pub fn capability(mut self, capability: CapabilityDef) -> Self {
        self.capabilities.push(capability);
        self
    }

    /// Validates all definitions and produces the immutable catalog.
    ///
    /// Malformed definitions fail here, once, and never reach the simulation
    /// core.
    pub fn build(self) -> Result<Catalog, DefinitionError> {
        let mut domains = BTreeMap::new();
        for domain in self.domains {
            if domains
                .insert(domain.id().to_string(), domain.clone())
                .is_some()
            {
                return Err(DefinitionError::Duplicate {
                    kind: "domain",
                    name: domain.id().to_string(),
                });
            }
        }

        let mut actions = BTreeMap::new();
        for action in self.actions {
            validate_action(&action)?;
            if actions.insert(action.name.clone(), action.clone()).is_some() {
                return Err(DefinitionError::Duplicate {
                    kind: "action",
                    name: action.name,
                });
            }
        }

        let mut capabilities = BTreeMap::new();
        for capability in self.capabilities {
            if capabilities
                .insert(capability.name.clone(), capability.clone())
                .is_some()
            {
                return Err(DefinitionError::Duplicate {
                    kind: "capability",
                    name: capability.name,
                });
            }
        }

        for action in actions.values() {
            for cap in &action.capabilities {
                if !capabilities.contains_key(cap) {
                    return Err(DefinitionError::UnknownCapability {
                        capability: cap.clone(),
                        action: action.name.clone(),
                    });
                }
            }
        }

        let mut devices = BTreeMap::new();
        for device in self.devices {
            validate_device(&device, &domains, &actions)?;
            if devices.insert(device.name.clone(), device.clone()).is_some() {
                return Err(DefinitionError::Duplicate {
                    kind: "device type",
                    name: device.name,
                });
            }
        }

        for action in actions.values() {
            if let Some(bound) = &action.device_type {
                if !devices.contains_key(bound) {
                    return Err(DefinitionError::UnknownActionDevice {
                        action: action.name.clone(),
                        device: bound.clone(),
                    });
                }
            }
        }

        Ok(Catalog {
            domains,
            devices,
            actions,
            capabilities,
        })
    }
}

fn validate_action(action: &Action) -> Result<(), DefinitionError> {
    for (name, spec) in &action.parameters {
        if spec
            .choices
            .as_ref()
            .is_some_and(std::vec::Vec::is_empty)
        {
            return Err(DefinitionError::EmptyParameterChoices {
                parameter: name.clone(),
                action: action.name.clone(),
            });
        }
    }
    Ok(())
}

fn validate_device(
    device: &DeviceType,
    domains: &BTreeMap<String, OrderedDomain>,
    actions: &BTreeMap<String, Action>,
) -> Result<(), DefinitionError> {
    let part_specs = device
        .parts
        .iter()
        .flat_map(|(part_name, part)| {
            part.attributes
                .values()
                .map(move |spec| (AttributePath::part(part_name, &spec.name), spec))
        })
        .chain(
            device
                .global_attributes
                .values()
                .map(|spec| (AttributePath::global(&spec.name), spec)),
        );
    for (path, spec) in part_specs {
        let Some(domain) = domains.get(&spec.domain_id) else {
            return Err(DefinitionError::UnknownDomainReference {
                attribute: path.to_string(),
                domain_id: spec.domain_id.clone(),
            });
        };
        if let Some(default) = &spec.default_value {
            if !domain.has(default) {
                return Err(DefinitionError::DefaultOutsideDomain {
                    attribute: path.to_string(),
                    value: default.clone(),
                    domain_id: spec.domain_id.clone(),
                });
            }
        }
    }
    for action_name in device.behaviors.keys() {
        if !actions.contains_key(action_name) {
            return Err(DefinitionError::UnknownBehaviorAction {
                device: device.name.clone(),
                action: action_name.clone(),
            });
        }
    }
    for constraint in &device.constraints {
        validate_condition_paths(&constraint.condition, device)?;
        validate_condition_paths(&constraint.requires, device)?;
    }
    Ok(())
}

fn validate_condition_paths(condition: &Condition, device: &DeviceType) -> Result<(), DefinitionError> {
    for path in condition.referenced_attributes() {
        if device.attribute_spec(path).is_none() {
            return Err(DefinitionError::InvalidPath {
                path: path.to_string(),
                reason: format!("not an attribute of device type '{}'", device.name),
            });
        }
    }
    Ok(())
}

/// Resolves a condition value against the supplied parameter map.
///
/// Used by both the deterministic evaluator and the branch computer so the
/// two agree on what a parameter reference means.
#[must_use]
pub fn resolve_value(
    value: &ConditionValue,
    parameters: &BTreeMap<String, String>,
) -> Option<crate::condition::ResolvedValue> {
    use crate::condition::ResolvedValue;
    match value {
        ConditionValue::Literal(v) => Some(ResolvedValue::Level(v.clone())),
        ConditionValue::Set(vs) => Some(ResolvedValue::Set(vs.clone())),
        ConditionValue::Parameter(name) => parameters
            .get(name)
            .map(|v| ResolvedValue::Level(v.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeSpec;
    use crate::device::{BehaviorOverride, PartSpec};
    use crate::effect::Effect;

    fn base_builder() -> CatalogBuilder {
        Catalog::builder()
            .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
            .device(DeviceType::new("lamp").with_part(PartSpec::new(
                "switch",
                [AttributeSpec::new("position", "binary_state", "off")],
            )))
    }

    #[test]
    fn build_validates_domain_references() {
        let err = Catalog::builder()
            .device(DeviceType::new("lamp").with_part(PartSpec::new(
                "switch",
                [AttributeSpec::new("position", "binary_state", "off")],
            )))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownDomainReference { .. }));
    }

    #[test]
    fn build_validates_defaults() {
        let err = Catalog::builder()
            .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
            .device(DeviceType::new("lamp").with_part(PartSpec::new(
                "switch",
                [AttributeSpec::new("position", "binary_state", "half")],
            )))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::DefaultOutsideDomain { .. }));
    }

    #[test]
    fn behavior_must_reference_known_action() {
        let err = Catalog::builder()
            .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
            .device(
                DeviceType::new("lamp")
                    .with_part(PartSpec::new(
                        "switch",
                        [AttributeSpec::new("position", "binary_state", "off")],
                    ))
                    .with_behavior("warp", BehaviorOverride::default()),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownBehaviorAction { .. }));
    }

    #[test]
    fn behavior_override_replaces_effects() {
        let catalog = base_builder()
            .action(Action::new("toggle").with_effect(Effect::set(
                AttributePath::part("switch", "position"),
                "on",
            )))
            .build()
            .unwrap();
        let plain = catalog.action_for("lamp", "toggle").unwrap();
        assert_eq!(plain.effects.len(), 1);

        let overridden = Catalog::builder()
            .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
            .action(Action::new("toggle").with_effect(Effect::set(
                AttributePath::part("switch", "position"),
                "on",
            )))
            .device(
                DeviceType::new("lamp")
                    .with_part(PartSpec::new(
                        "switch",
                        [AttributeSpec::new("position", "binary_state", "off")],
                    ))
                    .with_behavior(
                        "toggle",
                        BehaviorOverride {
                            preconditions: None,
                            effects: Some(vec![
                                Effect::set(AttributePath::part("switch", "position"), "on"),
                                Effect::set(AttributePath::part("switch", "position"), "off"),
                            ]),
                        },
                    ),
            )
            .build()
            .unwrap();
        let action = overridden.action_for("lamp", "toggle").unwrap();
        assert_eq!(action.effects.len(), 2);
    }

    #[test]
    fn capability_gated_action_requires_support() {
        let catalog = Catalog::builder()
            .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
            .capability(CapabilityDef::new(
                "switchable",
                [(AttributePath::part("switch", "position"), "binary_state".to_string())],
            ))
            .action(Action::new("toggle").with_capability("switchable"))
            .device(DeviceType::new("lamp").with_part(PartSpec::new(
                "switch",
                [AttributeSpec::new("position", "binary_state", "off")],
            )))
            .device(DeviceType::new("kettle"))
            .build()
            .unwrap();

        assert!(catalog.action_for("lamp", "toggle").is_ok());
        assert!(matches!(
            catalog.action_for("kettle", "toggle"),
            Err(ExecutionError::ActionNotFound { .. })
        ));
    }

    #[test]
    fn unknown_capability_reference_fails_build() {
        let err = Catalog::builder()
            .action(Action::new("toggle").with_capability("ghost"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownCapability { .. }));
    }

    #[test]
    fn device_bound_action_is_invisible_to_other_devices() {
        let catalog = Catalog::builder()
            .domain(OrderedDomain::new("binary_state", ["off", "on"]).unwrap())
            .action(
                Action::new("toggle")
                    .for_device("lamp")
                    .with_effect(Effect::set(AttributePath::part("switch", "position"), "on")),
            )
            .device(DeviceType::new("lamp").with_part(PartSpec::new(
                "switch",
                [AttributeSpec::new("position", "binary_state", "off")],
            )))
            .device(DeviceType::new("kettle"))
            .build()
            .unwrap();

        assert!(catalog.action_for("lamp", "toggle").is_ok());
        assert!(matches!(
            catalog.action_for("kettle", "toggle"),
            Err(ExecutionError::ActionNotFound { .. })
        ));
    }

    #[test]
    fn action_bound_to_missing_device_fails_build() {
        let err = Catalog::builder()
            .action(Action::new("toggle").for_device("ghost"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownActionDevice { .. }));
    }
}
