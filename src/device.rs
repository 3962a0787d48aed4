//! Device types and runtime device instances.
//!
//! A [`DeviceType`] is the schema: named parts, each a bag of attribute specs,
//! plus device-global attributes, dependency constraints, and per-action
//! behavior overrides. A [`DeviceInstance`] is the live state, deep-cloned
//! whenever a new world branch is produced. Attribute specs are shared between
//! clones through `Arc`, so cloning only duplicates mutable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeInstance, AttributeSpec};
use crate::condition::Condition;
use crate::constraint::DependencyConstraint;
use crate::effect::Effect;
use crate::error::ExecutionError;
use crate::path::AttributePath;

/// Specification for a part of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSpec {
    /// Part name within its device type.
    pub name: String,
    /// Attribute specs keyed by attribute name.
    pub attributes: BTreeMap<String, AttributeSpec>,
}

impl PartSpec {
    /// Creates a part from its attribute specs.
    #[must_use]
    pub fn new(name: impl Into<String>, attributes: impl IntoIterator<Item = AttributeSpec>) -> Self {
        Self {
            name: name.into(),
            attributes: attributes
                .into_iter()
                .map(|a| (a.name.clone(), a))
                .collect(),
        }
    }
}

/// Device-specific overrides for a named action.
///
/// `None` keeps the base action's list; `Some` replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BehaviorOverride {
    /// Replacement preconditions, if any.
    #[serde(default)]
    pub preconditions: Option<Vec<Condition>>,
    /// Replacement effects, if any.
    #[serde(default)]
    pub effects: Option<Vec<Effect>>,
}

/// Schema for a device: parts, global attributes, constraints, behaviors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceType {
    /// Device type name, unique within the catalog.
    pub name: String,
    /// Parts keyed by part name.
    #[serde(default)]
    pub parts: BTreeMap<String, PartSpec>,
    /// Global attribute specs keyed by attribute name.
    #[serde(default)]
    pub global_attributes: BTreeMap<String, AttributeSpec>,
    /// Dependency constraints over this device's attributes.
    #[serde(default)]
    pub constraints: Vec<DependencyConstraint>,
    /// Per-action behavior overrides keyed by action name.
    #[serde(default)]
    pub behaviors: BTreeMap<String, BehaviorOverride>,
}

impl DeviceType {
    /// Creates an empty device type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: BTreeMap::new(),
            global_attributes: BTreeMap::new(),
            constraints: Vec::new(),
            behaviors: BTreeMap::new(),
        }
    }

    /// Adds a part.
    #[must_use]
    pub fn with_part(mut self, part: PartSpec) -> Self {
        self.parts.insert(part.name.clone(), part);
        self
    }

    /// Adds a global attribute.
    #[must_use]
    pub fn with_global(mut self, spec: AttributeSpec) -> Self {
        self.global_attributes.insert(spec.name.clone(), spec);
        self
    }

    /// Adds a dependency constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: DependencyConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Adds a behavior override for a named action.
    #[must_use]
    pub fn with_behavior(mut self, action: impl Into<String>, behavior: BehaviorOverride) -> Self {
        self.behaviors.insert(action.into(), behavior);
        self
    }

    /// The spec for an attribute path, if the path exists on this type.
    #[must_use]
    pub fn attribute_spec(&self, path: &AttributePath) -> Option<&AttributeSpec> {
        match path.part_name() {
            Some(part) => self.parts.get(part)?.attributes.get(path.attribute_name()),
            None => self.global_attributes.get(path.attribute_name()),
        }
    }

    /// All attribute paths of this device type, parts first, in sorted order.
    #[must_use]
    pub fn attribute_paths(&self) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        for (part_name, part) in &self.parts {
            for attr_name in part.attributes.keys() {
                paths.push(AttributePath::part(part_name, attr_name));
            }
        }
        for attr_name in self.global_attributes.keys() {
            paths.push(AttributePath::global(attr_name));
        }
        paths
    }
}

/// Runtime instance of a part.
#[derive(Debug, Clone, PartialEq)]
pub struct PartInstance {
    /// Attribute instances keyed by attribute name.
    pub attributes: BTreeMap<String, AttributeInstance>,
}

/// Runtime instance of a device.
///
/// Owned exclusively by one branch of the simulation; cloned (deeply, except
/// for the `Arc`-shared specs) whenever a new branch is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInstance {
    /// Name of the device type this instance was created from.
    pub type_name: String,
    /// Part instances keyed by part name.
    pub parts: BTreeMap<String, PartInstance>,
    /// Global attribute instances keyed by attribute name.
    pub global_attributes: BTreeMap<String, AttributeInstance>,
}

impl DeviceInstance {
    /// Instantiates a device with every attribute at its default value.
    #[must_use]
    pub fn instantiate(device_type: &DeviceType) -> Self {
        let parts = device_type
            .parts
            .iter()
            .map(|(part_name, part)| {
                let attributes = part
                    .attributes
                    .iter()
                    .map(|(attr_name, spec)| {
                        (
                            attr_name.clone(),
                            AttributeInstance::from_spec(Arc::new(spec.clone())),
                        )
                    })
                    .collect();
                (part_name.clone(), PartInstance { attributes })
            })
            .collect();
        let global_attributes = device_type
            .global_attributes
            .iter()
            .map(|(attr_name, spec)| {
                (
                    attr_name.clone(),
                    AttributeInstance::from_spec(Arc::new(spec.clone())),
                )
            })
            .collect();
        Self {
            type_name: device_type.name.clone(),
            parts,
            global_attributes,
        }
    }

    /// Resolves an attribute path to its instance.
    pub fn attribute(&self, path: &AttributePath) -> Result<&AttributeInstance, ExecutionError> {
        self.try_attribute(path)
            .ok_or_else(|| ExecutionError::AttributeNotFound {
                path: path.to_string(),
            })
    }

    /// Resolves an attribute path, returning `None` when absent.
    #[must_use]
    pub fn try_attribute(&self, path: &AttributePath) -> Option<&AttributeInstance> {
        match path.part_name() {
            Some(part) => self.parts.get(part)?.attributes.get(path.attribute_name()),
            None => self.global_attributes.get(path.attribute_name()),
        }
    }

    /// Resolves an attribute path to a mutable instance.
    pub fn attribute_mut(
        &mut self,
        path: &AttributePath,
    ) -> Result<&mut AttributeInstance, ExecutionError> {
        let missing = ExecutionError::AttributeNotFound {
            path: path.to_string(),
        };
        match path.part_name() {
            Some(part) => self
                .parts
                .get_mut(part)
                .and_then(|p| p.attributes.get_mut(path.attribute_name()))
                .ok_or(missing),
            None => self
                .global_attributes
                .get_mut(path.attribute_name())
                .ok_or(missing),
        }
    }

    /// All attribute paths of this instance, parts first, in sorted order.
    #[must_use]
    pub fn attribute_paths(&self) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        for (part_name, part) in &self.parts {
            for attr_name in part.attributes.keys() {
                paths.push(AttributePath::part(part_name, attr_name));
            }
        }
        for attr_name in self.global_attributes.keys() {
            paths.push(AttributePath::global(attr_name));
        }
        paths
    }
}
