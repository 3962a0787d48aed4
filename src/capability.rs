//! Structural capability detection.
//!
//! A capability names a structural contract a device type can satisfy: "has
//! these attributes, drawn from these domains". Generic actions declare the
//! capabilities they need instead of naming device types; a device type is
//! eligible when detection covers the whole set.

use serde::{Deserialize, Serialize};

use crate::device::DeviceType;
use crate::path::AttributePath;

/// Definition of a capability: required attributes and their domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDef {
    /// Capability name, unique within the catalog.
    pub name: String,
    /// Attributes the device type must expose, with the domain each must use.
    pub required_attributes: Vec<RequiredAttribute>,
}

/// One structural requirement of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredAttribute {
    /// Path the device type must define.
    pub path: AttributePath,
    /// Domain id the attribute must draw from.
    pub domain_id: String,
}

impl CapabilityDef {
    /// Creates a capability from `(path, domain_id)` pairs.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        requirements: impl IntoIterator<Item = (AttributePath, String)>,
    ) -> Self {
        Self {
            name: name.into(),
            required_attributes: requirements
                .into_iter()
                .map(|(path, domain_id)| RequiredAttribute { path, domain_id })
                .collect(),
        }
    }

    /// Whether `device_type` structurally supports this capability.
    #[must_use]
    pub fn supported_by(&self, device_type: &DeviceType) -> bool {
        self.required_attributes.iter().all(|req| {
            device_type
                .attribute_spec(&req.path)
                .is_some_and(|spec| spec.domain_id == req.domain_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeSpec;
    use crate::device::PartSpec;

    fn switchable() -> CapabilityDef {
        CapabilityDef::new(
            "switchable",
            [(AttributePath::part("switch", "position"), "binary_state".to_string())],
        )
    }

    #[test]
    fn detects_matching_structure() {
        let device = DeviceType::new("lamp").with_part(PartSpec::new(
            "switch",
            [AttributeSpec::new("position", "binary_state", "off")],
        ));
        assert!(switchable().supported_by(&device));
    }

    #[test]
    fn rejects_missing_attribute_and_wrong_domain() {
        let no_switch = DeviceType::new("kettle");
        assert!(!switchable().supported_by(&no_switch));

        let wrong_domain = DeviceType::new("dial_lamp").with_part(PartSpec::new(
            "switch",
            [AttributeSpec::new("position", "dial_level", "low")],
        ));
        assert!(!switchable().supported_by(&wrong_domain));
    }
}
