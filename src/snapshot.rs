//! World snapshots.
//!
//! A [`WorldSnapshot`] is the immutable, hashable projection of a device
//! instance that the branching engine works on. Where a live instance holds a
//! single (possibly unknown) value per attribute, a snapshot may hold a
//! *value-set*: the non-empty subset of domain levels the attribute could
//! still be in, e.g. because an unresolved trend expanded a reading into every
//! level reachable in its direction.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeValue, TrendDirection};
use crate::catalog::Catalog;
use crate::device::DeviceInstance;
use crate::path::AttributePath;

/// An attribute's value as projected into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SnapshotValue {
    /// A single concrete level.
    Level(String),
    /// A non-empty subset of domain levels; size 1 counts as known.
    Set(Vec<String>),
    /// Nothing is known about the value.
    Unknown,
}

impl SnapshotValue {
    /// Builds a `Level` for one value, a `Set` otherwise.
    ///
    /// # Panics
    /// Panics on an empty slice: a branch with no satisfying values is never
    /// materialized, so an empty constraint here is a logic error.
    #[must_use]
    pub fn from_values(values: &[String]) -> Self {
        assert!(!values.is_empty(), "snapshot value-set cannot be empty");
        if values.len() == 1 {
            Self::Level(values[0].clone())
        } else {
            Self::Set(values.to_vec())
        }
    }

    /// The concrete level, when known (a one-element set counts).
    #[must_use]
    pub fn as_level(&self) -> Option<&str> {
        match self {
            Self::Level(v) => Some(v),
            Self::Set(vs) if vs.len() == 1 => Some(&vs[0]),
            Self::Set(_) | Self::Unknown => None,
        }
    }

    /// Whether the value is definitively known (single possibility).
    #[must_use]
    pub fn is_known(&self) -> bool {
        self.as_level().is_some()
    }

    /// Whether this is a multi-valued set.
    #[must_use]
    pub fn is_value_set(&self) -> bool {
        matches!(self, Self::Set(vs) if vs.len() > 1)
    }

    /// The candidate levels, when any are known: the set itself, or the single
    /// level. `Unknown` has no candidates (the caller falls back to the full
    /// domain).
    #[must_use]
    pub fn candidates(&self) -> Option<Vec<String>> {
        match self {
            Self::Level(v) => Some(vec![v.clone()]),
            Self::Set(vs) => Some(vs.clone()),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for SnapshotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(v) => write!(f, "{v}"),
            Self::Set(vs) => write!(f, "{{{}}}", vs.join(", ")),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Snapshot of one attribute: value, trend, and trend bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeState {
    /// Projected value.
    pub value: SnapshotValue,
    /// Active trend direction.
    #[serde(default)]
    pub trend: TrendDirection,
    /// Last concretely known level.
    #[serde(default)]
    pub last_known_value: Option<String>,
    /// Trend direction that produced the current uncertainty.
    #[serde(default)]
    pub last_trend_direction: Option<TrendDirection>,
    /// Id of the domain the attribute draws from.
    pub domain_id: String,
}

/// Immutable projection of a device instance at one point of the simulation.
///
/// Hashed by content for layer deduplication; the hash is independent of
/// attribute insertion order because all maps are ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Device type name.
    pub device_type: String,
    /// Part attribute states: part name -> attribute name -> state.
    pub parts: BTreeMap<String, BTreeMap<String, AttributeState>>,
    /// Global attribute states keyed by attribute name.
    #[serde(default)]
    pub global_attributes: BTreeMap<String, AttributeState>,
}

impl WorldSnapshot {
    /// Captures the current state of a device instance.
    ///
    /// Trend expansion: an active trend turns the reading into the value-set
    /// of all levels reachable in its direction from the last concrete value.
    /// Set preservation: if the parent snapshot held a value-set and this
    /// action did not write the attribute (unchanged last-known value), the
    /// parent's set is carried over instead of collapsing to unknown.
    #[must_use]
    pub fn capture(
        instance: &DeviceInstance,
        catalog: &Catalog,
        parent: Option<&WorldSnapshot>,
    ) -> Self {
        let mut parts: BTreeMap<String, BTreeMap<String, AttributeState>> = BTreeMap::new();
        for (part_name, part) in &instance.parts {
            let mut attrs = BTreeMap::new();
            for (attr_name, ai) in &part.attributes {
                let path = AttributePath::part(part_name, attr_name);
                attrs.insert(attr_name.clone(), project_attribute(ai, &path, catalog, parent));
            }
            parts.insert(part_name.clone(), attrs);
        }
        let mut global_attributes = BTreeMap::new();
        for (attr_name, ai) in &instance.global_attributes {
            let path = AttributePath::global(attr_name);
            global_attributes.insert(attr_name.clone(), project_attribute(ai, &path, catalog, parent));
        }
        Self {
            device_type: instance.type_name.clone(),
            parts,
            global_attributes,
        }
    }

    /// The state for an attribute path.
    #[must_use]
    pub fn get(&self, path: &AttributePath) -> Option<&AttributeState> {
        match path.part_name() {
            Some(part) => self.parts.get(part)?.get(path.attribute_name()),
            None => self.global_attributes.get(path.attribute_name()),
        }
    }

    /// Mutable state for an attribute path.
    pub fn get_mut(&mut self, path: &AttributePath) -> Option<&mut AttributeState> {
        match path.part_name() {
            Some(part) => self.parts.get_mut(part)?.get_mut(path.attribute_name()),
            None => self.global_attributes.get_mut(path.attribute_name()),
        }
    }

    /// The projected value for a path, if the attribute exists.
    #[must_use]
    pub fn value(&self, path: &AttributePath) -> Option<&SnapshotValue> {
        self.get(path).map(|a| &a.value)
    }

    /// Whether the attribute's value is definitively known.
    ///
    /// Unknown sentinels and value-sets of size > 1 are both "not known" for
    /// branching purposes.
    #[must_use]
    pub fn is_known(&self, path: &AttributePath) -> bool {
        self.get(path).is_some_and(|a| a.value.is_known())
    }

    /// All attribute paths in this snapshot, parts first, in sorted order.
    #[must_use]
    pub fn attribute_paths(&self) -> Vec<AttributePath> {
        let mut paths = Vec::new();
        for (part_name, attrs) in &self.parts {
            for attr_name in attrs.keys() {
                paths.push(AttributePath::part(part_name, attr_name));
            }
        }
        for attr_name in self.global_attributes.keys() {
            paths.push(AttributePath::global(attr_name));
        }
        paths
    }

    /// Overwrites an attribute's value unconditionally.
    pub fn set_value(&mut self, path: &AttributePath, value: SnapshotValue) {
        if let Some(state) = self.get_mut(path) {
            state.value = value;
        }
    }

    /// Narrows an attribute to a subset of values.
    ///
    /// A prior value-set is intersected with the subset (order preserved); an
    /// unknown value is replaced by the subset. A concrete level is never
    /// overridden: an explicit write always survives an external narrowing
    /// request. Returns true when the stored value changed.
    pub fn narrow(&mut self, path: &AttributePath, values: &[String]) -> bool {
        let Some(state) = self.get_mut(path) else {
            return false;
        };
        let new_value = match &state.value {
            SnapshotValue::Unknown => SnapshotValue::from_values(values),
            SnapshotValue::Set(prior) => {
                let kept: Vec<String> = prior
                    .iter()
                    .filter(|v| values.contains(v))
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    // An empty narrowing is never materialized as a branch;
                    // keep the prior set rather than fabricate an illegal state.
                    return false;
                }
                SnapshotValue::from_values(&kept)
            }
            SnapshotValue::Level(_) => return false,
        };
        if new_value == state.value {
            return false;
        }
        state.value = new_value;
        true
    }

    /// Canonical content hash over all attribute values and trends.
    ///
    /// Stable under attribute insertion order; excludes trend bookkeeping and
    /// domain ids (structural, not state).
    #[must_use]
    pub fn state_hash(&self) -> String {
        let mut canonical = format!("type:{}", self.device_type);
        for (part_name, attrs) in &self.parts {
            for (attr_name, state) in attrs {
                push_hash_entry(&mut canonical, &format!("{part_name}.{attr_name}"), state);
            }
        }
        for (attr_name, state) in &self.global_attributes {
            push_hash_entry(&mut canonical, &format!("global.{attr_name}"), state);
        }
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

fn push_hash_entry(canonical: &mut String, key: &str, state: &AttributeState) {
    let value_repr = match &state.value {
        SnapshotValue::Level(v) => v.clone(),
        SnapshotValue::Set(vs) => {
            let mut sorted = vs.clone();
            sorted.sort();
            format!("[{}]", sorted.join(","))
        }
        SnapshotValue::Unknown => "unknown".to_string(),
    };
    canonical.push('|');
    canonical.push_str(key);
    canonical.push(':');
    canonical.push_str(&value_repr);
    canonical.push(':');
    canonical.push_str(&state.trend.to_string());
}

fn project_attribute(
    ai: &crate::attribute::AttributeInstance,
    path: &AttributePath,
    catalog: &Catalog,
    parent: Option<&WorldSnapshot>,
) -> AttributeState {
    AttributeState {
        value: project_value(ai, path, catalog, parent),
        trend: ai.trend,
        last_known_value: ai.last_known_value.clone(),
        last_trend_direction: ai.last_trend_direction,
        domain_id: ai.spec.domain_id.clone(),
    }
}

fn project_value(
    ai: &crate::attribute::AttributeInstance,
    path: &AttributePath,
    catalog: &Catalog,
    parent: Option<&WorldSnapshot>,
) -> SnapshotValue {
    // Active trend: expand from the current reading (or the last known value)
    // into everything reachable in the trend's direction.
    if ai.trend.is_active() {
        let base = ai
            .current_value
            .as_level()
            .or(ai.last_known_value.as_deref());
        if let (Some(base), Some(domain)) = (base, catalog.domain(&ai.spec.domain_id)) {
            let reachable = domain.reachable(base, ai.trend);
            if reachable.len() > 1 {
                return SnapshotValue::Set(reachable);
            }
        }
    }

    // Preserve a parent value-set when this action did not write the attribute.
    if let Some(parent_state) = parent.and_then(|p| p.get(path)) {
        if parent_state.value.is_value_set()
            && parent_state.last_known_value == ai.last_known_value
        {
            return parent_state.value.clone();
        }
    }

    match &ai.current_value {
        AttributeValue::Level(v) => SnapshotValue::Level(v.clone()),
        AttributeValue::Unknown => SnapshotValue::Unknown,
    }
}
