//! Attribute specifications and runtime instances.
//!
//! An [`AttributeSpec`] ties an attribute name to an ordered domain; an
//! [`AttributeInstance`] carries the live state: the current value (possibly
//! unknown), an optional trend, a confidence scalar, and bookkeeping for the
//! last concretely known value and the trend direction that produced the
//! current uncertainty.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Direction of an active trend on an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Value is drifting toward higher levels.
    Up,
    /// Value is drifting toward lower levels.
    Down,
    /// No active trend.
    #[default]
    None,
}

impl TrendDirection {
    /// Whether this trend implies movement (up or down).
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::None => write!(f, "none"),
        }
    }
}

/// The current value of an attribute: a concrete level or unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValue {
    /// A concrete domain level.
    Level(String),
    /// The value is not known.
    #[default]
    Unknown,
}

impl AttributeValue {
    /// The concrete level, if known.
    #[must_use]
    pub fn as_level(&self) -> Option<&str> {
        match self {
            Self::Level(v) => Some(v),
            Self::Unknown => None,
        }
    }

    /// Whether the value is unknown.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(v) => write!(f, "{v}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        Self::Level(v.to_string())
    }
}

/// Specification for an attribute that can be attached to a part or a device.
///
/// Specs are genuinely immutable and shared between instances via `Arc`, so
/// deep-cloning a device per branch only duplicates mutable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Attribute name within its part (or globally).
    pub name: String,
    /// Id of the [`crate::domain::OrderedDomain`] this attribute draws from.
    pub domain_id: String,
    /// Whether effects may write this attribute.
    #[serde(default = "default_mutable")]
    pub mutable: bool,
    /// Default level assigned when a device is instantiated.
    #[serde(default)]
    pub default_value: Option<String>,
}

const fn default_mutable() -> bool {
    true
}

impl AttributeSpec {
    /// Creates a mutable spec with a default value.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        domain_id: impl Into<String>,
        default_value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain_id: domain_id.into(),
            mutable: true,
            default_value: Some(default_value.into()),
        }
    }
}

/// Runtime instance of an attribute.
///
/// Not serialized: persistence happens through [`crate::snapshot::WorldSnapshot`]
/// projections, never through live instances.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInstance {
    /// The immutable spec this instance was created from.
    pub spec: Arc<AttributeSpec>,
    /// Current value, possibly unknown.
    pub current_value: AttributeValue,
    /// Active trend direction.
    pub trend: TrendDirection,
    /// Confidence in the current value, in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Last concretely known level, if any.
    pub last_known_value: Option<String>,
    /// Trend direction that produced the current uncertainty, if any.
    pub last_trend_direction: Option<TrendDirection>,
}

impl AttributeInstance {
    /// Instantiates an attribute from its spec, applying the default value.
    #[must_use]
    pub fn from_spec(spec: Arc<AttributeSpec>) -> Self {
        let current_value = spec
            .default_value
            .as_ref()
            .map_or(AttributeValue::Unknown, |v| AttributeValue::Level(v.clone()));
        let last_known_value = spec.default_value.clone();
        Self {
            spec,
            current_value,
            trend: TrendDirection::None,
            confidence: 1.0,
            last_known_value,
            last_trend_direction: None,
        }
    }

    /// Writes a concrete value: fully known, trend bookkeeping cleared.
    pub fn write_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.last_known_value = Some(value.clone());
        self.current_value = AttributeValue::Level(value);
        self.confidence = 1.0;
        self.last_trend_direction = None;
    }

    /// Writes a trend direction.
    ///
    /// An active trend moves the value away from its last reading: the current
    /// value becomes unknown, confidence drops to zero, and the last known
    /// value and direction are remembered so snapshots can expand the trend
    /// into a value-set.
    pub fn write_trend(&mut self, direction: TrendDirection) {
        self.trend = direction;
        if !direction.is_active() {
            return;
        }
        if let AttributeValue::Level(v) = &self.current_value {
            self.last_known_value = Some(v.clone());
        }
        self.current_value = AttributeValue::Unknown;
        self.confidence = 0.0;
        self.last_trend_direction = Some(direction);
    }

    /// Marks the value unknown without touching trend bookkeeping.
    pub fn mark_unknown(&mut self) {
        self.current_value = AttributeValue::Unknown;
        self.confidence = 0.0;
    }

    /// Whether the current value is a concrete level.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !self.current_value.is_unknown()
    }
}
