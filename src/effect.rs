//! Effect trees.
//!
//! Effects are the state mutations an action performs: write a concrete value,
//! set a trend, or branch on a condition. Like [`crate::condition::Condition`]
//! they form a closed tagged union with exhaustive matching in every consumer.

use serde::{Deserialize, Serialize};

use crate::attribute::TrendDirection;
use crate::condition::{Condition, ConditionValue};
use crate::path::AttributePath;

/// A state mutation performed by an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Set an attribute to a literal or parameter-supplied level.
    SetAttribute {
        /// The attribute to write.
        target: AttributePath,
        /// The value to write (a `Set` here is a definition error).
        value: ConditionValue,
    },

    /// Set an attribute's trend direction.
    SetTrend {
        /// The attribute whose trend changes.
        target: AttributePath,
        /// New direction.
        direction: TrendDirection,
    },

    /// Apply `then` effects when the guard holds, `else` effects otherwise.
    ///
    /// A false guard with no else effects rejects the transition.
    Conditional {
        /// The guard condition.
        condition: Condition,
        /// Effects applied when the guard is true.
        then_effects: Vec<Effect>,
        /// Effects applied when the guard is false.
        #[serde(default)]
        else_effects: Vec<Effect>,
    },
}

impl Effect {
    /// Shorthand for setting an attribute to a literal level.
    #[must_use]
    pub fn set(target: AttributePath, value: impl Into<String>) -> Self {
        Self::SetAttribute {
            target,
            value: ConditionValue::Literal(value.into()),
        }
    }

    /// Shorthand for setting a trend.
    #[must_use]
    pub const fn trend(target: AttributePath, direction: TrendDirection) -> Self {
        Self::SetTrend { target, direction }
    }

    /// Shorthand for a guarded effect without an else branch.
    #[must_use]
    pub fn when(condition: Condition, then_effects: Vec<Effect>) -> Self {
        Self::Conditional {
            condition,
            then_effects,
            else_effects: Vec::new(),
        }
    }

    /// The guard condition, when this is a conditional effect.
    #[must_use]
    pub const fn guard(&self) -> Option<&Condition> {
        match self {
            Self::Conditional { condition, .. } => Some(condition),
            Self::SetAttribute { .. } | Self::SetTrend { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::CompareOp;

    #[test]
    fn guard_is_only_present_on_conditionals() {
        let set = Effect::set(AttributePath::part("bulb", "state"), "on");
        assert!(set.guard().is_none());

        let cond = Effect::when(
            Condition::attr(
                AttributePath::part("battery", "level"),
                CompareOp::NotEquals,
                ConditionValue::literal("empty"),
            ),
            vec![set],
        );
        assert!(cond.guard().is_some());
    }

    #[test]
    fn serialization_round_trip() {
        let eff = Effect::Conditional {
            condition: Condition::attr(
                AttributePath::part("battery", "level"),
                CompareOp::Equals,
                ConditionValue::literal("full"),
            ),
            then_effects: vec![Effect::set(AttributePath::part("bulb", "brightness"), "high")],
            else_effects: vec![Effect::trend(
                AttributePath::part("battery", "level"),
                TrendDirection::Down,
            )],
        };
        let json = serde_json::to_string(&eff).unwrap();
        let back: Effect = serde_json::from_str(&json).unwrap();
        assert_eq!(back, eff);
    }
}
