//! Condition trees.
//!
//! Conditions are a closed tagged union: attribute comparisons against a
//! literal, a value set, or an action parameter, plus the boolean combinators
//! `all` / `any` / `not` / `implies` and two parameter checks. Every consumer
//! (the transition evaluator, the branch computer, the describer) matches
//! exhaustively, so adding a variant fails to compile until it is handled
//! everywhere.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::OrderedDomain;
use crate::path::AttributePath;

/// Comparison operators over domain levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equals,
    NotEquals,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

impl CompareOp {
    /// Display symbol used in descriptions and error messages.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }

    /// Whether this operator relies on the domain order.
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        matches!(self, Self::Lt | Self::Lte | Self::Gt | Self::Gte)
    }

    /// The "should ..." phrase used in rejection messages.
    #[must_use]
    pub const fn failure_phrase(self) -> &'static str {
        match self {
            Self::Equals => "should be",
            Self::NotEquals => "should not be",
            Self::Lt => "should be less than",
            Self::Lte => "should be at most",
            Self::Gt => "should be greater than",
            Self::Gte => "should be at least",
            Self::In => "should be one of",
            Self::NotIn => "should be none of",
        }
    }
}

/// Right-hand side of an attribute comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConditionValue {
    /// A literal domain level.
    Literal(String),
    /// A set of domain levels (for `in` / `not_in`).
    Set(Vec<String>),
    /// A reference to an action parameter, resolved at evaluation time.
    Parameter(String),
}

impl ConditionValue {
    /// Convenience constructor for a literal level.
    #[must_use]
    pub fn literal(v: impl Into<String>) -> Self {
        Self::Literal(v.into())
    }

    /// Convenience constructor for a level set.
    #[must_use]
    pub fn set(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Set(values.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Set(vs) => write!(f, "{{{}}}", vs.join(", ")),
            Self::Parameter(name) => write!(f, "${name}"),
        }
    }
}

/// A comparison value with any parameter reference already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedValue {
    /// A single level.
    Level(String),
    /// A set of levels.
    Set(Vec<String>),
}

impl ResolvedValue {
    /// Whether `candidate` stands in relation `op` to this value, using the
    /// domain order for ordered operators.
    ///
    /// Returns `None` when an ordered comparison refers to a level outside the
    /// domain (the caller treats that as an anomaly, not a failure).
    #[must_use]
    pub fn satisfies(&self, op: CompareOp, domain: &OrderedDomain, candidate: &str) -> Option<bool> {
        match (op, self) {
            (CompareOp::Equals, Self::Level(v)) => Some(candidate == v),
            (CompareOp::NotEquals, Self::Level(v)) => Some(candidate != v),
            (CompareOp::Equals | CompareOp::In, Self::Set(vs)) => {
                Some(vs.iter().any(|v| v == candidate))
            }
            (CompareOp::NotEquals | CompareOp::NotIn, Self::Set(vs)) => {
                Some(!vs.iter().any(|v| v == candidate))
            }
            (CompareOp::In, Self::Level(v)) => Some(candidate == v),
            (CompareOp::NotIn, Self::Level(v)) => Some(candidate != v),
            (op, Self::Level(v)) => {
                let li = domain.index_of(candidate)?;
                let ri = domain.index_of(v)?;
                Some(match op {
                    CompareOp::Lt => li < ri,
                    CompareOp::Lte => li <= ri,
                    CompareOp::Gt => li > ri,
                    CompareOp::Gte => li >= ri,
                    _ => unreachable!(),
                })
            }
            (_, Self::Set(_)) => None,
        }
    }
}

impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(v) => write!(f, "{v}"),
            Self::Set(vs) => write!(f, "{{{}}}", vs.join(", ")),
        }
    }
}

/// A boolean predicate over device attributes and action parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Compare an attribute against a literal, set, or parameter.
    Attribute {
        /// The attribute under test.
        target: AttributePath,
        /// Comparison operator.
        operator: CompareOp,
        /// Expected value.
        value: ConditionValue,
    },

    /// True when every sub-condition is true.
    All {
        /// Ordered sub-conditions.
        conditions: Vec<Condition>,
    },

    /// True when at least one sub-condition is true.
    Any {
        /// Ordered sub-conditions.
        conditions: Vec<Condition>,
    },

    /// Negation of a single sub-condition.
    Not {
        /// The negated condition.
        condition: Box<Condition>,
    },

    /// Material implication: `if` false, or `then` true.
    Implies {
        /// Antecedent.
        when: Box<Condition>,
        /// Consequent.
        then: Box<Condition>,
    },

    /// A parameter must equal a specific value.
    ParameterEquals {
        /// Parameter name.
        parameter: String,
        /// Expected value.
        value: String,
    },

    /// A parameter must be one of a set of values.
    ParameterValid {
        /// Parameter name.
        parameter: String,
        /// Accepted values.
        valid_values: Vec<String>,
    },
}

impl Condition {
    /// Shorthand for an attribute comparison.
    #[must_use]
    pub fn attr(path: AttributePath, operator: CompareOp, value: ConditionValue) -> Self {
        Self::Attribute {
            target: path,
            operator,
            value,
        }
    }

    /// Shorthand for a conjunction.
    #[must_use]
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::All {
            conditions: conditions.into_iter().collect(),
        }
    }

    /// Shorthand for a disjunction.
    #[must_use]
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self::Any {
            conditions: conditions.into_iter().collect(),
        }
    }

    /// Human-readable rendering, used in rejection messages and node labels.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Attribute {
                target,
                operator,
                value,
            } => format!("{target} {} {value}", operator.symbol()),
            Self::All { conditions } => {
                let parts: Vec<String> = conditions.iter().map(Condition::describe).collect();
                format!("({})", parts.join(" AND "))
            }
            Self::Any { conditions } => {
                let parts: Vec<String> = conditions.iter().map(Condition::describe).collect();
                format!("({})", parts.join(" OR "))
            }
            Self::Not { condition } => format!("NOT ({})", condition.describe()),
            Self::Implies { when, then } => {
                format!("IF ({}) THEN ({})", when.describe(), then.describe())
            }
            Self::ParameterEquals { parameter, value } => {
                format!("${parameter} == {value}")
            }
            Self::ParameterValid {
                parameter,
                valid_values,
            } => format!("${parameter} in {{{}}}", valid_values.join(", ")),
        }
    }

    /// All attribute paths referenced anywhere in this condition tree.
    #[must_use]
    pub fn referenced_attributes(&self) -> Vec<&AttributePath> {
        let mut out = Vec::new();
        self.collect_attributes(&mut out);
        out
    }

    fn collect_attributes<'a>(&'a self, out: &mut Vec<&'a AttributePath>) {
        match self {
            Self::Attribute { target, .. } => out.push(target),
            Self::All { conditions } | Self::Any { conditions } => {
                for c in conditions {
                    c.collect_attributes(out);
                }
            }
            Self::Not { condition } => condition.collect_attributes(out),
            Self::Implies { when, then } => {
                when.collect_attributes(out);
                then.collect_attributes(out);
            }
            Self::ParameterEquals { .. } | Self::ParameterValid { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery() -> OrderedDomain {
        OrderedDomain::new("battery_level", ["empty", "low", "medium", "high", "full"]).unwrap()
    }

    fn level_cond(op: CompareOp, v: &str) -> Condition {
        Condition::attr(
            AttributePath::part("battery", "level"),
            op,
            ConditionValue::literal(v),
        )
    }

    #[test]
    fn resolved_value_ordered_satisfaction() {
        let d = battery();
        let rhs = ResolvedValue::Level("medium".to_string());
        assert_eq!(rhs.satisfies(CompareOp::Lt, &d, "low"), Some(true));
        assert_eq!(rhs.satisfies(CompareOp::Lt, &d, "medium"), Some(false));
        assert_eq!(rhs.satisfies(CompareOp::Gte, &d, "full"), Some(true));
    }

    #[test]
    fn resolved_value_unknown_level_is_anomaly() {
        let d = battery();
        let rhs = ResolvedValue::Level("charged".to_string());
        assert_eq!(rhs.satisfies(CompareOp::Lt, &d, "low"), None);
    }

    #[test]
    fn resolved_set_membership() {
        let d = battery();
        let rhs = ResolvedValue::Set(vec!["low".to_string(), "medium".to_string()]);
        assert_eq!(rhs.satisfies(CompareOp::In, &d, "low"), Some(true));
        assert_eq!(rhs.satisfies(CompareOp::NotIn, &d, "full"), Some(true));
        assert_eq!(rhs.satisfies(CompareOp::In, &d, "full"), Some(false));
    }

    #[test]
    fn describe_renders_nested_structure() {
        let c = Condition::any([
            Condition::all([
                level_cond(CompareOp::NotEquals, "empty"),
                level_cond(CompareOp::Lte, "high"),
            ]),
            level_cond(CompareOp::Equals, "full"),
        ]);
        assert_eq!(
            c.describe(),
            "((battery.level != empty AND battery.level <= high) OR battery.level == full)"
        );
    }

    #[test]
    fn referenced_attributes_walks_the_tree() {
        let c = Condition::Implies {
            when: Box::new(level_cond(CompareOp::Equals, "full")),
            then: Box::new(Condition::attr(
                AttributePath::part("bulb", "state"),
                CompareOp::Equals,
                ConditionValue::literal("on"),
            )),
        };
        let attrs = c.referenced_attributes();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].to_string(), "battery.level");
        assert_eq!(attrs[1].to_string(), "bulb.state");
    }

    #[test]
    fn serialization_round_trip() {
        let c = Condition::Not {
            condition: Box::new(level_cond(CompareOp::Gt, "low")),
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
