//! Ordered value domains.
//!
//! An [`OrderedDomain`] is a finite, totally ordered set of named levels such
//! as `empty < low < medium < high < full`. The order is fixed at definition
//! time and drives every ordered comparison (`lt`/`lte`/`gt`/`gte`) as well as
//! trend reachability.

use serde::{Deserialize, Serialize};

use crate::attribute::TrendDirection;
use crate::condition::CompareOp;
use crate::error::DefinitionError;

/// A reusable ordered qualitative value domain.
///
/// Invariants (checked at construction): the id is non-empty, the level list
/// is non-empty, and level names are unique. The domain is immutable after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedDomain {
    id: String,
    levels: Vec<String>,
}

impl OrderedDomain {
    /// Creates a new domain, validating its invariants.
    pub fn new(
        id: impl Into<String>,
        levels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, DefinitionError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DefinitionError::EmptyDomainId);
        }
        let levels: Vec<String> = levels.into_iter().map(Into::into).collect();
        if levels.is_empty() {
            return Err(DefinitionError::EmptyDomain { id });
        }
        for (i, level) in levels.iter().enumerate() {
            if levels[..i].contains(level) {
                return Err(DefinitionError::DuplicateLevel {
                    id,
                    level: level.clone(),
                });
            }
        }
        Ok(Self { id, levels })
    }

    /// The domain id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The ordered levels, lowest first.
    #[must_use]
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// Whether `value` is a level of this domain.
    #[must_use]
    pub fn has(&self, value: &str) -> bool {
        self.levels.iter().any(|l| l == value)
    }

    /// Position of a level in the order, if present.
    #[must_use]
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == value)
    }

    /// All levels that stand in relation `op` to `rhs`.
    ///
    /// For `equals`/`not_equals` this is plain membership; for the ordered
    /// operators the domain order decides. Returns `None` when `rhs` is not a
    /// level of this domain.
    #[must_use]
    pub fn values_for_comparison(&self, rhs: &str, op: CompareOp) -> Option<Vec<String>> {
        let ri = match op {
            CompareOp::Equals | CompareOp::NotEquals | CompareOp::In | CompareOp::NotIn => {
                return Some(
                    self.levels
                        .iter()
                        .filter(|l| match op {
                            CompareOp::Equals | CompareOp::In => l.as_str() == rhs,
                            CompareOp::NotEquals | CompareOp::NotIn => l.as_str() != rhs,
                            _ => unreachable!(),
                        })
                        .cloned()
                        .collect(),
                );
            }
            _ => self.index_of(rhs)?,
        };
        Some(
            self.levels
                .iter()
                .enumerate()
                .filter(|(li, _)| match op {
                    CompareOp::Lt => *li < ri,
                    CompareOp::Lte => *li <= ri,
                    CompareOp::Gt => *li > ri,
                    CompareOp::Gte => *li >= ri,
                    _ => unreachable!(),
                })
                .map(|(_, l)| l.clone())
                .collect(),
        )
    }

    /// Levels reachable from `from` in the given trend direction, inclusive.
    ///
    /// `down` from `medium` over `empty<low<medium<high<full` yields
    /// `[empty, low, medium]`; `up` yields `[medium, high, full]`;
    /// `none` yields `[from]`. Returns `[from]` unchanged when `from` is not
    /// a level of this domain.
    #[must_use]
    pub fn reachable(&self, from: &str, direction: TrendDirection) -> Vec<String> {
        let Some(idx) = self.index_of(from) else {
            return vec![from.to_string()];
        };
        match direction {
            TrendDirection::Down => self.levels[..=idx].to_vec(),
            TrendDirection::Up => self.levels[idx..].to_vec(),
            TrendDirection::None => vec![from.to_string()],
        }
    }

    /// The neighbouring level in the given direction, clamped at the ends.
    #[must_use]
    pub fn step(&self, current: &str, direction: TrendDirection) -> &str {
        let idx = self.index_of(current).unwrap_or(0);
        let idx = match direction {
            TrendDirection::Up => (idx + 1).min(self.levels.len() - 1),
            TrendDirection::Down => idx.saturating_sub(1),
            TrendDirection::None => idx,
        };
        &self.levels[idx]
    }

    /// The first level that differs from `current`, in domain order.
    ///
    /// Used by constraint fixup to deterministically pick a replacement value.
    #[must_use]
    pub fn first_other(&self, current: &str) -> Option<&str> {
        self.levels
            .iter()
            .find(|l| l.as_str() != current)
            .map(String::as_str)
    }
}
