//! Attribute paths.
//!
//! Attributes are addressed as `part.attribute` (for example `battery.level`)
//! or by a bare name for device-global attributes (`power`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;

/// Reference to an attribute on a device: part-qualified or global.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributePath {
    part: Option<String>,
    attribute: String,
}

impl AttributePath {
    /// Creates a part-qualified path.
    #[must_use]
    pub fn part(part: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            part: Some(part.into()),
            attribute: attribute.into(),
        }
    }

    /// Creates a global attribute path.
    #[must_use]
    pub fn global(attribute: impl Into<String>) -> Self {
        Self {
            part: None,
            attribute: attribute.into(),
        }
    }

    /// Parses `part.attribute` or a bare attribute name.
    pub fn parse(path: &str) -> Result<Self, DefinitionError> {
        let text = path.trim();
        if text.is_empty() {
            return Err(DefinitionError::InvalidPath {
                path: path.to_string(),
                reason: "empty reference".to_string(),
            });
        }
        match text.split_once('.') {
            Some((p, a)) => {
                let p = p.trim();
                let a = a.trim();
                if p.is_empty() || a.is_empty() || a.contains('.') {
                    return Err(DefinitionError::InvalidPath {
                        path: path.to_string(),
                        reason: "expected 'part.attribute' or 'attribute'".to_string(),
                    });
                }
                Ok(Self::part(p, a))
            }
            None => Ok(Self::global(text)),
        }
    }

    /// The part name, if this is a part-qualified path.
    #[must_use]
    pub fn part_name(&self) -> Option<&str> {
        self.part.as_deref()
    }

    /// The attribute name.
    #[must_use]
    pub fn attribute_name(&self) -> &str {
        &self.attribute
    }

    /// Whether this is a device-global attribute.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        self.part.is_none()
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.part {
            Some(part) => write!(f, "{part}.{}", self.attribute),
            None => write!(f, "{}", self.attribute),
        }
    }
}

impl FromStr for AttributePath {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AttributePath {
    type Error = DefinitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AttributePath> for String {
    fn from(path: AttributePath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_part_qualified_paths() {
        let p = AttributePath::parse("battery.level").unwrap();
        assert_eq!(p.part_name(), Some("battery"));
        assert_eq!(p.attribute_name(), "level");
        assert!(!p.is_global());
        assert_eq!(p.to_string(), "battery.level");
    }

    #[test]
    fn parses_global_paths() {
        let p = AttributePath::parse("power").unwrap();
        assert!(p.is_global());
        assert_eq!(p.to_string(), "power");
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(AttributePath::parse("").is_err());
        assert!(AttributePath::parse("a.").is_err());
        assert!(AttributePath::parse(".b").is_err());
        assert!(AttributePath::parse("a.b.c").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let p = AttributePath::parse("battery.level").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"battery.level\"");
        let back: AttributePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
