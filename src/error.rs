//! Error types for qualsim.
//!
//! All errors are strongly typed using thiserror. Definition errors are raised
//! once, while a [`crate::catalog::Catalog`] is being built, and never reach
//! the simulation core. Execution errors cover dangling references discovered
//! while a simulation is running.

use thiserror::Error;

/// Errors raised while validating definitions at catalog build time.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Domain '{id}' has no levels")]
    EmptyDomain {
        id: String,
    },

    #[error("Domain '{id}' has duplicate level '{level}'")]
    DuplicateLevel {
        id: String,
        level: String,
    },

    #[error("Domain id cannot be empty")]
    EmptyDomainId,

    #[error("Attribute '{attribute}' references unknown domain '{domain_id}'")]
    UnknownDomainReference {
        attribute: String,
        domain_id: String,
    },

    #[error("Attribute '{attribute}' default '{value}' is not a level of domain '{domain_id}'")]
    DefaultOutsideDomain {
        attribute: String,
        value: String,
        domain_id: String,
    },

    #[error("Duplicate {kind} definition: '{name}'")]
    Duplicate {
        kind: &'static str,
        name: String,
    },

    #[error("Device type '{device}' overrides behavior of unknown action '{action}'")]
    UnknownBehaviorAction {
        device: String,
        action: String,
    },

    #[error("Action '{action}' is bound to unknown device type '{device}'")]
    UnknownActionDevice {
        action: String,
        device: String,
    },

    #[error("Capability '{capability}' required by action '{action}' is not defined")]
    UnknownCapability {
        capability: String,
        action: String,
    },

    #[error("Invalid attribute path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: String,
    },

    #[error("Parameter '{parameter}' of action '{action}' has an empty choice list")]
    EmptyParameterChoices {
        parameter: String,
        action: String,
    },
}

/// Errors raised while a simulation is executing.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Device type not found: '{name}'")]
    DeviceTypeNotFound {
        name: String,
    },

    #[error("Action '{action}' not found for device type '{device}'")]
    ActionNotFound {
        action: String,
        device: String,
    },

    #[error("Attribute not found: '{path}'")]
    AttributeNotFound {
        path: String,
    },

    #[error("Domain not found: '{id}'")]
    DomainNotFound {
        id: String,
    },

    #[error("Invalid value '{value}' for {path}; valid levels: {levels:?}")]
    InvalidLevel {
        value: String,
        path: String,
        levels: Vec<String>,
    },

    #[error("Cannot compare '{value}' within domain '{domain_id}'")]
    NotComparable {
        value: String,
        domain_id: String,
    },
}

/// Top-level error type for qualsim.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SimError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a definition error.
    #[must_use]
    pub const fn is_definition(&self) -> bool {
        matches!(self, Self::Definition(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }
}

/// Result type alias for qualsim operations.
pub type SimResult<T> = Result<T, SimError>;
