//! Attribute access contract shared by plain and guarded instances.
//!
//! # Responsibility
//! - Define the four intercepted operations (`get`, `set`, `delete`, `call`).
//! - Define the umbrella error surfaced by every access path.
//!
//! # Invariants
//! - Errors propagate to the immediate caller; no access path retries or
//!   downgrades them.

use crate::managed::validator::ValidationError;
use crate::model::args::ConstructionError;
use crate::policy::access_policy::PolicyViolation;
use crate::value::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type AccessResult<T> = Result<T, AccessError>;

/// Attribute operation kind, used in policy decisions and trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessOp {
    Get,
    Set,
    Delete,
    Call,
}

impl AccessOp {
    /// Verb used in user-facing violation messages.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Get => "fetch",
            Self::Set => "change",
            Self::Delete => "delete",
            Self::Call => "call",
        }
    }

    /// Stable event token used in log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Call => "call",
        }
    }
}

/// Name-based attribute access.
///
/// Implemented by `DomainInstance` (ordinary resolution, managed attributes
/// applied) and `GuardedInstance` (policy check first, then delegation).
pub trait AttributeAccess {
    fn get(&self, name: &str) -> AccessResult<Value>;
    fn set(&mut self, name: &str, value: Value) -> AccessResult<()>;
    fn delete(&mut self, name: &str) -> AccessResult<()>;
    fn call(&mut self, name: &str, args: &[Value]) -> AccessResult<Value>;
}

/// Error returned by any intercepted attribute operation.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessError {
    /// Name rejected by the active access policy.
    Policy(PolicyViolation),
    /// Write rejected by a managed attribute's validators.
    Validation(ValidationError),
    /// Constructor arguments could not be bound to declared fields.
    Construction(ConstructionError),
    /// Name resolves to nothing (never set, deleted, or unknown method).
    MissingAttribute { class: String, name: String },
    /// Read view or derived computation could not produce a value.
    Compute { attribute: String, message: String },
    /// Method body reported a failure of its own.
    Method { name: String, message: String },
}

impl AccessError {
    pub fn missing(class: &str, name: &str) -> Self {
        Self::MissingAttribute {
            class: class.to_string(),
            name: name.to_string(),
        }
    }

    pub fn compute(attribute: &str, message: impl Into<String>) -> Self {
        Self::Compute {
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }

    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::Policy(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Policy(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Construction(err) => write!(f, "{err}"),
            Self::MissingAttribute { class, name } => {
                write!(f, "`{class}` object has no attribute `{name}`")
            }
            Self::Compute { attribute, message } => {
                write!(f, "cannot compute `{attribute}`: {message}")
            }
            Self::Method { name, message } => write!(f, "method `{name}` failed: {message}"),
        }
    }
}

impl Error for AccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Policy(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Construction(err) => Some(err),
            Self::MissingAttribute { .. } => None,
            Self::Compute { .. } => None,
            Self::Method { .. } => None,
        }
    }
}

impl From<PolicyViolation> for AccessError {
    fn from(value: PolicyViolation) -> Self {
        Self::Policy(value)
    }
}

impl From<ValidationError> for AccessError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ConstructionError> for AccessError {
    fn from(value: ConstructionError) -> Self {
        Self::Construction(value)
    }
}
