//! Managed-attribute access layer.
//!
//! Interposes on attribute access to in-process domain objects: access guards
//! enforce name visibility, managed attributes validate and compute values,
//! and the policy registry declares both from data.

pub mod access;
pub mod guard;
pub mod logging;
pub mod managed;
pub mod model;
pub mod policy;
pub mod value;

pub use access::{AccessError, AccessOp, AccessResult, AttributeAccess};
pub use guard::proxy::{make_guard, AccessCounters, GuardedInstance, GuardedType};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use managed::attribute::{ManagedAttribute, StorageMode, View};
pub use managed::validator::{
    InvalidBounds, Normalization, ValidationError, Validator, Violation,
};
pub use model::args::{Args, ConstructionError};
pub use model::class::{bind_managed_attribute, ConfigurationError, DomainClass};
pub use model::instance::{DomainInstance, InstanceId};
pub use policy::access_policy::{AttributePolicy, PolicyMode, PolicyViolation};
pub use policy::registry::{
    AttributeRole, AttributeSpec, ClassPolicy, ComputeSpec, PolicyRegistry, ValidatorSpec,
    ViewSpec,
};
pub use value::{Value, ValueKind};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
