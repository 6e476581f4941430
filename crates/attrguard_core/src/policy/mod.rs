//! Declarative policy: visibility rules and attribute rule registry.

pub mod access_policy;
pub mod registry;
