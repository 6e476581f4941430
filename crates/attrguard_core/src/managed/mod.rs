//! Managed attributes bound to domain classes.
//!
//! # Responsibility
//! - Intercept get/set/delete for one named attribute on every instance of
//!   the owning class and its subclasses.
//! - Validate writes and choose where the accepted value lives.
//!
//! # Invariants
//! - Writes are all-or-nothing: a rejected value leaves the prior one.
//! - Backing storage is never reached through the public attribute name.

pub mod attribute;
pub mod validator;
