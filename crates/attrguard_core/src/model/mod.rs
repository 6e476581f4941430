//! Domain model: classes, instances and constructor arguments.
//!
//! # Responsibility
//! - Describe the objects whose attributes are governed: fields, class
//!   data, methods and the per-class managed attribute table.
//! - Provide ordinary attribute resolution that managed attributes plug into.
//!
//! # Invariants
//! - Each instance is owned by exactly one holder (caller or guard).
//! - Classes are single-threaded (`Rc`), shared by all of their instances.

pub mod args;
pub mod class;
pub mod instance;
