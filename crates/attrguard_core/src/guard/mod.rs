//! Access guards: capability-checked proxies over domain instances.
//!
//! # Responsibility
//! - Pair a domain class with one access policy (`GuardedType`).
//! - Own exactly one wrapped instance per proxy (`GuardedInstance`).
//!
//! # Invariants
//! - `PolicyViolation` is the only error this layer originates.
//! - All proxies of one guarded type share one policy value.

pub mod proxy;
