//! Policy-checked proxy over one domain instance.
//!
//! # Responsibility
//! - Build guarded types from a class plus an access policy.
//! - Intercept external get/set/delete/call, check the policy, then forward
//!   unchanged to the embedded instance.
//!
//! # Invariants
//! - Bookkeeping names resolve without consulting the policy.
//! - A denied operation never reaches the embedded instance.
//! - Tracing only observes; it never changes a decision.

use crate::access::{AccessError, AccessOp, AccessResult, AttributeAccess};
use crate::model::args::Args;
use crate::model::class::DomainClass;
use crate::model::instance::{DomainInstance, InstanceId};
use crate::policy::access_policy::{AttributePolicy, PolicyMode, PolicyViolation};
use crate::value::Value;
use log::{debug, warn};
use std::cell::Cell;
use std::rc::Rc;

/// Names answered by the proxy itself.
pub const BOOKKEEPING_NAMES: [&str; 6] = [
    "__fetches__",
    "__stores__",
    "__deletes__",
    "__calls__",
    "__denials__",
    "__instance_id__",
];

/// Builds a guarded type for `class` from a mode and a name set.
pub fn make_guard<I, S>(class: &Rc<DomainClass>, mode: PolicyMode, names: I) -> GuardedType
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    GuardedType::new(class, AttributePolicy::new(mode, names))
}

/// Callable proxy type: a class paired with one shared policy.
#[derive(Debug, Clone)]
pub struct GuardedType {
    class: Rc<DomainClass>,
    policy: Rc<AttributePolicy>,
    tracing: bool,
}

impl GuardedType {
    pub fn new(class: &Rc<DomainClass>, policy: AttributePolicy) -> Self {
        if policy.is_degenerate() {
            warn!(
                "event=guard_degenerate module=guard class={} mode={} names=0",
                class.name(),
                policy.mode().as_str()
            );
        }
        Self {
            class: Rc::clone(class),
            policy: Rc::new(policy),
            tracing: false,
        }
    }

    /// Enables per-access debug trace lines for instances created afterwards.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing = enabled;
        self
    }

    pub fn class(&self) -> &Rc<DomainClass> {
        &self.class
    }

    pub fn policy(&self) -> &Rc<AttributePolicy> {
        &self.policy
    }

    /// Constructs one domain instance unintercepted and wraps it.
    pub fn instantiate(&self, args: Args) -> AccessResult<GuardedInstance> {
        let wrapped = self.class.instantiate(args)?;
        Ok(GuardedInstance {
            wrapped,
            policy: Rc::clone(&self.policy),
            tracing: self.tracing,
            counters: Cell::new(AccessCounters::default()),
        })
    }
}

/// Per-proxy access counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessCounters {
    pub fetches: u64,
    pub stores: u64,
    pub deletes: u64,
    pub calls: u64,
    pub denials: u64,
}

impl AccessCounters {
    fn record(&mut self, op: AccessOp) {
        match op {
            AccessOp::Get => self.fetches += 1,
            AccessOp::Set => self.stores += 1,
            AccessOp::Delete => self.deletes += 1,
            AccessOp::Call => self.calls += 1,
        }
    }
}

/// Proxy instance exclusively owning one domain instance.
#[derive(Debug)]
pub struct GuardedInstance {
    wrapped: DomainInstance,
    policy: Rc<AttributePolicy>,
    tracing: bool,
    counters: Cell<AccessCounters>,
}

impl GuardedInstance {
    pub fn get(&self, name: &str) -> AccessResult<Value> {
        if let Some(value) = self.bookkeeping(name) {
            return Ok(value);
        }
        self.intercept(AccessOp::Get, name)?;
        self.wrapped.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) -> AccessResult<()> {
        if is_bookkeeping(name) {
            return Err(self.deny(AccessOp::Set, name));
        }
        self.intercept(AccessOp::Set, name)?;
        self.wrapped.set(name, value)
    }

    pub fn delete(&mut self, name: &str) -> AccessResult<()> {
        if is_bookkeeping(name) {
            return Err(self.deny(AccessOp::Delete, name));
        }
        self.intercept(AccessOp::Delete, name)?;
        self.wrapped.delete(name)
    }

    pub fn call(&mut self, name: &str, args: &[Value]) -> AccessResult<Value> {
        self.intercept(AccessOp::Call, name)?;
        self.wrapped.call(name, args)
    }

    pub fn counters(&self) -> AccessCounters {
        self.counters.get()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.wrapped.id()
    }

    pub fn class_name(&self) -> &str {
        self.wrapped.class_name()
    }

    pub fn policy(&self) -> &AttributePolicy {
        &self.policy
    }

    /// Consumes the proxy and hands back the embedded instance.
    pub fn into_inner(self) -> DomainInstance {
        self.wrapped
    }

    fn intercept(&self, op: AccessOp, name: &str) -> AccessResult<()> {
        let mut counters = self.counters.get();
        counters.record(op);
        let decision = self.policy.check(op, name);
        if decision.is_err() {
            counters.denials += 1;
        }
        self.counters.set(counters);

        if self.tracing {
            debug!(
                "event=guard_trace module=guard class={} instance_id={} op={} name={} allowed={}",
                self.wrapped.class_name(),
                self.wrapped.id(),
                op.as_str(),
                name,
                decision.is_ok()
            );
        }
        decision.map_err(AccessError::from)
    }

    fn deny(&self, op: AccessOp, name: &str) -> AccessError {
        let mut counters = self.counters.get();
        counters.denials += 1;
        self.counters.set(counters);
        AccessError::Policy(PolicyViolation {
            op,
            name: name.to_string(),
            mode: self.policy.mode(),
        })
    }

    fn bookkeeping(&self, name: &str) -> Option<Value> {
        let counters = self.counters.get();
        let count = |value: u64| Value::Int(i64::try_from(value).unwrap_or(i64::MAX));
        match name {
            "__fetches__" => Some(count(counters.fetches)),
            "__stores__" => Some(count(counters.stores)),
            "__deletes__" => Some(count(counters.deletes)),
            "__calls__" => Some(count(counters.calls)),
            "__denials__" => Some(count(counters.denials)),
            "__instance_id__" => Some(Value::Str(self.wrapped.id().to_string())),
            _ => None,
        }
    }
}

impl AttributeAccess for GuardedInstance {
    fn get(&self, name: &str) -> AccessResult<Value> {
        GuardedInstance::get(self, name)
    }

    fn set(&mut self, name: &str, value: Value) -> AccessResult<()> {
        GuardedInstance::set(self, name, value)
    }

    fn delete(&mut self, name: &str) -> AccessResult<()> {
        GuardedInstance::delete(self, name)
    }

    fn call(&mut self, name: &str, args: &[Value]) -> AccessResult<Value> {
        GuardedInstance::call(self, name, args)
    }
}

fn is_bookkeeping(name: &str) -> bool {
    BOOKKEEPING_NAMES.contains(&name)
}
