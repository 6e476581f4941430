//! Managed attribute descriptors.
//!
//! # Responsibility
//! - Govern get/set/delete of exactly one attribute name on every instance
//!   of the class it is bound to (and of subclasses).
//! - Decide where the backing value lives: one shared cell on the
//!   descriptor, or a per-instance slot keyed apart from the public name.
//!
//! # Invariants
//! - Set is all-or-nothing: the validator chain runs to completion before
//!   any backing storage is touched.
//! - Backing lookups never resolve through the public name, so a descriptor
//!   cannot re-enter itself while reading its own value.
//! - Derived attributes have no storage and are recomputed on every read.
//! - Shared storage is observable from every instance of the class. This is
//!   the documented hazard of `StorageMode::Shared`, not an accident.

use crate::access::{AccessError, AccessResult};
use crate::logging::sanitize_message;
use crate::managed::validator::{ValidationError, Validator};
use crate::model::instance::DomainInstance;
use crate::value::Value;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

const MAX_TRACE_VALUE_CHARS: usize = 64;

/// Computes a derived attribute from other attributes of the instance.
pub type ComputeFn = Rc<dyn Fn(&DomainInstance) -> AccessResult<Value>>;

/// Presents a stored value, optionally combining it with instance state.
pub type ViewFn = Rc<dyn Fn(&Value, &DomainInstance) -> AccessResult<Value>>;

/// Where a stored managed attribute keeps its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// One cell on the descriptor, shared by every instance of the class.
    Shared,
    /// One slot per instance.
    #[default]
    PerInstance,
}

impl StorageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::PerInstance => "per_instance",
        }
    }
}

/// Read-side transformation of a stored value.
#[derive(Clone, Default)]
pub enum View {
    #[default]
    Raw,
    /// Numeric value multiplied by itself.
    Square,
    /// Replace the last `hidden` characters with `*`.
    MaskTail { hidden: usize },
    Custom(ViewFn),
}

impl View {
    pub fn custom<F>(present: F) -> Self
    where
        F: Fn(&Value, &DomainInstance) -> AccessResult<Value> + 'static,
    {
        Self::Custom(Rc::new(present))
    }

    fn present(&self, attribute: &str, raw: Value, instance: &DomainInstance) -> AccessResult<Value> {
        match self {
            Self::Raw => Ok(raw),
            Self::Square => raw
                .squared()
                .ok_or_else(|| AccessError::compute(attribute, format!("cannot square `{raw}`"))),
            Self::MaskTail { hidden } => {
                let text = raw.as_str().ok_or_else(|| {
                    AccessError::compute(attribute, format!("cannot mask non-string `{raw}`"))
                })?;
                let keep = text.chars().count().saturating_sub(*hidden);
                let mut masked: String = text.chars().take(keep).collect();
                masked.push_str(&"*".repeat(*hidden));
                Ok(Value::Str(masked))
            }
            Self::Custom(present) => present(&raw, instance),
        }
    }
}

impl Debug for View {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => f.write_str("Raw"),
            Self::Square => f.write_str("Square"),
            Self::MaskTail { hidden } => f.debug_struct("MaskTail").field("hidden", hidden).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

enum Storage {
    Shared(RefCell<Option<Value>>),
    PerInstance { key: String },
}

enum Role {
    Stored(Storage),
    Derived(ComputeFn),
}

/// Descriptor governing one attribute name on a class.
pub struct ManagedAttribute {
    name: String,
    validators: Vec<Validator>,
    view: View,
    role: Role,
}

impl ManagedAttribute {
    /// Stored attribute whose value lives on the descriptor.
    pub fn shared(name: impl Into<String>) -> Self {
        Self::stored(name.into(), Storage::Shared(RefCell::new(None)))
    }

    /// Shared attribute starting from `initial`, written without validation.
    pub fn shared_with_initial(name: impl Into<String>, initial: impl Into<Value>) -> Self {
        Self::stored(name.into(), Storage::Shared(RefCell::new(Some(initial.into()))))
    }

    /// Stored attribute whose value lives on each instance under
    /// `_managed__<name>`.
    pub fn per_instance(name: impl Into<String>) -> Self {
        let name = name.into();
        let key = format!("_managed__{name}");
        Self::stored(name, Storage::PerInstance { key })
    }

    /// Stored attribute in the given mode.
    pub fn with_mode(name: impl Into<String>, mode: StorageMode) -> Self {
        match mode {
            StorageMode::Shared => Self::shared(name),
            StorageMode::PerInstance => Self::per_instance(name),
        }
    }

    /// Read-only attribute recomputed from instance state on every read.
    pub fn derived<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&DomainInstance) -> AccessResult<Value> + 'static,
    {
        Self {
            name: name.into(),
            validators: Vec::new(),
            view: View::Raw,
            role: Role::Derived(Rc::new(compute)),
        }
    }

    fn stored(name: String, storage: Storage) -> Self {
        Self {
            name,
            validators: Vec::new(),
            view: View::Raw,
            role: Role::Stored(storage),
        }
    }

    /// Appends one validator to the write chain.
    pub fn validate_with(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = view;
        self
    }

    /// Overrides the per-instance slot key. No effect on other roles.
    pub fn with_slot_key(mut self, key: impl Into<String>) -> Self {
        if let Role::Stored(Storage::PerInstance { key: slot }) = &mut self.role {
            *slot = key.into();
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Storage mode, or `None` for derived attributes.
    pub fn storage_mode(&self) -> Option<StorageMode> {
        match &self.role {
            Role::Stored(Storage::Shared(_)) => Some(StorageMode::Shared),
            Role::Stored(Storage::PerInstance { .. }) => Some(StorageMode::PerInstance),
            Role::Derived(_) => None,
        }
    }

    pub fn slot_key(&self) -> Option<&str> {
        match &self.role {
            Role::Stored(Storage::PerInstance { key }) => Some(key.as_str()),
            _ => None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.role, Role::Derived(_))
    }

    pub(crate) fn role_label(&self) -> &'static str {
        match self.storage_mode() {
            Some(mode) => mode.as_str(),
            None => "derived",
        }
    }

    pub fn get(&self, instance: &DomainInstance) -> AccessResult<Value> {
        trace!(
            "event=attr_get module=managed class={} attribute={} role={}",
            instance.class_name(),
            self.name,
            self.role_label()
        );
        let raw = match &self.role {
            Role::Derived(compute) => compute(instance)?,
            Role::Stored(Storage::Shared(cell)) => cell.borrow().clone().ok_or_else(|| {
                AccessError::missing(instance.class_name(), &self.name)
            })?,
            Role::Stored(Storage::PerInstance { key }) => instance
                .slot(key)
                .cloned()
                .ok_or_else(|| AccessError::missing(instance.class_name(), &self.name))?,
        };
        self.view.present(&self.name, raw, instance)
    }

    /// Validates then stores `value`; on rejection nothing is written.
    pub fn set(&self, instance: &mut DomainInstance, value: Value) -> AccessResult<()> {
        let storage = match &self.role {
            Role::Derived(_) => return Err(ValidationError::read_only(&self.name).into()),
            Role::Stored(storage) => storage,
        };

        let mut accepted = value;
        for validator in &self.validators {
            accepted = match validator.validate(&self.name, accepted, instance) {
                Ok(next) => next,
                Err(err) => {
                    debug!(
                        "event=attr_set module=managed class={} attribute={} status=rejected reason={}",
                        instance.class_name(),
                        self.name,
                        sanitize_message(&err.to_string(), MAX_TRACE_VALUE_CHARS)
                    );
                    return Err(err.into());
                }
            };
        }

        match storage {
            Storage::Shared(cell) => {
                *cell.borrow_mut() = Some(accepted);
            }
            Storage::PerInstance { key } => instance.store_slot(key, accepted),
        }
        debug!(
            "event=attr_set module=managed class={} attribute={} storage={} status=ok",
            instance.class_name(),
            self.name,
            self.role_label()
        );
        Ok(())
    }

    /// Removes the backing value; subsequent reads report a missing attribute.
    pub fn delete(&self, instance: &mut DomainInstance) -> AccessResult<()> {
        let removed = match &self.role {
            Role::Derived(_) => return Err(ValidationError::read_only(&self.name).into()),
            Role::Stored(Storage::Shared(cell)) => cell.borrow_mut().take(),
            Role::Stored(Storage::PerInstance { key }) => instance.clear_slot(key),
        };
        match removed {
            Some(_) => {
                debug!(
                    "event=attr_delete module=managed class={} attribute={} status=ok",
                    instance.class_name(),
                    self.name
                );
                Ok(())
            }
            None => Err(AccessError::missing(instance.class_name(), &self.name)),
        }
    }
}

impl Debug for ManagedAttribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedAttribute")
            .field("name", &self.name)
            .field("role", &self.role_label())
            .field("slot_key", &self.slot_key())
            .field("validators", &self.validators)
            .field("view", &self.view)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ManagedAttribute, StorageMode, View};
    use crate::access::AccessError;
    use crate::managed::validator::{Validator, Violation};
    use crate::model::args::Args;
    use crate::model::class::DomainClass;
    use crate::value::Value;

    #[test]
    fn shared_square_is_visible_from_every_instance() {
        let client = DomainClass::builder("Client1").build();
        client
            .bind(ManagedAttribute::shared_with_initial("x", 3).view(View::Square))
            .expect("bind x");

        let mut c1 = client.instantiate(Args::new()).expect("c1");
        let c2 = client.instantiate(Args::new()).expect("c2");
        assert_eq!(c1.get("x").expect("c1.x"), Value::Int(9));

        c1.set("x", Value::Int(7)).expect("c1.x = 7");
        assert_eq!(c1.get("x").expect("c1.x"), Value::Int(49));
        assert_eq!(c2.get("x").expect("c2.x"), Value::Int(49));
    }

    #[test]
    fn per_instance_square_keeps_instances_apart() {
        let client = DomainClass::builder("Client3").field("x").build();
        client
            .bind(ManagedAttribute::per_instance("x").view(View::Square))
            .expect("bind x");

        let mut c3 = client.instantiate(Args::positional([9])).expect("c3");
        let c4 = client.instantiate(Args::positional([45])).expect("c4");
        c3.set("x", Value::Int(11)).expect("c3.x = 11");

        assert_eq!(c3.get("x").expect("c3.x"), Value::Int(121));
        assert_eq!(c4.get("x").expect("c4.x"), Value::Int(2025));
        assert_eq!(c3.slot_keys(), vec!["_managed__x"]);
        assert!(c3.namespace().is_empty());
    }

    #[test]
    fn delete_then_read_reports_missing() {
        let client = DomainClass::builder("Client").build();
        client
            .bind(ManagedAttribute::shared_with_initial("x", 3))
            .expect("bind x");
        let mut instance = client.instantiate(Args::new()).expect("instance");

        instance.delete("x").expect("delete x");
        let err = instance.get("x").expect_err("deleted value");
        assert_eq!(err, AccessError::missing("Client", "x"));
        assert!(instance.delete("x").is_err());
    }

    #[test]
    fn view_can_combine_descriptor_and_instance_state() {
        let client = DomainClass::builder("Client").field("data").build();
        let label = "spam".to_string();
        client
            .bind(
                ManagedAttribute::per_instance("data").view(View::custom(move |raw, _| {
                    Ok(Value::Str(format!("{label}, {raw}")))
                })),
            )
            .expect("bind data");

        let mut instance = client
            .instantiate(Args::positional(["eggs"]))
            .expect("instance");
        assert_eq!(instance.get("data").expect("read"), Value::from("spam, eggs"));
        instance.set("data", Value::from("SPAM")).expect("write");
        assert_eq!(instance.get("data").expect("read"), Value::from("spam, SPAM"));
    }

    #[test]
    fn derived_attribute_is_read_only() {
        let client = DomainClass::builder("Client").build();
        client
            .bind(ManagedAttribute::derived("answer", |_| Ok(Value::Int(42))))
            .expect("bind answer");
        let mut instance = client.instantiate(Args::new()).expect("instance");

        assert_eq!(instance.get("answer").expect("read"), Value::Int(42));
        let err = instance
            .set("answer", Value::Int(1))
            .expect_err("derived write");
        match err {
            AccessError::Validation(err) => assert_eq!(err.violation, Violation::ReadOnly),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(instance.delete("answer").is_err());
    }

    #[test]
    fn rejected_write_leaves_prior_value() {
        let client = DomainClass::builder("Client").build();
        client
            .bind(
                ManagedAttribute::with_mode("percent", StorageMode::PerInstance)
                    .validate_with(Validator::range(0.0, 1.0).expect("valid range")),
            )
            .expect("bind percent");
        let mut instance = client.instantiate(Args::new()).expect("instance");

        instance.set("percent", Value::Float(0.5)).expect("valid");
        assert!(instance.set("percent", Value::Float(1.5)).is_err());
        assert_eq!(instance.get("percent").expect("read"), Value::Float(0.5));
    }

    #[test]
    fn mask_tail_hides_last_characters() {
        let client = DomainClass::builder("Card").build();
        client
            .bind(ManagedAttribute::per_instance("acct").view(View::MaskTail { hidden: 3 }))
            .expect("bind acct");
        let mut instance = client.instantiate(Args::new()).expect("instance");

        instance.set("acct", Value::from("12345678")).expect("write");
        assert_eq!(instance.get("acct").expect("read"), Value::from("12345***"));
        instance.set("acct", Value::from("ab")).expect("write short");
        assert_eq!(instance.get("acct").expect("read"), Value::from("***"));
    }
}
