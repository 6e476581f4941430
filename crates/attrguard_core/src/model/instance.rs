//! Domain instances and ordinary attribute resolution.
//!
//! # Responsibility
//! - Own the per-instance public namespace and the private slot table used
//!   by instance-owned managed attributes.
//! - Resolve get/set/delete/call with tagged dispatch: managed attribute
//!   first, then namespace, then class data.
//!
//! # Invariants
//! - Slot entries are written only by managed attribute set/delete paths.
//! - Construction writes go through the same path as external writes, so
//!   constructor input is validated by managed attributes.

use crate::access::{AccessError, AccessResult, AttributeAccess};
use crate::model::args::{bind_arguments, Args};
use crate::model::class::DomainClass;
use crate::value::Value;
use log::debug;
use std::collections::BTreeMap;
use std::rc::Rc;
use uuid::Uuid;

/// Stable identity of one domain instance, used in trace events.
pub type InstanceId = Uuid;

/// One object of a declared domain class.
#[derive(Debug)]
pub struct DomainInstance {
    id: InstanceId,
    class: Rc<DomainClass>,
    namespace: BTreeMap<String, Value>,
    slots: BTreeMap<String, Value>,
}

impl DomainInstance {
    pub(crate) fn construct(class: &Rc<DomainClass>, args: Args) -> AccessResult<Self> {
        class.record_construction();
        let bound = bind_arguments(class.name(), class.fields(), args)?;

        let mut instance = Self {
            id: Uuid::new_v4(),
            class: Rc::clone(class),
            namespace: BTreeMap::new(),
            slots: BTreeMap::new(),
        };
        for (name, value) in bound {
            instance.set(&name, value)?;
        }

        debug!(
            "event=instance_created module=model class={} instance_id={}",
            class.name(),
            instance.id
        );
        Ok(instance)
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn class(&self) -> &Rc<DomainClass> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    pub fn get(&self, name: &str) -> AccessResult<Value> {
        if let Some(attribute) = self.class.managed_attribute(name) {
            return attribute.get(self);
        }
        if let Some(value) = self.namespace.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.class.class_data(name) {
            return Ok(value.clone());
        }
        Err(AccessError::missing(self.class.name(), name))
    }

    /// Reads `name` and requires a numeric value.
    pub fn get_number(&self, name: &str) -> AccessResult<f64> {
        let value = self.get(name)?;
        value
            .as_f64()
            .ok_or_else(|| AccessError::compute(name, format!("`{value}` is not numeric")))
    }

    pub fn set(&mut self, name: &str, value: Value) -> AccessResult<()> {
        if let Some(attribute) = self.class.managed_attribute(name) {
            return attribute.set(self, value);
        }
        self.namespace.insert(name.to_string(), value);
        Ok(())
    }

    /// Removes `name`. Class data is never deleted through an instance.
    pub fn delete(&mut self, name: &str) -> AccessResult<()> {
        if let Some(attribute) = self.class.managed_attribute(name) {
            return attribute.delete(self);
        }
        match self.namespace.remove(name) {
            Some(_) => Ok(()),
            None => Err(AccessError::missing(self.class.name(), name)),
        }
    }

    pub fn call(&mut self, name: &str, args: &[Value]) -> AccessResult<Value> {
        let method = self
            .class
            .method(name)
            .ok_or_else(|| AccessError::missing(self.class.name(), name))?;
        method(self, args)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.class.method(name).is_some()
    }

    /// Plain per-instance attributes, excluding managed and class data.
    pub fn namespace(&self) -> &BTreeMap<String, Value> {
        &self.namespace
    }

    /// Keys currently held in the instance-owned slot table.
    pub fn slot_keys(&self) -> Vec<&str> {
        self.slots.keys().map(String::as_str).collect()
    }

    pub(crate) fn slot(&self, key: &str) -> Option<&Value> {
        self.slots.get(key)
    }

    pub(crate) fn store_slot(&mut self, key: &str, value: Value) {
        self.slots.insert(key.to_string(), value);
    }

    pub(crate) fn clear_slot(&mut self, key: &str) -> Option<Value> {
        self.slots.remove(key)
    }
}

impl AttributeAccess for DomainInstance {
    fn get(&self, name: &str) -> AccessResult<Value> {
        DomainInstance::get(self, name)
    }

    fn set(&mut self, name: &str, value: Value) -> AccessResult<()> {
        DomainInstance::set(self, name, value)
    }

    fn delete(&mut self, name: &str) -> AccessResult<()> {
        DomainInstance::delete(self, name)
    }

    fn call(&mut self, name: &str, args: &[Value]) -> AccessResult<Value> {
        DomainInstance::call(self, name, args)
    }
}

#[cfg(test)]
mod tests {
    use crate::access::AccessError;
    use crate::model::args::Args;
    use crate::model::class::DomainClass;
    use crate::value::Value;

    fn doubler() -> std::rc::Rc<DomainClass> {
        DomainClass::builder("Doubler")
            .field("label")
            .field("data")
            .method("size", |this, _| {
                let data = this.get("data")?;
                let len = data.len().unwrap_or(0);
                Ok(Value::Int(len as i64))
            })
            .method("double", |this, _| {
                let data = this.get("data")?;
                let doubled = data
                    .as_list()
                    .unwrap_or_default()
                    .iter()
                    .map(|item| match item.as_i64() {
                        Some(n) => Value::Int(n * 2),
                        None => item.clone(),
                    })
                    .collect::<Vec<_>>();
                this.set("data", Value::List(doubled))?;
                Ok(Value::Bool(true))
            })
            .build()
    }

    #[test]
    fn constructor_assigns_fields_to_namespace() {
        let class = doubler();
        let instance = class
            .instantiate(Args::new().arg("x is").arg(vec![1, 2, 3]))
            .expect("construct doubler");

        assert_eq!(instance.get("label").expect("label"), Value::from("x is"));
        assert_eq!(instance.namespace().len(), 2);
        assert_eq!(class.instances_created(), 1);
    }

    #[test]
    fn methods_mutate_the_real_instance() {
        let class = doubler();
        let mut instance = class
            .instantiate(Args::new().arg("y").arg(vec![-10, -20]))
            .expect("construct doubler");

        instance.call("double", &[]).expect("double");
        assert_eq!(
            instance.get("data").expect("data"),
            Value::from(vec![-20, -40])
        );
        assert_eq!(instance.call("size", &[]).expect("size"), Value::Int(2));
    }

    #[test]
    fn unknown_names_report_missing_attribute() {
        let class = doubler();
        let mut instance = class
            .instantiate(Args::positional(["a", "b"]))
            .expect("construct doubler");

        let err = instance.get("nope").expect_err("unknown attribute");
        assert_eq!(err, AccessError::missing("Doubler", "nope"));
        let err = instance.call("nope", &[]).expect_err("unknown method");
        assert!(matches!(err, AccessError::MissingAttribute { .. }));
        let err = instance.delete("nope").expect_err("unknown delete");
        assert!(matches!(err, AccessError::MissingAttribute { .. }));
    }

    #[test]
    fn delete_removes_namespace_entry_but_not_class_data() {
        let class = DomainClass::builder("Card")
            .field("addr")
            .class_data("acctlen", 8)
            .build();
        let mut instance = class
            .instantiate(Args::positional(["123 main st"]))
            .expect("construct card");

        instance.delete("addr").expect("delete addr");
        assert!(instance.get("addr").is_err());

        assert_eq!(instance.get("acctlen").expect("class data"), Value::Int(8));
        assert!(instance.delete("acctlen").is_err());
        assert_eq!(instance.get_number("acctlen").expect("numeric"), 8.0);
    }
}
