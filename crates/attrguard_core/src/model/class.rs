//! Domain class declarations.
//!
//! # Responsibility
//! - Hold everything shared by all instances of one class: constructor
//!   fields, class data, methods and the managed attribute table.
//! - Resolve class-level lookups along the single-inheritance chain.
//!
//! # Invariants
//! - The managed attribute table is frozen once any instance of the class
//!   (or of a subclass) has been constructed.
//! - A subclass binding shadows the parent's binding of the same name for
//!   subclass instances only.

use crate::access::AccessResult;
use crate::managed::attribute::ManagedAttribute;
use crate::model::args::{Args, FieldDecl};
use crate::model::instance::DomainInstance;
use crate::value::Value;
use log::info;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// Method body. Runs against the real instance, outside any access guard.
pub type Method = Rc<dyn Fn(&mut DomainInstance, &[Value]) -> AccessResult<Value>>;

/// Declared domain class shared by all of its instances.
pub struct DomainClass {
    name: String,
    parent: Option<Rc<DomainClass>>,
    fields: Vec<FieldDecl>,
    class_data: BTreeMap<String, Value>,
    methods: BTreeMap<String, Method>,
    managed: RefCell<BTreeMap<String, Rc<ManagedAttribute>>>,
    instances_created: Cell<usize>,
}

impl DomainClass {
    pub fn builder(name: impl Into<String>) -> DomainClassBuilder {
        DomainClassBuilder {
            name: name.into(),
            parent: None,
            fields: None,
            class_data: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Rc<DomainClass>> {
        self.parent.as_ref()
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    /// Returns whether `self` is `other` or inherits from it.
    pub fn is_subclass_of(&self, other: &DomainClass) -> bool {
        self.ancestry().any(|class| std::ptr::eq(class, other))
    }

    /// Looks up class-level data along the inheritance chain.
    pub fn class_data(&self, name: &str) -> Option<&Value> {
        self.ancestry().find_map(|class| class.class_data.get(name))
    }

    /// Looks up a method along the inheritance chain.
    pub fn method(&self, name: &str) -> Option<Method> {
        self.ancestry().find_map(|class| class.methods.get(name).cloned())
    }

    /// Resolves the managed attribute governing `name`, nearest class first.
    pub fn managed_attribute(&self, name: &str) -> Option<Rc<ManagedAttribute>> {
        self.ancestry()
            .find_map(|class| class.managed.borrow().get(name).cloned())
    }

    /// Names of every managed attribute visible from this class.
    pub fn managed_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for class in self.ancestry() {
            for name in class.managed.borrow().keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names.sort();
        names
    }

    /// Number of construction attempts for this class and its subclasses.
    pub fn instances_created(&self) -> usize {
        self.instances_created.get()
    }

    /// Binds a managed attribute to this class under the attribute's name.
    ///
    /// # Errors
    /// - `LateBinding` once any instance of this class has been constructed.
    /// - `DuplicateBinding` when this class already binds the same name.
    /// - `SlotKeyShadowsName` when an instance-owned slot key equals the
    ///   public attribute name.
    pub fn bind(&self, attribute: ManagedAttribute) -> Result<(), ConfigurationError> {
        self.check_binding(&attribute)?;

        let overrides = self
            .parent
            .as_ref()
            .is_some_and(|parent| parent.managed_attribute(attribute.name()).is_some());
        info!(
            "event=attr_bound module=model class={} attribute={} role={} overrides_parent={}",
            self.name,
            attribute.name(),
            attribute.role_label(),
            overrides
        );
        self.managed
            .borrow_mut()
            .insert(attribute.name().to_string(), Rc::new(attribute));
        Ok(())
    }

    /// Checks `attribute` against the same rules as `bind` without binding it.
    pub fn check_binding(&self, attribute: &ManagedAttribute) -> Result<(), ConfigurationError> {
        if self.instances_created() > 0 {
            return Err(ConfigurationError::LateBinding {
                class: self.name.clone(),
                attribute: attribute.name().to_string(),
            });
        }
        if attribute.slot_key() == Some(attribute.name()) {
            return Err(ConfigurationError::SlotKeyShadowsName(
                attribute.name().to_string(),
            ));
        }
        if self.managed.borrow().contains_key(attribute.name()) {
            return Err(ConfigurationError::DuplicateBinding {
                class: self.name.clone(),
                attribute: attribute.name().to_string(),
            });
        }
        Ok(())
    }

    /// Constructs one instance, running the constructor's field writes
    /// through ordinary (managed) attribute assignment.
    pub fn instantiate(self: &Rc<Self>, args: Args) -> AccessResult<DomainInstance> {
        DomainInstance::construct(self, args)
    }

    pub(crate) fn record_construction(&self) {
        for class in self.ancestry() {
            class.instances_created.set(class.instances_created.get() + 1);
        }
    }

    fn ancestry(&self) -> Ancestry<'_> {
        Ancestry { next: Some(self) }
    }
}

impl Debug for DomainClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainClass")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|parent| parent.name()))
            .field("fields", &self.fields)
            .field("class_data", &self.class_data)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("managed", &self.managed_names())
            .finish()
    }
}

struct Ancestry<'a> {
    next: Option<&'a DomainClass>,
}

impl<'a> Iterator for Ancestry<'a> {
    type Item = &'a DomainClass;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

/// Declaration builder for `DomainClass`.
pub struct DomainClassBuilder {
    name: String,
    parent: Option<Rc<DomainClass>>,
    fields: Option<Vec<FieldDecl>>,
    class_data: BTreeMap<String, Value>,
    methods: BTreeMap<String, Method>,
}

impl DomainClassBuilder {
    /// Inherits class data, methods, managed attributes and (unless own
    /// fields are declared) constructor fields from `parent`.
    pub fn extends(mut self, parent: &Rc<DomainClass>) -> Self {
        self.parent = Some(Rc::clone(parent));
        self
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields
            .get_or_insert_with(Vec::new)
            .push(FieldDecl::required(name));
        self
    }

    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        default: impl Into<Value>,
    ) -> Self {
        self.fields
            .get_or_insert_with(Vec::new)
            .push(FieldDecl::with_default(name, default));
        self
    }

    pub fn class_data(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.class_data.insert(name.into(), value.into());
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut DomainInstance, &[Value]) -> AccessResult<Value> + 'static,
    {
        self.methods.insert(name.into(), Rc::new(body));
        self
    }

    pub fn build(self) -> Rc<DomainClass> {
        let fields = match (self.fields, &self.parent) {
            (Some(fields), _) => fields,
            (None, Some(parent)) => parent.fields().to_vec(),
            (None, None) => Vec::new(),
        };
        Rc::new(DomainClass {
            name: self.name,
            parent: self.parent,
            fields,
            class_data: self.class_data,
            methods: self.methods,
            managed: RefCell::new(BTreeMap::new()),
            instances_created: Cell::new(0),
        })
    }
}

/// Binds `attribute` to `class`; free-function form of `DomainClass::bind`.
pub fn bind_managed_attribute(
    class: &DomainClass,
    attribute: ManagedAttribute,
) -> Result<(), ConfigurationError> {
    class.bind(attribute)
}

/// Class setup and declarative configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    LateBinding { class: String, attribute: String },
    DuplicateBinding { class: String, attribute: String },
    SlotKeyShadowsName(String),
    InvalidName(String),
    InvalidRange { attribute: String, detail: String },
    InvalidPattern { attribute: String, detail: String },
    InvalidRole { attribute: String, detail: String },
    MissingAccessPolicy(String),
    Parse(String),
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LateBinding { class, attribute } => write!(
                f,
                "cannot bind `{attribute}` on `{class}`: instances already exist"
            ),
            Self::DuplicateBinding { class, attribute } => {
                write!(f, "`{class}` already binds managed attribute `{attribute}`")
            }
            Self::SlotKeyShadowsName(name) => {
                write!(f, "slot key for `{name}` must differ from the public name")
            }
            Self::InvalidName(value) => write!(f, "invalid attribute or class name: `{value}`"),
            Self::InvalidRange { attribute, detail } => {
                write!(f, "invalid range for `{attribute}`: {detail}")
            }
            Self::InvalidPattern { attribute, detail } => {
                write!(f, "invalid pattern for `{attribute}`: {detail}")
            }
            Self::InvalidRole { attribute, detail } => {
                write!(f, "invalid declaration for `{attribute}`: {detail}")
            }
            Self::MissingAccessPolicy(class) => {
                write!(f, "no access policy declared for class `{class}`")
            }
            Self::Parse(detail) => write!(f, "failed to parse policy document: {detail}"),
        }
    }
}

impl Error for ConfigurationError {}

#[cfg(test)]
mod tests {
    use super::{ConfigurationError, DomainClass};
    use crate::managed::attribute::ManagedAttribute;
    use crate::model::args::Args;
    use crate::value::Value;

    #[test]
    fn class_data_and_methods_resolve_through_parent() {
        let base = DomainClass::builder("Base")
            .field("label")
            .class_data("retireage", 59.5)
            .method("hello", |_, _| Ok(Value::from("hi")))
            .build();
        let child = DomainClass::builder("Child").extends(&base).build();

        assert_eq!(child.class_data("retireage"), Some(&Value::Float(59.5)));
        assert!(child.method("hello").is_some());
        assert_eq!(child.fields().len(), 1);
        assert!(child.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&child));
    }

    #[test]
    fn rejects_duplicate_binding_on_same_class() {
        let class = DomainClass::builder("Client").build();
        class
            .bind(ManagedAttribute::per_instance("x"))
            .expect("first binding");
        let err = class
            .bind(ManagedAttribute::shared("x"))
            .expect_err("second binding must fail");
        assert!(matches!(err, ConfigurationError::DuplicateBinding { .. }));
    }

    #[test]
    fn rejects_binding_after_subclass_instance_exists() {
        let base = DomainClass::builder("Base").build();
        let child = DomainClass::builder("Child").extends(&base).build();
        child.instantiate(Args::new()).expect("construct child");

        let err = base
            .bind(ManagedAttribute::per_instance("x"))
            .expect_err("late binding on parent must fail");
        assert_eq!(
            err,
            ConfigurationError::LateBinding {
                class: "Base".to_string(),
                attribute: "x".to_string(),
            }
        );
    }

    #[test]
    fn rejects_slot_key_equal_to_public_name() {
        let class = DomainClass::builder("Client").build();
        let err = class
            .bind(ManagedAttribute::per_instance("x").with_slot_key("x"))
            .expect_err("shadowing slot key must fail");
        assert_eq!(err, ConfigurationError::SlotKeyShadowsName("x".to_string()));
    }

    #[test]
    fn managed_names_merge_parent_and_child() {
        let base = DomainClass::builder("Base").build();
        base.bind(ManagedAttribute::per_instance("a")).expect("bind a");
        let child = DomainClass::builder("Child").extends(&base).build();
        child.bind(ManagedAttribute::per_instance("b")).expect("bind b");
        child.bind(ManagedAttribute::shared("a")).expect("override a");

        assert_eq!(child.managed_names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(base.managed_names(), vec!["a".to_string()]);
    }
}
