//! Declarative policy registry.
//!
//! # Responsibility
//! - Load per-class access policies and per-attribute rules from JSON.
//! - Compile attribute rules into `ManagedAttribute`s and bind them.
//! - Build guarded types from the declared access policy.
//!
//! # Invariants
//! - A registry that passed `validate()` compiles without errors.
//! - `apply` binds every declared attribute of a class or none of them.
//! - Applying a registry never mutates the registry itself.

use crate::access::AccessResult;
use crate::guard::proxy::GuardedType;
use crate::managed::attribute::{ManagedAttribute, StorageMode, View};
use crate::managed::validator::{InvalidBounds, Normalization, Validator};
use crate::model::class::{ConfigurationError, DomainClass};
use crate::model::instance::DomainInstance;
use crate::policy::access_policy::AttributePolicy;
use crate::value::{Value, ValueKind};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Declarative validator rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidatorSpec {
    Kind { kind: ValueKind },
    Range { min: f64, max: f64 },
    Length { min: usize, max: usize },
    ExactLengthOf { key: String },
    Normalize { steps: Vec<Normalization> },
    Pattern { pattern: String },
    OneOf { values: Vec<Value> },
}

impl ValidatorSpec {
    fn compile(&self, attribute: &str) -> Result<Validator, ConfigurationError> {
        let invalid_range = |err: InvalidBounds| {
            ConfigurationError::InvalidRange {
                attribute: attribute.to_string(),
                detail: err.0,
            }
        };
        match self {
            Self::Kind { kind } => Ok(Validator::Kind(*kind)),
            Self::Range { min, max } => Validator::range(*min, *max).map_err(invalid_range),
            Self::Length { min, max } => Validator::length(*min, *max).map_err(invalid_range),
            Self::ExactLengthOf { key } => Ok(Validator::exact_length_of(key.clone())),
            Self::Normalize { steps } => Ok(Validator::Normalize(steps.clone())),
            Self::Pattern { pattern } => {
                Validator::pattern(pattern).map_err(|err| ConfigurationError::InvalidPattern {
                    attribute: attribute.to_string(),
                    detail: err.to_string(),
                })
            }
            Self::OneOf { values } => Ok(Validator::OneOf(values.clone())),
        }
    }
}

/// Declarative read view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewSpec {
    #[default]
    Raw,
    Square,
    Mask { hidden: usize },
}

impl ViewSpec {
    fn compile(self) -> View {
        match self {
            Self::Raw => View::Raw,
            Self::Square => View::Square,
            Self::Mask { hidden } => View::MaskTail { hidden },
        }
    }
}

/// Whether a declared attribute keeps a value or computes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeRole {
    #[default]
    Stored,
    /// Read-only, recomputed from other attributes on every read.
    Derived,
}

/// Arithmetic over two numeric attributes of the same instance.
///
/// Operands resolve through ordinary attribute lookup, so they may name
/// managed attributes, plain fields or class data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ComputeSpec {
    Difference { minuend: String, subtrahend: String },
    Sum { left: String, right: String },
    Product { left: String, right: String },
}

impl ComputeSpec {
    pub fn operands(&self) -> [&str; 2] {
        match self {
            Self::Difference {
                minuend,
                subtrahend,
            } => [minuend.as_str(), subtrahend.as_str()],
            Self::Sum { left, right } | Self::Product { left, right } => {
                [left.as_str(), right.as_str()]
            }
        }
    }

    fn evaluate(&self, instance: &DomainInstance) -> AccessResult<Value> {
        let [left, right] = self.operands();
        let left = instance.get_number(left)?;
        let right = instance.get_number(right)?;
        let result = match self {
            Self::Difference { .. } => left - right,
            Self::Sum { .. } => left + right,
            Self::Product { .. } => left * right,
        };
        Ok(Value::Float(result))
    }
}

/// Rules for one managed attribute.
///
/// `storage`, `slot_key` and `validators` apply to stored attributes only;
/// a derived attribute needs `compute` and may still declare a `view`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    #[serde(default)]
    pub role: AttributeRole,
    #[serde(default)]
    pub storage: StorageMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_key: Option<String>,
    #[serde(default)]
    pub validators: Vec<ValidatorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<ComputeSpec>,
    #[serde(default)]
    pub view: ViewSpec,
}

impl AttributeSpec {
    pub fn new(storage: StorageMode) -> Self {
        Self {
            storage,
            ..Self::default()
        }
    }

    pub fn derived(compute: ComputeSpec) -> Self {
        Self {
            role: AttributeRole::Derived,
            compute: Some(compute),
            ..Self::default()
        }
    }

    pub fn validator(mut self, spec: ValidatorSpec) -> Self {
        self.validators.push(spec);
        self
    }

    pub fn slot_key(mut self, key: impl Into<String>) -> Self {
        self.slot_key = Some(key.into());
        self
    }

    pub fn view(mut self, view: ViewSpec) -> Self {
        self.view = view;
        self
    }

    /// Builds the descriptor for `name`.
    ///
    /// # Errors
    /// Every error `DomainClass::bind` could raise from the declaration
    /// alone, plus rule errors (`InvalidRange`, `InvalidPattern`,
    /// `InvalidRole`, `InvalidName`).
    pub fn compile(&self, name: &str) -> Result<ManagedAttribute, ConfigurationError> {
        require_identifier(name)?;
        let attribute = match self.role {
            AttributeRole::Stored => self.compile_stored(name)?,
            AttributeRole::Derived => self.compile_derived(name)?,
        };
        Ok(attribute.view(self.view.compile()))
    }

    fn compile_stored(&self, name: &str) -> Result<ManagedAttribute, ConfigurationError> {
        if self.compute.is_some() {
            return Err(invalid_role(name, "`compute` requires role `derived`"));
        }
        let mut attribute = ManagedAttribute::with_mode(name, self.storage);
        if let Some(key) = &self.slot_key {
            if self.storage != StorageMode::PerInstance {
                return Err(invalid_role(name, "`slot_key` requires per_instance storage"));
            }
            if key == name {
                return Err(ConfigurationError::SlotKeyShadowsName(name.to_string()));
            }
            require_identifier(key)?;
            attribute = attribute.with_slot_key(key.clone());
        }
        for spec in &self.validators {
            attribute = attribute.validate_with(spec.compile(name)?);
        }
        Ok(attribute)
    }

    fn compile_derived(&self, name: &str) -> Result<ManagedAttribute, ConfigurationError> {
        let Some(compute) = self.compute.clone() else {
            return Err(invalid_role(name, "derived attribute needs `compute`"));
        };
        if !self.validators.is_empty() || self.slot_key.is_some() {
            return Err(invalid_role(
                name,
                "derived attribute cannot declare validators or a slot key",
            ));
        }
        for operand in compute.operands() {
            require_identifier(operand)?;
            if operand == name {
                return Err(invalid_role(name, "compute cannot read the attribute itself"));
            }
        }
        Ok(ManagedAttribute::derived(name, move |instance| {
            compute.evaluate(instance)
        }))
    }
}

/// Everything declared for one class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AttributePolicy>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSpec>,
}

impl ClassPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access(mut self, policy: AttributePolicy) -> Self {
        self.access = Some(policy);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.attributes.insert(name.into(), spec);
        self
    }

    /// Checks names, rejects derived cycles and compiles every attribute.
    pub fn compile(&self) -> Result<Vec<ManagedAttribute>, ConfigurationError> {
        if let Some(access) = &self.access {
            for name in access.names() {
                require_identifier(name)?;
            }
        }
        let compiled = self
            .attributes
            .iter()
            .map(|(name, spec)| spec.compile(name))
            .collect::<Result<Vec<_>, _>>()?;
        self.reject_derived_cycles()?;
        Ok(compiled)
    }

    /// Derived attributes of this class that `name` reads directly.
    fn derived_operands(&self, name: &str) -> Vec<&str> {
        let Some(compute) = self.attributes.get(name).and_then(|spec| spec.compute.as_ref())
        else {
            return Vec::new();
        };
        compute
            .operands()
            .into_iter()
            .filter(|operand| {
                self.attributes
                    .get(*operand)
                    .is_some_and(|spec| spec.role == AttributeRole::Derived)
            })
            .collect()
    }

    fn reject_derived_cycles(&self) -> Result<(), ConfigurationError> {
        for start in self.attributes.keys() {
            let mut stack = self.derived_operands(start);
            let mut seen = Vec::new();
            while let Some(next) = stack.pop() {
                if next == start.as_str() {
                    return Err(invalid_role(start, "derived attributes form a cycle"));
                }
                if !seen.contains(&next) {
                    seen.push(next);
                    stack.extend(self.derived_operands(next));
                }
            }
        }
        Ok(())
    }
}

/// Declarative input for guards and managed attributes, keyed by class name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRegistry {
    #[serde(default)]
    classes: BTreeMap<String, ClassPolicy>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON policy document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigurationError> {
        let registry: Self =
            serde_json::from_str(raw).map_err(|err| ConfigurationError::Parse(err.to_string()))?;
        registry.validate()?;
        info!(
            "event=policy_loaded module=policy status=ok classes={}",
            registry.classes.len()
        );
        Ok(registry)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigurationError> {
        serde_json::to_string_pretty(self).map_err(|err| ConfigurationError::Parse(err.to_string()))
    }

    pub fn with_class(mut self, name: impl Into<String>, policy: ClassPolicy) -> Self {
        self.classes.insert(name.into(), policy);
        self
    }

    pub fn class_policy(&self, class: &str) -> Option<&ClassPolicy> {
        self.classes.get(class)
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.classes.keys().map(String::as_str).collect()
    }

    /// Checks names and compiles every rule without binding anything.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (class, policy) in &self.classes {
            require_identifier(class)?;
            policy.compile()?;
        }
        Ok(())
    }

    /// Binds every attribute declared for `class`, returning how many were
    /// bound. A class absent from the registry binds nothing.
    ///
    /// All bind checks run before the first binding, so a failure leaves the
    /// class table as it was.
    pub fn apply(&self, class: &DomainClass) -> Result<usize, ConfigurationError> {
        let Some(policy) = self.classes.get(class.name()) else {
            debug!(
                "event=policy_apply module=policy class={} status=skipped",
                class.name()
            );
            return Ok(0);
        };

        let compiled = policy.compile()?;
        if let Err(err) = compiled
            .iter()
            .try_for_each(|attribute| class.check_binding(attribute))
        {
            warn!(
                "event=policy_apply module=policy class={} status=rejected bound=0",
                class.name()
            );
            return Err(err);
        }

        let count = compiled.len();
        for attribute in compiled {
            class.bind(attribute)?;
        }
        info!(
            "event=policy_apply module=policy class={} status=ok bound={}",
            class.name(),
            count
        );
        Ok(count)
    }

    /// Builds a guarded type for `class` from its declared access policy.
    pub fn guard(&self, class: &Rc<DomainClass>) -> Result<GuardedType, ConfigurationError> {
        let access = self
            .classes
            .get(class.name())
            .and_then(|policy| policy.access.clone())
            .ok_or_else(|| ConfigurationError::MissingAccessPolicy(class.name().to_string()))?;
        Ok(GuardedType::new(class, access))
    }
}

fn require_identifier(value: &str) -> Result<(), ConfigurationError> {
    if IDENTIFIER_RE.is_match(value) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidName(value.to_string()))
    }
}

fn invalid_role(attribute: &str, detail: &str) -> ConfigurationError {
    ConfigurationError::InvalidRole {
        attribute: attribute.to_string(),
        detail: detail.to_string(),
    }
}
