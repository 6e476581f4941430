//! Dynamic attribute values.
//!
//! # Responsibility
//! - Carry attribute payloads between callers, descriptors and instances.
//! - Map plain JSON scalars/arrays one-to-one for declarative fixtures.
//!
//! # Invariants
//! - Integers and floats stay distinct; numeric views widen to `f64` only
//!   for comparisons, never for storage.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Value stored in or returned from one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
}

/// Coarse type tag used by kind validators and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    /// Either `Int` or `Float`.
    Number,
    Str,
    List,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Number => "number",
            Self::Str => "str",
            Self::List => "list",
        }
    }

    /// Returns whether `value` satisfies this kind.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Number => value.is_number(),
            other => value.kind() == other,
        }
    }
}

impl Value {
    /// Concrete kind of this value (never `Number`).
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::List(_) => ValueKind::List,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Numeric view used by range checks and derived arithmetic.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Character count for strings, element count for lists.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Str(value) => Some(value.chars().count()),
            Self::List(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Multiplies a number by itself, keeping integer results integral.
    ///
    /// Returns `None` for non-numeric values and on `i64` overflow.
    pub fn squared(&self) -> Option<Value> {
        match self {
            Self::Int(value) => value.checked_mul(*value).map(Value::Int),
            Self::Float(value) => Some(Value::Float(value * value)),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}
