//! Write validators for managed attributes.
//!
//! A validator is a total function over the raw input: it either returns the
//! accepted (possibly normalized) value or a `ValidationError` naming the
//! attribute and the violated constraint. Validators chain in declaration
//! order, each receiving the previous one's output.

use crate::model::instance::DomainInstance;
use crate::value::{Value, ValueKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// Caller-supplied check returning the accepted value or a rejection reason.
pub type CustomCheck = Rc<dyn Fn(&Value) -> Result<Value, String>>;

/// String normalization step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Normalization {
    Lowercase,
    Uppercase,
    Trim,
    Replace { from: String, to: String },
}

impl Normalization {
    fn apply(&self, input: &str) -> String {
        match self {
            Self::Lowercase => input.to_lowercase(),
            Self::Uppercase => input.to_uppercase(),
            Self::Trim => input.trim().to_string(),
            Self::Replace { from, to } => input.replace(from.as_str(), to),
        }
    }
}

/// One validation or normalization rule.
#[derive(Clone)]
pub enum Validator {
    /// Type expectation.
    Kind(ValueKind),
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
    /// Inclusive length bounds for strings (chars) and lists (items).
    Length { min: usize, max: usize },
    /// Length must equal the integer class data stored under this key.
    ExactLengthOf(String),
    /// String rewrite steps applied in order.
    Normalize(Vec<Normalization>),
    /// Whole-value regular expression match.
    Pattern { source: String, regex: Regex },
    /// Value must equal one of the listed values.
    OneOf(Vec<Value>),
    Custom(CustomCheck),
}

impl Validator {
    /// Inclusive numeric range; bounds must be finite with `min <= max`.
    pub fn range(min: f64, max: f64) -> Result<Self, InvalidBounds> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(InvalidBounds(format!("{min}...{max}")));
        }
        Ok(Self::Range { min, max })
    }

    pub fn length(min: usize, max: usize) -> Result<Self, InvalidBounds> {
        if min > max {
            return Err(InvalidBounds(format!("length {min}...{max}")));
        }
        Ok(Self::Length { min, max })
    }

    pub fn exact_length_of(class_data_key: impl Into<String>) -> Self {
        Self::ExactLengthOf(class_data_key.into())
    }

    /// Compiles `source` so that it must match the entire string value.
    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self::Pattern {
            source: source.to_string(),
            regex,
        })
    }

    pub fn custom<F>(check: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + 'static,
    {
        Self::Custom(Rc::new(check))
    }

    /// Applies this rule to `value` for `attribute` on `instance`.
    ///
    /// `instance` is consulted only for class data (`ExactLengthOf`).
    pub fn validate(
        &self,
        attribute: &str,
        value: Value,
        instance: &DomainInstance,
    ) -> Result<Value, ValidationError> {
        let fail = |violation| Err(ValidationError::new(attribute, violation));
        match self {
            Self::Kind(expected) => {
                if expected.matches(&value) {
                    Ok(value)
                } else {
                    fail(Violation::WrongKind {
                        expected: *expected,
                        actual: value.kind(),
                    })
                }
            }
            Self::Range { min, max } => {
                let Some(actual) = value.as_f64() else {
                    return fail(Violation::WrongKind {
                        expected: ValueKind::Number,
                        actual: value.kind(),
                    });
                };
                if (*min..=*max).contains(&actual) {
                    Ok(value)
                } else {
                    fail(Violation::OutOfRange {
                        min: *min,
                        max: *max,
                        actual,
                    })
                }
            }
            Self::Length { min, max } => {
                let Some(actual) = value.len() else {
                    return fail(Violation::WrongKind {
                        expected: ValueKind::Str,
                        actual: value.kind(),
                    });
                };
                if (*min..=*max).contains(&actual) {
                    Ok(value)
                } else {
                    fail(Violation::WrongLength {
                        min: *min,
                        max: *max,
                        actual,
                    })
                }
            }
            Self::ExactLengthOf(key) => {
                let expected = instance
                    .class()
                    .class_data(key)
                    .and_then(Value::as_i64)
                    .and_then(|len| usize::try_from(len).ok());
                let Some(expected) = expected else {
                    return fail(Violation::MissingClassData(key.clone()));
                };
                let Some(actual) = value.len() else {
                    return fail(Violation::WrongKind {
                        expected: ValueKind::Str,
                        actual: value.kind(),
                    });
                };
                if actual == expected {
                    Ok(value)
                } else {
                    fail(Violation::WrongLength {
                        min: expected,
                        max: expected,
                        actual,
                    })
                }
            }
            Self::Normalize(steps) => match value {
                Value::Str(raw) => Ok(Value::Str(
                    steps.iter().fold(raw, |current, step| step.apply(&current)),
                )),
                other => fail(Violation::WrongKind {
                    expected: ValueKind::Str,
                    actual: other.kind(),
                }),
            },
            Self::Pattern { source, regex } => match value.as_str() {
                Some(text) if regex.is_match(text) => Ok(value),
                Some(_) => fail(Violation::PatternMismatch(source.clone())),
                None => fail(Violation::WrongKind {
                    expected: ValueKind::Str,
                    actual: value.kind(),
                }),
            },
            Self::OneOf(allowed) => {
                if allowed.contains(&value) {
                    Ok(value)
                } else {
                    fail(Violation::NotAllowed(value))
                }
            }
            Self::Custom(check) => check(&value).or_else(|reason| fail(Violation::Rejected(reason))),
        }
    }
}

impl Debug for Validator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            Self::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Length { min, max } => f
                .debug_struct("Length")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::ExactLengthOf(key) => f.debug_tuple("ExactLengthOf").field(key).finish(),
            Self::Normalize(steps) => f.debug_tuple("Normalize").field(steps).finish(),
            Self::Pattern { source, .. } => f.debug_tuple("Pattern").field(source).finish(),
            Self::OneOf(values) => f.debug_tuple("OneOf").field(values).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Range or length bounds that no value could satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBounds(pub String);

impl Display for InvalidBounds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid bounds {}", self.0)
    }
}

impl Error for InvalidBounds {}

/// Constraint violated by a rejected write.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    OutOfRange { min: f64, max: f64, actual: f64 },
    WrongKind { expected: ValueKind, actual: ValueKind },
    WrongLength { min: usize, max: usize, actual: usize },
    PatternMismatch(String),
    NotAllowed(Value),
    MissingClassData(String),
    /// Attribute has no write path (derived attributes).
    ReadOnly,
    Rejected(String),
}

/// Write rejected by a managed attribute; the prior value is untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub attribute: String,
    pub violation: Violation,
}

impl ValidationError {
    pub fn new(attribute: &str, violation: Violation) -> Self {
        Self {
            attribute: attribute.to_string(),
            violation,
        }
    }

    pub fn read_only(attribute: &str) -> Self {
        Self::new(attribute, Violation::ReadOnly)
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let attribute = &self.attribute;
        match &self.violation {
            Violation::OutOfRange { min, max, actual } => {
                write!(f, "invalid {attribute}: {actual} not in {min}...{max}")
            }
            Violation::WrongKind { expected, actual } => write!(
                f,
                "invalid {attribute}: expected {}, got {}",
                expected.as_str(),
                actual.as_str()
            ),
            Violation::WrongLength { min, max, actual } if min == max => {
                write!(f, "invalid {attribute}: length {actual}, expected {min}")
            }
            Violation::WrongLength { min, max, actual } => {
                write!(f, "invalid {attribute}: length {actual} not in {min}...{max}")
            }
            Violation::PatternMismatch(pattern) => {
                write!(f, "invalid {attribute}: does not match `{pattern}`")
            }
            Violation::NotAllowed(value) => write!(f, "invalid {attribute}: `{value}` not allowed"),
            Violation::MissingClassData(key) => {
                write!(f, "invalid {attribute}: class data `{key}` is not an integer")
            }
            Violation::ReadOnly => write!(f, "cannot set {attribute}"),
            Violation::Rejected(reason) => write!(f, "invalid {attribute}: {reason}"),
        }
    }
}

impl Error for ValidationError {}
