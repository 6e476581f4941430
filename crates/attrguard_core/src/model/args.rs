//! Constructor arguments and field binding.

use crate::value::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Positional and keyword constructor arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Value>,
    keyword: BTreeMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an argument list from positional values only.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            positional: values.into_iter().map(Into::into).collect(),
            keyword: BTreeMap::new(),
        }
    }

    /// Appends one positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets one keyword argument; a repeated keyword replaces the earlier one.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keyword.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// One declared constructor field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub default: Option<Value>,
}

impl FieldDecl {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Matches `args` against `fields`: positionals fill fields in declaration
/// order, keywords fill by name, defaults fill whatever is left.
///
/// Returned pairs keep field declaration order so constructor writes run in a
/// stable sequence.
pub(crate) fn bind_arguments(
    class: &str,
    fields: &[FieldDecl],
    args: Args,
) -> Result<Vec<(String, Value)>, ConstructionError> {
    let Args {
        positional,
        mut keyword,
    } = args;

    if positional.len() > fields.len() {
        return Err(ConstructionError::TooManyPositional {
            class: class.to_string(),
            expected: fields.len(),
            given: positional.len(),
        });
    }

    if let Some(unknown) = keyword
        .keys()
        .find(|name| !fields.iter().any(|field| &field.name == *name))
    {
        return Err(ConstructionError::UnknownKeyword {
            class: class.to_string(),
            name: unknown.clone(),
        });
    }

    let mut positional = positional.into_iter();
    let mut bound = Vec::with_capacity(fields.len());
    for field in fields {
        let by_position = positional.next();
        let by_keyword = keyword.remove(field.name.as_str());
        let value = match (by_position, by_keyword) {
            (Some(_), Some(_)) => {
                return Err(ConstructionError::DuplicateArgument {
                    class: class.to_string(),
                    name: field.name.clone(),
                });
            }
            (Some(value), None) | (None, Some(value)) => value,
            (None, None) => match &field.default {
                Some(default) => default.clone(),
                None => {
                    return Err(ConstructionError::MissingArgument {
                        class: class.to_string(),
                        name: field.name.clone(),
                    });
                }
            },
        };
        bound.push((field.name.clone(), value));
    }
    Ok(bound)
}

/// Constructor argument binding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    TooManyPositional {
        class: String,
        expected: usize,
        given: usize,
    },
    UnknownKeyword {
        class: String,
        name: String,
    },
    DuplicateArgument {
        class: String,
        name: String,
    },
    MissingArgument {
        class: String,
        name: String,
    },
}

impl Display for ConstructionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyPositional {
                class,
                expected,
                given,
            } => write!(
                f,
                "{class}() takes {expected} positional arguments but {given} were given"
            ),
            Self::UnknownKeyword { class, name } => {
                write!(f, "{class}() got an unexpected keyword argument `{name}`")
            }
            Self::DuplicateArgument { class, name } => {
                write!(f, "{class}() got multiple values for argument `{name}`")
            }
            Self::MissingArgument { class, name } => {
                write!(f, "{class}() missing required argument `{name}`")
            }
        }
    }
}

impl Error for ConstructionError {}
