//! Name-visibility policy applied by access guards.

use crate::access::AccessOp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Polarity of an access policy's name set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Names in the set are private; everything else is reachable.
    Deny,
    /// Only names in the set are reachable.
    Allow,
}

impl PolicyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deny => "deny",
            Self::Allow => "allow",
        }
    }
}

/// Immutable `(mode, names)` pair declared once per guarded class.
///
/// Decisions are a pure function of `(mode, names, requested_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePolicy {
    mode: PolicyMode,
    names: BTreeSet<String>,
}

impl AttributePolicy {
    pub fn new<I, S>(mode: PolicyMode, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Deny-list policy: the listed names are private.
    pub fn private<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(PolicyMode::Deny, names)
    }

    /// Allow-list policy: only the listed names are public.
    pub fn public<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(PolicyMode::Allow, names)
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    /// Returns whether no external name can pass this policy.
    pub fn is_degenerate(&self) -> bool {
        self.mode == PolicyMode::Allow && self.names.is_empty()
    }

    pub fn permits(&self, name: &str) -> bool {
        let listed = self.names.contains(name);
        match self.mode {
            PolicyMode::Deny => !listed,
            PolicyMode::Allow => listed,
        }
    }

    /// Checks one operation against this policy.
    pub fn check(&self, op: AccessOp, name: &str) -> Result<(), PolicyViolation> {
        if self.permits(name) {
            return Ok(());
        }
        Err(PolicyViolation {
            op,
            name: name.to_string(),
            mode: self.mode,
        })
    }
}

/// Attribute name rejected by an access policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    pub op: AccessOp,
    pub name: String,
    pub mode: PolicyMode,
}

impl Display for PolicyViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "private attribute {}: {}", self.op.verb(), self.name)
    }
}

impl Error for PolicyViolation {}

#[cfg(test)]
mod tests {
    use super::{AttributePolicy, PolicyMode};
    use crate::access::AccessOp;

    #[test]
    fn deny_mode_rejects_listed_names_only() {
        let policy = AttributePolicy::private(["data", "size"]);
        assert!(!policy.permits("data"));
        assert!(!policy.permits("size"));
        assert!(policy.permits("label"));
    }

    #[test]
    fn allow_mode_inverts_polarity() {
        let policy = AttributePolicy::public(["name"]);
        assert!(policy.permits("name"));
        assert!(!policy.permits("age"));
    }

    #[test]
    fn violation_message_names_operation_and_attribute() {
        let policy = AttributePolicy::private(["age"]);
        let fetch = policy
            .check(AccessOp::Get, "age")
            .expect_err("private fetch must fail");
        assert_eq!(fetch.to_string(), "private attribute fetch: age");
        assert_eq!(fetch.mode, PolicyMode::Deny);

        let change = policy
            .check(AccessOp::Set, "age")
            .expect_err("private change must fail");
        assert_eq!(change.to_string(), "private attribute change: age");
    }

    #[test]
    fn empty_allow_list_is_degenerate_but_valid() {
        let policy = AttributePolicy::public(Vec::<String>::new());
        assert!(policy.is_degenerate());
        assert!(!policy.permits("anything"));
        assert!(!AttributePolicy::private(Vec::<String>::new()).is_degenerate());
    }

    #[test]
    fn deserializes_from_declarative_json() {
        let policy: AttributePolicy =
            serde_json::from_str(r#"{"mode": "allow", "names": ["name", "name", "pay"]}"#)
                .expect("policy json");
        assert_eq!(policy.mode(), PolicyMode::Allow);
        assert_eq!(policy.names().len(), 2);
    }
}
