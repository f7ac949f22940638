use std::borrow::Cow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use hrgate_core::DomainError;

/// HR module identifier (e.g. "salary", "absence", "documents").
///
/// Modules are opaque strings; the set of known modules for simulation lives in
/// [`crate::catalog::ModuleCatalog`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleKey(Cow<'static, str>);

impl ModuleKey {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operation a permission applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Approve,
    Export,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::View,
        Action::Create,
        Action::Edit,
        Action::Delete,
        Action::Approve,
        Action::Export,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Export => "export",
        }
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| DomainError::validation(format!("unknown action '{s}'")))
    }
}

/// Breadth of data a granted action applies to.
///
/// Scopes are an independent lookup axis: a `company` grant says nothing about
/// `team`, and vice versa.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Own,
    Team,
    Department,
    Company,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::Own, Scope::Team, Scope::Department, Scope::Company];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Own => "own",
            Scope::Team => "team",
            Scope::Department => "department",
            Scope::Company => "company",
        }
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .into_iter()
            .find(|sc| sc.as_str() == s.trim())
            .ok_or_else(|| DomainError::validation(format!("unknown scope '{s}'")))
    }
}

/// Decision carried by a permission rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Grant,
    Deny,
    LockGrant,
    LockDeny,
}

impl Decision {
    pub const ALL: [Decision; 4] = [
        Decision::Grant,
        Decision::Deny,
        Decision::LockGrant,
        Decision::LockDeny,
    ];

    /// Whether this decision permits the action.
    pub fn allows(self) -> bool {
        matches!(self, Decision::Grant | Decision::LockGrant)
    }

    /// Lock decisions terminate evaluation; no descendant can change them.
    pub fn is_lock(self) -> bool {
        matches!(self, Decision::LockGrant | Decision::LockDeny)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Grant => "grant",
            Decision::Deny => "deny",
            Decision::LockGrant => "lock-grant",
            Decision::LockDeny => "lock-deny",
        }
    }
}

impl core::fmt::Display for Decision {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decision::ALL
            .into_iter()
            .find(|d| d.as_str() == s.trim())
            .ok_or_else(|| DomainError::validation(format!("unknown decision '{s}'")))
    }
}

/// The (module, action, scope) part of a permission question.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionQuery {
    pub module: ModuleKey,
    pub action: Action,
    pub scope: Scope,
}

impl PermissionQuery {
    pub fn new(module: impl Into<ModuleKey>, action: Action, scope: Scope) -> Self {
        Self {
            module: module.into(),
            action,
            scope,
        }
    }
}

impl From<&'static str> for ModuleKey {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for ModuleKey {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl core::fmt::Display for PermissionQuery {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{} ({})", self.module, self.action, self.scope)
    }
}
