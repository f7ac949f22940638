use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role template identifier (e.g. "manager", "hr-admin").
///
/// Role templates are opaque strings supplied by the identity provider or by
/// `role` nodes in the hierarchy. One name is reserved: [`Role::SUPERADMIN`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Reserved break-glass template: implicit, non-overridable grant at the root.
    pub const SUPERADMIN: &'static str = "superadmin";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn superadmin() -> Self {
        Self(Cow::Borrowed(Self::SUPERADMIN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_superadmin(&self) -> bool {
        self.as_str() == Self::SUPERADMIN
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
