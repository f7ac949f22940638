use serde::{Deserialize, Serialize};

use hrgate_core::{NodeId, PrincipalId};

use crate::Role;

/// Who a permission rule is declared for.
///
/// Serialized externally tagged: `{"role": "manager"}` or `{"principal": "alice"}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSubject {
    /// Applies to every principal holding the role template.
    Role(Role),
    /// Applies to one principal only.
    Principal(PrincipalId),
}

/// Specificity of a rule subject within a single hierarchy node.
///
/// At the same node, a principal-specific rule is more specific than a
/// role-template rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectRank {
    RoleTemplate,
    Principal,
}

impl RuleSubject {
    pub fn role(name: impl Into<std::borrow::Cow<'static, str>>) -> Self {
        Self::Role(Role::new(name))
    }

    pub fn principal(id: impl Into<String>) -> Self {
        Self::Principal(PrincipalId::new(id))
    }

    pub fn rank(&self) -> SubjectRank {
        match self {
            RuleSubject::Role(_) => SubjectRank::RoleTemplate,
            RuleSubject::Principal(_) => SubjectRank::Principal,
        }
    }
}

impl core::fmt::Display for RuleSubject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RuleSubject::Role(role) => write!(f, "role:{role}"),
            RuleSubject::Principal(id) => write!(f, "principal:{id}"),
        }
    }
}

/// The subject of a permission query.
///
/// Supplied by the identity provider and trusted as given: its id, its position
/// in the hierarchy and the role templates it holds. Role-template principals
/// (used for "preview as role") are built with [`Principal::for_role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub node_id: NodeId,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn new(id: PrincipalId, node_id: NodeId) -> Self {
        Self {
            id,
            node_id,
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// A principal standing for a role template evaluated at `node_id`.
    pub fn for_role(role: Role, node_id: NodeId) -> Self {
        Self {
            id: PrincipalId::new(format!("role:{role}")),
            node_id,
            roles: vec![role],
        }
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == name)
    }

    /// Whether a rule declared for `subject` applies to this principal, given
    /// the full set of role templates in force for it.
    pub fn matches(&self, subject: &RuleSubject, templates: &[Role]) -> bool {
        match subject {
            RuleSubject::Principal(id) => *id == self.id,
            RuleSubject::Role(role) => templates.contains(role),
        }
    }
}
