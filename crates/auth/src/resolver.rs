//! The single authority function for permission decisions.
//!
//! [`resolve`] walks the principal's hierarchy path root-to-leaf and applies
//! the precedence rules below. It is a pure read over a [`PolicySnapshot`]:
//! no IO, no locks, no side effects other than tracing.
//!
//! # Precedence
//!
//! 1. [`Precedence::Lock`]: a `lock-grant` / `lock-deny` terminates evaluation.
//!    The locking node is the source and the result is `locked`.
//! 2. [`Precedence::Specificity`]: a plain `grant` / `deny` at a deeper node
//!    overrides one from an ancestor. At the same node, a principal rule is
//!    deeper than a role-template rule.
//! 3. [`Precedence::DefaultDeny`]: no rule anywhere on the path means deny.
//!    [`Precedence::Superadmin`] is the one exception: an implicit, locked
//!    grant at the global root that nothing can override.
//! 4. Rules at identical specificity that disagree are a data-integrity error
//!    ([`ResolutionError::AmbiguousRule`]) and resolution fails closed.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use hrgate_core::{NodeId, PrincipalId, RuleId};

use crate::hierarchy::{HierarchyError, HierarchyNode, NodeType};
use crate::principal::SubjectRank;
use crate::snapshot::PolicySnapshot;
use crate::{Action, Decision, ModuleKey, PermissionQuery, PermissionRule, Principal, Role, RuleSubject, Scope};

/// Named precedence rule that produced a decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    Superadmin,
    Lock,
    Specificity,
    DefaultDeny,
    FailClosed,
}

/// Internal failure during resolution. Always results in a denial.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ResolutionError {
    #[error("hierarchy node not found: {node_id}")]
    NodeNotFound { node_id: NodeId },

    #[error("ambiguous rules at '{node_id}': {}", format_ids(.rule_ids))]
    AmbiguousRule { node_id: NodeId, rule_ids: Vec<RuleId> },

    #[error("cycle detected at '{node_id}'")]
    CycleDetected { node_id: NodeId },

    #[error("invalid hierarchy: {message}")]
    InvalidHierarchy { message: String },
}

fn format_ids(ids: &[RuleId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl From<HierarchyError> for ResolutionError {
    fn from(value: HierarchyError) -> Self {
        match value {
            HierarchyError::CycleDetected { node, .. } => Self::CycleDetected { node_id: node },
            HierarchyError::NodeNotFound(node_id) => Self::NodeNotFound { node_id },
            other => Self::InvalidHierarchy {
                message: other.to_string(),
            },
        }
    }
}

/// Where a decision came from. Errors take the place of the source node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionSource {
    /// A rule at this node decided.
    Node { node_id: NodeId },
    /// The reserved superadmin template, anchored at the global root.
    Superadmin { node_id: NodeId },
    /// No rule anywhere on the path.
    DefaultDeny,
    /// Resolution failed; the decision is a denial.
    Error { error: ResolutionError },
}

/// What happened to a rule encountered on the path.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitOutcome {
    /// The rule decided (alone or together with agreeing rules at the same level).
    Applied,
    /// A more specific rule replaced it.
    Overridden,
    /// It sits below a lock and can never take effect.
    Unreachable,
}

/// One rule encountered while walking the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHit {
    pub rule_id: RuleId,
    pub node_id: NodeId,
    /// Position of `node_id` on the path (root = 0).
    pub depth: usize,
    pub subject: RuleSubject,
    pub decision: Decision,
    pub outcome: HitOutcome,
}

impl RuleHit {
    /// Specificity level: deeper nodes first, then principal over role template.
    pub fn level(&self) -> (usize, SubjectRank) {
        (self.depth, self.subject.rank())
    }
}

/// The resolved decision for one query, with provenance.
///
/// Derived on demand and never persisted: rebuilding it from the same snapshot
/// always yields the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermission {
    pub principal: PrincipalId,
    pub module: ModuleKey,
    pub action: Action,
    pub scope: Scope,
    pub allowed: bool,
    pub locked: bool,
    pub precedence: Precedence,
    pub source: DecisionSource,
    /// Rules encountered root-to-leaf, including overridden and unreachable ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trail: Vec<RuleHit>,
}

impl EffectivePermission {
    /// The node whose rule decided, if any.
    pub fn source_node_id(&self) -> Option<&NodeId> {
        match &self.source {
            DecisionSource::Node { node_id } | DecisionSource::Superadmin { node_id } => Some(node_id),
            DecisionSource::DefaultDeny | DecisionSource::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ResolutionError> {
        match &self.source {
            DecisionSource::Error { error } => Some(error),
            _ => None,
        }
    }

    pub fn query(&self) -> PermissionQuery {
        PermissionQuery::new(self.module.clone(), self.action, self.scope)
    }

    /// Human-readable reason for the decision (operator and audit facing).
    pub fn explain(&self) -> String {
        let verdict = if self.allowed { "allowed" } else { "denied" };
        let q = self.query();
        match (&self.source, self.precedence) {
            (DecisionSource::Superadmin { node_id }, _) => format!(
                "{q} {verdict}: '{}' holds the superadmin template (implicit lock-grant at '{node_id}')",
                self.principal
            ),
            (DecisionSource::Node { node_id }, Precedence::Lock) => {
                format!("{q} {verdict}: locked at '{node_id}'; more specific rules cannot change it")
            }
            (DecisionSource::Node { node_id }, _) => {
                format!("{q} {verdict}: most specific rule is at '{node_id}'")
            }
            (DecisionSource::DefaultDeny, _) => {
                format!("{q} {verdict}: no rule on the path (default deny)")
            }
            (DecisionSource::Error { error }, _) => {
                format!("{q} {verdict}: resolution failed closed ({error})")
            }
        }
    }

    fn fail_closed(principal: &Principal, query: &PermissionQuery, error: ResolutionError, trail: Vec<RuleHit>) -> Self {
        tracing::warn!(
            principal = %principal.id,
            query = %query,
            error = %error,
            "permission resolution failed closed"
        );
        Self {
            principal: principal.id.clone(),
            module: query.module.clone(),
            action: query.action,
            scope: query.scope,
            allowed: false,
            locked: false,
            precedence: Precedence::FailClosed,
            source: DecisionSource::Error { error },
            trail,
        }
    }
}

/// Role templates in force for `principal` on `path`: its own memberships plus
/// the names of `role` nodes above (or at) its position. Sorted, de-duplicated.
///
/// The superadmin template is only honoured as an explicit membership; a
/// `role` node carrying that name contributes nothing.
pub fn role_templates(principal: &Principal, path: &[&HierarchyNode]) -> Vec<Role> {
    let mut templates: Vec<Role> = principal.roles.clone();
    templates.extend(
        path.iter()
            .filter(|n| n.node_type == NodeType::Role)
            .map(|n| Role::new(n.name.clone()))
            .filter(|r| !r.is_superadmin()),
    );
    templates.sort();
    templates.dedup();
    templates
}

/// Resolve one permission query for `principal`.
///
/// Never fails: internal errors produce a denial whose source carries the error.
#[instrument(
    level = "debug",
    skip(snapshot, principal, query),
    fields(
        principal = %principal.id,
        node = %principal.node_id,
        module = %query.module,
        action = %query.action,
        scope = %query.scope,
    )
)]
pub fn resolve(snapshot: &PolicySnapshot, principal: &Principal, query: &PermissionQuery) -> EffectivePermission {
    let graph = snapshot.graph();
    let path = match graph.path_to_root(&principal.node_id) {
        Ok(path) => path,
        Err(err) => return EffectivePermission::fail_closed(principal, query, err.into(), Vec::new()),
    };
    let templates = role_templates(principal, &path);

    if principal.roles.iter().any(Role::is_superadmin) {
        let root = path
            .first()
            .map(|n| n.id.clone())
            .unwrap_or_else(|| principal.node_id.clone());
        return EffectivePermission {
            principal: principal.id.clone(),
            module: query.module.clone(),
            action: query.action,
            scope: query.scope,
            allowed: true,
            locked: true,
            precedence: Precedence::Superadmin,
            source: DecisionSource::Superadmin { node_id: root },
            trail: Vec::new(),
        };
    }

    let mut trail: Vec<RuleHit> = Vec::new();
    // Indices into `trail` of the rules currently deciding.
    let mut deciding: Vec<usize> = Vec::new();
    let mut decided: Option<(Decision, NodeId)> = None;
    let mut locked = false;

    for (depth, node) in path.iter().enumerate() {
        for rank in [SubjectRank::RoleTemplate, SubjectRank::Principal] {
            let level: Vec<&PermissionRule> = snapshot
                .rules()
                .rules_at(&node.id, query)
                .filter(|r| r.subject.rank() == rank && principal.matches(&r.subject, &templates))
                .collect();
            if level.is_empty() {
                continue;
            }

            if locked {
                trail.extend(level.iter().map(|r| hit(r, depth, HitOutcome::Unreachable)));
                continue;
            }

            let decision = level[0].decision;
            if level.iter().any(|r| r.decision != decision) {
                let mut rule_ids: Vec<RuleId> = level.iter().map(|r| r.id).collect();
                rule_ids.sort();
                let error = ResolutionError::AmbiguousRule {
                    node_id: node.id.clone(),
                    rule_ids,
                };
                trail.extend(level.iter().map(|r| hit(r, depth, HitOutcome::Overridden)));
                for idx in &deciding {
                    trail[*idx].outcome = HitOutcome::Overridden;
                }
                return EffectivePermission::fail_closed(principal, query, error, trail);
            }

            for idx in deciding.drain(..) {
                trail[idx].outcome = HitOutcome::Overridden;
            }
            for rule in &level {
                deciding.push(trail.len());
                trail.push(hit(rule, depth, HitOutcome::Applied));
            }
            decided = Some((decision, node.id.clone()));
            locked = decision.is_lock();
        }
    }

    let (allowed, locked, precedence, source) = match decided {
        Some((decision, node_id)) => (
            decision.allows(),
            decision.is_lock(),
            if decision.is_lock() {
                Precedence::Lock
            } else {
                Precedence::Specificity
            },
            DecisionSource::Node { node_id },
        ),
        None => (false, false, Precedence::DefaultDeny, DecisionSource::DefaultDeny),
    };

    tracing::debug!(allowed, locked, ?precedence, "permission resolved");

    EffectivePermission {
        principal: principal.id.clone(),
        module: query.module.clone(),
        action: query.action,
        scope: query.scope,
        allowed,
        locked,
        precedence,
        source,
        trail,
    }
}

fn hit(rule: &PermissionRule, depth: usize, outcome: HitOutcome) -> RuleHit {
    RuleHit {
        rule_id: rule.id,
        node_id: rule.node_id.clone(),
        depth,
        subject: rule.subject.clone(),
        decision: rule.decision,
        outcome,
    }
}
