//! Batch resolution for "preview as role / user" and audit evidence.
//!
//! A simulation resolves every (module × action × scope) tuple of a catalog for
//! one subject, then runs conflict detection once over the whole set. Reports
//! are deterministic: the same snapshot and subject always produce the same
//! report, so two reports can be diffed across rule edits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use hrgate_core::{NodeId, PrincipalId};

use crate::catalog::ModuleCatalog;
use crate::conflicts::{detect_conflicts, ConflictWarning};
use crate::resolver::{resolve, role_templates, DecisionSource, EffectivePermission};
use crate::snapshot::PolicySnapshot;
use crate::{Action, ModuleKey, Principal, Role, Scope};

/// Default upper bound on one simulation run.
pub const DEFAULT_SIMULATION_DEADLINE: Duration = Duration::from_secs(5);

/// Who a simulation is run for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimulationSubject {
    /// A role template evaluated at a hierarchy position.
    Role { role: Role, node_id: NodeId },
    /// A concrete principal, as seen through an impersonation session.
    Impersonated { principal: Principal },
}

impl SimulationSubject {
    pub fn principal(&self) -> Principal {
        match self {
            SimulationSubject::Role { role, node_id } => Principal::for_role(role.clone(), node_id.clone()),
            SimulationSubject::Impersonated { principal } => principal.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("simulation subject position not found: {0}")]
    NodeNotFound(NodeId),

    #[error("simulation exceeded its deadline of {deadline_ms} ms after {resolved} of {total} tuples")]
    DeadlineExceeded {
        deadline_ms: u128,
        resolved: usize,
        total: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub principal: PrincipalId,
    pub node_id: NodeId,
    /// Role templates in force for the subject (memberships + role nodes on its path).
    pub roles: Vec<Role>,
    /// Store version of the snapshot the report was computed from.
    pub snapshot_version: u64,
    pub permissions: Vec<EffectivePermission>,
    pub conflicts: Vec<ConflictWarning>,
    pub allowed_count: usize,
    pub denied_count: usize,
}

impl SimulationReport {
    pub fn permission(&self, module: &ModuleKey, action: Action, scope: Scope) -> Option<&EffectivePermission> {
        self.permissions
            .iter()
            .find(|p| &p.module == module && p.action == action && p.scope == scope)
    }

    /// Tuples whose outcome differs between `self` (before) and `after`.
    pub fn diff(&self, after: &SimulationReport) -> Vec<PermissionChange> {
        let mut changes = Vec::new();
        for before in &self.permissions {
            let Some(now) = after.permission(&before.module, before.action, before.scope) else {
                continue;
            };
            if before.allowed != now.allowed || before.locked != now.locked || before.source != now.source {
                changes.push(PermissionChange {
                    module: before.module.clone(),
                    action: before.action,
                    scope: before.scope,
                    allowed_before: before.allowed,
                    allowed_after: now.allowed,
                    locked_before: before.locked,
                    locked_after: now.locked,
                    source_before: before.source.clone(),
                    source_after: now.source.clone(),
                });
            }
        }
        changes
    }
}

/// One tuple whose decision, lock state or provenance changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionChange {
    pub module: ModuleKey,
    pub action: Action,
    pub scope: Scope,
    pub allowed_before: bool,
    pub allowed_after: bool,
    pub locked_before: bool,
    pub locked_after: bool,
    pub source_before: DecisionSource,
    pub source_after: DecisionSource,
}

impl PermissionChange {
    /// Whether access itself changed (not just provenance).
    pub fn is_access_change(&self) -> bool {
        self.allowed_before != self.allowed_after
    }
}

/// Runs simulations against one snapshot.
#[derive(Debug, Clone)]
pub struct Simulator<'a> {
    snapshot: &'a PolicySnapshot,
    catalog: &'a ModuleCatalog,
    deadline: Duration,
}

impl<'a> Simulator<'a> {
    pub fn new(snapshot: &'a PolicySnapshot, catalog: &'a ModuleCatalog) -> Self {
        Self {
            snapshot,
            catalog,
            deadline: DEFAULT_SIMULATION_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[instrument(level = "debug", skip(self, subject), fields(principal = tracing::field::Empty))]
    pub fn simulate(&self, subject: &SimulationSubject) -> Result<SimulationReport, SimulationError> {
        let principal = subject.principal();
        tracing::Span::current().record("principal", tracing::field::display(&principal.id));

        let path = self
            .snapshot
            .graph()
            .path_to_root(&principal.node_id)
            .map_err(|_| SimulationError::NodeNotFound(principal.node_id.clone()))?;
        let roles = role_templates(&principal, &path);

        let started = Instant::now();
        let queries = self.catalog.queries();
        let total = queries.len();
        let mut permissions = Vec::with_capacity(total);
        for query in &queries {
            if started.elapsed() >= self.deadline {
                tracing::warn!(resolved = permissions.len(), total, "simulation deadline exceeded");
                return Err(SimulationError::DeadlineExceeded {
                    deadline_ms: self.deadline.as_millis(),
                    resolved: permissions.len(),
                    total,
                });
            }
            permissions.push(resolve(self.snapshot, &principal, query));
        }

        let conflicts = detect_conflicts(&principal.id, &permissions);
        let allowed_count = permissions.iter().filter(|p| p.allowed).count();
        let denied_count = permissions.len() - allowed_count;

        tracing::debug!(
            allowed_count,
            denied_count,
            conflicts = conflicts.len(),
            "simulation completed"
        );

        Ok(SimulationReport {
            principal: principal.id,
            node_id: principal.node_id,
            roles,
            snapshot_version: self.snapshot.version(),
            permissions,
            conflicts,
            allowed_count,
            denied_count,
        })
    }
}

/// Convenience wrapper: simulate with the default deadline.
pub fn simulate(
    snapshot: &PolicySnapshot,
    catalog: &ModuleCatalog,
    subject: &SimulationSubject,
) -> Result<SimulationReport, SimulationError> {
    Simulator::new(snapshot, catalog).simulate(subject)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use super::*;
    use crate::conflicts::ConflictKind;
    use crate::hierarchy::{HierarchyGraph, HierarchyNode, NodeType};
    use crate::rules::RuleSet;
    use crate::{Decision, PermissionQuery, PermissionRule, RuleSubject};

    fn graph() -> HierarchyGraph {
        let global = NodeId::new("global");
        let company = NodeId::new("company-a");
        HierarchyGraph::from_nodes(vec![
            HierarchyNode::root("global", "Global"),
            HierarchyNode::child("company-a", NodeType::Company, &global, "A"),
            HierarchyNode::child("team-x", NodeType::Team, &company, "Team X"),
        ])
        .unwrap()
    }

    fn rule(node: &str, q: PermissionQuery, decision: Decision) -> PermissionRule {
        PermissionRule::new(RuleSubject::role("manager"), NodeId::new(node), q, decision, Utc::now())
    }

    fn manager() -> SimulationSubject {
        SimulationSubject::Role {
            role: Role::new("manager"),
            node_id: NodeId::new("team-x"),
        }
    }

    fn catalog() -> ModuleCatalog {
        ModuleCatalog::new(vec![ModuleKey::from("absence"), ModuleKey::from("salary")])
    }

    fn snapshot(rules: Vec<PermissionRule>) -> PolicySnapshot {
        PolicySnapshot::new(graph(), RuleSet::from_rules(rules).unwrap(), 7).unwrap()
    }

    #[test]
    fn covers_the_full_cross_product() {
        let snap = snapshot(vec![rule(
            "team-x",
            PermissionQuery::new("absence", Action::Approve, Scope::Team),
            Decision::Grant,
        )]);
        let report = simulate(&snap, &catalog(), &manager()).unwrap();

        assert_eq!(report.permissions.len(), 2 * 6 * 4);
        assert_eq!(report.allowed_count, 1);
        assert_eq!(report.denied_count, 47);
        assert_eq!(report.snapshot_version, 7);
        assert!(report.conflicts.iter().any(|w| w.kind == ConflictKind::CoverageGap));
        assert!(
            report
                .permission(&ModuleKey::from("absence"), Action::Approve, Scope::Team)
                .unwrap()
                .allowed
        );
    }

    #[test]
    fn reports_are_byte_identical_across_runs() {
        let snap = snapshot(vec![
            rule("global", PermissionQuery::new("salary", Action::View, Scope::Company), Decision::LockDeny),
            rule("team-x", PermissionQuery::new("salary", Action::View, Scope::Company), Decision::Grant),
        ]);
        let first = simulate(&snap, &catalog(), &manager()).unwrap();
        let second = simulate(&snap, &catalog(), &manager()).unwrap();

        assert_eq!(
            serde_json::to_vec(&first.permissions).unwrap(),
            serde_json::to_vec(&second.permissions).unwrap()
        );
        assert_eq!(
            serde_json::to_vec(&first.conflicts).unwrap(),
            serde_json::to_vec(&second.conflicts).unwrap()
        );
    }

    #[test]
    fn unknown_subject_position_is_an_error() {
        let subject = SimulationSubject::Role {
            role: Role::new("manager"),
            node_id: NodeId::new("ghost"),
        };
        let err = simulate(&snapshot(vec![]), &catalog(), &subject).unwrap_err();
        assert_eq!(err, SimulationError::NodeNotFound(NodeId::new("ghost")));
    }

    #[test]
    fn zero_deadline_is_exceeded() {
        let snap = snapshot(vec![]);
        let cat = catalog();
        let err = Simulator::new(&snap, &cat)
            .with_deadline(Duration::ZERO)
            .simulate(&manager())
            .unwrap_err();
        assert_eq!(
            err,
            SimulationError::DeadlineExceeded {
                deadline_ms: 0,
                resolved: 0,
                total: 48,
            }
        );
    }

    #[test]
    fn diff_lists_changed_tuples_only() {
        let q = PermissionQuery::new("absence", Action::View, Scope::Team);
        let before = simulate(&snapshot(vec![]), &catalog(), &manager()).unwrap();
        let after = simulate(&snapshot(vec![rule("team-x", q, Decision::Grant)]), &catalog(), &manager()).unwrap();

        let changes = before.diff(&after);
        assert_eq!(changes.len(), 1);
        assert!(changes[0].is_access_change());
        assert_eq!(changes[0].module, ModuleKey::from("absence"));
        assert_eq!(changes[0].action, Action::View);
        assert!(before.diff(&before).is_empty());
    }

    #[test]
    fn impersonated_subject_uses_principal_rules() {
        let q = PermissionQuery::new("salary", Action::View, Scope::Own);
        let mut rules = RuleSet::new();
        rules.upsert(PermissionRule::new(
            RuleSubject::principal("bob"),
            NodeId::new("team-x"),
            q,
            Decision::Grant,
            Utc::now(),
        ));
        let snap = PolicySnapshot::new(graph(), rules, 1).unwrap();
        let bob = Principal::new(PrincipalId::new("bob"), NodeId::new("team-x"));

        let report = simulate(&snap, &catalog(), &SimulationSubject::Impersonated { principal: bob }).unwrap();
        assert_eq!(report.allowed_count, 1);
        assert_eq!(report.principal, PrincipalId::new("bob"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: writing a rule and deleting it again restores every decision.
        #[test]
        fn write_then_delete_restores_resolution(
            node in prop::sample::select(vec!["global", "company-a", "team-x"]),
            action in prop::sample::select(Action::ALL.to_vec()),
            scope in prop::sample::select(Scope::ALL.to_vec()),
            decision in prop::sample::select(Decision::ALL.to_vec()),
        ) {
            let base = vec![
                rule("global", PermissionQuery::new("absence", Action::View, Scope::Team), Decision::Grant),
                rule("company-a", PermissionQuery::new("salary", Action::Edit, Scope::Company), Decision::Deny),
            ];
            let original = snapshot(base.clone());
            let before = simulate(&original, &catalog(), &manager()).unwrap();

            let extra = rule(node, PermissionQuery::new("salary", action, scope), decision);
            let mut rules = RuleSet::from_rules(base.clone()).unwrap();
            let replaced = rules.upsert(extra.clone());
            prop_assume!(replaced.is_none());
            rules.remove(&extra.key());

            let restored = PolicySnapshot::new(graph(), rules, 7).unwrap();
            let after = simulate(&restored, &catalog(), &manager()).unwrap();
            prop_assert_eq!(before, after);
        }
    }
}
