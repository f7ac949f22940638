//! Advisory configuration checks over a resolved permission set.
//!
//! Findings describe configuration quality only. They never change `allowed`
//! and detection never fails.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use hrgate_core::PrincipalId;

use crate::resolver::{DecisionSource, EffectivePermission, HitOutcome, ResolutionError, RuleHit};
use crate::{Action, ModuleKey, Scope};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    Contradiction,
    RedundantOverride,
    CoverageGap,
    Informational,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConflictWarning {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub message: String,
    pub affected_modules: Vec<ModuleKey>,
}

impl ConflictWarning {
    fn new(kind: ConflictKind, severity: Severity, message: String, module: &ModuleKey) -> Self {
        Self {
            kind,
            severity,
            message,
            affected_modules: vec![module.clone()],
        }
    }
}

/// Actions that are useless without a prerequisite on the same module and scope.
const PREREQUISITES: [(Action, Action); 4] = [
    (Action::Approve, Action::View),
    (Action::Edit, Action::View),
    (Action::Delete, Action::View),
    (Action::Export, Action::View),
];

/// Action pairs reviewers usually expect together; reported as notices only.
const EXPECTED_COMPANIONS: [(Action, Action); 2] = [
    (Action::Approve, Action::Delete),
    (Action::Delete, Action::Edit),
];

/// Scan `resolved` for contradictions, redundant overrides, coverage gaps and
/// role-semantic notices.
///
/// Output is sorted (most severe first) and de-duplicated, so it does not
/// depend on the order of `resolved`.
pub fn detect_conflicts(principal: &PrincipalId, resolved: &[EffectivePermission]) -> Vec<ConflictWarning> {
    let mut out = Vec::new();

    for permission in resolved {
        check_failed_resolution(permission, &mut out);
        check_trail(permission, &mut out);
    }
    check_coverage(resolved, &mut out);
    check_role_semantics(principal, resolved, &mut out);

    out.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.affected_modules.cmp(&b.affected_modules))
            .then_with(|| a.message.cmp(&b.message))
    });
    out.dedup();
    out
}

fn check_failed_resolution(permission: &EffectivePermission, out: &mut Vec<ConflictWarning>) {
    let DecisionSource::Error { error } = &permission.source else {
        return;
    };
    let q = permission.query();
    let (kind, message) = match error {
        ResolutionError::AmbiguousRule { .. } => (
            ConflictKind::Contradiction,
            format!("{q}: {error}; the check fails closed until one rule is removed"),
        ),
        other => (
            ConflictKind::Informational,
            format!("{q}: resolution failed closed ({other})"),
        ),
    };
    out.push(ConflictWarning::new(kind, Severity::Error, message, &permission.module));
}

/// Contradictions and redundant overrides, read from the resolution trail.
fn check_trail(permission: &EffectivePermission, out: &mut Vec<ConflictWarning>) {
    let q = permission.query();
    let lock = permission
        .trail
        .iter()
        .find(|h| h.decision.is_lock() && h.outcome == HitOutcome::Applied);

    // Decision in force before the level currently being read.
    let mut in_force: Option<&RuleHit> = None;
    let mut level_start: Option<&RuleHit> = None;
    let mut level_in_force: Option<&RuleHit> = None;

    for hit in &permission.trail {
        if hit.outcome == HitOutcome::Unreachable {
            let Some(lock) = lock else { continue };
            if hit.decision.allows() != lock.decision.allows() {
                out.push(ConflictWarning::new(
                    ConflictKind::Contradiction,
                    Severity::Error,
                    format!(
                        "{q}: {} at '{}' is unreachable below {} at '{}'",
                        hit.decision, hit.node_id, lock.decision, lock.node_id
                    ),
                    &permission.module,
                ));
            } else {
                out.push(ConflictWarning::new(
                    ConflictKind::RedundantOverride,
                    Severity::Info,
                    format!(
                        "{q}: {} at '{}' repeats {} locked at '{}'",
                        hit.decision, hit.node_id, lock.decision, lock.node_id
                    ),
                    &permission.module,
                ));
            }
            continue;
        }

        if level_start.map(RuleHit::level) != Some(hit.level()) {
            level_in_force = in_force;
            level_start = Some(hit);
        }
        if let Some(ancestor) = level_in_force {
            if ancestor.decision == hit.decision && ancestor.level() < hit.level() {
                out.push(ConflictWarning::new(
                    ConflictKind::RedundantOverride,
                    Severity::Info,
                    format!(
                        "{q}: {} at '{}' restates {} already in force from '{}'",
                        hit.decision, hit.node_id, ancestor.decision, ancestor.node_id
                    ),
                    &permission.module,
                ));
            }
        }
        in_force = Some(hit);
    }
}

fn check_coverage(resolved: &[EffectivePermission], out: &mut Vec<ConflictWarning>) {
    let allowed: BTreeSet<(&ModuleKey, Scope, Action)> = resolved
        .iter()
        .filter(|p| p.allowed)
        .map(|p| (&p.module, p.scope, p.action))
        .collect();

    for (module, scope, action) in &allowed {
        for (dependent, prerequisite) in PREREQUISITES {
            if *action == dependent && !allowed.contains(&(*module, *scope, prerequisite)) {
                out.push(ConflictWarning::new(
                    ConflictKind::CoverageGap,
                    Severity::Warning,
                    format!("{module}: {dependent} is granted at {scope} scope without {prerequisite}"),
                    module,
                ));
            }
        }
    }
}

fn check_role_semantics(principal: &PrincipalId, resolved: &[EffectivePermission], out: &mut Vec<ConflictWarning>) {
    let mut by_module: BTreeMap<&ModuleKey, BTreeSet<Action>> = BTreeMap::new();
    for p in resolved.iter().filter(|p| p.allowed) {
        by_module.entry(&p.module).or_default().insert(p.action);
    }

    for (module, actions) in by_module {
        for (present, missing) in EXPECTED_COMPANIONS {
            if actions.contains(&present) && !actions.contains(&missing) {
                out.push(ConflictWarning::new(
                    ConflictKind::Informational,
                    Severity::Info,
                    format!("'{principal}' has {present} but not {missing} on {module}"),
                    module,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use hrgate_core::NodeId;

    use super::*;
    use crate::hierarchy::{HierarchyGraph, HierarchyNode, NodeType};
    use crate::resolver::resolve;
    use crate::rules::RuleSet;
    use crate::snapshot::PolicySnapshot;
    use crate::{Decision, PermissionQuery, PermissionRule, Principal, Role, RuleSubject};

    fn snapshot(rules: Vec<PermissionRule>) -> PolicySnapshot {
        let global = NodeId::new("global");
        let company = NodeId::new("company-a");
        let graph = HierarchyGraph::from_nodes(vec![
            HierarchyNode::root("global", "Global"),
            HierarchyNode::child("company-a", NodeType::Company, &global, "A"),
            HierarchyNode::child("team-x", NodeType::Team, &company, "Team X"),
        ])
        .unwrap();
        PolicySnapshot::new(graph, RuleSet::from_rules(rules).unwrap(), 1).unwrap()
    }

    fn rule(role: &'static str, node: &str, q: &PermissionQuery, decision: Decision) -> PermissionRule {
        PermissionRule::new(RuleSubject::role(role), NodeId::new(node), q.clone(), decision, Utc::now())
    }

    fn manager() -> Principal {
        Principal::for_role(Role::new("manager"), NodeId::new("team-x"))
    }

    #[test]
    fn approve_without_view_is_a_coverage_gap() {
        let approve = PermissionQuery::new("absence", Action::Approve, Scope::Team);
        let view = PermissionQuery::new("absence", Action::View, Scope::Team);
        let snap = snapshot(vec![rule("manager", "team-x", &approve, Decision::Grant)]);

        let resolved = vec![resolve(&snap, &manager(), &approve), resolve(&snap, &manager(), &view)];
        assert!(resolved[0].allowed);

        let warnings = detect_conflicts(&manager().id, &resolved);
        let gap = warnings
            .iter()
            .find(|w| w.kind == ConflictKind::CoverageGap)
            .expect("coverage gap");
        assert_eq!(gap.severity, Severity::Warning);
        assert_eq!(gap.affected_modules, vec![ModuleKey::from("absence")]);
        assert!(gap.message.contains("approve"));
        assert!(gap.message.contains("view"));

        // Advisory only: the resolution is unchanged.
        assert!(resolve(&snap, &manager(), &approve).allowed);
    }

    #[test]
    fn grant_below_lock_deny_is_a_contradiction() {
        let q = PermissionQuery::new("salary", Action::View, Scope::Company);
        let snap = snapshot(vec![
            rule("manager", "global", &q, Decision::LockDeny),
            rule("manager", "team-x", &q, Decision::Grant),
        ]);
        let warnings = detect_conflicts(&manager().id, &[resolve(&snap, &manager(), &q)]);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, ConflictKind::Contradiction);
        assert_eq!(warnings[0].severity, Severity::Error);
    }

    #[test]
    fn restating_an_inherited_decision_is_redundant() {
        let q = PermissionQuery::new("documents", Action::View, Scope::Own);
        let snap = snapshot(vec![
            rule("manager", "global", &q, Decision::Grant),
            rule("manager", "team-x", &q, Decision::Grant),
        ]);
        let warnings = detect_conflicts(&manager().id, &[resolve(&snap, &manager(), &q)]);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, ConflictKind::RedundantOverride);
        assert_eq!(warnings[0].severity, Severity::Info);
    }

    #[test]
    fn a_real_override_is_not_redundant() {
        let q = PermissionQuery::new("documents", Action::View, Scope::Own);
        let snap = snapshot(vec![
            rule("manager", "global", &q, Decision::Deny),
            rule("manager", "team-x", &q, Decision::Grant),
        ]);
        let warnings = detect_conflicts(&manager().id, &[resolve(&snap, &manager(), &q)]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn locking_an_inherited_grant_is_not_redundant() {
        let q = PermissionQuery::new("salary", Action::View, Scope::Company);
        let snap = snapshot(vec![
            rule("manager", "global", &q, Decision::Grant),
            rule("manager", "company-a", &q, Decision::LockGrant),
        ]);
        let resolved = resolve(&snap, &manager(), &q);
        assert!(resolved.allowed && resolved.locked);

        let warnings = detect_conflicts(&manager().id, &[resolved]);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn approve_without_delete_is_informational() {
        let view = PermissionQuery::new("expenses", Action::View, Scope::Team);
        let approve = PermissionQuery::new("expenses", Action::Approve, Scope::Team);
        let snap = snapshot(vec![
            rule("manager", "team-x", &view, Decision::Grant),
            rule("manager", "team-x", &approve, Decision::Grant),
        ]);
        let resolved = vec![resolve(&snap, &manager(), &view), resolve(&snap, &manager(), &approve)];
        let warnings = detect_conflicts(&manager().id, &resolved);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, ConflictKind::Informational);
        assert!(warnings[0].message.contains("approve but not delete"));
    }

    #[test]
    fn output_is_independent_of_input_order() {
        let approve = PermissionQuery::new("absence", Action::Approve, Scope::Team);
        let export = PermissionQuery::new("salary", Action::Export, Scope::Company);
        let snap = snapshot(vec![
            rule("manager", "team-x", &approve, Decision::Grant),
            rule("manager", "global", &export, Decision::Grant),
        ]);
        let a = resolve(&snap, &manager(), &approve);
        let b = resolve(&snap, &manager(), &export);

        let forward = detect_conflicts(&manager().id, &[a.clone(), b.clone()]);
        let backward = detect_conflicts(&manager().id, &[b, a]);
        assert_eq!(forward, backward);
        assert!(forward.iter().all(|w| w.kind == ConflictKind::CoverageGap || w.kind == ConflictKind::Informational));
    }
}
