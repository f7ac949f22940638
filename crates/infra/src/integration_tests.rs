//! Integration tests for the full policy pipeline.
//!
//! Tests: mutation → PolicyStore (audited) → snapshot → Resolver / Simulation
//!
//! Verifies:
//! - The documented resolution examples hold end to end
//! - Audit failures block mutations and leave the snapshot untouched
//! - Optimistic concurrency serializes writers on the same (node, module)
//! - Write-then-delete restores the previous decision

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use chrono::Utc;
    use proptest::prelude::*;

    use hrgate_auth::{
        detect_conflicts, resolve, Action, ConflictKind, Decision, DecisionSource, HierarchyNode, ModuleCatalog,
        ModuleKey, NodeType, PermissionQuery, PermissionRule, Precedence, Principal, Role, RuleSubject, Scope, Severity,
        SimulationSubject, Simulator,
    };
    use hrgate_core::{ExpectedVersion, NodeId, PrincipalId};

    use crate::audit::{export_csv, AuditEntry, AuditError, AuditRecord, AuditSink, InMemoryAuditSink};
    use crate::policy_store::{InMemoryPolicyStore, PolicyStore, PolicyStoreError};

    /// A sink that refuses every write, standing in for an unavailable audit backend.
    #[derive(Debug, Default)]
    struct UnavailableAuditSink;

    impl AuditSink for UnavailableAuditSink {
        fn append(&self, _actor: &PrincipalId, _record: AuditRecord) -> Result<AuditEntry, AuditError> {
            Err(AuditError::WriteFailed("audit backend unreachable".to_string()))
        }

        fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
            Ok(Vec::new())
        }
    }

    fn ops() -> PrincipalId {
        PrincipalId::new("ops")
    }

    /// Global → CompanyA → DepartmentHR → TeamPayroll, plus TeamX under DepartmentHR.
    fn seeded<A: AuditSink>(store: &InMemoryPolicyStore<A>) {
        let nodes = [
            HierarchyNode::root("global", "Global"),
            HierarchyNode::child("company-a", NodeType::Company, &NodeId::new("global"), "Company A"),
            HierarchyNode::child("department-hr", NodeType::Department, &NodeId::new("company-a"), "HR"),
            HierarchyNode::child("team-payroll", NodeType::Team, &NodeId::new("department-hr"), "Payroll"),
            HierarchyNode::child("team-x", NodeType::Team, &NodeId::new("department-hr"), "Team X"),
        ];
        for node in nodes {
            store.add_node(&ops(), node).unwrap();
        }
    }

    fn setup() -> Arc<InMemoryPolicyStore<Arc<InMemoryAuditSink>>> {
        let store = Arc::new(InMemoryPolicyStore::new(Arc::new(InMemoryAuditSink::new())));
        seeded(&store);
        store
    }

    fn rule(role: &str, node: &str, query: PermissionQuery, decision: Decision) -> PermissionRule {
        PermissionRule::new(
            RuleSubject::role(role.to_string()),
            NodeId::new(node),
            query,
            decision,
            Utc::now(),
        )
    }

    fn member(id: &str, node: &str, role: &str) -> Principal {
        Principal::new(PrincipalId::new(id), NodeId::new(node)).with_role(Role::new(role.to_string()))
    }

    #[test]
    fn global_lock_deny_beats_team_grant() {
        let store = setup();
        let q = PermissionQuery::new("salary", Action::View, Scope::Company);
        store
            .upsert_rule(&ops(), rule("admin", "global", q.clone(), Decision::LockDeny), ExpectedVersion::Exact(0))
            .unwrap();
        store
            .upsert_rule(&ops(), rule("admin", "team-payroll", q.clone(), Decision::Grant), ExpectedVersion::Exact(0))
            .unwrap();

        let admin = member("alice", "team-payroll", "admin");
        let result = resolve(&store.snapshot().unwrap(), &admin, &q);

        assert!(!result.allowed);
        assert!(result.locked);
        assert_eq!(result.precedence, Precedence::Lock);
        assert_eq!(result.source_node_id(), Some(&NodeId::new("global")));

        let warnings = detect_conflicts(&admin.id, std::slice::from_ref(&result));
        assert!(
            warnings
                .iter()
                .any(|w| w.kind == ConflictKind::Contradiction && w.severity == Severity::Error)
        );
    }

    #[test]
    fn no_rules_means_default_deny() {
        let store = setup();
        let employee = member("erin", "team-x", "employee");
        let result = resolve(
            &store.snapshot().unwrap(),
            &employee,
            &PermissionQuery::new("documents", Action::View, Scope::Own),
        );

        assert!(!result.allowed);
        assert!(!result.locked);
        assert_eq!(result.source, DecisionSource::DefaultDeny);
    }

    #[test]
    fn approve_without_view_is_a_coverage_gap_but_still_allowed() {
        let store = setup();
        store
            .upsert_rule(
                &ops(),
                rule("manager", "team-x", PermissionQuery::new("absence", Action::Approve, Scope::Team), Decision::Grant),
                ExpectedVersion::Any,
            )
            .unwrap();

        let snapshot = store.snapshot().unwrap();
        let catalog = ModuleCatalog::hr_default();
        let subject = SimulationSubject::Role {
            role: Role::new("manager"),
            node_id: NodeId::new("team-x"),
        };
        let report = Simulator::new(&snapshot, &catalog)
            .with_deadline(Duration::from_secs(5))
            .simulate(&subject)
            .unwrap();

        let approve = report
            .permission(&"absence".into(), Action::Approve, Scope::Team)
            .unwrap();
        assert!(approve.allowed);
        assert!(report.conflicts.iter().any(|w| w.kind == ConflictKind::CoverageGap
            && w.severity == Severity::Warning
            && w.affected_modules == vec![ModuleKey::from("absence")]));
        assert_eq!(report.allowed_count, 1);
    }

    #[test]
    fn superadmin_is_allowed_everywhere_regardless_of_rules() {
        let store = setup();
        let q = PermissionQuery::new("disciplinary", Action::Delete, Scope::Company);
        store
            .upsert_rule(&ops(), rule("superadmin", "global", q.clone(), Decision::LockDeny), ExpectedVersion::Any)
            .unwrap();

        let root = Principal::new(PrincipalId::new("root"), NodeId::new("team-x")).with_role(Role::superadmin());
        let result = resolve(&store.snapshot().unwrap(), &root, &q);
        assert!(result.allowed);
        assert!(result.locked);
        assert_eq!(result.precedence, Precedence::Superadmin);
    }

    #[test]
    fn audit_failure_blocks_the_mutation() {
        let seed = InMemoryPolicyStore::new(InMemoryAuditSink::new());
        seeded(&seed);
        let snapshot = (*seed.snapshot().unwrap()).clone();
        let store = InMemoryPolicyStore::with_snapshot(snapshot, UnavailableAuditSink);

        let q = PermissionQuery::new("salary", Action::View, Scope::Company);
        let err = store
            .upsert_rule(&ops(), rule("admin", "global", q.clone(), Decision::Grant), ExpectedVersion::Any)
            .unwrap_err();
        assert!(matches!(err, PolicyStoreError::Audit(AuditError::WriteFailed(_))));

        let err = store
            .add_node(&ops(), HierarchyNode::child("team-y", NodeType::Team, &NodeId::new("department-hr"), "Y"))
            .unwrap_err();
        assert!(matches!(err, PolicyStoreError::Audit(_)));

        let after = store.snapshot().unwrap();
        assert!(after.rules().is_empty());
        assert!(!after.graph().contains(&NodeId::new("team-y")));
        assert_eq!(store.key_version(&NodeId::new("global"), &"salary".into()).unwrap(), 0);
    }

    #[test]
    fn concurrent_writers_on_one_key_admit_exactly_one() {
        let store = setup();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let decision = if i % 2 == 0 { Decision::Grant } else { Decision::Deny };
                    store.upsert_rule(
                        &PrincipalId::new(format!("writer-{i}")),
                        rule("manager", "team-x", PermissionQuery::new("expenses", Action::Approve, Scope::Team), decision),
                        ExpectedVersion::Exact(0),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let committed = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(PolicyStoreError::Concurrency { .. })))
            .count();

        assert_eq!(committed, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(
            store.key_version(&NodeId::new("team-x"), &"expenses".into()).unwrap(),
            1
        );
    }

    #[test]
    fn writers_on_different_modules_do_not_conflict() {
        let store = setup();
        for module in ["salary", "health", "contracts"] {
            store
                .upsert_rule(
                    &ops(),
                    rule("manager", "team-x", PermissionQuery::new(module, Action::View, Scope::Team), Decision::Grant),
                    ExpectedVersion::Exact(0),
                )
                .unwrap();
        }
        assert_eq!(store.snapshot().unwrap().rules().len(), 3);
    }

    #[test]
    fn every_mutation_produces_exactly_one_audit_entry() {
        let store = setup();
        let nodes_added = store.audit().len().unwrap();
        let q = PermissionQuery::new("health", Action::View, Scope::Department);

        let w = store
            .upsert_rule(&ops(), rule("hr", "department-hr", q.clone(), Decision::Grant), ExpectedVersion::Exact(0))
            .unwrap();
        store
            .upsert_rule(&ops(), rule("hr", "department-hr", q, Decision::Deny), ExpectedVersion::Exact(1))
            .unwrap();
        store
            .delete_rule(&ops(), &w.after.unwrap().key(), ExpectedVersion::Exact(2))
            .unwrap();

        let entries = store.audit().entries().unwrap();
        assert_eq!(entries.len(), nodes_added + 3);
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (1..=entries.len() as u64).collect::<Vec<_>>());

        let mut csv = Vec::new();
        export_csv(&entries, &mut csv).unwrap();
        assert_eq!(String::from_utf8(csv).unwrap().lines().count(), entries.len() + 1);
    }

    #[test]
    fn moving_a_team_changes_inherited_decisions() {
        let store = setup();
        let q = PermissionQuery::new("reports", Action::Export, Scope::Department);
        store
            .add_node(&ops(), HierarchyNode::child("company-b", NodeType::Company, &NodeId::new("global"), "B"))
            .unwrap();
        store
            .upsert_rule(&ops(), rule("manager", "company-a", q.clone(), Decision::Grant), ExpectedVersion::Any)
            .unwrap();

        let manager = member("mia", "team-x", "manager");
        assert!(resolve(&store.snapshot().unwrap(), &manager, &q).allowed);

        store
            .move_node(&ops(), &NodeId::new("team-x"), &NodeId::new("company-b"))
            .unwrap();
        let moved = resolve(&store.snapshot().unwrap(), &manager, &q);
        assert!(!moved.allowed);
        assert_eq!(moved.source, DecisionSource::DefaultDeny);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: committing a rule and deleting it again restores `resolve`.
        #[test]
        fn write_then_delete_restores_the_previous_decision(
            node in prop::sample::select(vec!["global", "company-a", "department-hr", "team-x"]),
            decision in prop::sample::select(Decision::ALL.to_vec()),
            action in prop::sample::select(Action::ALL.to_vec()),
        ) {
            let store = setup();
            let q = PermissionQuery::new("contracts", action, Scope::Team);
            store
                .upsert_rule(&ops(), rule("manager", "company-a", q.clone(), Decision::Grant), ExpectedVersion::Any)
                .unwrap();

            let manager = member("mia", "team-x", "manager");
            let before = resolve(&store.snapshot().unwrap(), &manager, &q);

            let extra = PermissionRule::new(
                RuleSubject::principal("mia"),
                NodeId::new(node),
                q.clone(),
                decision,
                Utc::now(),
            );
            store.upsert_rule(&ops(), extra.clone(), ExpectedVersion::Any).unwrap();
            store.delete_rule(&ops(), &extra.key(), ExpectedVersion::Any).unwrap();

            let after = resolve(&store.snapshot().unwrap(), &manager, &q);
            prop_assert_eq!(before, after);
        }
    }
}
