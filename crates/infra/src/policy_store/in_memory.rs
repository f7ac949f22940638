use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use hrgate_auth::{HierarchyGraph, HierarchyNode, ModuleKey, PermissionRule, PolicySnapshot, RuleKey, RuleSet};
use hrgate_core::{ExpectedVersion, NodeId, PrincipalId};

use super::{PolicyStore, PolicyStoreError, RuleWrite};
use crate::audit::{AuditEntry, AuditError, AuditSink};

#[derive(Debug, Default)]
struct State {
    snapshot: Arc<PolicySnapshot>,
    versions: HashMap<(NodeId, ModuleKey), u64>,
}

/// In-memory policy store publishing immutable snapshots.
///
/// Writers are serialized by one lock around the published state; readers only
/// hold it long enough to clone the current `Arc<PolicySnapshot>`.
#[derive(Debug)]
pub struct InMemoryPolicyStore<A> {
    state: RwLock<State>,
    audit: A,
}

impl<A: AuditSink> InMemoryPolicyStore<A> {
    /// An empty store; the first node added must be the global root.
    pub fn new(audit: A) -> Self {
        Self {
            state: RwLock::new(State::default()),
            audit,
        }
    }

    /// Seed the store from an already validated snapshot (e.g. a loaded document).
    pub fn with_snapshot(snapshot: PolicySnapshot, audit: A) -> Self {
        Self {
            state: RwLock::new(State {
                snapshot: Arc::new(snapshot),
                versions: HashMap::new(),
            }),
            audit,
        }
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, State>, PolicyStoreError> {
        self.state
            .write()
            .map_err(|_| PolicyStoreError::Storage("lock poisoned".to_string()))
    }

    fn audited(&self, result: Result<AuditEntry, AuditError>) -> Result<AuditEntry, PolicyStoreError> {
        result.map_err(|err| {
            tracing::error!(error = %err, "audit write failed; mutation rejected");
            PolicyStoreError::Audit(err)
        })
    }

    fn write_rule(
        &self,
        actor: &PrincipalId,
        node_id: &NodeId,
        module: &ModuleKey,
        expected: ExpectedVersion,
        change: impl FnOnce(&mut RuleSet) -> Result<(Option<PermissionRule>, Option<PermissionRule>), PolicyStoreError>,
    ) -> Result<RuleWrite, PolicyStoreError> {
        let mut state = self.write_state()?;

        let slot = (node_id.clone(), module.clone());
        let actual = state.versions.get(&slot).copied().unwrap_or(0);
        if !expected.matches(actual) {
            return Err(PolicyStoreError::Concurrency {
                node_id: node_id.clone(),
                module: module.clone(),
                expected,
                actual,
            });
        }

        let current = Arc::clone(&state.snapshot);
        let mut rules = current.rules().clone();
        let (before, after) = change(&mut rules)?;
        let next = PolicySnapshot::new(current.graph().clone(), rules, current.version() + 1)?;

        let entry = self.audited(self.audit.record_rule_change(actor, before.as_ref(), after.as_ref()))?;

        let snapshot_version = next.version();
        state.snapshot = Arc::new(next);
        state.versions.insert(slot, actual + 1);

        tracing::info!(
            actor = %actor,
            node_id = %node_id,
            module = %module,
            key_version = actual + 1,
            snapshot_version,
            audit_sequence = entry.sequence,
            "permission rule committed"
        );

        Ok(RuleWrite {
            before,
            after,
            key_version: actual + 1,
            snapshot_version,
            audit_entry: entry.id,
        })
    }

    fn write_graph(
        &self,
        actor: &PrincipalId,
        change: impl FnOnce(&PolicySnapshot) -> Result<(HierarchyGraph, Option<HierarchyNode>, Option<HierarchyNode>), PolicyStoreError>,
    ) -> Result<u64, PolicyStoreError> {
        let mut state = self.write_state()?;

        let current = Arc::clone(&state.snapshot);
        let (graph, before, after) = change(&current)?;
        let next = PolicySnapshot::new(graph, current.rules().clone(), current.version() + 1)?;

        let entry = self.audited(self.audit.record_node_change(actor, before.as_ref(), after.as_ref()))?;

        let version = next.version();
        state.snapshot = Arc::new(next);

        let node_id = after.as_ref().or(before.as_ref()).map(|n| n.id.to_string());
        tracing::info!(
            actor = %actor,
            node_id = node_id.as_deref().unwrap_or("-"),
            snapshot_version = version,
            audit_sequence = entry.sequence,
            "hierarchy change committed"
        );
        Ok(version)
    }
}

impl<A: AuditSink> PolicyStore for InMemoryPolicyStore<A> {
    fn snapshot(&self) -> Result<Arc<PolicySnapshot>, PolicyStoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| PolicyStoreError::Storage("lock poisoned".to_string()))?;
        Ok(Arc::clone(&state.snapshot))
    }

    fn key_version(&self, node_id: &NodeId, module: &ModuleKey) -> Result<u64, PolicyStoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| PolicyStoreError::Storage("lock poisoned".to_string()))?;
        Ok(state
            .versions
            .get(&(node_id.clone(), module.clone()))
            .copied()
            .unwrap_or(0))
    }

    fn upsert_rule(
        &self,
        actor: &PrincipalId,
        rule: PermissionRule,
        expected: ExpectedVersion,
    ) -> Result<RuleWrite, PolicyStoreError> {
        let node_id = rule.node_id.clone();
        let module = rule.module.clone();
        self.write_rule(actor, &node_id, &module, expected, |rules| {
            let before = rules.upsert(rule.clone());
            Ok((before, Some(rule)))
        })
    }

    fn delete_rule(
        &self,
        actor: &PrincipalId,
        key: &RuleKey,
        expected: ExpectedVersion,
    ) -> Result<RuleWrite, PolicyStoreError> {
        self.write_rule(actor, &key.node_id, &key.module, expected, |rules| {
            let removed = rules
                .remove(key)
                .ok_or_else(|| PolicyStoreError::RuleNotFound(key.clone()))?;
            Ok((Some(removed), None))
        })
    }

    fn add_node(&self, actor: &PrincipalId, node: HierarchyNode) -> Result<u64, PolicyStoreError> {
        self.write_graph(actor, |snapshot| {
            let graph = snapshot.graph().with_node(node.clone())?;
            Ok((graph, None, Some(node)))
        })
    }

    fn move_node(&self, actor: &PrincipalId, node_id: &NodeId, new_parent: &NodeId) -> Result<u64, PolicyStoreError> {
        self.write_graph(actor, |snapshot| {
            let before = snapshot.graph().node(node_id)?.clone();
            let graph = snapshot.graph().with_parent(node_id, new_parent)?;
            let after = graph.node(node_id)?.clone();
            Ok((graph, Some(before), Some(after)))
        })
    }

    fn remove_node(&self, actor: &PrincipalId, node_id: &NodeId) -> Result<u64, PolicyStoreError> {
        self.write_graph(actor, |snapshot| {
            let count = snapshot.rules().bound_to(node_id);
            if count > 0 {
                return Err(PolicyStoreError::NodeHasRules {
                    node_id: node_id.clone(),
                    count,
                });
            }
            let before = snapshot.graph().node(node_id)?.clone();
            let graph = snapshot.graph().without_node(node_id)?;
            Ok((graph, Some(before), None))
        })
    }
}
