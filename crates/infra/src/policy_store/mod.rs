//! Versioned policy store boundary.
//!
//! Readers take an `Arc<PolicySnapshot>` and resolve against it without
//! holding any lock. Writers go through [`PolicyStore`], which checks the
//! per-(node, module) version, writes the audit entry, and only then publishes
//! a new snapshot.

pub mod in_memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrgate_auth::{HierarchyError, HierarchyNode, ModuleKey, PermissionRule, PolicySnapshot, RuleKey, SnapshotError};
use hrgate_core::{AuditEntryId, ExpectedVersion, NodeId, PrincipalId};

use crate::audit::AuditError;

pub use in_memory::InMemoryPolicyStore;

/// Outcome of a committed rule write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleWrite {
    pub before: Option<PermissionRule>,
    pub after: Option<PermissionRule>,
    /// Version of the (node, module) key after the write.
    pub key_version: u64,
    /// Version of the published snapshot.
    pub snapshot_version: u64,
    pub audit_entry: AuditEntryId,
}

#[derive(Debug, Error)]
pub enum PolicyStoreError {
    #[error("optimistic concurrency check failed for {node_id}/{module}: expected {expected:?}, found {actual}")]
    Concurrency {
        node_id: NodeId,
        module: ModuleKey,
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("rule not found: {0}")]
    RuleNotFound(RuleKey),

    #[error("node '{node_id}' still has {count} bound rule(s)")]
    NodeHasRules { node_id: NodeId, count: usize },

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The audit entry could not be written; the mutation was not applied.
    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("policy store unavailable: {0}")]
    Storage(String),
}

/// Versioned store of hierarchy nodes and permission rules.
///
/// Every mutating call writes exactly one audit entry before it succeeds. If
/// the audit write fails the mutation is rejected and the published snapshot
/// is unchanged.
pub trait PolicyStore: Send + Sync {
    /// The currently published snapshot.
    fn snapshot(&self) -> Result<Arc<PolicySnapshot>, PolicyStoreError>;

    /// Current version of a (node, module) key; `0` if never written.
    fn key_version(&self, node_id: &NodeId, module: &ModuleKey) -> Result<u64, PolicyStoreError>;

    /// Insert or replace the rule at `rule.key()`.
    fn upsert_rule(
        &self,
        actor: &PrincipalId,
        rule: PermissionRule,
        expected: ExpectedVersion,
    ) -> Result<RuleWrite, PolicyStoreError>;

    fn delete_rule(
        &self,
        actor: &PrincipalId,
        key: &RuleKey,
        expected: ExpectedVersion,
    ) -> Result<RuleWrite, PolicyStoreError>;

    /// Returns the new snapshot version.
    fn add_node(&self, actor: &PrincipalId, node: HierarchyNode) -> Result<u64, PolicyStoreError>;

    fn move_node(&self, actor: &PrincipalId, node_id: &NodeId, new_parent: &NodeId) -> Result<u64, PolicyStoreError>;

    /// Only allowed once the node has no children and no bound rules.
    fn remove_node(&self, actor: &PrincipalId, node_id: &NodeId) -> Result<u64, PolicyStoreError>;
}

impl<S> PolicyStore for Arc<S>
where
    S: PolicyStore + ?Sized,
{
    fn snapshot(&self) -> Result<Arc<PolicySnapshot>, PolicyStoreError> {
        (**self).snapshot()
    }

    fn key_version(&self, node_id: &NodeId, module: &ModuleKey) -> Result<u64, PolicyStoreError> {
        (**self).key_version(node_id, module)
    }

    fn upsert_rule(
        &self,
        actor: &PrincipalId,
        rule: PermissionRule,
        expected: ExpectedVersion,
    ) -> Result<RuleWrite, PolicyStoreError> {
        (**self).upsert_rule(actor, rule, expected)
    }

    fn delete_rule(
        &self,
        actor: &PrincipalId,
        key: &RuleKey,
        expected: ExpectedVersion,
    ) -> Result<RuleWrite, PolicyStoreError> {
        (**self).delete_rule(actor, key, expected)
    }

    fn add_node(&self, actor: &PrincipalId, node: HierarchyNode) -> Result<u64, PolicyStoreError> {
        (**self).add_node(actor, node)
    }

    fn move_node(&self, actor: &PrincipalId, node_id: &NodeId, new_parent: &NodeId) -> Result<u64, PolicyStoreError> {
        (**self).move_node(actor, node_id, new_parent)
    }

    fn remove_node(&self, actor: &PrincipalId, node_id: &NodeId) -> Result<u64, PolicyStoreError> {
        (**self).remove_node(actor, node_id)
    }
}
