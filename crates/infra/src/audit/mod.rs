//! Append-only audit log.
//!
//! Every rule mutation, node mutation and impersonation session is recorded
//! here **before** it takes effect. If the sink cannot persist an entry, the
//! triggering operation fails; there is no best-effort mode.

pub mod export;
pub mod in_memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrgate_auth::{HierarchyNode, PermissionRule, Principal};
use hrgate_core::{AuditEntryId, PrincipalId, SessionId};

pub use export::{export_csv, export_json_lines};
pub use in_memory::InMemoryAuditSink;

/// How an impersonation session ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    Ended,
    TimedOut,
}

/// One impersonation ("tunnel") session as written to the log.
///
/// Written once when the session starts (`ended_at = None`) and once more when
/// it ends explicitly or by timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub target: Principal,
    pub justification: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end: Option<SessionEnd>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    /// `before = None` is a create, `after = None` a delete.
    RuleChange {
        before: Option<PermissionRule>,
        after: Option<PermissionRule>,
    },
    NodeChange {
        before: Option<HierarchyNode>,
        after: Option<HierarchyNode>,
    },
    ImpersonationSession(SessionRecord),
}

impl AuditRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditRecord::RuleChange { .. } => "rule_change",
            AuditRecord::NodeChange { .. } => "node_change",
            AuditRecord::ImpersonationSession(_) => "impersonation_session",
        }
    }
}

/// A persisted audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    /// Position in the log, starting at 1, gap-free.
    pub sequence: u64,
    pub actor: PrincipalId,
    pub recorded_at: DateTime<Utc>,
    pub record: AuditRecord,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit write failed: {0}")]
    WriteFailed(String),

    #[error("audit read failed: {0}")]
    ReadFailed(String),

    #[error("audit export failed: {0}")]
    Export(String),
}

/// Append-only audit sink.
///
/// Implementations must assign gap-free, monotonically increasing sequence
/// numbers and must return an error rather than drop an entry.
pub trait AuditSink: Send + Sync {
    fn append(&self, actor: &PrincipalId, record: AuditRecord) -> Result<AuditEntry, AuditError>;

    /// All entries, ordered by sequence number.
    fn entries(&self) -> Result<Vec<AuditEntry>, AuditError>;

    fn record_rule_change(
        &self,
        actor: &PrincipalId,
        before: Option<&PermissionRule>,
        after: Option<&PermissionRule>,
    ) -> Result<AuditEntry, AuditError> {
        self.append(
            actor,
            AuditRecord::RuleChange {
                before: before.cloned(),
                after: after.cloned(),
            },
        )
    }

    fn record_node_change(
        &self,
        actor: &PrincipalId,
        before: Option<&HierarchyNode>,
        after: Option<&HierarchyNode>,
    ) -> Result<AuditEntry, AuditError> {
        self.append(
            actor,
            AuditRecord::NodeChange {
                before: before.cloned(),
                after: after.cloned(),
            },
        )
    }

    fn record_impersonation_session(
        &self,
        actor: &PrincipalId,
        session: SessionRecord,
    ) -> Result<AuditEntry, AuditError> {
        self.append(actor, AuditRecord::ImpersonationSession(session))
    }
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn append(&self, actor: &PrincipalId, record: AuditRecord) -> Result<AuditEntry, AuditError> {
        (**self).append(actor, record)
    }

    fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        (**self).entries()
    }
}
