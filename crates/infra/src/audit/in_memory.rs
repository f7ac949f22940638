use std::sync::RwLock;

use chrono::Utc;

use hrgate_core::{AuditEntryId, PrincipalId};

use super::{AuditEntry, AuditError, AuditRecord, AuditSink};

/// In-memory append-only audit log.
///
/// Intended for tests/dev and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, AuditError> {
        self.entries
            .read()
            .map(|e| e.len())
            .map_err(|_| AuditError::ReadFailed("lock poisoned".to_string()))
    }

    pub fn is_empty(&self) -> Result<bool, AuditError> {
        Ok(self.len()? == 0)
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, actor: &PrincipalId, record: AuditRecord) -> Result<AuditEntry, AuditError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AuditError::WriteFailed("lock poisoned".to_string()))?;

        let entry = AuditEntry {
            id: AuditEntryId::new(),
            sequence: entries.len() as u64 + 1,
            actor: actor.clone(),
            recorded_at: Utc::now(),
            record,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditError::ReadFailed("lock poisoned".to_string()))?;
        Ok(entries.clone())
    }
}
