//! CSV and JSON Lines export of the audit log.
//!
//! Both formats emit entries in sequence order. CSV flattens every record kind
//! into one fixed column set so the file opens cleanly in a spreadsheet; JSON
//! Lines keeps the full structure, one entry per line.

use std::io::Write;

use serde::Serialize;

use hrgate_auth::HierarchyNode;

use super::{AuditEntry, AuditError, AuditRecord};

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    sequence: u64,
    entry_id: String,
    recorded_at: String,
    actor: &'a str,
    kind: &'static str,
    node_id: Option<&'a str>,
    subject: Option<String>,
    permission: Option<String>,
    before: Option<String>,
    after: Option<String>,
    target: Option<&'a str>,
    justification: Option<&'a str>,
    started_at: Option<String>,
    ended_at: Option<String>,
}

impl<'a> CsvRow<'a> {
    fn from_entry(entry: &'a AuditEntry) -> Self {
        let mut row = CsvRow {
            sequence: entry.sequence,
            entry_id: entry.id.to_string(),
            recorded_at: entry.recorded_at.to_rfc3339(),
            actor: entry.actor.as_str(),
            kind: entry.record.kind(),
            node_id: None,
            subject: None,
            permission: None,
            before: None,
            after: None,
            target: None,
            justification: None,
            started_at: None,
            ended_at: None,
        };

        match &entry.record {
            AuditRecord::RuleChange { before, after } => {
                if let Some(rule) = after.as_ref().or(before.as_ref()) {
                    row.node_id = Some(rule.node_id.as_str());
                    row.subject = Some(rule.subject.to_string());
                    row.permission = Some(rule.query().to_string());
                }
                row.before = before.as_ref().map(|r| r.decision.to_string());
                row.after = after.as_ref().map(|r| r.decision.to_string());
            }
            AuditRecord::NodeChange { before, after } => {
                if let Some(node) = after.as_ref().or(before.as_ref()) {
                    row.node_id = Some(node.id.as_str());
                }
                let describe = |node: &HierarchyNode| {
                    let parent = node.parent_id.as_ref().map(|p| p.as_str()).unwrap_or("-");
                    format!("{} {} under {}", node.node_type.as_str(), node.name, parent)
                };
                row.before = before.as_ref().map(describe);
                row.after = after.as_ref().map(describe);
            }
            AuditRecord::ImpersonationSession(session) => {
                row.node_id = Some(session.target.node_id.as_str());
                row.target = Some(session.target.id.as_str());
                row.justification = Some(session.justification.as_str());
                row.started_at = Some(session.started_at.to_rfc3339());
                row.ended_at = session.ended_at.map(|t| t.to_rfc3339());
            }
        }
        row
    }
}

/// Write `entries` as CSV with a header row.
pub fn export_csv<W: Write>(entries: &[AuditEntry], writer: W) -> Result<(), AuditError> {
    let mut out = csv::Writer::from_writer(writer);
    for entry in sorted(entries) {
        out.serialize(CsvRow::from_entry(entry))
            .map_err(|e| AuditError::Export(format!("csv row {}: {e}", entry.sequence)))?;
    }
    out.flush().map_err(|e| AuditError::Export(format!("csv flush: {e}")))
}

/// Write `entries` as JSON Lines.
pub fn export_json_lines<W: Write>(entries: &[AuditEntry], mut writer: W) -> Result<(), AuditError> {
    for entry in sorted(entries) {
        serde_json::to_writer(&mut writer, entry)
            .map_err(|e| AuditError::Export(format!("json entry {}: {e}", entry.sequence)))?;
        writer
            .write_all(b"\n")
            .map_err(|e| AuditError::Export(e.to_string()))?;
    }
    writer.flush().map_err(|e| AuditError::Export(e.to_string()))
}

fn sorted(entries: &[AuditEntry]) -> Vec<&AuditEntry> {
    let mut out: Vec<&AuditEntry> = entries.iter().collect();
    out.sort_by_key(|e| e.sequence);
    out
}
