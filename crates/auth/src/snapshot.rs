//! Immutable policy snapshots.
//!
//! A [`PolicySnapshot`] pairs a hierarchy graph with the rule index that was in
//! force at one store version. Resolution and simulation only ever read a
//! snapshot; writers build a new one and swap it in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use hrgate_core::{NodeId, RuleId};

use crate::hierarchy::{HierarchyError, HierarchyGraph, HierarchyNode};
use crate::rules::{PermissionRule, RuleSet, RuleSetError};
use crate::{Action, Decision, ModuleKey, RuleSubject, Scope};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error(transparent)]
    Rules(#[from] RuleSetError),

    #[error("rule {rule_id} is bound to unknown node '{node_id}'")]
    UnboundRule { rule_id: RuleId, node_id: NodeId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    graph: HierarchyGraph,
    rules: RuleSet,
    version: u64,
}

impl PolicySnapshot {
    /// Validate that every rule is bound to a node of `graph`.
    pub fn new(graph: HierarchyGraph, rules: RuleSet, version: u64) -> Result<Self, SnapshotError> {
        if let Some(rule) = rules.iter().find(|r| !graph.contains(&r.node_id)) {
            return Err(SnapshotError::UnboundRule {
                rule_id: rule.id,
                node_id: rule.node_id.clone(),
            });
        }
        Ok(Self {
            graph,
            rules,
            version,
        })
    }

    pub fn from_document(document: PolicyDocument) -> Result<Self, SnapshotError> {
        let graph = HierarchyGraph::from_nodes(document.nodes)?;
        let rules = RuleSet::from_rules(
            document
                .rules
                .into_iter()
                .enumerate()
                .map(|(idx, row)| row.into_rule(idx)),
        )?;
        Self::new(graph, rules, 0)
    }

    pub fn graph(&self) -> &HierarchyGraph {
        &self.graph
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Store version this snapshot was published at.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn to_document(&self) -> PolicyDocument {
        PolicyDocument {
            nodes: self.graph.nodes().cloned().collect(),
            rules: self.rules.iter().cloned().map(RuleRow::from).collect(),
            modules: None,
        }
    }
}

/// Serialized policy: the row shape the record store and the CLI exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub nodes: Vec<HierarchyNode>,
    #[serde(default)]
    pub rules: Vec<RuleRow>,
    /// Optional module catalog override for simulation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<ModuleKey>>,
}

/// A rule row; `id` and `source_timestamp` may be omitted in hand-written documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RuleId>,
    pub subject: RuleSubject,
    pub node_id: NodeId,
    pub module: ModuleKey,
    pub action: Action,
    pub scope: Scope,
    pub decision: Decision,
    #[serde(default)]
    pub source_timestamp: DateTime<Utc>,
}

impl RuleRow {
    /// Rows without an id get one derived from their position, so loading the
    /// same document twice yields identical rule ids.
    fn into_rule(self, position: usize) -> PermissionRule {
        PermissionRule {
            id: self
                .id
                .unwrap_or_else(|| RuleId::from_uuid(Uuid::from_u128(position as u128 + 1))),
            subject: self.subject,
            node_id: self.node_id,
            module: self.module,
            action: self.action,
            scope: self.scope,
            decision: self.decision,
            source_timestamp: self.source_timestamp,
        }
    }
}

impl From<PermissionRule> for RuleRow {
    fn from(rule: PermissionRule) -> Self {
        Self {
            id: Some(rule.id),
            subject: rule.subject,
            node_id: rule.node_id,
            module: rule.module,
            action: rule.action,
            scope: rule.scope,
            decision: rule.decision,
            source_timestamp: rule.source_timestamp,
        }
    }
}
