//! Permission rules and the in-memory rule index used by the resolver.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hrgate_core::{NodeId, RuleId};

use crate::{Action, Decision, ModuleKey, PermissionQuery, RuleSubject, Scope};

/// A raw permission declaration: who, where, what, and the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub id: RuleId,
    pub subject: RuleSubject,
    pub node_id: NodeId,
    pub module: ModuleKey,
    pub action: Action,
    pub scope: Scope,
    pub decision: Decision,
    pub source_timestamp: DateTime<Utc>,
}

impl PermissionRule {
    pub fn new(
        subject: RuleSubject,
        node_id: NodeId,
        query: PermissionQuery,
        decision: Decision,
        source_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RuleId::new(),
            subject,
            node_id,
            module: query.module,
            action: query.action,
            scope: query.scope,
            decision,
            source_timestamp,
        }
    }

    pub fn key(&self) -> RuleKey {
        RuleKey {
            subject: self.subject.clone(),
            node_id: self.node_id.clone(),
            module: self.module.clone(),
            action: self.action,
            scope: self.scope,
        }
    }

    pub fn query(&self) -> PermissionQuery {
        PermissionQuery {
            module: self.module.clone(),
            action: self.action,
            scope: self.scope,
        }
    }
}

/// Uniqueness key of a rule: at most one rule exists per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleKey {
    pub subject: RuleSubject,
    pub node_id: NodeId,
    pub module: ModuleKey,
    pub action: Action,
    pub scope: Scope,
}

impl RuleKey {
    pub fn query(&self) -> PermissionQuery {
        PermissionQuery {
            module: self.module.clone(),
            action: self.action,
            scope: self.scope,
        }
    }
}

impl core::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} @ {}: {}", self.subject, self.node_id, self.query())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleSetError {
    #[error("duplicate rule for {key} (rules {existing} and {duplicate})")]
    Duplicate {
        key: RuleKey,
        existing: RuleId,
        duplicate: RuleId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Slot {
    node_id: NodeId,
    query: PermissionQuery,
}

/// Index of permission rules, grouped by (node, module, action, scope).
///
/// Within a slot rules are keyed by subject, which makes the uniqueness
/// invariant structural: `upsert` replaces, it never duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    slots: BTreeMap<Slot, BTreeMap<RuleSubject, PermissionRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rows, failing on any duplicate key (a data-integrity violation).
    pub fn from_rules(rules: impl IntoIterator<Item = PermissionRule>) -> Result<Self, RuleSetError> {
        let mut set = Self::new();
        for rule in rules {
            if let Some(existing) = set.get(&rule.key()) {
                return Err(RuleSetError::Duplicate {
                    key: rule.key(),
                    existing: existing.id,
                    duplicate: rule.id,
                });
            }
            set.upsert(rule);
        }
        Ok(set)
    }

    /// Insert or replace the rule with the same key; returns the replaced rule.
    pub fn upsert(&mut self, rule: PermissionRule) -> Option<PermissionRule> {
        let slot = Slot {
            node_id: rule.node_id.clone(),
            query: rule.query(),
        };
        self.slots
            .entry(slot)
            .or_default()
            .insert(rule.subject.clone(), rule)
    }

    pub fn remove(&mut self, key: &RuleKey) -> Option<PermissionRule> {
        let slot = Slot {
            node_id: key.node_id.clone(),
            query: key.query(),
        };
        let bucket = self.slots.get_mut(&slot)?;
        let removed = bucket.remove(&key.subject);
        if bucket.is_empty() {
            self.slots.remove(&slot);
        }
        removed
    }

    pub fn get(&self, key: &RuleKey) -> Option<&PermissionRule> {
        let slot = Slot {
            node_id: key.node_id.clone(),
            query: key.query(),
        };
        self.slots.get(&slot)?.get(&key.subject)
    }

    /// Rules declared at `node_id` for exactly `query`, ordered by subject.
    pub fn rules_at<'a>(
        &'a self,
        node_id: &NodeId,
        query: &PermissionQuery,
    ) -> impl Iterator<Item = &'a PermissionRule> + 'a {
        let slot = Slot {
            node_id: node_id.clone(),
            query: query.clone(),
        };
        self.slots.get(&slot).into_iter().flat_map(|bucket| bucket.values())
    }

    /// Number of rules bound to `node_id`.
    pub fn bound_to(&self, node_id: &NodeId) -> usize {
        self.slots
            .iter()
            .filter(|(slot, _)| &slot.node_id == node_id)
            .map(|(_, bucket)| bucket.len())
            .sum()
    }

    /// All rules in deterministic (node, module, action, scope, subject) order.
    pub fn iter(&self) -> impl Iterator<Item = &PermissionRule> {
        self.slots.values().flat_map(|bucket| bucket.values())
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
