//! Command implementations, kept free of argument parsing and process IO so
//! they can be tested directly.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use hrgate_auth::{
    resolve, EffectivePermission, ModuleCatalog, PermissionChange, PermissionQuery, PolicyDocument, PolicySnapshot,
    Principal, SimulationReport, SimulationSubject, Simulator,
};
use hrgate_core::NodeId;
use hrgate_infra::EngineConfig;

/// A validated policy plus the module catalog to enumerate.
#[derive(Debug, Clone)]
pub struct LoadedPolicy {
    pub snapshot: PolicySnapshot,
    pub catalog: ModuleCatalog,
}

impl LoadedPolicy {
    pub fn from_path(path: &Path, config: &EngineConfig) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&text, config).with_context(|| format!("loading {}", path.display()))
    }

    /// A `modules` list in the document overrides the configured catalog.
    pub fn from_json(text: &str, config: &EngineConfig) -> Result<Self> {
        let document: PolicyDocument = serde_json::from_str(text).context("parsing policy document")?;
        let catalog = document
            .modules
            .clone()
            .map(ModuleCatalog::new)
            .unwrap_or_else(|| config.modules.clone());
        let snapshot = PolicySnapshot::from_document(document).context("validating policy document")?;
        Ok(Self { snapshot, catalog })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub root: Option<NodeId>,
    pub nodes: usize,
    pub rules: usize,
    pub modules: usize,
}

pub fn check(policy: &LoadedPolicy) -> CheckSummary {
    let graph = policy.snapshot.graph();
    CheckSummary {
        root: graph.root().map(|n| n.id.clone()),
        nodes: graph.len(),
        rules: policy.snapshot.rules().len(),
        modules: policy.catalog.len(),
    }
}

pub fn resolve_one(policy: &LoadedPolicy, principal: &Principal, query: &PermissionQuery) -> EffectivePermission {
    resolve(&policy.snapshot, principal, query)
}

pub fn simulate(policy: &LoadedPolicy, subject: &SimulationSubject, deadline: Duration) -> Result<SimulationReport> {
    Simulator::new(&policy.snapshot, &policy.catalog)
        .with_deadline(deadline)
        .simulate(subject)
        .context("running simulation")
}

/// Tuples whose outcome differs between two policies for the same subject.
pub fn diff(
    before: &LoadedPolicy,
    after: &LoadedPolicy,
    subject: &SimulationSubject,
    deadline: Duration,
) -> Result<Vec<PermissionChange>> {
    let old = simulate(before, subject, deadline).context("simulating the first policy")?;
    let new = simulate(after, subject, deadline).context("simulating the second policy")?;
    Ok(old.diff(&new))
}
