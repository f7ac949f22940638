//! `hrgate-auth` — hierarchical permission resolution for HR modules.
//!
//! This crate is pure: it owns the policy model (hierarchy, rules, snapshots),
//! the resolver, conflict detection and simulation. Storage, audit and
//! impersonation sessions live in `hrgate-infra`.

pub mod catalog;
pub mod conflicts;
pub mod hierarchy;
pub mod permissions;
pub mod principal;
pub mod resolver;
pub mod roles;
pub mod rules;
pub mod simulation;
pub mod snapshot;

pub use catalog::ModuleCatalog;
pub use conflicts::{detect_conflicts, ConflictKind, ConflictWarning, Severity};
pub use hierarchy::{HierarchyError, HierarchyGraph, HierarchyNode, NodeType};
pub use permissions::{Action, Decision, ModuleKey, PermissionQuery, Scope};
pub use principal::{Principal, RuleSubject, SubjectRank};
pub use resolver::{resolve, DecisionSource, EffectivePermission, Precedence, ResolutionError};
pub use roles::Role;
pub use rules::{PermissionRule, RuleKey, RuleSet, RuleSetError};
pub use simulation::{simulate, PermissionChange, SimulationError, SimulationReport, SimulationSubject, Simulator};
pub use snapshot::{PolicyDocument, PolicySnapshot, RuleRow, SnapshotError};
