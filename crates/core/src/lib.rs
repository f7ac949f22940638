//! `hrgate-core` — shared building blocks for the permission engine.
//!
//! This crate contains identifiers, the domain error model and optimistic
//! versioning. It has no knowledge of hierarchy, rules or storage.

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{AuditEntryId, NodeId, PrincipalId, RuleId, SessionId};
pub use version::ExpectedVersion;
