//! Infrastructure layer: policy store, audit log, impersonation sessions, config.

pub mod audit;
pub mod config;
pub mod impersonation;
pub mod policy_store;

#[cfg(test)]
mod integration_tests;

pub use audit::{AuditEntry, AuditError, AuditRecord, AuditSink, InMemoryAuditSink};
pub use config::{ConfigError, EngineConfig};
pub use impersonation::{ImpersonationError, ImpersonationManager, ImpersonationSession};
pub use policy_store::{InMemoryPolicyStore, PolicyStore, PolicyStoreError, RuleWrite};
