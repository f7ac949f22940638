//! Optimistic concurrency for per-key writes.

use crate::error::{DomainError, DomainResult};

/// Optimistic concurrency expectation for a versioned key.
///
/// Writers read the current version of the key they intend to change and pass
/// it back on write; a concurrent writer that committed first bumps the version
/// and the late writer is rejected instead of silently overwriting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (imports, migrations, single-writer tools).
    Any,
    /// Require the key to be at an exact version. `Exact(0)` means "never written".
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
