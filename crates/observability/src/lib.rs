//! Tracing/logging setup shared by binaries.
//!
//! Library crates only emit `tracing` events; installing a subscriber is the
//! binary's job and happens through [`init`] or [`init_with`].

pub mod tracing;

pub use crate::tracing::{LogFormat, ParseLogFormatError};

/// Initialize process-wide tracing with JSON output.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    crate::tracing::init(LogFormat::Json);
}

/// Initialize process-wide tracing with the given output format.
pub fn init_with(format: LogFormat) {
    crate::tracing::init(format);
}
