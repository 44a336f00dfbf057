//! Structured error types for nmscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! "Not found" is never an error here: lookups return `Ok(None)` and only
//! malformed input or a mismatched layout surfaces as [`InspectError`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Memory at 0x{address:x} (+{length} bytes) is not present in the image")]
    Unmapped { address: u64, length: usize },

    #[error("Layout has no entry for {structure}::{field}")]
    MissingLayout { structure: String, field: String },

    #[error("Malformed {what} at 0x{address:x}")]
    Malformed { what: &'static str, address: u64 },

    #[error("Blob at 0x{0:x} is not a compiled method")]
    NotCompiledMethod(u64),

    #[error("Unsupported pointer size {0} (expected 4 or 8)")]
    UnsupportedPointerSize(u8),
}

impl InspectError {
    pub(crate) fn malformed(what: &'static str, address: u64) -> Self {
        InspectError::Malformed { what, address }
    }

    pub(crate) fn missing(structure: &str, field: &str) -> Self {
        InspectError::MissingLayout { structure: structure.to_string(), field: field.to_string() }
    }
}

/// Problems building a [`SnapshotImage`](crate::memory::SnapshotImage)
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Region at 0x{base:x} overlaps an existing region")]
    OverlappingRegion { base: u64 },

    #[error("Invalid address literal: {0}")]
    InvalidAddress(String),

    #[error("Core file has no loadable segments")]
    NoLoadableSegments,
}
