//! Error types for the resource runtime.
//!
//! Usage faults and invariant faults are returned as errors, never panics.
//! Per-resource data faults travel as failure events so sibling work continues.

use thiserror::Error;

use crate::manifest::ManifestError;

/// Errors surfaced by resource operations.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// An operation was called before its prerequisite setup, or while a
    /// conflicting operation is active.
    #[error("Usage error: {0}")]
    Usage(String),

    /// An internal invariant was violated (double-set snapshot, reference
    /// count violation on release, duplicate table entry).
    #[error("Invariant fault: {0}")]
    Fault(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Packed store error: {0}")]
    PackedStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResourceError {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub(crate) fn fault(msg: impl Into<String>) -> Self {
        Self::Fault(msg.into())
    }

    /// Returns true if this error is a caller mistake rather than bad data.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Returns true if this error is an internal invariant violation.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// Length/hash verification failures for a single resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("compressed length mismatch for {resource}: expected {expected}, got {actual}")]
    CompressedLength {
        resource: String,
        expected: u64,
        actual: u64,
    },

    #[error("compressed hash mismatch for {resource}: expected {expected:08x}, got {actual:08x}")]
    CompressedHash {
        resource: String,
        expected: u32,
        actual: u32,
    },

    #[error("length mismatch for {resource}: expected {expected}, got {actual}")]
    Length {
        resource: String,
        expected: u64,
        actual: u64,
    },

    #[error("hash mismatch for {resource}: expected {expected:08x}, got {actual:08x}")]
    Hash {
        resource: String,
        expected: u32,
        actual: u32,
    },

    #[error("decompression failed for {resource}: {reason}")]
    Decompress { resource: String, reason: String },
}

/// Outcome classification for load requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadResourceStatus {
    Success,
    /// Asset or resource is unknown, or its bytes could not be read.
    NotExist,
    /// Resource is known but not downloaded yet.
    NotReady,
    /// A dependency asset could not be resolved or failed to load.
    DependencyError,
    /// Asset/binary requested through the wrong entry point.
    TypeError,
    /// The decoder rejected the bundle or asset.
    AssetError,
}

impl std::fmt::Display for LoadResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::NotExist => "not_exist",
            Self::NotReady => "not_ready",
            Self::DependencyError => "dependency_error",
            Self::TypeError => "type_error",
            Self::AssetError => "asset_error",
        };
        f.write_str(s)
    }
}

/// A recoverable load rejection or failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct LoadFailure {
    pub status: LoadResourceStatus,
    pub message: String,
}

impl LoadFailure {
    pub fn new(status: LoadResourceStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_and_fault_are_distinguished() {
        assert!(ResourceError::usage("x").is_usage());
        assert!(!ResourceError::usage("x").is_fault());
        assert!(ResourceError::fault("y").is_fault());
    }

    #[test]
    fn load_failure_display_includes_status() {
        let f = LoadFailure::new(LoadResourceStatus::NotReady, "asset 'a' is not ready");
        assert_eq!(f.to_string(), "not_ready: asset 'a' is not ready");
    }

    #[test]
    fn integrity_hash_formats_hex() {
        let e = IntegrityError::Hash {
            resource: "r.dat".into(),
            expected: 0xAB,
            actual: 0x1,
        };
        assert!(e.to_string().contains("000000ab"));
    }
}
