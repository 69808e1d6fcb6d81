//! Error types for Terra.

use thiserror::Error;

/// Top-level error type for Terra operations.
#[derive(Debug, Error)]
pub enum TerraError {
    /// Unusable setup: missing GPU context, zero-sized grid, disposed pool
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persisted or transported terrain data failed validation
    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// A named map, save, or asset does not exist
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up (e.g. "map", "save")
        kind: &'static str,
        /// Name that was requested
        name: String,
    },

    /// A save, map or export name contains characters a file name cannot hold
    #[error("Invalid name: {0}")]
    InvalidName(String),

    /// A resource pool was used in a way that breaks its ownership rules
    #[error("Resource pool invariant violated: {0}")]
    PoolInvariant(String),

    /// GPU errors
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },
}

impl TerraError {
    /// Shorthand for a [`TerraError::NotFound`].
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether the caller can keep its previous state and continue.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CorruptedData(_)
                | Self::NotFound { .. }
                | Self::InvalidName(_)
                | Self::Io(_)
                | Self::Serialization(_)
                | Self::VersionMismatch { .. }
        )
    }
}

/// GPU-specific errors.
#[derive(Debug, Error)]
pub enum GpuError {
    /// A handle does not refer to a live GPU object
    #[error("Unknown GPU handle: {0}")]
    InvalidHandle(String),

    /// Texture upload size does not match the target
    #[error("Upload size mismatch: expected {expected} bytes, got {actual}")]
    UploadSize {
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// GPU to CPU copy failed
    #[error("Readback failed: {0}")]
    ReadbackFailed(String),
}

/// Result type alias for Terra operations.
pub type TerraResult<T> = Result<T, TerraError>;
