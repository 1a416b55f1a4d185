//! Error types for the memory manager.

use thiserror::Error;

/// Errors the memory manager can report.
///
/// Most of these map directly onto a failure mode described for the memory
/// manager: allocation can fail when a space is exhausted, a cycle can fail
/// mid-mark if an embedder root visitor panics, and a handful are internal
/// consistency checks that should never fire outside of a bug.
#[derive(Debug, Error)]
pub enum GcError {
    #[error("out of memory: requested {requested} bytes, available {available} bytes")]
    OutOfMemory { requested: usize, available: usize },

    #[error("heap initialization failed: {0}")]
    HeapInitialization(String),

    #[error("invalid pointer address: {address:#x}")]
    InvalidPointer { address: usize },

    #[error("gc cycle failed: {reason}")]
    GcCycleFailed { reason: String },

    #[error("marking phase failed: {0}")]
    MarkingFailed(String),

    #[error("relocation phase failed: {0}")]
    RelocationFailed(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bounds check failed: index {index} out of bounds for length {length}")]
    BoundsCheckFailed { index: usize, length: usize },

    #[error("alignment error: address {address:#x} is not aligned to {alignment} bytes")]
    AlignmentError { address: usize, alignment: usize },

    #[error("gc reentered while already running ({operation})")]
    Reentrant { operation: String },
}

impl GcError {
    /// Whether retrying the allocation (e.g. after a full GC) could help.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GcError::OutOfMemory { .. })
    }

    /// Whether this indicates a bug in the collector rather than resource
    /// pressure or bad embedder input.
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            GcError::InvalidState { .. } | GcError::BoundsCheckFailed { .. } | GcError::Internal(_)
        )
    }
}

/// Result type alias for memory manager operations.
pub type Result<T> = std::result::Result<T, GcError>;

/// Early-return with an error, same shape as `anyhow::bail!`.
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err(format!($fmt, $($arg)*).into())
    };
}

/// Return an error unless the condition holds.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
