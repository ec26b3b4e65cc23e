//! Error types for atlasgate
//!
//! Two layers of errors:
//! - [`EngineError`]: what the storage engine reports, rendered in the
//!   engine's native text (`"Corruption: ..."`, `"IO error: ..."`).
//! - [`GateError`]: what callers of the access layer see. Every recoverable
//!   failure carries a stable discriminator via [`GateError::code`].
//!
//! Engine errors never cross the worker/calling-context boundary
//! unconverted: tasks record an `EngineError` on the worker and the
//! conversion below runs when the outcome is delivered.

use thiserror::Error;

/// Result type alias using GateError
pub type Result<T> = std::result::Result<T, GateError>;

/// Result type alias using EngineError
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors reported by a storage engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("NotFound: {0}")]
    NotFound(String),

    #[error("Corruption: {0}")]
    Corruption(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl From<bincode::Error> for EngineError {
    fn from(e: bincode::Error) -> Self {
        EngineError::Corruption(format!("bad record encoding: {}", e))
    }
}

/// Unified error type for access layer operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    // -------------------------------------------------------------------------
    // Engine Errors (converted)
    // -------------------------------------------------------------------------
    /// The store is locked by another handle or process
    #[error("{0}")]
    Locked(String),

    #[error("{0}")]
    Corruption(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Access Layer Errors
    // -------------------------------------------------------------------------
    /// An iterator batch completed after `abort()` was requested
    #[error("Operation has been aborted")]
    Aborted,

    /// The database (or its environment) is not open
    #[error("Database is not open: cannot call {0}()")]
    NotOpen(&'static str),

    #[error("{0}")]
    Other(String),
}

impl GateError {
    /// Stable discriminator for recoverable failures
    pub fn code(&self) -> Option<&'static str> {
        match self {
            GateError::Locked(_) => Some("LOCKED"),
            GateError::Corruption(_) => Some("CORRUPTION"),
            GateError::Io(_) => Some("IO_ERROR"),
            GateError::InvalidArgument(_) => Some("INVALID_ARGUMENT"),
            GateError::Aborted => Some("ABORTED"),
            GateError::NotOpen(_) => Some("NOT_OPEN"),
            GateError::Other(_) => None,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, GateError::Locked(_))
    }
}

/// Engine text prefixes identifying a lock failure (posix, windows)
const LOCK_PREFIXES: [&str; 2] = ["IO error: lock ", "IO error: LockFile "];

impl From<EngineError> for GateError {
    fn from(e: EngineError) -> Self {
        let message = e.to_string();
        match e {
            EngineError::Corruption(_) => GateError::Corruption(message),
            EngineError::Io(_) => {
                if LOCK_PREFIXES.iter().any(|p| message.starts_with(p)) {
                    GateError::Locked(message)
                } else {
                    GateError::Io(message)
                }
            }
            EngineError::InvalidArgument(_) => GateError::InvalidArgument(message),
            // NotFound is resolved as absent by the tasks that can see it
            EngineError::NotFound(_) | EngineError::Other(_) => GateError::Other(message),
        }
    }
}
