//! Error types for the filer provisioner
//!
//! Every failure surfaced by the controller maps to exactly one [`Code`]
//! category so that an external orchestrator can retry idempotently.

use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("volume id {id:?} unexpected format: got {tokens} tokens")]
    MalformedIdentifier { id: String, tokens: usize },

    // =========================================================================
    // Allocation Errors
    // =========================================================================
    #[error("all of the /{prefix_len} IP ranges in the cidr {pool} are reserved")]
    PoolExhausted { pool: String, prefix_len: u8 },

    #[error("aborted: {0}")]
    Aborted(String),

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Provider operation failed: {operation}: {reason}")]
    Provider { operation: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Status category reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    InvalidArgument,
    AlreadyExists,
    NotFound,
    ResourceExhausted,
    Aborted,
    Internal,
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Code::InvalidArgument => write!(f, "invalid_argument"),
            Code::AlreadyExists => write!(f, "already_exists"),
            Code::NotFound => write!(f, "not_found"),
            Code::ResourceExhausted => write!(f, "resource_exhausted"),
            Code::Aborted => write!(f, "aborted"),
            Code::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Status category for this error
    pub fn code(&self) -> Code {
        match self {
            Error::InvalidArgument(_) | Error::MalformedIdentifier { .. } => Code::InvalidArgument,
            Error::AlreadyExists(_) => Code::AlreadyExists,
            Error::NotFound(_) | Error::ResourceNotFound { .. } => Code::NotFound,
            Error::PoolExhausted { .. } => Code::ResourceExhausted,
            Error::Aborted(_) => Code::Aborted,
            Error::Provider { .. }
            | Error::Internal(_)
            | Error::Configuration(_)
            | Error::Yaml(_)
            | Error::Io(_) => Code::Internal,
        }
    }

    /// Whether the error means the referenced resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ResourceNotFound { .. } | Error::NotFound(_))
    }

    /// Re-categorize an unexpected collaborator failure as `Internal`,
    /// keeping the original message.
    pub fn into_internal(self) -> Self {
        match self {
            Error::Internal(_) => self,
            other => Error::Internal(other.to_string()),
        }
    }

    /// Create an [`Error::Provider`] for a failed remote call
    pub fn provider<E: std::fmt::Display>(operation: &str, e: E) -> Self {
        Error::Provider {
            operation: operation.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;
