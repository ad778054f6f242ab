use thiserror::Error;

/// Every component-specific error (scheduler status errors, cluster
/// transaction rollback failures, metastore version mismatches) is a
/// variant on this single enum rather than a separate error type per
/// module, matching the teacher's existing `DbError`.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Protocol status error: expected message type {expected}, got {got}")]
    StatusError { expected: u32, got: u32 },

    #[error("Too many open time windows: {0}")]
    TooManyTimeWindows(String),

    #[error("Not enough task buffer quota: {0}")]
    NotEnoughBuffer(String),

    #[error("Metadata version mismatch: {0}")]
    DataVersionMismatch(String),

    #[error("Job was freed before completion")]
    JobFreed,

    #[error("Job was cancelled: {0}")]
    JobCancelled(String),

    #[error("Query cancelled")]
    QueryCancelled,

    #[error("Task is already being executed by another thread")]
    TaskInExec,
}

impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Io(e) => DbError::Internal(e.to_string()),
            DbError::Transaction(s) => DbError::Transaction(s.clone()),
            DbError::Catalog(s) => DbError::Catalog(s.clone()),
            DbError::Execution(s) => DbError::Execution(s.clone()),
            DbError::Network(s) => DbError::Network(s.clone()),
            DbError::Serialization(s) => DbError::Serialization(s.clone()),
            DbError::Unavailable(s) => DbError::Unavailable(s.clone()),
            DbError::NotFound(s) => DbError::NotFound(s.clone()),
            DbError::InvalidInput(s) => DbError::InvalidInput(s.clone()),
            DbError::NotImplemented(s) => DbError::NotImplemented(s.clone()),
            DbError::Internal(s) => DbError::Internal(s.clone()),
            DbError::ResourceExhausted(s) => DbError::ResourceExhausted(s.clone()),
            DbError::PermissionDenied(s) => DbError::PermissionDenied(s.clone()),
            DbError::Timeout(s) => DbError::Timeout(s.clone()),
            DbError::InvalidState(s) => DbError::InvalidState(s.clone()),
            DbError::StatusError { expected, got } => DbError::StatusError { expected: *expected, got: *got },
            DbError::TooManyTimeWindows(s) => DbError::TooManyTimeWindows(s.clone()),
            DbError::NotEnoughBuffer(s) => DbError::NotEnoughBuffer(s.clone()),
            DbError::DataVersionMismatch(s) => DbError::DataVersionMismatch(s.clone()),
            DbError::JobFreed => DbError::JobFreed,
            DbError::JobCancelled(s) => DbError::JobCancelled(s.clone()),
            DbError::QueryCancelled => DbError::QueryCancelled,
            DbError::TaskInExec => DbError::TaskInExec,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<bincode::error::EncodeError> for DbError {
    fn from(e: bincode::error::EncodeError) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for DbError {
    fn from(e: bincode::error::DecodeError) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}
