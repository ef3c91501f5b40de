use thiserror::Error;

use super::types::UserId;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Store connection error: {0}")]
    StoreConnection(String),

    #[error("Aggregation query error: {0}")]
    AggregationQuery(String),

    #[error("Archive write failed for user {user_id}: {message}")]
    ArchiveWrite { user_id: UserId, message: String },

    #[error("Delete failed for user {user_id}: {message}")]
    Delete { user_id: UserId, message: String },

    #[error("Report write error: {0}")]
    ReportWrite(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl ArchiveError {
    pub fn archive_write(user_id: UserId, message: impl Into<String>) -> Self {
        Self::ArchiveWrite {
            user_id,
            message: message.into(),
        }
    }

    pub fn delete(user_id: UserId, message: impl Into<String>) -> Self {
        Self::Delete {
            user_id,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

impl<T> From<std::sync::PoisonError<T>> for ArchiveError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for ArchiveError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ArchiveError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
