//! The module contains the errors the local store can return.
//!
//! - [`NotInitialized`] the handle was used before `open` completed (or after
//!   `close`); retry once the store is open.
//! - [`StoreUnavailable`] the database could not be opened at all.
//! - [`WriteRejected`] a record broke a constraint (missing key, unique
//!   index); the caller must fix the record.
//!
//!  [`NotInitialized`]: StoreError::NotInitialized
//!  [`StoreUnavailable`]: StoreError::StoreUnavailable
//!  [`WriteRejected`]: StoreError::WriteRejected
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Local store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store not initialized!")]
    NotInitialized,
    #[error("Local storage unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Write rejected: {0}")]
    WriteRejected(String),
    #[error("\"{0}\" collection not found!")]
    UnknownCollection(String),
    #[error("Version conflict: requested {requested}, stored {stored}")]
    VersionConflict { requested: u32, stored: u32 },
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl StoreError {
    /// Map a database error raised by a write, turning constraint failures
    /// into [`StoreError::WriteRejected`].
    pub(crate) fn from_write(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => Self::WriteRejected(msg),
            _ => Self::Database(err),
        }
    }
}

impl PartialEq for StoreError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotInitialized, Self::NotInitialized) => true,
            (Self::StoreUnavailable(a), Self::StoreUnavailable(b)) => a == b,
            (Self::WriteRejected(a), Self::WriteRejected(b)) => a == b,
            (Self::UnknownCollection(a), Self::UnknownCollection(b)) => a == b,
            (
                Self::VersionConflict {
                    requested: a,
                    stored: b,
                },
                Self::VersionConflict {
                    requested: c,
                    stored: d,
                },
            ) => a == c && b == d,
            (Self::InvalidSchema(a), Self::InvalidSchema(b)) => a == b,
            (Self::Serialization(a), Self::Serialization(b)) => a.to_string() == b.to_string(),
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
