// src/error.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Error taxonomy shared by every store backend.
//!
//! Only two conditions are ever turned into non-error outcomes by the crate:
//! `PreconditionFailed` on a write-once write and `StopIteration` returned from
//! a walk callback. Everything else reaches the caller untouched.

use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A create-if-absent write found an object already at the key.
    #[error("object already exists: {0}")]
    PreconditionFailed(String),

    /// Returned by a walk callback to end enumeration early.
    #[error("enumeration stopped by caller")]
    StopIteration,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid store url: {0}")]
    InvalidUrl(String),

    #[error("unsupported store scheme: {0} (supported: s3://, gs://, file://, mem://)")]
    UnsupportedScheme(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Provider failures and caller callback errors, carried verbatim.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, StoreError::StopIteration)
    }

    /// Wrap a provider SDK error without losing its source chain.
    pub(crate) fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Other(anyhow::Error::new(err))
    }
}

impl From<url::ParseError> for StoreError {
    fn from(err: url::ParseError) -> Self {
        StoreError::InvalidUrl(err.to_string())
    }
}
