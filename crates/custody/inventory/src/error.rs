use custody_ledger::LedgerError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Relational store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Custody service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
