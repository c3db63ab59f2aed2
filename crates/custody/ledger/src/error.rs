use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-layer errors.
///
/// `Validation` is raised before any write is attempted. Nothing in this crate
/// retries on any of these; callers decide whether a failure is logged or
/// escalated.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid {kind} `{value}`")]
    Validation { kind: &'static str, value: String },

    #[error("ledger backend unreachable: {0}")]
    Connectivity(String),

    #[error("ledger write failed: {0}")]
    Write(String),

    #[error("ledger read failed: {0}")]
    Read(String),

    #[error("integrity verification could not complete: {0}")]
    VerificationIncomplete(String),

    #[error("not implemented by this backend: {0}")]
    Unimplemented(String),

    #[error("ledger is closed")]
    Closed,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    pub(crate) fn validation(kind: &'static str, value: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            value: value.into(),
        }
    }

    /// Whether the caller can fix the request and try again.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}
