use crate::domain::account::{AccountKey, Balance};
use crate::domain::session::SessionState;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Insufficient balance in account {account}: has {balance}, requested {requested}")]
    InsufficientBalance {
        account: AccountKey,
        balance: Balance,
        requested: Decimal,
    },
    #[error("Account not found: {0}")]
    AccountNotFound(AccountKey),
    #[error("Write conflict on account {0}")]
    Conflict(AccountKey),
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),
    #[error("Invalid session state: expected {expected}, found {actual}")]
    InvalidSessionState {
        expected: SessionState,
        actual: SessionState,
    },
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<TransferError>,
    },
    #[error("Transfer cancelled before commit")]
    Cancelled,
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TransferError {
    /// Whether a fresh attempt of the whole transfer may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::Conflict(_) | TransferError::SessionUnavailable(_)
        )
    }

    /// Stable error code for transport layers.
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidArgument(_) => "INVALID_ARGUMENT",
            TransferError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::Conflict(_) => "CONFLICT",
            TransferError::SessionUnavailable(_) => "SESSION_UNAVAILABLE",
            TransferError::InvalidSessionState { .. } => "INVALID_SESSION_STATE",
            TransferError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            TransferError::Cancelled => "CANCELLED",
            TransferError::CsvError(_) => "CSV_ERROR",
            TransferError::IoError(_) => "IO_ERROR",
            TransferError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Suggested HTTP status when the coordinator sits behind an HTTP endpoint.
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidArgument(_)
            | TransferError::InsufficientBalance { .. }
            | TransferError::CsvError(_) => 400,
            TransferError::AccountNotFound(_) => 404,
            TransferError::Conflict(_) | TransferError::RetriesExhausted { .. } => 409,
            TransferError::Cancelled => 499,
            TransferError::SessionUnavailable(_) => 503,
            TransferError::InvalidSessionState { .. }
            | TransferError::IoError(_)
            | TransferError::InternalError(_) => 500,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for TransferError {
    fn from(e: rocksdb::Error) -> Self {
        TransferError::SessionUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        TransferError::InternalError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
