//! Transfer Error Types
//!
//! Error codes follow the `TRF_xxx` catalogue exposed on API responses:
//! 001-009 validation, 010-019 lookup, 020-029 account, 030-039 state,
//! 040-049 SAGA, 050-059 outbox, 090+ system.

use thiserror::Error;

use super::outbox::OutboxStatus;
use super::status::{SagaStatus, TransferStatus};
use crate::money::MoneyError;

/// Transfer error taxonomy
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Invalid transfer id format: {0}")]
    InvalidTransferIdFormat(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot transfer to the same account: {0}")]
    SameAccountTransfer(String),

    #[error("Invalid outbox event id format: {0}")]
    InvalidOutboxEventIdFormat(String),

    // === Lookup Errors ===
    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("Outbox event not found: {0}")]
    OutboxEventNotFound(String),

    // === Account Errors ===
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    // === State Errors ===
    #[error("Cannot cancel transfer in status {status}/{saga_status}")]
    CannotCancel {
        status: TransferStatus,
        saga_status: SagaStatus,
    },

    // === SAGA Errors ===
    #[error("Invalid SAGA transition: {from} -> {to}")]
    InvalidSagaTransition { from: SagaStatus, to: SagaStatus },

    // === Outbox Errors ===
    #[error("Only FAILED outbox events can be retried (current: {status})")]
    OutboxNotFailed { status: OutboxStatus },

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl TransferError {
    /// Get the stable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidTransferIdFormat(_) => "TRF_001",
            TransferError::InvalidAmount(_) => "TRF_002",
            TransferError::SameAccountTransfer(_) => "TRF_005",
            TransferError::InvalidOutboxEventIdFormat(_) => "TRF_007",
            TransferError::TransferNotFound(_) => "TRF_010",
            TransferError::OutboxEventNotFound(_) => "TRF_011",
            TransferError::InsufficientFunds(_) => "TRF_024",
            TransferError::CannotCancel { .. } => "TRF_033",
            TransferError::InvalidSagaTransition { .. } => "TRF_040",
            TransferError::OutboxNotFailed { .. } => "TRF_051",
            TransferError::DatabaseError(_) => "TRF_090",
            TransferError::SystemError(_) => "TRF_091",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidTransferIdFormat(_)
            | TransferError::InvalidAmount(_)
            | TransferError::SameAccountTransfer(_)
            | TransferError::InvalidOutboxEventIdFormat(_)
            | TransferError::InsufficientFunds(_) => 400,
            TransferError::TransferNotFound(_) | TransferError::OutboxEventNotFound(_) => 404,
            TransferError::CannotCancel { .. }
            | TransferError::InvalidSagaTransition { .. }
            | TransferError::OutboxNotFailed { .. } => 422,
            TransferError::DatabaseError(_) | TransferError::SystemError(_) => 500,
        }
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::DatabaseError(e.to_string())
    }
}

impl From<anyhow::Error> for TransferError {
    fn from(e: anyhow::Error) -> Self {
        TransferError::SystemError(e.to_string())
    }
}

impl From<MoneyError> for TransferError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::InvalidAmount(v) => TransferError::InvalidAmount(v),
            MoneyError::InsufficientFunds { .. } => TransferError::InsufficientFunds(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        TransferError::SystemError(format!("payload serialization failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::InvalidAmount("x".into()).code(), "TRF_002");
        assert_eq!(
            TransferError::SameAccountTransfer("111-222".into()).code(),
            "TRF_005"
        );
        assert_eq!(
            TransferError::InvalidSagaTransition {
                from: SagaStatus::Completed,
                to: SagaStatus::DebitPending,
            }
            .code(),
            "TRF_040"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::InvalidAmount("x".into()).http_status(), 400);
        assert_eq!(TransferError::TransferNotFound("x".into()).http_status(), 404);
        assert_eq!(
            TransferError::OutboxNotFailed {
                status: OutboxStatus::Pending
            }
            .http_status(),
            422
        );
        assert_eq!(TransferError::SystemError("x".into()).http_status(), 500);
    }

    #[test]
    fn test_money_error_conversion() {
        let err: TransferError = MoneyError::InvalidAmount("-1".into()).into();
        assert!(matches!(err, TransferError::InvalidAmount(_)));
    }
}
