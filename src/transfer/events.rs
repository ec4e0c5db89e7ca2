//! Domain Event Catalogue
//!
//! Event types, their broker topics, and the JSON payload shared by all of
//! them. Events are never published directly: they are enqueued through the
//! outbox in the same transaction as the state change they announce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::TransferError;
use super::model::Transfer;
use super::outbox::OutboxEvent;

/// Topic carrying debit/credit/rollback commands to the account service
pub const TOPIC_ACCOUNT_COMMAND: &str = "account.command";
/// Topic carrying final transfer outcomes to downstream consumers
pub const TOPIC_TRANSFER_RESULT: &str = "transfer.result";
/// Topic for conditions needing operator attention
pub const TOPIC_TRANSFER_ALERT: &str = "transfer.alert";

/// Every event the transfer SAGA can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Command: withdraw `amount` from the source account
    DebitRequested,
    /// Command: deposit `amount` into the destination account
    CreditRequested,
    /// Command: reverse a completed debit
    DebitRollbackRequested,
    /// Notification: transfer finished successfully
    TransferCompleted,
    /// Notification: transfer finished unsuccessfully
    TransferFailed,
    /// Notification: transfer cancelled before money moved
    TransferCancelled,
    /// Alert: compensation could not be applied, manual intervention needed
    CompensationFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DebitRequested => "DEBIT_REQUESTED",
            EventType::CreditRequested => "CREDIT_REQUESTED",
            EventType::DebitRollbackRequested => "DEBIT_ROLLBACK_REQUESTED",
            EventType::TransferCompleted => "TRANSFER_COMPLETED",
            EventType::TransferFailed => "TRANSFER_FAILED",
            EventType::TransferCancelled => "TRANSFER_CANCELLED",
            EventType::CompensationFailed => "COMPENSATION_FAILED",
        }
    }

    /// Broker topic this event is delivered on.
    pub fn topic(&self) -> &'static str {
        match self {
            EventType::DebitRequested
            | EventType::CreditRequested
            | EventType::DebitRollbackRequested => TOPIC_ACCOUNT_COMMAND,
            EventType::TransferCompleted
            | EventType::TransferFailed
            | EventType::TransferCancelled => TOPIC_TRANSFER_RESULT,
            EventType::CompensationFailed => TOPIC_TRANSFER_ALERT,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JSON payload carried by every transfer event.
///
/// `amount` is serialized as a string so consumers never touch binary
/// floating point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEventPayload {
    pub event_type: String,
    pub transfer_id: String,
    pub from_account: String,
    pub to_account: String,
    pub amount: String,
    pub saga_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl TransferEventPayload {
    fn from_transfer(transfer: &Transfer, event_type: EventType) -> Self {
        Self {
            event_type: event_type.as_str().to_string(),
            transfer_id: transfer.id().to_string(),
            from_account: transfer.from_account().to_string(),
            to_account: transfer.to_account().to_string(),
            amount: transfer.amount().to_string(),
            saga_status: transfer.saga_status().as_str().to_string(),
            fail_reason: transfer.fail_reason().map(str::to_string),
            occurred_at: Utc::now(),
        }
    }
}

/// Build the outbox entry announcing `event_type` for `transfer`.
pub fn outbox_event_for(
    transfer: &Transfer,
    event_type: EventType,
) -> Result<OutboxEvent, TransferError> {
    let payload = TransferEventPayload::from_transfer(transfer, event_type);
    Ok(OutboxEvent::create(
        transfer.id().clone(),
        event_type.as_str().to_string(),
        event_type.topic().to_string(),
        serde_json::to_string(&payload)?,
    ))
}
