//! Transactional Outbox Entry
//!
//! An outbox event is written in the same database transaction as the
//! business change it announces, then delivered asynchronously by the
//! publisher loop. Delivery is at-least-once; consumers must tolerate
//! duplicates.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::error::TransferError;
use super::types::{OutboxEventId, TransferId};

/// Delivery attempts before an event parks as FAILED
pub const DEFAULT_MAX_RETRY: i32 = 3;

/// The only aggregate this outbox serves
pub const AGGREGATE_TYPE: &str = "Transfer";

/// Outbox delivery state.
///
/// ```text
/// PENDING → SENT
/// PENDING → FAILED → PENDING  (manual retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxStatus {
    /// Awaiting delivery (or re-queued after a manual retry)
    Pending,
    /// Terminal: delivered to the broker
    Sent,
    /// Retry ceiling reached, parked for manual intervention
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Sent => "SENT",
            OutboxStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OutboxStatus::Pending),
            "SENT" => Ok(OutboxStatus::Sent),
            "FAILED" => Ok(OutboxStatus::Failed),
            _ => Err(()),
        }
    }
}

/// One queued domain event, owned by a transfer.
#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub(crate) event_id: OutboxEventId,
    pub(crate) transfer_id: TransferId,
    pub(crate) event_type: String,
    pub(crate) topic: String,
    pub(crate) payload: String,
    pub(crate) status: OutboxStatus,
    pub(crate) retry_count: i32,
    pub(crate) last_error: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) sent_at: Option<DateTime<Utc>>,
}

/// All persisted fields, for trusted rehydration from storage.
#[derive(Debug, Clone)]
pub struct OutboxEventParts {
    pub event_id: OutboxEventId,
    pub transfer_id: TransferId,
    pub event_type: String,
    pub topic: String,
    pub payload: String,
    pub status: OutboxStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// New PENDING event with a fresh id and zero retries.
    pub fn create(
        transfer_id: TransferId,
        event_type: String,
        topic: String,
        payload: String,
    ) -> Self {
        Self {
            event_id: OutboxEventId::generate(),
            transfer_id,
            event_type,
            topic,
            payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
            sent_at: None,
        }
    }

    /// Rehydrate from storage. Trusted: no validation.
    pub fn restore(parts: OutboxEventParts) -> Self {
        Self {
            event_id: parts.event_id,
            transfer_id: parts.transfer_id,
            event_type: parts.event_type,
            topic: parts.topic,
            payload: parts.payload,
            status: parts.status,
            retry_count: parts.retry_count,
            last_error: parts.last_error,
            created_at: parts.created_at,
            sent_at: parts.sent_at,
        }
    }

    pub fn id(&self) -> &OutboxEventId {
        &self.event_id
    }

    pub fn aggregate_type(&self) -> &'static str {
        AGGREGATE_TYPE
    }

    /// Weak reference to the owning transfer: lookup only, no ownership
    pub fn transfer_id(&self) -> &TransferId {
        &self.transfer_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn status(&self) -> OutboxStatus {
        self.status
    }

    pub fn retry_count(&self) -> i32 {
        self.retry_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    /// Delivery confirmed. Unconditional: a duplicate confirmation after a
    /// publisher crash-and-replay is harmless and must not error.
    pub fn mark_as_sent(&mut self) {
        self.status = OutboxStatus::Sent;
        self.sent_at = Some(Utc::now());
    }

    /// Record one failed delivery attempt. At the retry ceiling the event
    /// parks as FAILED and the publisher stops touching it.
    pub fn record_failure(&mut self, error: &str, max_retry: i32) {
        self.retry_count += 1;
        self.last_error = Some(error.to_string());
        if self.retry_count >= max_retry {
            self.status = OutboxStatus::Failed;
        }
    }

    /// Park the event without consuming the remaining retry budget.
    pub fn mark_as_failed(&mut self) {
        self.status = OutboxStatus::Failed;
    }

    /// Manual re-queue of a parked event.
    ///
    /// Keeps `retry_count` so the audit trail shows total attempts; the
    /// publisher will park it again after a single further failure unless
    /// the underlying problem was fixed.
    pub fn request_retry(&mut self) -> Result<(), TransferError> {
        if self.status != OutboxStatus::Failed {
            return Err(TransferError::OutboxNotFailed {
                status: self.status,
            });
        }
        self.status = OutboxStatus::Pending;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_event() -> OutboxEvent {
        OutboxEvent::create(
            TransferId::generate(),
            "TRANSFER_COMPLETED".to_string(),
            "transfer.result".to_string(),
            r#"{"transferId":"TRF-a1b2c3d4"}"#.to_string(),
        )
    }

    #[test]
    fn test_create_initial_state() {
        let e = new_event();
        assert_eq!(e.status(), OutboxStatus::Pending);
        assert_eq!(e.retry_count(), 0);
        assert!(e.last_error().is_none());
        assert!(e.sent_at().is_none());
    }

    #[test]
    fn test_mark_as_sent() {
        let mut e = new_event();
        e.mark_as_sent();
        assert_eq!(e.status(), OutboxStatus::Sent);
        assert!(e.sent_at().is_some());

        // Duplicate confirmation is a no-op in effect
        e.mark_as_sent();
        assert_eq!(e.status(), OutboxStatus::Sent);
    }

    #[test]
    fn test_failure_below_ceiling_stays_pending() {
        let mut e = new_event();
        e.record_failure("broker timeout", DEFAULT_MAX_RETRY);
        e.record_failure("broker timeout", DEFAULT_MAX_RETRY);

        assert_eq!(e.status(), OutboxStatus::Pending);
        assert_eq!(e.retry_count(), 2);
        assert_eq!(e.last_error(), Some("broker timeout"));
    }

    #[test]
    fn test_failure_at_ceiling_parks_failed() {
        let mut e = new_event();
        for _ in 0..DEFAULT_MAX_RETRY {
            e.record_failure("connection refused", DEFAULT_MAX_RETRY);
        }
        assert_eq!(e.status(), OutboxStatus::Failed);
        assert_eq!(e.retry_count(), DEFAULT_MAX_RETRY);
    }

    #[test]
    fn test_request_retry_preserves_count() {
        let mut e = new_event();
        for _ in 0..DEFAULT_MAX_RETRY {
            e.record_failure("down", DEFAULT_MAX_RETRY);
        }

        e.request_retry().unwrap();
        assert_eq!(e.status(), OutboxStatus::Pending);
        assert_eq!(e.retry_count(), DEFAULT_MAX_RETRY);

        // One more failure immediately re-parks it
        e.record_failure("still down", DEFAULT_MAX_RETRY);
        assert_eq!(e.status(), OutboxStatus::Failed);
    }

    #[test]
    fn test_mark_as_failed_is_retry_eligible() {
        let mut e = new_event();
        e.mark_as_failed();
        assert_eq!(e.status(), OutboxStatus::Failed);
        assert_eq!(e.retry_count(), 0);
        assert!(e.request_retry().is_ok());
        assert_eq!(e.status(), OutboxStatus::Pending);
    }

    #[test]
    fn test_request_retry_only_from_failed() {
        let mut pending = new_event();
        assert!(matches!(
            pending.request_retry(),
            Err(TransferError::OutboxNotFailed {
                status: OutboxStatus::Pending
            })
        ));

        let mut sent = new_event();
        sent.mark_as_sent();
        assert!(matches!(
            sent.request_retry(),
            Err(TransferError::OutboxNotFailed {
                status: OutboxStatus::Sent
            })
        ));
    }
}
