//! Money Transfer SAGA
//!
//! Orchestrated money transfers between accounts using the SAGA pattern
//! with a transactional outbox:
//!
//! - [`model::Transfer`] is the aggregate: a status pair driven through a
//!   fixed transition graph by named methods
//! - [`orchestrator::SagaOrchestrator`] applies account-service responses
//!   under a per-transfer row lock, enqueueing follow-up events atomically
//! - [`publisher::OutboxPublisher`] drains the outbox to the broker with
//!   bounded retry (at-least-once delivery)
//! - [`watchdog::SagaTimeoutWorker`] resolves legs whose answer never came

pub mod db;
pub mod error;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod outbox;
pub mod publisher;
pub mod status;
pub mod types;
pub mod watchdog;

pub use db::TransferStore;
pub use error::TransferError;
pub use events::{EventType, TransferEventPayload};
pub use model::Transfer;
pub use orchestrator::SagaOrchestrator;
pub use outbox::{OutboxEvent, OutboxStatus};
pub use publisher::{MessagePublisher, OutboxPublisher, PublisherConfig};
pub use status::{SagaStatus, TransferStatus};
pub use types::{OutboxEventId, StepOutcome, TransferId, TransferIntent, TransferSnapshot};
pub use watchdog::{SagaTimeoutWorker, WatchdogConfig};
