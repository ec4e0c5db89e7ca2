//! Transfer Service - SAGA-orchestrated money transfers
//!
//! Moves money between accounts owned by a separate account service,
//! coordinating the distributed debit/credit pair with a SAGA and
//! announcing every state change through a transactional outbox.
//!
//! # Modules
//!
//! - [`money`] - Non-negative whole-unit money value object
//! - [`transfer`] - The SAGA: aggregate, orchestrator, outbox, publisher,
//!   timeout watchdog, and PostgreSQL persistence
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing setup with file rotation

pub mod config;
pub mod logging;
pub mod money;
pub mod transfer;

// Convenient re-exports at crate root
pub use money::{Money, MoneyError};
pub use transfer::{
    EventType, MessagePublisher, OutboxEvent, OutboxEventId, OutboxPublisher, OutboxStatus,
    PublisherConfig, SagaOrchestrator, SagaStatus, SagaTimeoutWorker, StepOutcome, Transfer,
    TransferError, TransferId, TransferIntent, TransferSnapshot, TransferStatus, TransferStore,
    WatchdogConfig,
};
