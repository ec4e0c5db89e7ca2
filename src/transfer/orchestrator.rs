//! SAGA Orchestrator
//!
//! Drives each transfer through debit, credit, and (when needed)
//! compensation. Every handler follows the same shape:
//!
//! 1. Open a transaction and lock the transfer row (`FOR UPDATE`)
//! 2. Check the saga-status precondition; a mismatch means the inbound
//!    message is stale or duplicated and the handler returns without writing
//! 3. Apply the aggregate transition
//! 4. Enqueue the follow-up outbox event(s) in the same transaction
//! 5. Write the transfer back and commit
//!
//! The row lock serializes concurrent responses for one transfer; the
//! precondition makes replayed responses harmless.

use std::sync::Arc;

use super::db::TransferStore;
use super::error::TransferError;
use super::events::{self, EventType};
use super::model::Transfer;
use super::outbox::OutboxEvent;
use super::status::SagaStatus;
use super::types::{OutboxEventId, StepOutcome, TransferId, TransferIntent, TransferSnapshot};

pub struct SagaOrchestrator {
    store: Arc<TransferStore>,
}

impl SagaOrchestrator {
    pub fn new(store: Arc<TransferStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<TransferStore> {
        &self.store
    }

    // ========================================
    // Intake
    // ========================================

    /// Accept a transfer intent and start its SAGA.
    ///
    /// Idempotent on `idempotency_key`: a duplicate submission returns the
    /// transfer created by the first one instead of moving money twice.
    pub async fn submit(&self, intent: TransferIntent) -> Result<Transfer, TransferError> {
        if let Some(key) = &intent.idempotency_key {
            if let Some(existing) = self.store.get_by_idempotency_key(key).await? {
                tracing::info!(
                    transfer_id = %existing.id(),
                    idempotency_key = %key,
                    "Duplicate submission - returning existing transfer"
                );
                return Ok(existing);
            }
        }

        let mut transfer = Transfer::create(
            intent.from_account,
            intent.to_account,
            intent.amount,
            None,
            intent.memo,
            intent.idempotency_key,
        )?;
        transfer.start_saga()?;

        let debit_event = events::outbox_event_for(&transfer, EventType::DebitRequested)?;
        self.store
            .insert_transfer_with_event(&transfer, &debit_event)
            .await?;

        tracing::info!(
            transfer_id = %transfer.id(),
            from = transfer.from_account(),
            to = transfer.to_account(),
            amount = %transfer.amount(),
            "Transfer accepted, debit requested"
        );
        Ok(transfer)
    }

    // ========================================
    // SAGA leg responses
    // ========================================

    /// Account service answered the debit command.
    pub async fn handle_debit_response(
        &self,
        transfer_id: &TransferId,
        outcome: StepOutcome,
    ) -> Result<Transfer, TransferError> {
        self.handle_response(transfer_id, SagaStatus::DebitPending, |transfer| {
            match outcome {
                StepOutcome::Success => {
                    transfer.complete_debit()?;
                    Ok(EventType::CreditRequested)
                }
                StepOutcome::Failed(reason) => {
                    transfer.fail_debit(&reason)?;
                    Ok(EventType::TransferFailed)
                }
            }
        })
        .await
    }

    /// Account service answered the credit command.
    ///
    /// A credit failure does not finish the transfer: the completed debit
    /// must be reversed first, so the SAGA moves to COMPENSATING and a
    /// rollback command goes out.
    pub async fn handle_credit_response(
        &self,
        transfer_id: &TransferId,
        outcome: StepOutcome,
    ) -> Result<Transfer, TransferError> {
        self.handle_response(transfer_id, SagaStatus::CreditPending, |transfer| {
            match outcome {
                StepOutcome::Success => {
                    transfer.complete_credit()?;
                    Ok(EventType::TransferCompleted)
                }
                StepOutcome::Failed(reason) => {
                    transfer.fail_credit(&reason)?;
                    Ok(EventType::DebitRollbackRequested)
                }
            }
        })
        .await
    }

    /// Account service answered the debit rollback command.
    ///
    /// A rollback failure leaves money withdrawn with nowhere to go; the
    /// transfer is forced terminal and an alert goes out for manual
    /// intervention.
    pub async fn handle_rollback_response(
        &self,
        transfer_id: &TransferId,
        outcome: StepOutcome,
    ) -> Result<Transfer, TransferError> {
        self.handle_response(transfer_id, SagaStatus::Compensating, |transfer| {
            match outcome {
                StepOutcome::Success => {
                    transfer.complete_compensation()?;
                    Ok(EventType::TransferFailed)
                }
                StepOutcome::Failed(reason) => {
                    transfer.fail_compensation(&reason)?;
                    Ok(EventType::CompensationFailed)
                }
            }
        })
        .await
    }

    /// Shared handler shape: lock, check precondition, transition, enqueue
    /// exactly one follow-up event.
    async fn handle_response<F>(
        &self,
        transfer_id: &TransferId,
        expected: SagaStatus,
        transition: F,
    ) -> Result<Transfer, TransferError>
    where
        F: FnOnce(&mut Transfer) -> Result<EventType, TransferError>,
    {
        let mut tx = self.store.begin().await?;
        let mut transfer = TransferStore::lock_transfer(&mut tx, transfer_id).await?;

        // Stale or duplicated response: the transfer already moved on.
        if transfer.saga_status() != expected {
            tracing::debug!(
                transfer_id = %transfer_id,
                expected = %expected,
                actual = %transfer.saga_status(),
                "Ignoring stale SAGA response"
            );
            tx.rollback().await?;
            return Ok(transfer);
        }

        let event_type = transition(&mut transfer)?;
        let event = events::outbox_event_for(&transfer, event_type)?;
        TransferStore::insert_event(&mut tx, &event).await?;
        TransferStore::update_transfer(&mut tx, &transfer).await?;
        tx.commit().await?;

        tracing::info!(
            transfer_id = %transfer_id,
            saga_status = %transfer.saga_status(),
            status = %transfer.status(),
            event = event_type.as_str(),
            "SAGA step applied"
        );
        Ok(transfer)
    }

    // ========================================
    // User operations
    // ========================================

    /// Cancel a transfer, allowed only before the debit completed.
    pub async fn cancel(
        &self,
        transfer_id: &TransferId,
        reason: &str,
    ) -> Result<Transfer, TransferError> {
        let mut tx = self.store.begin().await?;
        let mut transfer = TransferStore::lock_transfer(&mut tx, transfer_id).await?;

        transfer.cancel(reason)?;

        let event = events::outbox_event_for(&transfer, EventType::TransferCancelled)?;
        TransferStore::insert_event(&mut tx, &event).await?;
        TransferStore::update_transfer(&mut tx, &transfer).await?;
        tx.commit().await?;

        tracing::info!(transfer_id = %transfer_id, reason, "Transfer cancelled");
        Ok(transfer)
    }

    /// Current status of a transfer.
    pub async fn status(&self, transfer_id: &TransferId) -> Result<TransferSnapshot, TransferError> {
        let transfer = self
            .store
            .get(transfer_id)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(transfer_id.as_str().to_string()))?;
        Ok(transfer.snapshot())
    }

    /// Re-queue a parked outbox event after the underlying problem was fixed.
    pub async fn retry_outbox_event(
        &self,
        event_id: &OutboxEventId,
    ) -> Result<OutboxEvent, TransferError> {
        let mut tx = self.store.begin().await?;
        let mut event = TransferStore::lock_event(&mut tx, event_id).await?;

        event.request_retry()?;

        TransferStore::update_event(&mut tx, &event).await?;
        tx.commit().await?;

        tracing::info!(
            event_id = %event_id,
            retry_count = event.retry_count(),
            "Outbox event re-queued"
        );
        Ok(event)
    }

    // ========================================
    // Timeout resolution (watchdog entry point)
    // ========================================

    /// Resolve a SAGA leg that never got an answer.
    ///
    /// Routes the stuck state down its failure edge: an unanswered debit
    /// fails outright, an unanswered credit triggers compensation, an
    /// unanswered rollback raises the manual-intervention alert. The
    /// precondition re-check inside the handler makes this safe against a
    /// response racing in after the staleness scan.
    pub async fn fail_timed_out(&self, transfer: &Transfer) -> Result<(), TransferError> {
        let reason = format!("timed out in {}", transfer.saga_status());
        match transfer.saga_status() {
            SagaStatus::DebitPending => {
                self.handle_debit_response(transfer.id(), StepOutcome::Failed(reason))
                    .await?;
            }
            SagaStatus::CreditPending => {
                self.handle_credit_response(transfer.id(), StepOutcome::Failed(reason))
                    .await?;
            }
            SagaStatus::Compensating => {
                self.handle_rollback_response(transfer.id(), StepOutcome::Failed(reason))
                    .await?;
            }
            other => {
                tracing::debug!(
                    transfer_id = %transfer.id(),
                    saga_status = %other,
                    "Skipping timeout resolution for non-pending leg"
                );
            }
        }
        Ok(())
    }
}
