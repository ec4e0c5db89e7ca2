//! Transfer Aggregate
//!
//! Owns the `TransferStatus`/`SagaStatus` pair and enforces legal transitions.
//! All mutation goes through the named transition methods; the orchestrator
//! serializes concurrent callers with per-row locking, not this type.
//!
//! # SAGA flow
//!
//! ```text
//! 1. start_saga()            STARTED → DEBIT_PENDING
//! 2. complete_debit()        DEBIT_PENDING → DEBIT_COMPLETED → CREDIT_PENDING
//! 3. complete_credit()       CREDIT_PENDING → CREDIT_COMPLETED → COMPLETED + SUCCESS
//!    or
//! 3. fail_credit()           CREDIT_PENDING → CREDIT_FAILED → COMPENSATING
//! 4. complete_compensation() COMPENSATING → COMPENSATED → FAILED
//! ```

use chrono::{DateTime, Utc};

use super::error::TransferError;
use super::status::{SagaStatus, TransferStatus};
use super::types::{TransferId, TransferSnapshot};
use crate::money::Money;

/// Transfer aggregate root.
///
/// Fields are crate-private: external code reads through accessors and
/// mutates only through the transition methods below.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub(crate) transfer_id: TransferId,
    pub(crate) from_account: String,
    pub(crate) to_account: String,
    pub(crate) amount: Money,
    pub(crate) fee: Money,
    pub(crate) status: TransferStatus,
    pub(crate) saga_status: SagaStatus,
    pub(crate) fail_reason: Option<String>,
    pub(crate) memo: Option<String>,
    pub(crate) idempotency_key: Option<String>,
    pub(crate) requested_at: DateTime<Utc>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    // Audit metadata, carried but not behaviorally significant
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

/// All persisted fields, for trusted rehydration from storage.
#[derive(Debug, Clone)]
pub struct TransferParts {
    pub transfer_id: TransferId,
    pub from_account: String,
    pub to_account: String,
    pub amount: Money,
    pub fee: Money,
    pub status: TransferStatus,
    pub saga_status: SagaStatus,
    pub fail_reason: Option<String>,
    pub memo: Option<String>,
    pub idempotency_key: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transfer {
    // ========================================
    // Construction
    // ========================================

    /// Create a new transfer, enforcing creation invariants.
    ///
    /// Starts in `PENDING`/`STARTED` with a freshly generated id.
    pub fn create(
        from_account: String,
        to_account: String,
        amount: Money,
        fee: Option<Money>,
        memo: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<Self, TransferError> {
        if from_account == to_account {
            return Err(TransferError::SameAccountTransfer(from_account));
        }
        if !amount.is_positive() {
            return Err(TransferError::InvalidAmount(amount.to_string()));
        }

        let now = Utc::now();
        Ok(Self {
            transfer_id: TransferId::generate(),
            from_account,
            to_account,
            amount,
            fee: fee.unwrap_or(Money::ZERO),
            status: TransferStatus::Pending,
            saga_status: SagaStatus::Started,
            fail_reason: None,
            memo,
            idempotency_key,
            requested_at: now,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rehydrate from storage. Trusted: no validation, all fields required.
    pub fn restore(parts: TransferParts) -> Self {
        Self {
            transfer_id: parts.transfer_id,
            from_account: parts.from_account,
            to_account: parts.to_account,
            amount: parts.amount,
            fee: parts.fee,
            status: parts.status,
            saga_status: parts.saga_status,
            fail_reason: parts.fail_reason,
            memo: parts.memo,
            idempotency_key: parts.idempotency_key,
            requested_at: parts.requested_at,
            completed_at: parts.completed_at,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn id(&self) -> &TransferId {
        &self.transfer_id
    }

    pub fn from_account(&self) -> &str {
        &self.from_account
    }

    pub fn to_account(&self) -> &str {
        &self.to_account
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn fee(&self) -> Money {
        self.fee
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn saga_status(&self) -> SagaStatus {
        self.saga_status
    }

    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_final(&self) -> bool {
        self.status.is_final()
    }

    /// Cancellation window: before money has left the source account.
    pub fn is_cancellable(&self) -> bool {
        self.status.is_pending()
            && matches!(
                self.saga_status,
                SagaStatus::Started | SagaStatus::DebitPending
            )
    }

    /// True while aborting the flow would owe the source account a reversal.
    pub fn requires_compensation(&self) -> bool {
        self.saga_status.requires_compensation()
    }

    /// Status snapshot for the query boundary.
    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            transfer_id: self.transfer_id.clone(),
            status: self.status,
            saga_status: self.saga_status,
            fail_reason: self.fail_reason.clone(),
            completed_at: self.completed_at,
        }
    }

    // ========================================
    // SAGA transition methods
    // ========================================

    /// STARTED → DEBIT_PENDING
    pub fn start_saga(&mut self) -> Result<(), TransferError> {
        self.advance(SagaStatus::DebitPending)
    }

    /// DEBIT_PENDING → DEBIT_COMPLETED → CREDIT_PENDING
    ///
    /// DEBIT_COMPLETED collapses immediately; it is never the resting state.
    pub fn complete_debit(&mut self) -> Result<(), TransferError> {
        self.advance(SagaStatus::DebitCompleted)?;
        self.advance(SagaStatus::CreditPending)
    }

    /// DEBIT_PENDING → DEBIT_FAILED → FAILED. No compensation owed.
    pub fn fail_debit(&mut self, reason: &str) -> Result<(), TransferError> {
        self.advance(SagaStatus::DebitFailed)?;
        self.fail_reason = Some(reason.to_string());
        self.advance(SagaStatus::Failed)?;
        self.finish(TransferStatus::Failed);
        Ok(())
    }

    /// CREDIT_PENDING → CREDIT_COMPLETED → COMPLETED, transfer succeeds.
    pub fn complete_credit(&mut self) -> Result<(), TransferError> {
        self.advance(SagaStatus::CreditCompleted)?;
        self.advance(SagaStatus::Completed)?;
        self.finish(TransferStatus::Success);
        Ok(())
    }

    /// CREDIT_PENDING → CREDIT_FAILED → COMPENSATING. Reversal now owed.
    pub fn fail_credit(&mut self, reason: &str) -> Result<(), TransferError> {
        self.advance(SagaStatus::CreditFailed)?;
        self.fail_reason = Some(reason.to_string());
        self.advance(SagaStatus::Compensating)
    }

    /// COMPENSATING → COMPENSATED → FAILED, source account restored.
    pub fn complete_compensation(&mut self) -> Result<(), TransferError> {
        self.advance(SagaStatus::Compensated)?;
        self.advance(SagaStatus::Failed)?;
        self.finish(TransferStatus::Failed);
        Ok(())
    }

    /// Compensation itself failed. Forces the terminal state and marks the
    /// reason for manual operator intervention; this path never self-heals.
    pub fn fail_compensation(&mut self, reason: &str) -> Result<(), TransferError> {
        if self.saga_status.is_final() {
            return Err(TransferError::InvalidSagaTransition {
                from: self.saga_status,
                to: SagaStatus::Failed,
            });
        }
        self.fail_reason = Some(format!("compensation failed: {reason}"));
        self.saga_status = SagaStatus::Failed;
        self.finish(TransferStatus::Failed);
        Ok(())
    }

    /// User-initiated cancellation, honored only while `is_cancellable()`.
    pub fn cancel(&mut self, reason: &str) -> Result<(), TransferError> {
        if !self.is_cancellable() {
            return Err(TransferError::CannotCancel {
                status: self.status,
                saga_status: self.saga_status,
            });
        }
        self.fail_reason = Some(format!("cancelled: {reason}"));
        self.saga_status = SagaStatus::Failed;
        self.finish(TransferStatus::Cancelled);
        Ok(())
    }

    // ========================================
    // Private helpers
    // ========================================

    fn advance(&mut self, target: SagaStatus) -> Result<(), TransferError> {
        if !self.saga_status.can_transition_to(target) {
            return Err(TransferError::InvalidSagaTransition {
                from: self.saga_status,
                to: target,
            });
        }
        self.saga_status = target;
        Ok(())
    }

    fn finish(&mut self, outcome: TransferStatus) {
        debug_assert!(self.status.can_transition_to(outcome));
        self.status = outcome;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_transfer() -> Transfer {
        Transfer::create(
            "111-111".to_string(),
            "222-222".to_string(),
            Money::of_int(50_000).unwrap(),
            None,
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_create_initial_state() {
        let t = new_transfer();
        assert_eq!(t.status(), TransferStatus::Pending);
        assert_eq!(t.saga_status(), SagaStatus::Started);
        assert_eq!(t.fee(), Money::ZERO);
        assert!(t.completed_at().is_none());
        assert!(t.is_cancellable());
    }

    #[test]
    fn test_create_rejects_same_account() {
        let result = Transfer::create(
            "111-111".to_string(),
            "111-111".to_string(),
            Money::of_int(1000).unwrap(),
            None,
            None,
            None,
        );
        assert!(matches!(result, Err(TransferError::SameAccountTransfer(_))));
    }

    #[test]
    fn test_create_rejects_zero_amount() {
        let result = Transfer::create(
            "111-111".to_string(),
            "222-222".to_string(),
            Money::ZERO,
            None,
            None,
            None,
        );
        assert!(matches!(result, Err(TransferError::InvalidAmount(_))));
    }

    #[test]
    fn test_happy_path() {
        let mut t = new_transfer();

        t.start_saga().unwrap();
        assert_eq!(t.saga_status(), SagaStatus::DebitPending);

        t.complete_debit().unwrap();
        assert_eq!(t.saga_status(), SagaStatus::CreditPending);
        assert!(t.requires_compensation());

        t.complete_credit().unwrap();
        assert_eq!(t.status(), TransferStatus::Success);
        assert_eq!(t.saga_status(), SagaStatus::Completed);
        assert!(t.completed_at().is_some());
    }

    #[test]
    fn test_debit_failure_path() {
        let mut t = new_transfer();
        t.start_saga().unwrap();

        t.fail_debit("insufficient funds").unwrap();
        assert_eq!(t.status(), TransferStatus::Failed);
        assert_eq!(t.saga_status(), SagaStatus::Failed);
        assert_eq!(t.fail_reason(), Some("insufficient funds"));
        assert!(!t.requires_compensation());
        assert!(t.completed_at().is_some());
    }

    #[test]
    fn test_compensation_path() {
        let mut t = new_transfer();
        t.start_saga().unwrap();
        t.complete_debit().unwrap();

        t.fail_credit("account frozen").unwrap();
        assert_eq!(t.saga_status(), SagaStatus::Compensating);
        assert_eq!(t.status(), TransferStatus::Pending);
        assert!(t.requires_compensation());

        t.complete_compensation().unwrap();
        assert_eq!(t.status(), TransferStatus::Failed);
        assert_eq!(t.saga_status(), SagaStatus::Failed);
        assert!(t.completed_at().is_some());
    }

    #[test]
    fn test_compensation_failure_marks_reason() {
        let mut t = new_transfer();
        t.start_saga().unwrap();
        t.complete_debit().unwrap();
        t.fail_credit("account frozen").unwrap();

        t.fail_compensation("rollback rejected").unwrap();
        assert_eq!(t.status(), TransferStatus::Failed);
        assert_eq!(t.saga_status(), SagaStatus::Failed);
        assert_eq!(
            t.fail_reason(),
            Some("compensation failed: rollback rejected")
        );
    }

    #[test]
    fn test_cancel_before_debit() {
        let mut t = new_transfer();
        t.cancel("user request").unwrap();

        assert_eq!(t.status(), TransferStatus::Cancelled);
        assert_eq!(t.saga_status(), SagaStatus::Failed);
        assert!(t.completed_at().is_some());
    }

    #[test]
    fn test_cancel_rejected_after_debit() {
        let mut t = new_transfer();
        t.start_saga().unwrap();
        t.complete_debit().unwrap();

        let result = t.cancel("too late");
        assert!(matches!(result, Err(TransferError::CannotCancel { .. })));
        // Aggregate unchanged
        assert_eq!(t.status(), TransferStatus::Pending);
        assert_eq!(t.saga_status(), SagaStatus::CreditPending);
    }

    #[test]
    fn test_transition_from_final_rejected() {
        let mut t = new_transfer();
        t.start_saga().unwrap();
        t.fail_debit("boom").unwrap();

        let before = t.clone();
        for result in [
            t.start_saga(),
            t.complete_debit(),
            t.complete_credit(),
            t.complete_compensation(),
            t.fail_compensation("x"),
        ] {
            assert!(matches!(
                result,
                Err(TransferError::InvalidSagaTransition { .. })
            ));
        }
        // No transition attempt mutated the aggregate
        assert_eq!(t.status(), before.status());
        assert_eq!(t.saga_status(), before.saga_status());
        assert_eq!(t.fail_reason(), before.fail_reason());
    }

    #[test]
    fn test_skipping_steps_rejected() {
        let mut t = new_transfer();
        // complete_debit without start_saga
        assert!(matches!(
            t.complete_debit(),
            Err(TransferError::InvalidSagaTransition { .. })
        ));
        assert_eq!(t.saga_status(), SagaStatus::Started);
    }

    #[test]
    fn test_status_terminal_iff_saga_terminal() {
        let mut t = new_transfer();
        assert_eq!(t.status().is_final(), t.saga_status().is_final());
        t.start_saga().unwrap();
        assert_eq!(t.status().is_final(), t.saga_status().is_final());
        t.complete_debit().unwrap();
        assert_eq!(t.status().is_final(), t.saga_status().is_final());
        t.complete_credit().unwrap();
        assert!(t.status().is_final() && t.saga_status().is_final());
        assert_eq!(t.completed_at().is_some(), t.status().is_final());
    }

    #[test]
    fn test_restore_roundtrip() {
        let t = new_transfer();
        let restored = Transfer::restore(TransferParts {
            transfer_id: t.id().clone(),
            from_account: t.from_account().to_string(),
            to_account: t.to_account().to_string(),
            amount: t.amount(),
            fee: t.fee(),
            status: t.status(),
            saga_status: t.saga_status(),
            fail_reason: None,
            memo: None,
            idempotency_key: None,
            requested_at: t.requested_at(),
            completed_at: None,
            created_at: t.created_at,
            updated_at: t.updated_at,
        });
        assert_eq!(restored.id(), t.id());
        assert_eq!(restored.saga_status(), t.saga_status());
    }
}
