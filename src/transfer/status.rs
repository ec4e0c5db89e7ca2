//! Transfer and SAGA Status Definitions
//!
//! Statuses are stored in PostgreSQL as TEXT using `as_str`/`from_str`.

use std::fmt;
use std::str::FromStr;

/// Final outcome of a transfer.
///
/// Only `Pending` may transition, and only to one of the three final states.
///
/// ```text
/// PENDING → SUCCESS | FAILED | CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// SAGA in progress
    Pending,
    /// Terminal: debit and credit both completed
    Success,
    /// Terminal: failed (including after completed compensation)
    Failed,
    /// Terminal: cancelled by the user before money moved
    Cancelled,
}

impl TransferStatus {
    #[inline]
    pub fn is_final(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, TransferStatus::Pending)
    }

    /// Allowed successor states. Total and exhaustive so a new variant
    /// forces every match to be revisited.
    pub fn allowed_transitions(&self) -> &'static [TransferStatus] {
        match self {
            TransferStatus::Pending => &[
                TransferStatus::Success,
                TransferStatus::Failed,
                TransferStatus::Cancelled,
            ],
            TransferStatus::Success | TransferStatus::Failed | TransferStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: TransferStatus) -> bool {
        self != &target && self.allowed_transitions().contains(&target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Success => "SUCCESS",
            TransferStatus::Failed => "FAILED",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransferStatus::Pending),
            "SUCCESS" => Ok(TransferStatus::Success),
            "FAILED" => Ok(TransferStatus::Failed),
            "CANCELLED" => Ok(TransferStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// SAGA progress for a transfer.
///
/// Directed transition graph, no back-edges, no skipped steps:
///
/// ```text
/// STARTED → DEBIT_PENDING
///              │      │
///              ▼      ▼
///   DEBIT_COMPLETED  DEBIT_FAILED → FAILED
///              │
///              ▼
///       CREDIT_PENDING
///          │      │
///          ▼      ▼
/// CREDIT_COMPLETED  CREDIT_FAILED
///          │              │
///          ▼              ▼
///      COMPLETED    COMPENSATING → COMPENSATED → FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// SAGA accepted, debit not yet requested
    Started,
    /// Debit command sent, awaiting the account service
    DebitPending,
    /// Debit confirmed - money has left the source account
    DebitCompleted,
    /// Credit command sent, awaiting the account service
    CreditPending,
    /// Credit confirmed
    CreditCompleted,
    /// Debit rejected - no money moved, no compensation owed
    DebitFailed,
    /// Credit rejected - debit must be reversed
    CreditFailed,
    /// Debit rollback command sent
    Compensating,
    /// Debit rollback confirmed
    Compensated,
    /// Terminal: SAGA finished successfully
    Completed,
    /// Terminal: SAGA finished unsuccessfully
    Failed,
}

impl SagaStatus {
    /// Terminal states have no outgoing edges.
    #[inline]
    pub fn is_final(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Failed)
    }

    #[inline]
    pub fn is_in_progress(&self) -> bool {
        !self.is_final()
    }

    /// True for states reached only after the debit leg succeeded: aborting
    /// from one of these owes the source account a reversal.
    #[inline]
    pub fn requires_compensation(&self) -> bool {
        matches!(
            self,
            SagaStatus::DebitCompleted
                | SagaStatus::CreditPending
                | SagaStatus::CreditFailed
                | SagaStatus::Compensating
        )
    }

    /// Allowed successor states. Total and exhaustive over all variants.
    pub fn allowed_transitions(&self) -> &'static [SagaStatus] {
        match self {
            SagaStatus::Started => &[SagaStatus::DebitPending],
            SagaStatus::DebitPending => &[SagaStatus::DebitCompleted, SagaStatus::DebitFailed],
            SagaStatus::DebitCompleted => &[SagaStatus::CreditPending],
            SagaStatus::DebitFailed => &[SagaStatus::Failed],
            SagaStatus::CreditPending => &[SagaStatus::CreditCompleted, SagaStatus::CreditFailed],
            SagaStatus::CreditCompleted => &[SagaStatus::Completed],
            SagaStatus::CreditFailed => &[SagaStatus::Compensating],
            SagaStatus::Compensating => &[SagaStatus::Compensated],
            SagaStatus::Compensated => &[SagaStatus::Failed],
            SagaStatus::Completed | SagaStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, target: SagaStatus) -> bool {
        self != &target && self.allowed_transitions().contains(&target)
    }

    /// Next state on the happy path, `None` once the path forks away or ends.
    pub fn next_success_status(&self) -> Option<SagaStatus> {
        match self {
            SagaStatus::Started => Some(SagaStatus::DebitPending),
            SagaStatus::DebitPending => Some(SagaStatus::DebitCompleted),
            SagaStatus::DebitCompleted => Some(SagaStatus::CreditPending),
            SagaStatus::CreditPending => Some(SagaStatus::CreditCompleted),
            SagaStatus::CreditCompleted => Some(SagaStatus::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::DebitPending => "DEBIT_PENDING",
            SagaStatus::DebitCompleted => "DEBIT_COMPLETED",
            SagaStatus::CreditPending => "CREDIT_PENDING",
            SagaStatus::CreditCompleted => "CREDIT_COMPLETED",
            SagaStatus::DebitFailed => "DEBIT_FAILED",
            SagaStatus::CreditFailed => "CREDIT_FAILED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(SagaStatus::Started),
            "DEBIT_PENDING" => Ok(SagaStatus::DebitPending),
            "DEBIT_COMPLETED" => Ok(SagaStatus::DebitCompleted),
            "CREDIT_PENDING" => Ok(SagaStatus::CreditPending),
            "CREDIT_COMPLETED" => Ok(SagaStatus::CreditCompleted),
            "DEBIT_FAILED" => Ok(SagaStatus::DebitFailed),
            "CREDIT_FAILED" => Ok(SagaStatus::CreditFailed),
            "COMPENSATING" => Ok(SagaStatus::Compensating),
            "COMPENSATED" => Ok(SagaStatus::Compensated),
            "COMPLETED" => Ok(SagaStatus::Completed),
            "FAILED" => Ok(SagaStatus::Failed),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_SAGA: [SagaStatus; 11] = [
        SagaStatus::Started,
        SagaStatus::DebitPending,
        SagaStatus::DebitCompleted,
        SagaStatus::CreditPending,
        SagaStatus::CreditCompleted,
        SagaStatus::DebitFailed,
        SagaStatus::CreditFailed,
        SagaStatus::Compensating,
        SagaStatus::Compensated,
        SagaStatus::Completed,
        SagaStatus::Failed,
    ];

    #[test]
    fn test_final_states() {
        assert!(SagaStatus::Completed.is_final());
        assert!(SagaStatus::Failed.is_final());
        for s in ALL_SAGA {
            if !matches!(s, SagaStatus::Completed | SagaStatus::Failed) {
                assert!(!s.is_final(), "{s} must not be final");
                assert!(s.is_in_progress());
            }
        }
    }

    #[test]
    fn test_requires_compensation_exact_set() {
        let expected = [
            SagaStatus::DebitCompleted,
            SagaStatus::CreditPending,
            SagaStatus::CreditFailed,
            SagaStatus::Compensating,
        ];
        for s in ALL_SAGA {
            assert_eq!(
                s.requires_compensation(),
                expected.contains(&s),
                "requires_compensation mismatch for {s}"
            );
        }
    }

    #[test]
    fn test_no_outgoing_edges_from_final() {
        assert!(SagaStatus::Completed.allowed_transitions().is_empty());
        assert!(SagaStatus::Failed.allowed_transitions().is_empty());
        assert!(!SagaStatus::Failed.can_transition_to(SagaStatus::Started));
    }

    #[test]
    fn test_no_self_transition() {
        for s in ALL_SAGA {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn test_happy_path_chain() {
        let mut s = SagaStatus::Started;
        let mut hops = 0;
        while let Some(next) = s.next_success_status() {
            assert!(s.can_transition_to(next));
            s = next;
            hops += 1;
        }
        assert_eq!(s, SagaStatus::Completed);
        assert_eq!(hops, 5);
    }

    #[test]
    fn test_saga_str_roundtrip() {
        for s in ALL_SAGA {
            assert_eq!(s.as_str().parse::<SagaStatus>().unwrap(), s);
        }
        assert!("BOGUS".parse::<SagaStatus>().is_err());
    }

    #[test]
    fn test_transfer_status_transitions() {
        assert!(TransferStatus::Pending.can_transition_to(TransferStatus::Success));
        assert!(TransferStatus::Pending.can_transition_to(TransferStatus::Cancelled));
        assert!(!TransferStatus::Success.can_transition_to(TransferStatus::Failed));
        assert!(TransferStatus::Success.is_final());
        assert!(!TransferStatus::Pending.is_final());
    }

    #[test]
    fn test_transfer_status_str_roundtrip() {
        for s in [
            TransferStatus::Pending,
            TransferStatus::Success,
            TransferStatus::Failed,
            TransferStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<TransferStatus>().unwrap(), s);
        }
    }
}
