//! Transfer Core Types
//!
//! Prefixed domain identifiers plus the DTOs crossing the inbound boundary.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::TransferError;
use super::status::{SagaStatus, TransferStatus};
use crate::money::Money;

/// Length of the random hex suffix in a domain id (`TRF-a1b2c3d4`)
const ID_SUFFIX_LEN: usize = 8;

fn generate_domain_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &uuid[..ID_SUFFIX_LEN])
}

fn is_valid_domain_id(value: &str, prefix: &str) -> bool {
    let Some(suffix) = value.strip_prefix(prefix).and_then(|s| s.strip_prefix('-')) else {
        return false;
    };
    suffix.len() == ID_SUFFIX_LEN && suffix.chars().all(|c| c.is_ascii_hexdigit())
}

/// Transfer identifier: `TRF-` followed by 8 hex characters.
///
/// Opaque, globally unique, generated without coordination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    pub const PREFIX: &'static str = "TRF";

    /// Generate a new unique id
    pub fn generate() -> Self {
        Self(generate_domain_id(Self::PREFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_valid_domain_id(s, Self::PREFIX) {
            return Err(TransferError::InvalidTransferIdFormat(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

/// Outbox event identifier: `OBX-` followed by 8 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OutboxEventId(String);

impl OutboxEventId {
    pub const PREFIX: &'static str = "OBX";

    /// Generate a new unique id
    pub fn generate() -> Self {
        Self(generate_domain_id(Self::PREFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutboxEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OutboxEventId {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_valid_domain_id(s, Self::PREFIX) {
            return Err(TransferError::InvalidOutboxEventIdFormat(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

/// Inbound transfer intent from the request boundary
#[derive(Debug, Clone)]
pub struct TransferIntent {
    pub from_account: String,
    pub to_account: String,
    pub amount: Money,
    pub memo: Option<String>,
    /// Caller-supplied duplicate-submission token
    pub idempotency_key: Option<String>,
}

/// Outcome of one remote SAGA leg, reported by the account service
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// Leg completed
    Success,
    /// Leg explicitly failed with a reason
    Failed(String),
}

impl StepOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success)
    }
}

/// Point-in-time view returned by the status-query boundary
#[derive(Debug, Clone, Serialize)]
pub struct TransferSnapshot {
    pub transfer_id: TransferId,
    pub status: TransferStatus,
    pub saga_status: SagaStatus,
    pub fail_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_unique_and_valid() {
        let a = TransferId::generate();
        let b = TransferId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().parse::<TransferId>().is_ok());
    }

    #[test]
    fn test_id_format_validation() {
        assert!("TRF-a1b2c3d4".parse::<TransferId>().is_ok());
        assert!("TRF-A1B2C3D4".parse::<TransferId>().is_ok());

        for bad in ["", "TRF-", "TRF-xyz", "TRF-a1b2c3d", "OBX-a1b2c3d4", "a1b2c3d4"] {
            assert!(
                matches!(
                    bad.parse::<TransferId>(),
                    Err(TransferError::InvalidTransferIdFormat(_))
                ),
                "should reject {bad:?}"
            );
        }
    }

    #[test]
    fn test_outbox_id_format_validation() {
        assert!("OBX-deadbeef".parse::<OutboxEventId>().is_ok());
        assert!(matches!(
            "TRF-deadbeef".parse::<OutboxEventId>(),
            Err(TransferError::InvalidOutboxEventIdFormat(_))
        ));
    }

    #[test]
    fn test_step_outcome() {
        assert!(StepOutcome::Success.is_success());
        assert!(!StepOutcome::Failed("nope".into()).is_success());
    }
}
