//! Transfer Persistence Layer
//!
//! PostgreSQL storage for the transfer aggregate and its outbox queue.
//! Two rules keep the system consistent under concurrency:
//!
//! 1. Every aggregate mutation happens inside a transaction that first takes
//!    the transfer row with `SELECT ... FOR UPDATE`, so concurrent responses
//!    for the same transfer serialize at the database.
//! 2. An outbox event is inserted in the same transaction as the state change
//!    it announces. Either both commit or neither does.

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;

use super::error::TransferError;
use super::model::{Transfer, TransferParts};
use super::outbox::{OutboxEvent, OutboxEventParts, OutboxStatus};
use super::status::{SagaStatus, TransferStatus};
use super::types::{OutboxEventId, TransferId};
use crate::money::Money;

const TRANSFER_COLUMNS: &str = "transfer_id, from_account, to_account, amount, fee, \
     status, saga_status, fail_reason, memo, idempotency_key, \
     requested_at, completed_at, created_at, updated_at";

const EVENT_COLUMNS: &str = "event_id, transfer_id, event_type, topic, payload, \
     status, retry_count, last_error, created_at, sent_at";

/// Transfer and outbox database operations
pub struct TransferStore {
    pool: PgPool,
}

impl TransferStore {
    /// Create a new TransferStore with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to PostgreSQL and build a store
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, TransferError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist
    pub async fn init_schema(&self) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transfers_tb (
                id BIGSERIAL PRIMARY KEY,
                transfer_id VARCHAR(16) NOT NULL UNIQUE,
                from_account VARCHAR(64) NOT NULL,
                to_account VARCHAR(64) NOT NULL,
                amount NUMERIC(20, 0) NOT NULL,
                fee NUMERIC(20, 0) NOT NULL DEFAULT 0,
                status VARCHAR(16) NOT NULL,
                saga_status VARCHAR(24) NOT NULL,
                fail_reason TEXT,
                memo TEXT,
                idempotency_key VARCHAR(128) UNIQUE,
                requested_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_transfers_status_updated
                ON transfers_tb (status, updated_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox_events_tb (
                id BIGSERIAL PRIMARY KEY,
                event_id VARCHAR(16) NOT NULL UNIQUE,
                aggregate_type VARCHAR(32) NOT NULL,
                transfer_id VARCHAR(16) NOT NULL,
                event_type VARCHAR(40) NOT NULL,
                topic VARCHAR(64) NOT NULL,
                payload TEXT NOT NULL,
                status VARCHAR(16) NOT NULL,
                retry_count INT NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                sent_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_outbox_status_created
                ON outbox_events_tb (status, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Begin a transaction for a multi-statement unit of work
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, TransferError> {
        Ok(self.pool.begin().await?)
    }

    // ========================================
    // Transfers
    // ========================================

    /// Insert a new transfer together with its first outbox event, atomically.
    pub async fn insert_transfer_with_event(
        &self,
        transfer: &Transfer,
        event: &OutboxEvent,
    ) -> Result<(), TransferError> {
        let mut tx = self.begin().await?;
        Self::insert_transfer(&mut tx, transfer).await?;
        Self::insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Insert a transfer row inside an open transaction
    pub async fn insert_transfer(
        tx: &mut Transaction<'static, Postgres>,
        transfer: &Transfer,
    ) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            INSERT INTO transfers_tb
                (transfer_id, from_account, to_account, amount, fee,
                 status, saga_status, fail_reason, memo, idempotency_key,
                 requested_at, completed_at, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), NOW())
            "#,
        )
        .bind(transfer.id().as_str())
        .bind(transfer.from_account())
        .bind(transfer.to_account())
        .bind(transfer.amount().as_decimal())
        .bind(transfer.fee().as_decimal())
        .bind(transfer.status().as_str())
        .bind(transfer.saga_status().as_str())
        .bind(transfer.fail_reason())
        .bind(transfer.memo())
        .bind(transfer.idempotency_key())
        .bind(transfer.requested_at())
        .bind(transfer.completed_at())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Get a transfer by id
    pub async fn get(&self, transfer_id: &TransferId) -> Result<Option<Transfer>, TransferError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers_tb WHERE transfer_id = $1"
        ))
        .bind(transfer_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_transfer(&r)).transpose()
    }

    /// Get a transfer by client idempotency key
    pub async fn get_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transfer>, TransferError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers_tb WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_transfer(&r)).transpose()
    }

    /// Take the transfer row with FOR UPDATE, blocking concurrent writers
    /// until the transaction ends.
    pub async fn lock_transfer(
        tx: &mut Transaction<'static, Postgres>,
        transfer_id: &TransferId,
    ) -> Result<Transfer, TransferError> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers_tb WHERE transfer_id = $1 FOR UPDATE"
        ))
        .bind(transfer_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some(row) => row_to_transfer(&row),
            None => Err(TransferError::TransferNotFound(
                transfer_id.as_str().to_string(),
            )),
        }
    }

    /// Write back the mutable portion of a locked transfer
    pub async fn update_transfer(
        tx: &mut Transaction<'static, Postgres>,
        transfer: &Transfer,
    ) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            UPDATE transfers_tb
            SET status = $1, saga_status = $2, fail_reason = $3,
                completed_at = $4, updated_at = NOW()
            WHERE transfer_id = $5
            "#,
        )
        .bind(transfer.status().as_str())
        .bind(transfer.saga_status().as_str())
        .bind(transfer.fail_reason())
        .bind(transfer.completed_at())
        .bind(transfer.id().as_str())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Find transfers stuck in-flight past the staleness threshold.
    ///
    /// Used by the timeout watchdog to resolve abandoned SAGA legs.
    pub async fn find_stale_transfers(
        &self,
        threshold: Duration,
        limit: i64,
    ) -> Result<Vec<Transfer>, TransferError> {
        let threshold_secs = threshold.as_secs() as i64;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSFER_COLUMNS}
            FROM transfers_tb
            WHERE status = $1
              AND saga_status IN ($2, $3, $4)
              AND updated_at < NOW() - INTERVAL '1 second' * $5
            ORDER BY updated_at ASC
            LIMIT $6
            "#
        ))
        .bind(TransferStatus::Pending.as_str())
        .bind(SagaStatus::DebitPending.as_str())
        .bind(SagaStatus::CreditPending.as_str())
        .bind(SagaStatus::Compensating.as_str())
        .bind(threshold_secs)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut transfers = Vec::with_capacity(rows.len());
        for row in rows {
            transfers.push(row_to_transfer(&row)?);
        }
        Ok(transfers)
    }

    // ========================================
    // Outbox events
    // ========================================

    /// Insert an outbox event inside an open transaction
    pub async fn insert_event(
        tx: &mut Transaction<'static, Postgres>,
        event: &OutboxEvent,
    ) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events_tb
                (event_id, aggregate_type, transfer_id, event_type, topic, payload,
                 status, retry_count, last_error, created_at, sent_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), $10)
            "#,
        )
        .bind(event.id().as_str())
        .bind(event.aggregate_type())
        .bind(event.transfer_id().as_str())
        .bind(event.event_type())
        .bind(event.topic())
        .bind(event.payload())
        .bind(event.status().as_str())
        .bind(event.retry_count())
        .bind(event.last_error())
        .bind(event.sent_at())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Get an outbox event by id
    pub async fn get_event(
        &self,
        event_id: &OutboxEventId,
    ) -> Result<Option<OutboxEvent>, TransferError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM outbox_events_tb WHERE event_id = $1"
        ))
        .bind(event_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_event(&r)).transpose()
    }

    /// Take an outbox event row with FOR UPDATE
    pub async fn lock_event(
        tx: &mut Transaction<'static, Postgres>,
        event_id: &OutboxEventId,
    ) -> Result<OutboxEvent, TransferError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM outbox_events_tb WHERE event_id = $1 FOR UPDATE"
        ))
        .bind(event_id.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some(row) => row_to_event(&row),
            None => Err(TransferError::OutboxEventNotFound(
                event_id.as_str().to_string(),
            )),
        }
    }

    /// Claim a batch of PENDING events, oldest first.
    ///
    /// `FOR UPDATE SKIP LOCKED` lets concurrent publisher instances each take
    /// a disjoint batch instead of blocking on one another.
    pub async fn claim_pending_events(
        tx: &mut Transaction<'static, Postgres>,
        batch_size: i64,
    ) -> Result<Vec<OutboxEvent>, TransferError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM outbox_events_tb
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#
        ))
        .bind(OutboxStatus::Pending.as_str())
        .bind(batch_size)
        .fetch_all(&mut **tx)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }

    /// Write back the mutable portion of a claimed event
    pub async fn update_event(
        tx: &mut Transaction<'static, Postgres>,
        event: &OutboxEvent,
    ) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            UPDATE outbox_events_tb
            SET status = $1, retry_count = $2, last_error = $3, sent_at = $4
            WHERE event_id = $5
            "#,
        )
        .bind(event.status().as_str())
        .bind(event.retry_count())
        .bind(event.last_error())
        .bind(event.sent_at())
        .bind(event.id().as_str())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

fn row_to_transfer(row: &PgRow) -> Result<Transfer, TransferError> {
    let transfer_id: TransferId = row.get::<String, _>("transfer_id").parse()?;

    let status: TransferStatus = row
        .get::<String, _>("status")
        .parse()
        .map_err(|_| TransferError::DatabaseError("invalid status column".to_string()))?;
    let saga_status: SagaStatus = row
        .get::<String, _>("saga_status")
        .parse()
        .map_err(|_| TransferError::DatabaseError("invalid saga_status column".to_string()))?;

    let amount = Money::of_decimal(row.get("amount"))
        .map_err(|e| TransferError::DatabaseError(format!("invalid amount column: {e}")))?;
    let fee = Money::of_decimal(row.get("fee"))
        .map_err(|e| TransferError::DatabaseError(format!("invalid fee column: {e}")))?;

    Ok(Transfer::restore(TransferParts {
        transfer_id,
        from_account: row.get("from_account"),
        to_account: row.get("to_account"),
        amount,
        fee,
        status,
        saga_status,
        fail_reason: row.get("fail_reason"),
        memo: row.get("memo"),
        idempotency_key: row.get("idempotency_key"),
        requested_at: row.get("requested_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }))
}

fn row_to_event(row: &PgRow) -> Result<OutboxEvent, TransferError> {
    let event_id: OutboxEventId = row.get::<String, _>("event_id").parse()?;
    let transfer_id: TransferId = row.get::<String, _>("transfer_id").parse()?;

    let status: OutboxStatus = row
        .get::<String, _>("status")
        .parse()
        .map_err(|_| TransferError::DatabaseError("invalid outbox status column".to_string()))?;

    Ok(OutboxEvent::restore(OutboxEventParts {
        event_id,
        transfer_id,
        event_type: row.get("event_type"),
        topic: row.get("topic"),
        payload: row.get("payload"),
        status,
        retry_count: row.get("retry_count"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        sent_at: row.get("sent_at"),
    }))
}
