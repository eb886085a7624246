//! Transactional outbox for verification domain events.
//!
//! Approve/reject persist the outgoing event row in the same database
//! transaction as the status mutation, then a background relay
//! publishes unpublished rows to the bus and marks them. A publish
//! failure after commit therefore delays the event instead of losing
//! it, and never rolls back the business transition.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::OutboundEvent;
use crate::infra::{EventPublisher, Result, ServiceError};

/// A persisted, not-yet-published (or already-published) domain event.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxRow {
    pub id: Uuid,
    pub verification_id: Uuid,
    pub event_type: String,
    pub subject: String,
    pub payload: serde_json::Value,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Insert an event row inside an open transaction. Called by the
/// verification store's terminal-transition path.
pub async fn enqueue_tx(
    tx: &mut Transaction<'_, Postgres>,
    verification_id: Uuid,
    event: &OutboundEvent,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO verification_events (id, verification_id, event_type, subject, payload, published, created_at)
        VALUES ($1, $2, $3, $4, $5, FALSE, NOW())
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(verification_id)
    .bind(event.event_type())
    .bind(event.subject())
    .bind(event.to_payload())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Postgres-backed outbox queries.
pub struct PgOutbox {
    pool: PgPool,
}

impl PgOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Oldest-first batch of rows awaiting publication.
    pub async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxRow>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, verification_id, event_type, subject, payload, published, created_at, published_at
            FROM verification_events
            WHERE published = FALSE
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_published(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            UPDATE verification_events
            SET published = TRUE, published_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Background task that drains the outbox to the bus.
pub struct OutboxRelay {
    outbox: PgOutbox,
    publisher: Arc<dyn EventPublisher>,
    poll_interval: Duration,
    batch_size: i64,
}

impl OutboxRelay {
    pub fn new(outbox: PgOutbox, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            outbox,
            publisher,
            poll_interval: Duration::from_secs(1),
            batch_size: 50,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Publish one batch; returns how many rows were published.
    ///
    /// Rows are marked individually after their publish succeeds, so a
    /// broker failure mid-batch re-delivers only the remainder. The bus
    /// is at-least-once anyway; consumers must tolerate duplicates.
    pub async fn drain_once(&self) -> Result<u64> {
        let rows = self.outbox.fetch_unpublished(self.batch_size).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let mut published = Vec::with_capacity(rows.len());
        for row in &rows {
            match self.publisher.publish_raw(&row.subject, &row.payload).await {
                Ok(()) => published.push(row.id),
                Err(e) => {
                    warn!(
                        event_id = %row.id,
                        subject = %row.subject,
                        error = %e,
                        "Outbox publish failed; will retry on next poll"
                    );
                    break;
                }
            }
        }

        let count = published.len() as u64;
        self.outbox.mark_published(&published).await?;
        if count > 0 {
            debug!(count, "Published outbox events");
        }
        Ok(count)
    }

    /// Poll loop. Runs until the task is aborted at shutdown.
    pub async fn run(self) {
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Outbox relay started");
        loop {
            if let Err(e) = self.drain_once().await {
                match e {
                    ServiceError::Database(ref db) => {
                        error!(error = %db, "Outbox relay database error")
                    }
                    other => error!(error = %other, "Outbox relay error"),
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
