//! PostgreSQL verification store.
//!
//! Holds the verification lifecycle rows plus the outbox table used by
//! terminal transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPool, FromRow};
use uuid::Uuid;

use crate::domain::{
    OutboundEvent, Page, SortBy, SortOrder, Verification, VerificationFilter, VerificationStats,
    VerificationStatus,
};
use crate::infra::outbox::enqueue_tx;
use crate::infra::{is_unique_violation, Result, ServiceError, VerificationStore};

/// PostgreSQL-backed verification store.
pub struct PgVerificationStore {
    pool: PgPool,
}

impl PgVerificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const VERIFICATION_COLUMNS: &str = "id, trip_id, user_id, verifier_id, co2_saved_kg, \
     credits_suggested, status, remarks, signature_hash, signed_at, created_at, updated_at";

/// Build the WHERE clause for a filter. Bind positions start at 1; the
/// caller binds values in the same order the clause was assembled.
fn filter_clause(filter: &VerificationFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(status) = filter.status {
        binds.push(status.as_str().to_string());
        conditions.push(format!("status = ${}", binds.len()));
    }
    if let Some(ref user_id) = filter.user_id {
        binds.push(user_id.clone());
        conditions.push(format!("user_id = ${}", binds.len()));
    }
    if let Some(ref verifier_id) = filter.verifier_id {
        binds.push(verifier_id.clone());
        conditions.push(format!("verifier_id = ${}", binds.len()));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    (clause, binds)
}

#[async_trait]
impl VerificationStore for PgVerificationStore {
    async fn create(&self, record: &Verification) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO verifications (
                id, trip_id, user_id, verifier_id,
                co2_saved_kg, credits_suggested,
                status, remarks, signature_hash, signed_at,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(&record.trip_id)
        .bind(&record.user_id)
        .bind(&record.verifier_id)
        .bind(record.co2_saved_kg)
        .bind(record.credits_suggested)
        .bind(record.status.as_str())
        .bind(&record.remarks)
        .bind(&record.signature_hash)
        .bind(record.signed_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(ServiceError::Conflict(format!(
                "verification already exists for trip {}",
                record.trip_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Verification>> {
        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM verifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VerificationRow::into_domain).transpose()
    }

    async fn get_by_trip_id(&self, trip_id: &str) -> Result<Option<Verification>> {
        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM verifications WHERE trip_id = $1"
        ))
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VerificationRow::into_domain).transpose()
    }

    async fn list(
        &self,
        filter: &VerificationFilter,
        page: Page,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<(Vec<Verification>, u64)> {
        let (clause, binds) = filter_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM verifications{clause}");
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        for b in &binds {
            count_query = count_query.bind(b);
        }
        let (total,) = count_query.fetch_one(&self.pool).await?;

        // Sort column and direction come from closed enums; only filter
        // values are bound.
        let list_sql = format!(
            "SELECT {VERIFICATION_COLUMNS} FROM verifications{clause} ORDER BY {} {} LIMIT ${} OFFSET ${}",
            sort_by.column(),
            sort_order.keyword(),
            binds.len() + 1,
            binds.len() + 2,
        );
        let mut list_query = sqlx::query_as::<_, VerificationRow>(&list_sql);
        for b in &binds {
            list_query = list_query.bind(b);
        }
        let rows = list_query
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .into_iter()
            .map(VerificationRow::into_domain)
            .collect::<Result<Vec<_>>>()?;
        Ok((records, total as u64))
    }

    async fn update(&self, record: &Verification) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE verifications
            SET verifier_id = $2, status = $3, remarks = $4,
                signature_hash = $5, signed_at = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.verifier_id)
        .bind(record.status.as_str())
        .bind(&record.remarks)
        .bind(&record.signature_hash)
        .bind(record.signed_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("verification", record.id));
        }
        Ok(())
    }

    async fn update_with_outbox(
        &self,
        record: &Verification,
        event: &OutboundEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // The status guard makes concurrent approve/reject race-safe:
        // only one transaction moves the row out of PENDING, the loser
        // matches zero rows and surfaces a conflict.
        let result = sqlx::query(
            r#"
            UPDATE verifications
            SET verifier_id = $2, status = $3, remarks = $4,
                signature_hash = $5, signed_at = $6, updated_at = $7
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(record.id)
        .bind(&record.verifier_id)
        .bind(record.status.as_str())
        .bind(&record.remarks)
        .bind(&record.signature_hash)
        .bind(record.signed_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(ServiceError::Conflict(format!(
                "verification {} is not pending",
                record.id
            )));
        }

        enqueue_tx(&mut tx, record.id, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn statistics<'a>(&self, user_id: Option<&'a str>) -> Result<VerificationStats> {
        let row: StatsRow = match user_id {
            Some(uid) => {
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*) AS total,
                           COUNT(*) FILTER (WHERE status = 'PENDING') AS pending,
                           COUNT(*) FILTER (WHERE status = 'APPROVED') AS approved,
                           COUNT(*) FILTER (WHERE status = 'REJECTED') AS rejected,
                           COALESCE(SUM(co2_saved_kg) FILTER (WHERE status = 'APPROVED'), 0) AS total_co2_saved,
                           COALESCE(SUM(credits_suggested) FILTER (WHERE status = 'APPROVED'), 0) AS total_credits
                    FROM verifications
                    WHERE user_id = $1
                    "#,
                )
                .bind(uid)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*) AS total,
                           COUNT(*) FILTER (WHERE status = 'PENDING') AS pending,
                           COUNT(*) FILTER (WHERE status = 'APPROVED') AS approved,
                           COUNT(*) FILTER (WHERE status = 'REJECTED') AS rejected,
                           COALESCE(SUM(co2_saved_kg) FILTER (WHERE status = 'APPROVED'), 0) AS total_co2_saved,
                           COALESCE(SUM(credits_suggested) FILTER (WHERE status = 'APPROVED'), 0) AS total_credits
                    FROM verifications
                    "#,
                )
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(VerificationStats {
            total: row.total as u64,
            pending: row.pending as u64,
            approved: row.approved as u64,
            rejected: row.rejected as u64,
            approval_rate: VerificationStats::approval_rate_of(
                row.approved as u64,
                row.total as u64,
            ),
            total_co2_saved: row.total_co2_saved,
            total_credits: row.total_credits,
        })
    }
}

/// Raw row from the verifications table.
#[derive(Debug, FromRow)]
struct VerificationRow {
    id: Uuid,
    trip_id: String,
    user_id: String,
    verifier_id: Option<String>,
    co2_saved_kg: Decimal,
    credits_suggested: Decimal,
    status: String,
    remarks: Option<String>,
    signature_hash: Option<String>,
    signed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VerificationRow {
    fn into_domain(self) -> Result<Verification> {
        let status = VerificationStatus::parse(&self.status).ok_or_else(|| {
            ServiceError::Internal(format!("unknown verification status: {}", self.status))
        })?;
        Ok(Verification {
            id: self.id,
            trip_id: self.trip_id,
            user_id: self.user_id,
            verifier_id: self.verifier_id,
            co2_saved_kg: self.co2_saved_kg,
            credits_suggested: self.credits_suggested,
            status,
            remarks: self.remarks,
            signature_hash: self.signature_hash,
            signed_at: self.signed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct StatsRow {
    total: i64,
    pending: i64,
    approved: i64,
    rejected: i64,
    total_co2_saved: Decimal,
    total_credits: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_clause_is_positional() {
        let filter = VerificationFilter {
            status: Some(VerificationStatus::Pending),
            user_id: Some("user-1".into()),
            verifier_id: None,
        };
        let (clause, binds) = filter_clause(&filter);
        assert_eq!(clause, " WHERE status = $1 AND user_id = $2");
        assert_eq!(binds, vec!["PENDING".to_string(), "user-1".to_string()]);
    }

    #[test]
    fn empty_filter_has_no_clause() {
        let (clause, binds) = filter_clause(&VerificationFilter::default());
        assert!(clause.is_empty());
        assert!(binds.is_empty());
    }
}
