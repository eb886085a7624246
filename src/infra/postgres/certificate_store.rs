//! PostgreSQL certificate store.
//!
//! Certificates plus their append-only verification and download audit
//! logs, and the PDF template catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPool, FromRow};

use crate::domain::{
    Certificate, CertificateDownloadLog, CertificateStatus, CertificateTemplate,
    CertificateVerificationLog, NewCertificate, VerificationMethod,
};
use crate::infra::{is_unique_violation, CertificateStore, Result, ServiceError};

/// PostgreSQL-backed certificate store.
pub struct PgCertificateStore {
    pool: PgPool,
}

impl PgCertificateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CERTIFICATE_COLUMNS: &str = "id, verification_id, trip_id, user_id, credit_amount, \
     cert_hash, issue_date, pdf_url, template_id, status, revoke_reason, revoked_at, \
     revoked_by, created_at, updated_at";

#[async_trait]
impl CertificateStore for PgCertificateStore {
    async fn create(&self, cert: &NewCertificate) -> Result<Certificate> {
        let result = sqlx::query_as::<_, CertificateRow>(&format!(
            r#"
            INSERT INTO certificates (
                verification_id, trip_id, user_id, credit_amount,
                cert_hash, issue_date, template_id, status
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'valid')
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        ))
        .bind(cert.verification_id)
        .bind(cert.trip_id)
        .bind(cert.user_id)
        .bind(cert.credit_amount)
        .bind(&cert.cert_hash)
        .bind(cert.issue_date)
        .bind(cert.template_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.into_domain(),
            Err(e) if is_unique_violation(&e) => Err(ServiceError::Conflict(format!(
                "certificate already exists with hash {}",
                cert.cert_hash
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_id(&self, cert_id: i64) -> Result<Option<Certificate>> {
        let row = sqlx::query_as::<_, CertificateRow>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE id = $1"
        ))
        .bind(cert_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CertificateRow::into_domain).transpose()
    }

    async fn get_by_hash(&self, cert_hash: &str) -> Result<Option<Certificate>> {
        let row = sqlx::query_as::<_, CertificateRow>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE cert_hash = $1"
        ))
        .bind(cert_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CertificateRow::into_domain).transpose()
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Certificate>, u64)> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM certificates WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query_as::<_, CertificateRow>(&format!(
            r#"
            SELECT {CERTIFICATE_COLUMNS} FROM certificates
            WHERE user_id = $1
            ORDER BY issue_date DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        let certs = rows
            .into_iter()
            .map(CertificateRow::into_domain)
            .collect::<Result<Vec<_>>>()?;
        Ok((certs, total as u64))
    }

    async fn list_all(
        &self,
        skip: i64,
        limit: i64,
        status: Option<CertificateStatus>,
    ) -> Result<(Vec<Certificate>, u64)> {
        let (total, rows) = match status {
            Some(status) => {
                let (total,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM certificates WHERE status = $1")
                        .bind(status.as_str())
                        .fetch_one(&self.pool)
                        .await?;
                let rows = sqlx::query_as::<_, CertificateRow>(&format!(
                    r#"
                    SELECT {CERTIFICATE_COLUMNS} FROM certificates
                    WHERE status = $1
                    ORDER BY issue_date DESC
                    LIMIT $2 OFFSET $3
                    "#
                ))
                .bind(status.as_str())
                .bind(limit)
                .bind(skip)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
            None => {
                let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM certificates")
                    .fetch_one(&self.pool)
                    .await?;
                let rows = sqlx::query_as::<_, CertificateRow>(&format!(
                    r#"
                    SELECT {CERTIFICATE_COLUMNS} FROM certificates
                    ORDER BY issue_date DESC
                    LIMIT $1 OFFSET $2
                    "#
                ))
                .bind(limit)
                .bind(skip)
                .fetch_all(&self.pool)
                .await?;
                (total, rows)
            }
        };

        let certs = rows
            .into_iter()
            .map(CertificateRow::into_domain)
            .collect::<Result<Vec<_>>>()?;
        Ok((certs, total as u64))
    }

    async fn update(&self, cert: &Certificate) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE certificates
            SET pdf_url = $2, template_id = $3, status = $4,
                revoke_reason = $5, revoked_at = $6, revoked_by = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(cert.id)
        .bind(&cert.pdf_url)
        .bind(cert.template_id)
        .bind(cert.status.as_str())
        .bind(&cert.revoke_reason)
        .bind(cert.revoked_at)
        .bind(cert.revoked_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("certificate", cert.id));
        }
        Ok(())
    }

    async fn log_verification(
        &self,
        cert_id: i64,
        verified_by: Option<i64>,
        method: VerificationMethod,
    ) -> Result<CertificateVerificationLog> {
        let row = sqlx::query_as::<_, VerificationLogRow>(
            r#"
            INSERT INTO certificate_verifications (cert_id, verified_by, verification_method)
            VALUES ($1, $2, $3)
            RETURNING id, cert_id, verified_by, verified_at, verification_method
            "#,
        )
        .bind(cert_id)
        .bind(verified_by)
        .bind(method.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn log_download(
        &self,
        cert_id: i64,
        downloaded_by: Option<i64>,
    ) -> Result<CertificateDownloadLog> {
        let row = sqlx::query_as::<_, DownloadLogRow>(
            r#"
            INSERT INTO certificate_downloads (cert_id, downloaded_by)
            VALUES ($1, $2)
            RETURNING id, cert_id, downloaded_by, downloaded_at
            "#,
        )
        .bind(cert_id)
        .bind(downloaded_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(CertificateDownloadLog {
            id: row.id,
            cert_id: row.cert_id,
            downloaded_by: row.downloaded_by,
            downloaded_at: row.downloaded_at,
        })
    }

    async fn get_template(&self, template_id: i64) -> Result<Option<CertificateTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, template_name, pdf_template_path, description, is_active, created_at
            FROM certificate_templates
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TemplateRow::into_domain))
    }
}

/// Raw row from the certificates table.
#[derive(Debug, FromRow)]
struct CertificateRow {
    id: i64,
    verification_id: i64,
    trip_id: i64,
    user_id: i64,
    credit_amount: Decimal,
    cert_hash: String,
    issue_date: DateTime<Utc>,
    pdf_url: Option<String>,
    template_id: Option<i64>,
    status: String,
    revoke_reason: Option<String>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CertificateRow {
    fn into_domain(self) -> Result<Certificate> {
        let status = CertificateStatus::parse(&self.status).ok_or_else(|| {
            ServiceError::Internal(format!("unknown certificate status: {}", self.status))
        })?;
        Ok(Certificate {
            id: self.id,
            verification_id: self.verification_id,
            trip_id: self.trip_id,
            user_id: self.user_id,
            credit_amount: self.credit_amount,
            cert_hash: self.cert_hash,
            issue_date: self.issue_date,
            pdf_url: self.pdf_url,
            template_id: self.template_id,
            status,
            revoke_reason: self.revoke_reason,
            revoked_at: self.revoked_at,
            revoked_by: self.revoked_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: i64,
    template_name: String,
    pdf_template_path: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TemplateRow {
    fn into_domain(self) -> CertificateTemplate {
        CertificateTemplate {
            id: self.id,
            template_name: self.template_name,
            pdf_template_path: self.pdf_template_path,
            description: self.description,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VerificationLogRow {
    id: i64,
    cert_id: i64,
    verified_by: Option<i64>,
    verified_at: DateTime<Utc>,
    verification_method: String,
}

impl VerificationLogRow {
    fn into_domain(self) -> Result<CertificateVerificationLog> {
        let method = VerificationMethod::parse(&self.verification_method).ok_or_else(|| {
            ServiceError::Internal(format!(
                "unknown verification method: {}",
                self.verification_method
            ))
        })?;
        Ok(CertificateVerificationLog {
            id: self.id,
            cert_id: self.cert_id,
            verified_by: self.verified_by,
            verified_at: self.verified_at,
            verification_method: method,
        })
    }
}

#[derive(Debug, FromRow)]
struct DownloadLogRow {
    id: i64,
    cert_id: i64,
    downloaded_by: Option<i64>,
    downloaded_at: DateTime<Utc>,
}
