//! Certificates: issued, hashed proof-of-credit documents.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places carried by certificate credit amounts.
pub const CERTIFICATE_DECIMAL_PLACES: u32 = 2;

/// Sentinel verification_id for certificates issued from marketplace
/// purchases, which have no associated verification.
pub const MARKETPLACE_VERIFICATION_ID: i64 = 0;

/// Lifecycle status of a certificate. `Revoked` is terminal and blocks
/// downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Valid,
    Expired,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Valid => "valid",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(CertificateStatus::Valid),
            "expired" => Some(CertificateStatus::Expired),
            "revoked" => Some(CertificateStatus::Revoked),
            _ => None,
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An issued proof-of-credit document.
///
/// Provenance links (`verification_id`, `trip_id`, `user_id`) are held
/// by value, not foreign keys; the verification lives in a different
/// service, so the coupling is deliberately loose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,
    pub verification_id: i64,
    pub trip_id: i64,
    pub user_id: i64,
    pub credit_amount: Decimal,
    /// Unique content address; see [`crate::crypto::certificate_hash`].
    pub cert_hash: String,
    pub issue_date: DateTime<Utc>,
    /// Set asynchronously after rendering; a certificate without a PDF
    /// is still valid and queryable.
    pub pdf_url: Option<String>,
    pub template_id: Option<i64>,
    pub status: CertificateStatus,
    pub revoke_reason: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to persist a new certificate; the store assigns the ID.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub verification_id: i64,
    pub trip_id: i64,
    pub user_id: i64,
    pub credit_amount: Decimal,
    pub cert_hash: String,
    pub issue_date: DateTime<Utc>,
    pub template_id: Option<i64>,
}

/// PDF layout template metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateTemplate {
    pub id: i64,
    pub template_name: String,
    pub pdf_template_path: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// How a certificate verification was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMethod {
    System,
    Manual,
    Public,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::System => "system",
            VerificationMethod::Manual => "manual",
            VerificationMethod::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(VerificationMethod::System),
            "manual" => Some(VerificationMethod::Manual),
            "public" => Some(VerificationMethod::Public),
            _ => None,
        }
    }
}

/// Append-only audit record of a verify call against a certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateVerificationLog {
    pub id: i64,
    pub cert_id: i64,
    pub verified_by: Option<i64>,
    pub verified_at: DateTime<Utc>,
    pub verification_method: VerificationMethod,
}

/// Append-only audit record of a certificate download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateDownloadLog {
    pub id: i64,
    pub cert_id: i64,
    pub downloaded_by: Option<i64>,
    pub downloaded_at: DateTime<Utc>,
}
