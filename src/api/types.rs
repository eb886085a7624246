//! Request and response bodies for the HTTP surface.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Certificate, CertificateStatus, SortBy, SortOrder, Verification, VerificationStats,
    VerificationStatus,
};

#[derive(Debug, Deserialize)]
pub struct CreateVerificationRequest {
    pub trip_id: String,
    pub co2_saved_kg: Decimal,
    pub credits_suggested: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub remarks: String,
}

/// Listing query: filters, pagination, sorting. Unknown sort fields
/// fail deserialization rather than being silently ignored.
#[derive(Debug, Deserialize)]
pub struct ListVerificationsQuery {
    #[serde(default)]
    pub status: Option<VerificationStatus>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub success: bool,
    pub data: Verification,
}

impl VerificationResponse {
    pub fn new(data: Verification) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VerificationListResponse {
    pub success: bool,
    pub data: Vec<Verification>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: VerificationStats,
}

#[derive(Debug, Deserialize)]
pub struct GenerateCertificateRequest {
    pub verification_id: i64,
    pub trip_id: i64,
    pub user_id: i64,
    pub credit_amount: Decimal,
    #[serde(default)]
    pub template_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RevokeCertificateRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListCertificatesQuery {
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub status: Option<CertificateStatus>,
}

#[derive(Debug, Serialize)]
pub struct CertificateResponse {
    pub success: bool,
    pub data: Certificate,
}

impl CertificateResponse {
    pub fn new(data: Certificate) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CertificateListResponse {
    pub success: bool,
    pub data: Vec<Certificate>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct VerifyCertificateResponse {
    pub success: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Certificate>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    pub pdf_url: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Exact page count for offset pagination.
pub fn total_pages(total: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
    }

    #[test]
    fn list_query_defaults() {
        let q: ListVerificationsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.page_size, 20);
        assert_eq!(q.sort_by, SortBy::CreatedAt);
        assert_eq!(q.sort_order, SortOrder::Desc);
        assert!(q.status.is_none());
    }

    #[test]
    fn list_query_rejects_unknown_sort_column() {
        let result = serde_json::from_str::<ListVerificationsQuery>(
            r#"{"sort_by": "signature_hash"}"#,
        );
        assert!(result.is_err());
    }
}
