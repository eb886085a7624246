//! Trait seams between the service layer and its collaborators.
//!
//! Stores, the event publisher, and the PDF renderer are all behind
//! traits so the state machine and issuance pipeline can be exercised
//! against mocks without a database or broker.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::{
    Certificate, CertificateDownloadLog, CertificateStatus, CertificateTemplate,
    CertificateVerificationLog, NewCertificate, OutboundEvent, Page, SortBy, SortOrder,
    Verification, VerificationFilter, VerificationMethod, VerificationStats,
};

use super::Result;

/// Persistence contract for verification records.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn create(&self, record: &Verification) -> Result<()>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Verification>>;

    async fn get_by_trip_id(&self, trip_id: &str) -> Result<Option<Verification>>;

    /// List with filters, offset pagination, and sorting. The total is
    /// counted before limit/offset so `total_pages` is exact.
    async fn list(
        &self,
        filter: &VerificationFilter,
        page: Page,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<(Vec<Verification>, u64)>;

    async fn update(&self, record: &Verification) -> Result<()>;

    /// Apply a terminal transition and enqueue its domain event in the
    /// same transaction (transactional outbox).
    async fn update_with_outbox(
        &self,
        record: &Verification,
        event: &OutboundEvent,
    ) -> Result<()>;

    async fn statistics<'a>(&self, user_id: Option<&'a str>) -> Result<VerificationStats>;
}

/// Persistence contract for certificates and their audit logs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn create(&self, cert: &NewCertificate) -> Result<Certificate>;

    async fn get_by_id(&self, cert_id: i64) -> Result<Option<Certificate>>;

    async fn get_by_hash(&self, cert_hash: &str) -> Result<Option<Certificate>>;

    async fn list_by_user(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Certificate>, u64)>;

    async fn list_all(
        &self,
        skip: i64,
        limit: i64,
        status: Option<CertificateStatus>,
    ) -> Result<(Vec<Certificate>, u64)>;

    async fn update(&self, cert: &Certificate) -> Result<()>;

    async fn log_verification(
        &self,
        cert_id: i64,
        verified_by: Option<i64>,
        method: VerificationMethod,
    ) -> Result<CertificateVerificationLog>;

    async fn log_download(
        &self,
        cert_id: i64,
        downloaded_by: Option<i64>,
    ) -> Result<CertificateDownloadLog>;

    async fn get_template(&self, template_id: i64) -> Result<Option<CertificateTemplate>>;
}

/// Outgoing event transport. Implemented by the NATS adapter; failures
/// surface as [`crate::infra::ServiceError::Bus`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a pre-serialized body to a subject. The outbox relay
    /// uses this form to replay persisted events verbatim.
    async fn publish_raw(&self, subject: &str, payload: &serde_json::Value) -> Result<()>;

    async fn publish(&self, event: &OutboundEvent) -> Result<()> {
        self.publish_raw(&event.subject(), &event.to_payload()).await
    }
}

/// Result of a successful render.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    /// URL to serve the document from.
    pub url: String,
    /// Local path when the renderer writes to shared storage; used for
    /// post-render integrity checking.
    pub local_path: Option<PathBuf>,
}

/// Opaque external PDF renderer. Rendering is best-effort: a failure
/// here never fails certificate creation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render<'a>(
        &self,
        certificate: &Certificate,
        template: Option<&'a CertificateTemplate>,
    ) -> Result<RenderedPdf>;
}
