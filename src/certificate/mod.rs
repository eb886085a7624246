//! Certificate issuance pipeline.
//!
//! Certificates are content-addressed: the hash over the provenance
//! tuple is the public identity of the document. PDF rendering is a
//! best-effort side effect; a certificate without a PDF is still valid.

mod renderer;

pub use renderer::HttpPdfRenderer;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::bus::EventHandler;
use crate::domain::InboundEvent;

use crate::crypto::{certificate_hash, file_sha256, uuid_to_int};
use crate::domain::{
    Certificate, CertificateStatus, CertificateTemplate, CreditPurchasedEvent, NewCertificate,
    OutboundEvent, TripVerifiedEvent, VerificationMethod, CERTIFICATE_DECIMAL_PLACES,
    MARKETPLACE_VERIFICATION_ID,
};
use crate::infra::{CertificateStore, EventPublisher, PdfRenderer, Result, ServiceError};

/// Template for certificates issued from verified trips.
pub const TRIP_TEMPLATE_ID: i64 = 1;
/// Template for certificates issued from marketplace purchases.
pub const MARKETPLACE_TEMPLATE_ID: i64 = 2;

/// Application service for certificates.
pub struct CertificateService {
    store: Arc<dyn CertificateStore>,
    publisher: Arc<dyn EventPublisher>,
    renderer: Arc<dyn PdfRenderer>,
}

impl CertificateService {
    pub fn new(
        store: Arc<dyn CertificateStore>,
        publisher: Arc<dyn EventPublisher>,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Self {
        Self {
            store,
            publisher,
            renderer,
        }
    }

    /// Issue a certificate for a verified credit amount.
    ///
    /// The amount is quantized to the certificate precision before
    /// hashing so the stored value and the hashed value can never
    /// disagree. Render failure downgrades to a warning; publish
    /// failure is surfaced to the caller after the certificate exists.
    #[instrument(skip(self))]
    pub async fn issue_certificate(
        &self,
        verification_id: i64,
        trip_id: i64,
        user_id: i64,
        credit_amount: Decimal,
        template_id: Option<i64>,
    ) -> Result<Certificate> {
        if credit_amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "credit_amount must be positive".into(),
            ));
        }

        let amount = credit_amount.round_dp(CERTIFICATE_DECIMAL_PLACES);
        let issue_date = Utc::now();
        let cert_hash = certificate_hash(verification_id, trip_id, user_id, amount, issue_date);

        let mut cert = self
            .store
            .create(&NewCertificate {
                verification_id,
                trip_id,
                user_id,
                credit_amount: amount,
                cert_hash,
                issue_date,
                template_id,
            })
            .await?;

        let template = match template_id {
            Some(id) => self.store.get_template(id).await?,
            None => None,
        };
        if let Some(url) = self.render_pdf(&cert, template.as_ref()).await {
            cert.pdf_url = Some(url);
            self.store.update(&cert).await?;
        }

        self.publisher
            .publish(&OutboundEvent::CertificateGenerated(cert.clone()))
            .await?;

        info!(cert_id = cert.id, cert_hash = %cert.cert_hash, "Certificate issued");
        Ok(cert)
    }

    /// Render the PDF. Returns the URL on success, `None` on failure.
    async fn render_pdf(
        &self,
        cert: &Certificate,
        template: Option<&CertificateTemplate>,
    ) -> Option<String> {
        match self.renderer.render(cert, template).await {
            Ok(rendered) => {
                if let Some(path) = &rendered.local_path {
                    match file_sha256(path) {
                        Ok(digest) => {
                            info!(cert_id = cert.id, pdf_sha256 = %digest, "Certificate PDF rendered")
                        }
                        Err(e) => {
                            warn!(cert_id = cert.id, error = %e, "Rendered PDF is unreadable")
                        }
                    }
                }
                Some(rendered.url)
            }
            Err(e) => {
                warn!(cert_id = cert.id, error = %e, "PDF render failed; certificate stands");
                None
            }
        }
    }

    pub async fn get_certificate(&self, cert_id: i64) -> Result<Certificate> {
        self.store
            .get_by_id(cert_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("certificate", cert_id))
    }

    pub async fn list_by_user(
        &self,
        user_id: i64,
        skip: i64,
        limit: i64,
    ) -> Result<(Vec<Certificate>, u64)> {
        self.store.list_by_user(user_id, skip, limit).await
    }

    pub async fn list_all(
        &self,
        skip: i64,
        limit: i64,
        status: Option<CertificateStatus>,
    ) -> Result<(Vec<Certificate>, u64)> {
        self.store.list_all(skip, limit, status).await
    }

    /// Public authenticity check by content hash.
    ///
    /// Unknown hash yields `(false, None)`. A known but non-valid
    /// certificate yields `(false, Some)` so the caller can show why.
    /// Only a successful check is logged and announced.
    #[instrument(skip(self))]
    pub async fn verify_by_hash(&self, cert_hash: &str) -> Result<(bool, Option<Certificate>)> {
        let Some(cert) = self.store.get_by_hash(cert_hash).await? else {
            return Ok((false, None));
        };

        if cert.status != CertificateStatus::Valid {
            return Ok((false, Some(cert)));
        }

        self.store
            .log_verification(cert.id, None, VerificationMethod::Public)
            .await?;
        self.publisher
            .publish(&OutboundEvent::CertificateVerified {
                cert_id: cert.id,
                verified_by: None,
                method: VerificationMethod::Public.as_str().to_string(),
            })
            .await?;

        Ok((true, Some(cert)))
    }

    /// Authenticated verification by certificate ID.
    #[instrument(skip(self))]
    pub async fn verify_certificate(
        &self,
        cert_id: i64,
        verified_by: Option<i64>,
        method: VerificationMethod,
    ) -> Result<(bool, Certificate)> {
        let cert = self.get_certificate(cert_id).await?;
        let valid = cert.status == CertificateStatus::Valid;

        self.store
            .log_verification(cert.id, verified_by, method)
            .await?;
        self.publisher
            .publish(&OutboundEvent::CertificateVerified {
                cert_id: cert.id,
                verified_by,
                method: method.as_str().to_string(),
            })
            .await?;

        Ok((valid, cert))
    }

    /// Revoke a certificate. One-way: a revoked certificate can never
    /// return to valid.
    #[instrument(skip(self))]
    pub async fn revoke_certificate(
        &self,
        cert_id: i64,
        revoked_by: i64,
        reason: Option<&str>,
    ) -> Result<Certificate> {
        let mut cert = self.get_certificate(cert_id).await?;

        if cert.status == CertificateStatus::Revoked {
            return Err(ServiceError::Validation(format!(
                "certificate {cert_id} is already revoked"
            )));
        }

        let now = Utc::now();
        cert.status = CertificateStatus::Revoked;
        cert.revoke_reason = reason.map(str::to_string);
        cert.revoked_at = Some(now);
        cert.revoked_by = Some(revoked_by);
        cert.updated_at = now;
        self.store.update(&cert).await?;

        self.publisher
            .publish(&OutboundEvent::CertificateRevoked {
                cert_id: cert.id,
                user_id: cert.user_id,
                revoked_by,
                reason: cert.revoke_reason.clone().unwrap_or_default(),
                credit_amount: cert.credit_amount,
            })
            .await?;

        info!(cert_id, revoked_by, "Certificate revoked");
        Ok(cert)
    }

    /// Resolve the PDF URL for download.
    ///
    /// Revocation blocks download outright, before the PDF check, so a
    /// revoked certificate with a surviving PDF is still inaccessible.
    #[instrument(skip(self))]
    pub async fn download_certificate(
        &self,
        cert_id: i64,
        user_id: Option<i64>,
    ) -> Result<String> {
        let cert = self.get_certificate(cert_id).await?;

        if cert.status == CertificateStatus::Revoked {
            return Err(ServiceError::Forbidden(format!(
                "certificate {cert_id} has been revoked"
            )));
        }
        let Some(url) = cert.pdf_url else {
            return Err(ServiceError::not_found("certificate PDF", cert_id));
        };

        self.store.log_download(cert_id, user_id).await?;
        self.publisher
            .publish(&OutboundEvent::CertificateDownloaded { cert_id, user_id })
            .await?;

        Ok(url)
    }

    /// Issue from an approval event. IDs map through directly.
    pub async fn issue_from_trip_verified(&self, event: &TripVerifiedEvent) -> Result<Certificate> {
        self.issue_certificate(
            event.verification_id,
            event.trip_id,
            event.user_id,
            event.credit_amount,
            Some(TRIP_TEMPLATE_ID),
        )
        .await
    }

    /// Issue from a marketplace purchase. External UUIDs are bridged
    /// into the integer ID space; there is no backing verification.
    pub async fn issue_from_credit_purchased(
        &self,
        event: &CreditPurchasedEvent,
    ) -> Result<Certificate> {
        let user_id = uuid_to_int(&event.buyer_id);
        let trip_id = match &event.trip_id {
            Some(id) => uuid_to_int(id),
            None => uuid_to_int(&event.transaction_id),
        };
        self.issue_certificate(
            MARKETPLACE_VERIFICATION_ID,
            trip_id,
            user_id,
            event.credit_amount,
            Some(MARKETPLACE_TEMPLATE_ID),
        )
        .await
    }
}

/// Bus-facing side of the certificate service: turns approval and
/// purchase events into certificates.
pub struct CertificateEventHandler {
    service: Arc<CertificateService>,
}

impl CertificateEventHandler {
    pub fn new(service: Arc<CertificateService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for CertificateEventHandler {
    async fn handle(&self, event: InboundEvent) -> Result<()> {
        let result = match &event {
            InboundEvent::TripVerified(e) => self.service.issue_from_trip_verified(e).await,
            InboundEvent::CreditPurchased(e) => self.service.issue_from_credit_purchased(e).await,
            // Filter subjects keep other kinds out; ack if one slips in.
            _ => return Ok(()),
        };

        match result {
            Ok(_) => Ok(()),
            // Redelivery of an already-processed message. Ack, do not
            // requeue.
            Err(ServiceError::Conflict(msg)) => {
                info!(msg, "Duplicate issuance event acknowledged");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{
        MockCertificateStore, MockEventPublisher, MockPdfRenderer, RenderedPdf,
    };
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn cert_with(status: CertificateStatus, pdf_url: Option<&str>) -> Certificate {
        let now = Utc::now();
        Certificate {
            id: 7,
            verification_id: 42,
            trip_id: 3,
            user_id: 9,
            credit_amount: dec!(25.50),
            cert_hash: "ab".repeat(32),
            issue_date: now,
            pdf_url: pdf_url.map(str::to_string),
            template_id: Some(TRIP_TEMPLATE_ID),
            status,
            revoke_reason: None,
            revoked_at: None,
            revoked_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn service(
        store: MockCertificateStore,
        publisher: MockEventPublisher,
        renderer: MockPdfRenderer,
    ) -> CertificateService {
        CertificateService::new(Arc::new(store), Arc::new(publisher), Arc::new(renderer))
    }

    #[tokio::test]
    async fn issue_quantizes_and_survives_render_failure() {
        let mut store = MockCertificateStore::new();
        store
            .expect_create()
            .withf(|c| c.credit_amount == dec!(25.56) && c.cert_hash.len() == 64)
            .returning(|c| {
                let mut cert = cert_with(CertificateStatus::Valid, None);
                cert.credit_amount = c.credit_amount;
                cert.cert_hash = c.cert_hash.clone();
                Ok(cert)
            });
        store
            .expect_get_template()
            .returning(|_| Ok(None));

        let mut renderer = MockPdfRenderer::new();
        renderer
            .expect_render()
            .returning(|_, _| Err(ServiceError::Internal("renderer offline".into())));

        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|e| matches!(e, OutboundEvent::CertificateGenerated(_)))
            .returning(|_| Ok(()));

        let svc = service(store, publisher, renderer);
        let cert = svc
            .issue_certificate(42, 3, 9, dec!(25.555), Some(TRIP_TEMPLATE_ID))
            .await
            .unwrap();
        assert_eq!(cert.credit_amount, dec!(25.56));
        assert!(cert.pdf_url.is_none());
    }

    #[tokio::test]
    async fn issue_stores_pdf_url_on_render_success() {
        let mut store = MockCertificateStore::new();
        store
            .expect_create()
            .returning(|_| Ok(cert_with(CertificateStatus::Valid, None)));
        store.expect_get_template().returning(|_| Ok(None));
        store
            .expect_update()
            .withf(|c| c.pdf_url.as_deref() == Some("/files/cert-7.pdf"))
            .returning(|_| Ok(()));

        let mut renderer = MockPdfRenderer::new();
        renderer.expect_render().returning(|_, _| {
            Ok(RenderedPdf {
                url: "/files/cert-7.pdf".into(),
                local_path: None,
            })
        });

        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().returning(|_| Ok(()));

        let svc = service(store, publisher, renderer);
        let cert = svc
            .issue_certificate(42, 3, 9, dec!(25.50), Some(TRIP_TEMPLATE_ID))
            .await
            .unwrap();
        assert_eq!(cert.pdf_url.as_deref(), Some("/files/cert-7.pdf"));
    }

    #[tokio::test]
    async fn verify_by_hash_unknown() {
        let mut store = MockCertificateStore::new();
        store.expect_get_by_hash().returning(|_| Ok(None));

        let svc = service(store, MockEventPublisher::new(), MockPdfRenderer::new());
        let (valid, cert) = svc.verify_by_hash("deadbeef").await.unwrap();
        assert!(!valid);
        assert!(cert.is_none());
    }

    #[tokio::test]
    async fn verify_by_hash_revoked_is_invalid_but_returned() {
        let mut store = MockCertificateStore::new();
        store
            .expect_get_by_hash()
            .returning(|_| Ok(Some(cert_with(CertificateStatus::Revoked, None))));

        // No log_verification or publish expectations: a failed check
        // must not produce an audit entry or an event.
        let svc = service(store, MockEventPublisher::new(), MockPdfRenderer::new());
        let (valid, cert) = svc.verify_by_hash(&"ab".repeat(32)).await.unwrap();
        assert!(!valid);
        assert_eq!(cert.unwrap().status, CertificateStatus::Revoked);
    }

    #[tokio::test]
    async fn verify_by_hash_valid_logs_and_publishes() {
        let mut store = MockCertificateStore::new();
        store
            .expect_get_by_hash()
            .returning(|_| Ok(Some(cert_with(CertificateStatus::Valid, None))));
        store
            .expect_log_verification()
            .withf(|_, by, method| by.is_none() && *method == VerificationMethod::Public)
            .returning(|cert_id, verified_by, method| {
                Ok(crate::domain::CertificateVerificationLog {
                    id: 1,
                    cert_id,
                    verified_by,
                    verified_at: Utc::now(),
                    verification_method: method,
                })
            });

        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|e| matches!(e, OutboundEvent::CertificateVerified { .. }))
            .returning(|_| Ok(()));

        let svc = service(store, publisher, MockPdfRenderer::new());
        let (valid, _) = svc.verify_by_hash(&"ab".repeat(32)).await.unwrap();
        assert!(valid);
    }

    #[tokio::test]
    async fn revoke_is_one_way() {
        let mut store = MockCertificateStore::new();
        store
            .expect_get_by_id()
            .returning(|_| Ok(Some(cert_with(CertificateStatus::Revoked, None))));

        let svc = service(store, MockEventPublisher::new(), MockPdfRenderer::new());
        let err = svc.revoke_certificate(7, 99, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn revoke_publishes_event() {
        let mut store = MockCertificateStore::new();
        store
            .expect_get_by_id()
            .returning(|_| Ok(Some(cert_with(CertificateStatus::Valid, None))));
        store
            .expect_update()
            .withf(|c| {
                c.status == CertificateStatus::Revoked
                    && c.revoked_by == Some(99)
                    && c.revoked_at.is_some()
            })
            .returning(|_| Ok(()));

        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|e| matches!(e, OutboundEvent::CertificateRevoked { revoked_by: 99, .. }))
            .returning(|_| Ok(()));

        let svc = service(store, publisher, MockPdfRenderer::new());
        let cert = svc
            .revoke_certificate(7, 99, Some("issued in error"))
            .await
            .unwrap();
        assert_eq!(cert.status, CertificateStatus::Revoked);
    }

    #[tokio::test]
    async fn download_revoked_is_forbidden_even_with_pdf() {
        let mut store = MockCertificateStore::new();
        store.expect_get_by_id().returning(|_| {
            Ok(Some(cert_with(
                CertificateStatus::Revoked,
                Some("/files/cert-7.pdf"),
            )))
        });

        let svc = service(store, MockEventPublisher::new(), MockPdfRenderer::new());
        let err = svc.download_certificate(7, Some(9)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn download_without_pdf_is_not_found() {
        let mut store = MockCertificateStore::new();
        store
            .expect_get_by_id()
            .returning(|_| Ok(Some(cert_with(CertificateStatus::Valid, None))));

        let svc = service(store, MockEventPublisher::new(), MockPdfRenderer::new());
        let err = svc.download_certificate(7, Some(9)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn download_logs_and_publishes() {
        let mut store = MockCertificateStore::new();
        store.expect_get_by_id().returning(|_| {
            Ok(Some(cert_with(
                CertificateStatus::Valid,
                Some("/files/cert-7.pdf"),
            )))
        });
        store
            .expect_log_download()
            .returning(|cert_id, downloaded_by| {
                Ok(crate::domain::CertificateDownloadLog {
                    id: 1,
                    cert_id,
                    downloaded_by,
                    downloaded_at: Utc::now(),
                })
            });

        let mut publisher = MockEventPublisher::new();
        publisher
            .expect_publish()
            .withf(|e| matches!(e, OutboundEvent::CertificateDownloaded { .. }))
            .returning(|_| Ok(()));

        let svc = service(store, publisher, MockPdfRenderer::new());
        let url = svc.download_certificate(7, Some(9)).await.unwrap();
        assert_eq!(url, "/files/cert-7.pdf");
    }

    #[tokio::test]
    async fn handler_acks_duplicate_issuance() {
        let mut store = MockCertificateStore::new();
        store
            .expect_create()
            .returning(|_| Err(ServiceError::Conflict("already issued".into())));
        store.expect_get_template().returning(|_| Ok(None));

        let svc = Arc::new(service(
            store,
            MockEventPublisher::new(),
            MockPdfRenderer::new(),
        ));
        let handler = CertificateEventHandler::new(svc);
        let event = InboundEvent::TripVerified(TripVerifiedEvent {
            verification_id: 42,
            trip_id: 3,
            user_id: 9,
            credit_amount: dec!(25.50),
        });
        assert!(handler.handle(event).await.is_ok());
    }

    #[tokio::test]
    async fn marketplace_issuance_bridges_uuids() {
        let event = CreditPurchasedEvent {
            transaction_id: "c0ffee00-0000-4000-8000-000000000001".into(),
            buyer_id: "deadbeef-0000-4000-8000-000000000002".into(),
            trip_id: None,
            credit_amount: dec!(10.00),
        };
        let expected_user = uuid_to_int(&event.buyer_id);

        let mut store = MockCertificateStore::new();
        store
            .expect_create()
            .withf(move |c| {
                c.verification_id == MARKETPLACE_VERIFICATION_ID
                    && c.user_id == expected_user
                    && c.template_id == Some(MARKETPLACE_TEMPLATE_ID)
            })
            .returning(|_| Ok(cert_with(CertificateStatus::Valid, None)));
        store.expect_get_template().returning(|_| Ok(None));

        let mut renderer = MockPdfRenderer::new();
        renderer
            .expect_render()
            .returning(|_, _| Err(ServiceError::Internal("no renderer".into())));

        let mut publisher = MockEventPublisher::new();
        publisher.expect_publish().returning(|_| Ok(()));

        let svc = service(store, publisher, renderer);
        svc.issue_from_credit_purchased(&event).await.unwrap();
    }
}
