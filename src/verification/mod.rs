//! Verification state machine: PENDING -> APPROVED | REJECTED.
//!
//! Terminal transitions write the status mutation and the outgoing
//! event in one transaction through the store's outbox path, so the
//! bus being down cannot lose an adjudication event.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::bus::EventHandler;
use crate::crypto::approval_signature;
use crate::domain::{
    InboundEvent, OutboundEvent, Page, SortBy, SortOrder, Verification, VerificationFilter,
    VerificationStats, VerificationStatus,
};
use crate::infra::{Result, ServiceError, VerificationStore};

/// Minimum length of a rejection justification.
pub const MIN_REJECT_REMARKS: usize = 10;

/// Application service for verification records.
pub struct VerificationService {
    store: Arc<dyn VerificationStore>,
}

impl VerificationService {
    pub fn new(store: Arc<dyn VerificationStore>) -> Self {
        Self { store }
    }

    /// Register a new pending verification for a trip.
    ///
    /// One verification per trip: an advisory lookup rejects obvious
    /// duplicates early, and the unique index on trip_id catches the
    /// race between concurrent submitters. Both surface as Conflict.
    #[instrument(skip(self))]
    pub async fn create_verification(
        &self,
        trip_id: &str,
        user_id: &str,
        co2_saved_kg: Decimal,
        credits_suggested: Decimal,
    ) -> Result<Verification> {
        if trip_id.trim().is_empty() {
            return Err(ServiceError::Validation("trip_id must not be empty".into()));
        }
        if co2_saved_kg <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "co2_saved_kg must be positive".into(),
            ));
        }
        if credits_suggested <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "credits_suggested must be positive".into(),
            ));
        }

        if self.store.get_by_trip_id(trip_id).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "verification already exists for trip {trip_id}"
            )));
        }

        let record = Verification::new(trip_id, user_id, co2_saved_kg, credits_suggested);
        self.store.create(&record).await?;

        info!(verification_id = %record.id, trip_id, "Verification created");
        Ok(record)
    }

    pub async fn get_verification(&self, id: Uuid) -> Result<Verification> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("verification", id))
    }

    pub async fn list_verifications(
        &self,
        filter: &VerificationFilter,
        page: Page,
        sort_by: SortBy,
        sort_order: SortOrder,
    ) -> Result<(Vec<Verification>, u64)> {
        self.store.list(filter, page, sort_by, sort_order).await
    }

    /// Approve a pending verification.
    ///
    /// Computes the verifier's attestation signature over the approval
    /// tuple, then applies the transition and the outbound event in one
    /// transaction.
    #[instrument(skip(self))]
    pub async fn approve_verification(
        &self,
        id: Uuid,
        verifier_id: &str,
        remarks: Option<&str>,
    ) -> Result<Verification> {
        let mut record = self.get_verification(id).await?;
        self.require_pending(&record)?;

        let now = Utc::now();
        let signature =
            approval_signature(&id.to_string(), verifier_id, record.credits_suggested, now);

        record.status = VerificationStatus::Approved;
        record.verifier_id = Some(verifier_id.to_string());
        record.remarks = remarks.map(str::to_string);
        record.signature_hash = Some(signature);
        record.signed_at = Some(now);
        record.updated_at = now;

        let event = OutboundEvent::VerificationApproved {
            verification_id: record.id.to_string(),
            trip_id: record.trip_id.clone(),
            user_id: record.user_id.clone(),
            verifier_id: verifier_id.to_string(),
            co2_saved_kg: record.co2_saved_kg,
            credits_awarded: record.credits_suggested,
            timestamp: now,
        };
        self.store.update_with_outbox(&record, &event).await?;

        info!(verification_id = %record.id, verifier_id, "Verification approved");
        Ok(record)
    }

    /// Reject a pending verification. Remarks are mandatory and
    /// validated before any read or write happens.
    #[instrument(skip(self))]
    pub async fn reject_verification(
        &self,
        id: Uuid,
        verifier_id: &str,
        remarks: &str,
    ) -> Result<Verification> {
        if remarks.trim().len() < MIN_REJECT_REMARKS {
            return Err(ServiceError::Validation(format!(
                "rejection remarks must be at least {MIN_REJECT_REMARKS} characters"
            )));
        }

        let mut record = self.get_verification(id).await?;
        self.require_pending(&record)?;

        let now = Utc::now();
        record.status = VerificationStatus::Rejected;
        record.verifier_id = Some(verifier_id.to_string());
        record.remarks = Some(remarks.to_string());
        record.updated_at = now;

        let event = OutboundEvent::VerificationRejected {
            verification_id: record.id.to_string(),
            trip_id: record.trip_id.clone(),
            user_id: record.user_id.clone(),
            verifier_id: verifier_id.to_string(),
            reason: remarks.to_string(),
            timestamp: now,
        };
        self.store.update_with_outbox(&record, &event).await?;

        info!(verification_id = %record.id, verifier_id, "Verification rejected");
        Ok(record)
    }

    pub async fn statistics(&self, user_id: Option<&str>) -> Result<VerificationStats> {
        self.store.statistics(user_id).await
    }

    fn require_pending(&self, record: &Verification) -> Result<()> {
        if record.status != VerificationStatus::Pending {
            return Err(ServiceError::Validation(format!(
                "verification {} is already {}",
                record.id, record.status
            )));
        }
        Ok(())
    }
}

/// Bus-facing side of the verification service: registers submitted
/// trips as pending verifications.
pub struct TripSubmittedHandler {
    service: Arc<VerificationService>,
}

impl TripSubmittedHandler {
    pub fn new(service: Arc<VerificationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for TripSubmittedHandler {
    async fn handle(&self, event: InboundEvent) -> Result<()> {
        let InboundEvent::TripSubmitted(e) = event else {
            // Filter subjects keep other kinds out; ack if one slips in.
            return Ok(());
        };

        match self
            .service
            .create_verification(&e.trip_id, &e.user_id, e.co2_saved_kg, e.credits_suggested)
            .await
        {
            Ok(_) => Ok(()),
            // Redelivered submission for a trip we already registered.
            Err(ServiceError::Conflict(msg)) => {
                info!(msg, "Duplicate trip submission acknowledged");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
