//! Bus event contracts.
//!
//! Inbound and outbound event kinds are closed enums; dispatch happens
//! on the variant, never on raw strings scattered through handlers.
//! Unknown inbound kinds are a distinct variant so consumers can ack
//! them without retry instead of falling into a poison-message loop.
//!
//! Payload field names are part of a cross-service compatibility
//! contract: outbound bodies are camelCase, and inbound decoding
//! accepts both the dotted and PascalCase spellings of each event type
//! as well as `data`/`payload` envelope wrappers or flat bodies.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Certificate;

/// Subject prefix for all bus traffic belonging to this platform.
pub const SUBJECT_PREFIX: &str = "ccm";

/// Inbound subjects consumed by the verification service.
pub const SUBJECT_TRIP_SUBMITTED: &str = "ccm.trip.submitted";
/// Inbound subjects consumed by the certificate service.
pub const SUBJECT_TRIP_VERIFIED: &str = "ccm.verification.trip.verified";
pub const SUBJECT_CREDIT_PURCHASED: &str = "ccm.credit.purchased";

/// "trip submitted" measurement event from the upstream MRV system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripSubmittedEvent {
    pub trip_id: String,
    pub user_id: String,
    pub co2_saved_kg: Decimal,
    pub credits_suggested: Decimal,
}

/// Approval outcome consumed by the certificate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripVerifiedEvent {
    pub verification_id: i64,
    pub trip_id: i64,
    pub user_id: i64,
    pub credit_amount: Decimal,
}

/// Marketplace purchase event; identifiers are external UUIDs that get
/// bridged into the certificate ID space via [`crate::crypto::uuid_to_int`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPurchasedEvent {
    pub transaction_id: String,
    pub buyer_id: String,
    #[serde(default)]
    pub trip_id: Option<String>,
    pub credit_amount: Decimal,
}

/// Every message shape a consumer can receive.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    TripSubmitted(TripSubmittedEvent),
    TripVerified(TripVerifiedEvent),
    CreditPurchased(CreditPurchasedEvent),
    /// Recognized as a message, but not an event kind we handle.
    /// Acked without retry by design.
    Unknown { event_type: String },
}

/// Reasons an inbound message cannot be decoded at all. Malformed
/// messages are non-retryable, same as unknown kinds.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message has no event type field")]
    MissingEventType,
}

impl InboundEvent {
    /// Decode a raw message body.
    ///
    /// The event type is read from `event_type`, `eventType`, or `type`;
    /// the payload from `data`, `payload`, or the message itself.
    pub fn decode(body: &[u8]) -> Result<Self, EventDecodeError> {
        let msg: serde_json::Value = serde_json::from_slice(body)?;

        let event_type = msg
            .get("event_type")
            .or_else(|| msg.get("eventType"))
            .or_else(|| msg.get("type"))
            .and_then(|v| v.as_str())
            .ok_or(EventDecodeError::MissingEventType)?
            .to_string();

        let data = msg
            .get("data")
            .or_else(|| msg.get("payload"))
            .unwrap_or(&msg);

        let event = match event_type.as_str() {
            "TripSubmitted" | "trip.submitted" => {
                InboundEvent::TripSubmitted(serde_json::from_value(data.clone())?)
            }
            "TripVerified" | "verification.trip.verified" => {
                InboundEvent::TripVerified(serde_json::from_value(data.clone())?)
            }
            "CreditPurchased" | "credit.purchased" => {
                InboundEvent::CreditPurchased(serde_json::from_value(data.clone())?)
            }
            _ => InboundEvent::Unknown { event_type },
        };
        Ok(event)
    }
}

/// Every event this platform publishes.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    VerificationApproved {
        verification_id: String,
        trip_id: String,
        user_id: String,
        verifier_id: String,
        co2_saved_kg: Decimal,
        credits_awarded: Decimal,
        timestamp: DateTime<Utc>,
    },
    VerificationRejected {
        verification_id: String,
        trip_id: String,
        user_id: String,
        verifier_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    CertificateGenerated(Certificate),
    CertificateVerified {
        cert_id: i64,
        verified_by: Option<i64>,
        method: String,
    },
    CertificateDownloaded {
        cert_id: i64,
        user_id: Option<i64>,
    },
    CertificateRevoked {
        cert_id: i64,
        user_id: i64,
        revoked_by: i64,
        reason: String,
        credit_amount: Decimal,
    },
}

impl OutboundEvent {
    /// Dotted event type carried in the body (`eventType` field).
    pub fn event_type(&self) -> &'static str {
        match self {
            OutboundEvent::VerificationApproved { .. } => "verification.approved",
            OutboundEvent::VerificationRejected { .. } => "verification.rejected",
            OutboundEvent::CertificateGenerated(_) => "certificate.generated",
            OutboundEvent::CertificateVerified { .. } => "certificate.verified",
            OutboundEvent::CertificateDownloaded { .. } => "certificate.downloaded",
            OutboundEvent::CertificateRevoked { .. } => "certificate.revoked",
        }
    }

    /// Bus subject the event is published on.
    pub fn subject(&self) -> String {
        format!("{}.{}", SUBJECT_PREFIX, self.event_type())
    }

    /// JSON body. Field names are the cross-service contract; do not
    /// rename without coordinating with downstream consumers.
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            OutboundEvent::VerificationApproved {
                verification_id,
                trip_id,
                user_id,
                verifier_id,
                co2_saved_kg,
                credits_awarded,
                timestamp,
            } => serde_json::json!({
                "eventType": self.event_type(),
                "verificationId": verification_id,
                "tripId": trip_id,
                "userId": user_id,
                "verifierId": verifier_id,
                "co2SavedKg": co2_saved_kg,
                "creditsAwarded": credits_awarded,
                "status": "APPROVED",
                "timestamp": timestamp,
            }),
            OutboundEvent::VerificationRejected {
                verification_id,
                trip_id,
                user_id,
                verifier_id,
                reason,
                timestamp,
            } => serde_json::json!({
                "eventType": self.event_type(),
                "verificationId": verification_id,
                "tripId": trip_id,
                "userId": user_id,
                "verifierId": verifier_id,
                "status": "REJECTED",
                "timestamp": timestamp,
                "reason": reason,
            }),
            OutboundEvent::CertificateGenerated(cert) => serde_json::json!({
                "eventType": self.event_type(),
                "certId": cert.id,
                "verificationId": cert.verification_id,
                "tripId": cert.trip_id,
                "userId": cert.user_id,
                "creditAmount": cert.credit_amount,
                "certHash": cert.cert_hash,
                "status": cert.status,
                "pdfUrl": cert.pdf_url,
                "issueDate": cert.issue_date,
            }),
            OutboundEvent::CertificateVerified {
                cert_id,
                verified_by,
                method,
            } => serde_json::json!({
                "eventType": self.event_type(),
                "certId": cert_id,
                "verifiedBy": verified_by,
                "method": method,
            }),
            OutboundEvent::CertificateDownloaded { cert_id, user_id } => serde_json::json!({
                "eventType": self.event_type(),
                "certId": cert_id,
                "userId": user_id,
            }),
            OutboundEvent::CertificateRevoked {
                cert_id,
                user_id,
                revoked_by,
                reason,
                credit_amount,
            } => serde_json::json!({
                "eventType": self.event_type(),
                "certId": cert_id,
                "userId": user_id,
                "revokedBy": revoked_by,
                "reason": reason,
                "creditAmount": credit_amount,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decode_trip_submitted_enveloped() {
        let body = serde_json::json!({
            "event_type": "TripSubmitted",
            "data": {
                "trip_id": "trip-001",
                "user_id": "user-001",
                "co2_saved_kg": "2.5",
                "credits_suggested": "0.0025",
            }
        });
        let event = InboundEvent::decode(&serde_json::to_vec(&body).unwrap()).unwrap();
        match event {
            InboundEvent::TripSubmitted(e) => {
                assert_eq!(e.trip_id, "trip-001");
                assert_eq!(e.co2_saved_kg, dec!(2.5));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn decode_accepts_dotted_alias_and_flat_body() {
        let body = serde_json::json!({
            "eventType": "trip.submitted",
            "trip_id": "trip-002",
            "user_id": "user-002",
            "co2_saved_kg": "1.0",
            "credits_suggested": "0.001",
        });
        let event = InboundEvent::decode(&serde_json::to_vec(&body).unwrap()).unwrap();
        assert!(matches!(event, InboundEvent::TripSubmitted(_)));
    }

    #[test]
    fn decode_trip_verified() {
        let body = serde_json::json!({
            "event_type": "verification.trip.verified",
            "data": {
                "verification_id": 42,
                "trip_id": 7,
                "user_id": 9,
                "credit_amount": "25.50",
            }
        });
        let event = InboundEvent::decode(&serde_json::to_vec(&body).unwrap()).unwrap();
        match event {
            InboundEvent::TripVerified(e) => {
                assert_eq!(e.verification_id, 42);
                assert_eq!(e.credit_amount, dec!(25.50));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn decode_credit_purchased_camel_case() {
        let body = serde_json::json!({
            "type": "credit.purchased",
            "transactionId": "c0ffee00-0000-4000-8000-000000000001",
            "buyerId": "deadbeef-0000-4000-8000-000000000002",
            "creditAmount": "10.00",
        });
        let event = InboundEvent::decode(&serde_json::to_vec(&body).unwrap()).unwrap();
        match event {
            InboundEvent::CreditPurchased(e) => {
                assert!(e.trip_id.is_none());
                assert_eq!(e.credit_amount, dec!(10.00));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn decode_unknown_kind_is_distinct_variant() {
        let body = serde_json::json!({ "event_type": "wallet.topped.up", "data": {} });
        let event = InboundEvent::decode(&serde_json::to_vec(&body).unwrap()).unwrap();
        match event {
            InboundEvent::Unknown { event_type } => assert_eq!(event_type, "wallet.topped.up"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_missing_event_type() {
        let body = serde_json::json!({ "data": {} });
        let err = InboundEvent::decode(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(err, EventDecodeError::MissingEventType));
    }

    #[test]
    fn approved_payload_contract() {
        let event = OutboundEvent::VerificationApproved {
            verification_id: "verif-001".into(),
            trip_id: "trip-001".into(),
            user_id: "user-001".into(),
            verifier_id: "cva-001".into(),
            co2_saved_kg: dec!(2.5),
            credits_awarded: dec!(0.0025),
            timestamp: Utc::now(),
        };
        assert_eq!(event.subject(), "ccm.verification.approved");
        let payload = event.to_payload();
        assert_eq!(payload["eventType"], "verification.approved");
        assert_eq!(payload["status"], "APPROVED");
        assert_eq!(payload["verifierId"], "cva-001");
    }

    #[test]
    fn rejected_payload_carries_reason() {
        let event = OutboundEvent::VerificationRejected {
            verification_id: "verif-001".into(),
            trip_id: "trip-001".into(),
            user_id: "user-001".into(),
            verifier_id: "cva-001".into(),
            reason: "GPS data inconsistent".into(),
            timestamp: Utc::now(),
        };
        let payload = event.to_payload();
        assert_eq!(payload["status"], "REJECTED");
        assert_eq!(payload["reason"], "GPS data inconsistent");
    }
}
