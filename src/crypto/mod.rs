//! Deterministic hashing and approval signatures.
//!
//! Certificates are content-addressed: the certificate hash is a SHA-256
//! digest over a canonical JSON encoding (RFC 8785, sorted keys) of the
//! issuance fields, so any party holding the fields can re-derive and
//! check the hash independently. Approval signatures use the same
//! construction scoped to the approval tuple and act as the verifier's
//! non-repudiable attestation.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Chunk size for streaming file hashing.
const FILE_HASH_CHUNK: usize = 8192;

/// Serialize a JSON value canonically (RFC 8785: sorted keys, no
/// whitespace, normalized numbers) and return its SHA-256 hex digest.
fn canonical_sha256_hex(value: &serde_json::Value) -> String {
    let canonical = serde_json_canonicalizer::to_string(value)
        .expect("canonical JSON encoding of string-valued map cannot fail");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Timestamps are serialized to ISO-8601 with second precision so the
/// hash survives round-trips through stores that truncate sub-second
/// precision.
fn canonical_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Compute the content hash that identifies a certificate.
///
/// Pure function: the same (verification_id, trip_id, user_id, amount,
/// timestamp) tuple always yields the same hex digest. The amount is
/// serialized as a decimal string to avoid float drift across services.
pub fn certificate_hash(
    verification_id: i64,
    trip_id: i64,
    user_id: i64,
    credit_amount: Decimal,
    timestamp: DateTime<Utc>,
) -> String {
    let value = serde_json::json!({
        "verification_id": verification_id,
        "trip_id": trip_id,
        "user_id": user_id,
        "credit_amount": credit_amount.to_string(),
        "timestamp": canonical_timestamp(timestamp),
    });
    canonical_sha256_hex(&value)
}

/// Re-derive a certificate hash and compare against a claimed digest.
pub fn verify_certificate_hash(
    claimed: &str,
    verification_id: i64,
    trip_id: i64,
    user_id: i64,
    credit_amount: Decimal,
    timestamp: DateTime<Utc>,
) -> bool {
    certificate_hash(verification_id, trip_id, user_id, credit_amount, timestamp) == claimed
}

/// Compute the approval signature for a verification decision.
///
/// Scoped to the approval event: who signed, what record, how many
/// credits, when. Stored on the verification as `signature_hash`.
pub fn approval_signature(
    verification_id: &str,
    verifier_id: &str,
    credits: Decimal,
    timestamp: DateTime<Utc>,
) -> String {
    let value = serde_json::json!({
        "verification_id": verification_id,
        "verifier_id": verifier_id,
        "credits": credits.to_string(),
        "timestamp": canonical_timestamp(timestamp),
    });
    canonical_sha256_hex(&value)
}

/// Stream a file through SHA-256 in fixed-size chunks.
///
/// Used for integrity-checking rendered PDFs after the renderer reports
/// success; avoids loading the whole document into memory.
pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; FILE_HASH_CHUNK];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Map an external UUID into a bounded positive integer space.
///
/// `SHA-256(uuid) mod 10^8`, a cross-service identifier bridge for
/// marketplace events that carry UUIDs where the certificate schema
/// expects integers. Deterministic, not a security hash.
pub fn uuid_to_int(uuid_str: &str) -> i64 {
    let digest = Sha256::digest(uuid_str.as_bytes());
    // Big-endian residue of the full digest modulo 10^8, folded byte by
    // byte so we never need a big-integer type.
    let mut acc: u64 = 0;
    for byte in digest {
        acc = (acc * 256 + byte as u64) % 100_000_000;
    }
    acc as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn fixed_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn certificate_hash_is_deterministic() {
        let a = certificate_hash(42, 7, 9, dec!(25.50), fixed_ts());
        let b = certificate_hash(42, 7, 9, dec!(25.50), fixed_ts());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn certificate_hash_changes_with_any_field() {
        let base = certificate_hash(42, 7, 9, dec!(25.50), fixed_ts());
        assert_ne!(base, certificate_hash(43, 7, 9, dec!(25.50), fixed_ts()));
        assert_ne!(base, certificate_hash(42, 8, 9, dec!(25.50), fixed_ts()));
        assert_ne!(base, certificate_hash(42, 7, 10, dec!(25.50), fixed_ts()));
        assert_ne!(base, certificate_hash(42, 7, 9, dec!(25.51), fixed_ts()));
        let later = fixed_ts() + chrono::Duration::seconds(1);
        assert_ne!(base, certificate_hash(42, 7, 9, dec!(25.50), later));
    }

    #[test]
    fn verify_round_trip() {
        let ts = fixed_ts();
        let hash = certificate_hash(1, 2, 3, dec!(10.00), ts);
        assert!(verify_certificate_hash(&hash, 1, 2, 3, dec!(10.00), ts));
        assert!(!verify_certificate_hash(&hash, 1, 2, 4, dec!(10.00), ts));
    }

    #[test]
    fn approval_signature_binds_verifier() {
        let ts = fixed_ts();
        let a = approval_signature("verif-001", "cva-001", dec!(0.0025), ts);
        let b = approval_signature("verif-001", "cva-002", dec!(0.0025), ts);
        assert_ne!(a, b);
    }

    #[test]
    fn file_hash_matches_known_digest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"carbon certificate body").unwrap();
        let streamed = file_sha256(file.path()).unwrap();
        let direct = hex::encode(Sha256::digest(b"carbon certificate body"));
        assert_eq!(streamed, direct);
    }

    #[test]
    fn uuid_to_int_is_stable_and_bounded() {
        let uuid = "a9f1c3e2-5a77-4d0b-9a6e-0f37c2d8b441";
        let first = uuid_to_int(uuid);
        assert_eq!(first, uuid_to_int(uuid));
        assert!(first >= 0 && first < 100_000_000);
        assert_ne!(first, uuid_to_int("b9f1c3e2-5a77-4d0b-9a6e-0f37c2d8b441"));
    }

    proptest! {
        #[test]
        fn certificate_hash_pure(
            verification_id in 0i64..1_000_000,
            trip_id in 0i64..1_000_000,
            user_id in 0i64..1_000_000,
            cents in 1i64..10_000_000,
        ) {
            let amount = Decimal::new(cents, 2);
            let ts = fixed_ts();
            let a = certificate_hash(verification_id, trip_id, user_id, amount, ts);
            let b = certificate_hash(verification_id, trip_id, user_id, amount, ts);
            prop_assert_eq!(&a, &b);
            prop_assert!(verify_certificate_hash(&a, verification_id, trip_id, user_id, amount, ts));
        }

        #[test]
        fn uuid_to_int_bounded(s in "[a-f0-9-]{8,36}") {
            let n = uuid_to_int(&s);
            prop_assert!(n >= 0 && n < 100_000_000);
        }
    }
}
