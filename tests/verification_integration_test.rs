//! Postgres-backed integration tests for the verification store and
//! its transactional outbox.
//!
//! Ignored by default; run with `DATABASE_URL` set.

mod common;

use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use ccm_services::domain::{
    OutboundEvent, Page, SortBy, SortOrder, Verification, VerificationFilter, VerificationStatus,
};
use ccm_services::infra::{
    PgOutbox, PgVerificationStore, ServiceError, VerificationStore,
};

use common::{connect_db, random_trip_id, random_user_id};

fn new_pending(trip_id: &str, user_id: &str) -> Verification {
    Verification::new(trip_id, user_id, dec!(2.5), dec!(0.0025))
}

fn approved_event(record: &Verification, verifier: &str) -> OutboundEvent {
    OutboundEvent::VerificationApproved {
        verification_id: record.id.to_string(),
        trip_id: record.trip_id.clone(),
        user_id: record.user_id.clone(),
        verifier_id: verifier.to_string(),
        co2_saved_kg: record.co2_saved_kg,
        credits_awarded: record.credits_suggested,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
#[ignore]
async fn duplicate_trip_id_maps_to_conflict() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    ccm_services::migrations::run_verification(&pool)
        .await
        .unwrap();

    let store = PgVerificationStore::new(pool);
    let trip_id = random_trip_id();

    store
        .create(&new_pending(&trip_id, &random_user_id()))
        .await
        .unwrap();

    let err = store
        .create(&new_pending(&trip_id, &random_user_id()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
#[ignore]
async fn round_trip_preserves_quantized_decimals() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    ccm_services::migrations::run_verification(&pool)
        .await
        .unwrap();

    let store = PgVerificationStore::new(pool);
    let record = Verification::new(
        random_trip_id(),
        random_user_id(),
        dec!(2.51239),
        dec!(0.00251),
    );
    store.create(&record).await.unwrap();

    let loaded = store.get_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(loaded.co2_saved_kg, dec!(2.5124));
    assert_eq!(loaded.credits_suggested, dec!(0.0025));
    assert_eq!(loaded.status, VerificationStatus::Pending);
}

#[tokio::test]
#[ignore]
async fn terminal_transition_writes_outbox_row_atomically() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    ccm_services::migrations::run_verification(&pool)
        .await
        .unwrap();

    let store = PgVerificationStore::new(pool.clone());
    let mut record = new_pending(&random_trip_id(), &random_user_id());
    store.create(&record).await.unwrap();

    record.status = VerificationStatus::Approved;
    record.verifier_id = Some("cva-001".into());
    record.signature_hash = Some("ab".repeat(32));
    record.signed_at = Some(Utc::now());
    record.updated_at = Utc::now();

    let event = approved_event(&record, "cva-001");
    store.update_with_outbox(&record, &event).await.unwrap();

    let loaded = store.get_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, VerificationStatus::Approved);
    assert!(loaded.signature_hash.is_some());

    let outbox = PgOutbox::new(pool);
    let rows = outbox.fetch_unpublished(1000).await.unwrap();
    let row = rows
        .iter()
        .find(|r| r.verification_id == record.id)
        .expect("outbox row missing");
    assert_eq!(row.event_type, "verification.approved");
    assert_eq!(row.subject, "ccm.verification.approved");
    assert_eq!(row.payload["status"], "APPROVED");

    outbox.mark_published(&[row.id]).await.unwrap();
    let remaining = outbox.fetch_unpublished(1000).await.unwrap();
    assert!(!remaining.iter().any(|r| r.id == row.id));
}

#[tokio::test]
#[ignore]
async fn second_terminal_transition_loses_the_race() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    ccm_services::migrations::run_verification(&pool)
        .await
        .unwrap();

    let store = PgVerificationStore::new(pool);
    let mut record = new_pending(&random_trip_id(), &random_user_id());
    store.create(&record).await.unwrap();

    record.status = VerificationStatus::Approved;
    record.verifier_id = Some("cva-001".into());
    record.signature_hash = Some("ab".repeat(32));
    record.signed_at = Some(Utc::now());
    let event = approved_event(&record, "cva-001");
    store.update_with_outbox(&record, &event).await.unwrap();

    // The row is no longer PENDING; the guarded update matches nothing.
    let err = store
        .update_with_outbox(&record, &event)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
#[ignore]
async fn list_filters_and_paginates() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    ccm_services::migrations::run_verification(&pool)
        .await
        .unwrap();

    let store = PgVerificationStore::new(pool);
    let user_id = random_user_id();
    for _ in 0..5 {
        store
            .create(&new_pending(&random_trip_id(), &user_id))
            .await
            .unwrap();
    }

    let filter = VerificationFilter {
        status: Some(VerificationStatus::Pending),
        user_id: Some(user_id.clone()),
        verifier_id: None,
    };
    let (page1, total) = store
        .list(&filter, Page::new(1, 2), SortBy::CreatedAt, SortOrder::Desc)
        .await
        .unwrap();
    assert_eq!(total, 5);
    assert_eq!(page1.len(), 2);

    let (page3, _) = store
        .list(&filter, Page::new(3, 2), SortBy::CreatedAt, SortOrder::Desc)
        .await
        .unwrap();
    assert_eq!(page3.len(), 1);
    assert!(page1.iter().all(|v| v.user_id == user_id));
}

#[tokio::test]
#[ignore]
async fn statistics_count_only_approved_sums() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    ccm_services::migrations::run_verification(&pool)
        .await
        .unwrap();

    let store = PgVerificationStore::new(pool);
    let user_id = random_user_id();

    // One approved, one rejected, one pending.
    let mut approved = new_pending(&random_trip_id(), &user_id);
    store.create(&approved).await.unwrap();
    approved.status = VerificationStatus::Approved;
    approved.verifier_id = Some("cva-001".into());
    approved.signature_hash = Some("ab".repeat(32));
    approved.signed_at = Some(Utc::now());
    store
        .update_with_outbox(&approved, &approved_event(&approved, "cva-001"))
        .await
        .unwrap();

    let mut rejected = new_pending(&random_trip_id(), &user_id);
    store.create(&rejected).await.unwrap();
    rejected.status = VerificationStatus::Rejected;
    rejected.verifier_id = Some("cva-001".into());
    rejected.remarks = Some("GPS data inconsistent".into());
    store.update(&rejected).await.unwrap();

    store
        .create(&new_pending(&random_trip_id(), &user_id))
        .await
        .unwrap();

    let stats = store.statistics(Some(&user_id)).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.approved, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.total_co2_saved, dec!(2.5));
    assert_eq!(stats.total_credits, dec!(0.0025));
    assert!((stats.approval_rate - 100.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
#[ignore]
async fn statistics_for_unknown_user_have_zero_rate() {
    let Some(pool) = connect_db().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    ccm_services::migrations::run_verification(&pool)
        .await
        .unwrap();

    let store = PgVerificationStore::new(pool);
    let stats = store
        .statistics(Some(&format!("nobody-{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(stats.total, 0);
    assert_eq!(stats.approval_rate, 0.0);
}
