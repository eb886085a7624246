//! Common test utilities for integration tests.

#![allow(dead_code)]

use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

/// Connect to the test database, or `None` when `DATABASE_URL` is not
/// set (the test should skip).
pub async fn connect_db() -> Option<sqlx::PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .ok()?;
    Some(pool)
}

/// Unique external trip reference.
pub fn random_trip_id() -> String {
    format!("trip-{}", &Uuid::new_v4().to_string()[..8])
}

/// Unique claimant identity.
pub fn random_user_id() -> String {
    format!("user-{}", &Uuid::new_v4().to_string()[..8])
}
