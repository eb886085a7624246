//! HTTP API layer.

pub mod certificate;
mod error;
mod types;
pub mod verification;

pub use certificate::CertificateApiState;
pub use error::{ApiError, ErrorCode};
pub use types::*;
pub use verification::VerificationApiState;

use axum::routing::get;
use axum::{Json, Router};

/// Liveness probe shared by both services.
pub fn health_router(service: &'static str) -> Router {
    Router::new().route(
        "/health",
        get(move || async move {
            Json(HealthResponse {
                status: "ok",
                service,
            })
        }),
    )
}
