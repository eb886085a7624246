//! HTTP surface of the certificate service.
//!
//! The public verify-by-hash endpoint is unauthenticated; everything
//! else sits behind the auth middleware.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::instrument;

use crate::auth::{authorize, AuthContext, Role};
use crate::certificate::CertificateService;
use crate::crypto::uuid_to_int;
use crate::domain::VerificationMethod;
use crate::infra::ServiceError;

use super::error::ApiError;
use super::types::{
    CertificateListResponse, CertificateResponse, DownloadResponse, GenerateCertificateRequest,
    ListCertificatesQuery, RevokeCertificateRequest, VerifyCertificateResponse,
};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct CertificateApiState {
    pub service: Arc<CertificateService>,
}

/// Authenticated routes.
pub fn router(state: CertificateApiState) -> Router {
    Router::new()
        .route("/generate", post(generate_certificate))
        .route("/all", get(list_all_certificates))
        .route("/user/{user_id}", get(list_user_certificates))
        .route("/{cert_id}", get(get_certificate))
        .route("/{cert_id}/revoke", post(revoke_certificate))
        .route("/{cert_id}/download", get(download_certificate))
        .route("/{cert_id}/verify", post(verify_certificate))
        .with_state(state)
}

/// Unauthenticated routes.
pub fn public_router(state: CertificateApiState) -> Router {
    Router::new()
        .route("/public/{cert_hash}", get(verify_by_hash))
        .with_state(state)
}

/// Token subjects are either plain integers or external UUIDs; UUIDs
/// go through the same bridge as marketplace events.
fn numeric_user_id(ctx: &AuthContext) -> i64 {
    ctx.user_id
        .parse::<i64>()
        .unwrap_or_else(|_| uuid_to_int(&ctx.user_id))
}

fn clamp_paging(query: &ListCertificatesQuery) -> (i64, i64) {
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    (skip, limit)
}

#[instrument(skip(state, ctx, body), fields(user_id = %ctx.user_id))]
async fn generate_certificate(
    State(state): State<CertificateApiState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<GenerateCertificateRequest>,
) -> Result<(StatusCode, Json<CertificateResponse>), ApiError> {
    authorize(&ctx, &[Role::Cva])?;

    let cert = state
        .service
        .issue_certificate(
            body.verification_id,
            body.trip_id,
            body.user_id,
            body.credit_amount,
            body.template_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(CertificateResponse::new(cert))))
}

#[instrument(skip(state, ctx, query), fields(user_id = %ctx.user_id))]
async fn list_all_certificates(
    State(state): State<CertificateApiState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ListCertificatesQuery>,
) -> Result<Json<CertificateListResponse>, ApiError> {
    authorize(&ctx, &[Role::Cva])?;

    let (skip, limit) = clamp_paging(&query);
    let (certs, total) = state.service.list_all(skip, limit, query.status).await?;
    Ok(Json(CertificateListResponse {
        success: true,
        data: certs,
        total,
    }))
}

#[instrument(skip(state, ctx, query), fields(caller = %ctx.user_id))]
async fn list_user_certificates(
    State(state): State<CertificateApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<i64>,
    Query(query): Query<ListCertificatesQuery>,
) -> Result<Json<CertificateListResponse>, ApiError> {
    authorize(&ctx, &[Role::EvOwner, Role::Cva])?;

    // Owners can only list themselves.
    let user_id = if ctx.is_owner_scoped() {
        numeric_user_id(&ctx)
    } else {
        user_id
    };

    let (skip, limit) = clamp_paging(&query);
    let (certs, total) = state.service.list_by_user(user_id, skip, limit).await?;
    Ok(Json(CertificateListResponse {
        success: true,
        data: certs,
        total,
    }))
}

#[instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
async fn get_certificate(
    State(state): State<CertificateApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(cert_id): Path<i64>,
) -> Result<Json<CertificateResponse>, ApiError> {
    authorize(&ctx, &[Role::EvOwner, Role::Cva])?;

    let cert = state.service.get_certificate(cert_id).await?;
    if ctx.is_owner_scoped() && cert.user_id != numeric_user_id(&ctx) {
        return Err(ServiceError::not_found("certificate", cert_id).into());
    }
    Ok(Json(CertificateResponse::new(cert)))
}

#[instrument(skip(state, ctx, body), fields(user_id = %ctx.user_id))]
async fn revoke_certificate(
    State(state): State<CertificateApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(cert_id): Path<i64>,
    Json(body): Json<RevokeCertificateRequest>,
) -> Result<Json<CertificateResponse>, ApiError> {
    authorize(&ctx, &[Role::Cva])?;

    let cert = state
        .service
        .revoke_certificate(cert_id, numeric_user_id(&ctx), body.reason.as_deref())
        .await?;
    Ok(Json(CertificateResponse::new(cert)))
}

#[instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
async fn download_certificate(
    State(state): State<CertificateApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(cert_id): Path<i64>,
) -> Result<Json<DownloadResponse>, ApiError> {
    authorize(&ctx, &[Role::EvOwner, Role::Cva])?;

    let caller = numeric_user_id(&ctx);
    if ctx.is_owner_scoped() {
        let cert = state.service.get_certificate(cert_id).await?;
        if cert.user_id != caller {
            return Err(ServiceError::not_found("certificate", cert_id).into());
        }
    }

    let url = state.service.download_certificate(cert_id, Some(caller)).await?;
    Ok(Json(DownloadResponse {
        success: true,
        pdf_url: url,
    }))
}

#[instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
async fn verify_certificate(
    State(state): State<CertificateApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(cert_id): Path<i64>,
) -> Result<Json<VerifyCertificateResponse>, ApiError> {
    authorize(&ctx, &[Role::EvOwner, Role::Cva])?;

    let (valid, cert) = state
        .service
        .verify_certificate(cert_id, Some(numeric_user_id(&ctx)), VerificationMethod::Manual)
        .await?;
    Ok(Json(VerifyCertificateResponse {
        success: true,
        valid,
        data: Some(cert),
    }))
}

#[instrument(skip(state))]
async fn verify_by_hash(
    State(state): State<CertificateApiState>,
    Path(cert_hash): Path<String>,
) -> Result<Json<VerifyCertificateResponse>, ApiError> {
    let (valid, cert) = state.service.verify_by_hash(&cert_hash).await?;
    Ok(Json(VerifyCertificateResponse {
        success: true,
        valid,
        data: cert,
    }))
}
