//! HTTP surface of the verification service.
//!
//! EV owners see only their own records: their listings and statistics
//! are filter-rewritten to their identity, and a foreign record fetched
//! by ID surfaces as NotFound rather than Forbidden so record existence
//! is not disclosed.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::{authorize, AuthContext, Role};
use crate::domain::{Page, VerificationFilter};
use crate::verification::VerificationService;

use super::error::ApiError;
use super::types::{
    total_pages, ApproveRequest, CreateVerificationRequest, ListVerificationsQuery,
    RejectRequest, StatsResponse, VerificationListResponse, VerificationResponse,
};

#[derive(Clone)]
pub struct VerificationApiState {
    pub service: Arc<VerificationService>,
}

/// Routes mounted behind the auth middleware.
pub fn router(state: VerificationApiState) -> Router {
    Router::new()
        .route("/", post(create_verification).get(list_verifications))
        .route("/statistics", get(statistics))
        .route("/{id}", get(get_verification))
        .route("/{id}/approve", post(approve_verification))
        .route("/{id}/reject", post(reject_verification))
        .with_state(state)
}

#[instrument(skip(state, ctx, body), fields(user_id = %ctx.user_id))]
async fn create_verification(
    State(state): State<VerificationApiState>,
    Extension(ctx): Extension<AuthContext>,
    Json(body): Json<CreateVerificationRequest>,
) -> Result<(StatusCode, Json<VerificationResponse>), ApiError> {
    authorize(&ctx, &[Role::EvOwner])?;

    let record = state
        .service
        .create_verification(
            &body.trip_id,
            &ctx.user_id,
            body.co2_saved_kg,
            body.credits_suggested,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(VerificationResponse::new(record))))
}

#[instrument(skip(state, ctx, query), fields(user_id = %ctx.user_id))]
async fn list_verifications(
    State(state): State<VerificationApiState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<ListVerificationsQuery>,
) -> Result<Json<VerificationListResponse>, ApiError> {
    authorize(&ctx, &[Role::EvOwner, Role::Cva])?;

    let mut filter = VerificationFilter {
        status: query.status,
        user_id: query.user_id,
        verifier_id: None,
    };
    if ctx.is_owner_scoped() {
        filter.user_id = Some(ctx.user_id.clone());
    }

    let page = Page::new(query.page, query.page_size);
    let (records, total) = state
        .service
        .list_verifications(&filter, page, query.sort_by, query.sort_order)
        .await?;

    Ok(Json(VerificationListResponse {
        success: true,
        data: records,
        total,
        page: page.page,
        page_size: page.page_size,
        total_pages: total_pages(total, page.page_size),
    }))
}

#[instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
async fn get_verification(
    State(state): State<VerificationApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerificationResponse>, ApiError> {
    authorize(&ctx, &[Role::EvOwner, Role::Cva])?;

    let record = state.service.get_verification(id).await?;
    if ctx.is_owner_scoped() && record.user_id != ctx.user_id {
        return Err(crate::infra::ServiceError::not_found("verification", id).into());
    }
    Ok(Json(VerificationResponse::new(record)))
}

#[instrument(skip(state, ctx, body), fields(verifier_id = %ctx.user_id))]
async fn approve_verification(
    State(state): State<VerificationApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<VerificationResponse>, ApiError> {
    authorize(&ctx, &[Role::Cva])?;

    let record = state
        .service
        .approve_verification(id, &ctx.user_id, body.remarks.as_deref())
        .await?;
    Ok(Json(VerificationResponse::new(record)))
}

#[instrument(skip(state, ctx, body), fields(verifier_id = %ctx.user_id))]
async fn reject_verification(
    State(state): State<VerificationApiState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<VerificationResponse>, ApiError> {
    authorize(&ctx, &[Role::Cva])?;

    let record = state
        .service
        .reject_verification(id, &ctx.user_id, &body.remarks)
        .await?;
    Ok(Json(VerificationResponse::new(record)))
}

#[instrument(skip(state, ctx), fields(user_id = %ctx.user_id))]
async fn statistics(
    State(state): State<VerificationApiState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<StatsResponse>, ApiError> {
    authorize(&ctx, &[Role::EvOwner, Role::Cva])?;

    let user_id = ctx.is_owner_scoped().then_some(ctx.user_id.as_str());
    let stats = state.service.statistics(user_id).await?;
    Ok(Json(StatsResponse {
        success: true,
        data: stats,
    }))
}
