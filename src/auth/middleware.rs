//! Bearer-token middleware for axum.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::JwtValidator;
use crate::api::ApiError;
use crate::infra::ServiceError;

/// Shared middleware state.
#[derive(Clone)]
pub struct AuthState {
    pub validator: Arc<JwtValidator>,
}

/// Extract and validate the bearer token, then attach the resulting
/// [`super::AuthContext`] to request extensions. Routes mounted behind
/// this layer can rely on the context being present.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return ApiError::from(ServiceError::Unauthorized(
            "missing bearer token".into(),
        ))
        .into_response();
    };

    match state.validator.validate(token) {
        Ok(ctx) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
