//! Service startup: configuration, tracing, pool, bus tasks, HTTP.
//!
//! Each binary calls one of the `run_*` functions. The bus consumer
//! and the outbox relay run as separate tokio tasks sharing the
//! database pool with the HTTP handlers.

use axum::http::{HeaderValue, Method};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::api::{CertificateApiState, VerificationApiState};
use crate::auth::{auth_middleware, AuthState, JwtValidator};
use crate::bus::{connect, EventBus, EventConsumer};
use crate::certificate::{CertificateEventHandler, CertificateService, HttpPdfRenderer};
use crate::domain::{SUBJECT_CREDIT_PURCHASED, SUBJECT_TRIP_SUBMITTED, SUBJECT_TRIP_VERIFIED};
use crate::infra::{OutboxRelay, PgCertificateStore, PgOutbox, PgVerificationStore};
use crate::verification::{TripSubmittedHandler, VerificationService};

/// Shared configuration for both services.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub max_connections: u32,
    pub nats_url: String,
    pub jwt_secret: String,
    /// Base URL of the external PDF renderer (certificate service only).
    pub renderer_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address: {e}"))?;

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let nats_url =
            std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());

        let jwt_secret =
            std::env::var("JWT_SECRET").map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;

        let renderer_url =
            std::env::var("RENDERER_URL").unwrap_or_else(|_| "http://localhost:9090".to_string());

        Ok(Self {
            database_url,
            listen_addr,
            max_connections,
            nats_url,
            jwt_secret,
            renderer_url,
        })
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

/// Start the verification service: HTTP API, trip-submitted consumer,
/// outbox relay.
pub async fn run_verification_service() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    info!(addr = %config.listen_addr, "Starting verification service");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    crate::migrations::run_verification(&pool).await?;
    info!("Database ready");

    let nats = connect(&config.nats_url).await?;
    let bus = Arc::new(EventBus::new(nats.clone()).await?);

    let store = Arc::new(PgVerificationStore::new(pool.clone()));
    let service = Arc::new(VerificationService::new(store));

    let consumer = EventConsumer::new(
        nats,
        "verification-service",
        vec![SUBJECT_TRIP_SUBMITTED.to_string()],
    );
    let handler = Arc::new(TripSubmittedHandler::new(service.clone()));
    tokio::spawn(async move {
        if let Err(e) = consumer.run(handler).await {
            tracing::error!(error = %e, "Trip-submitted consumer exited");
        }
    });

    let relay = OutboxRelay::new(PgOutbox::new(pool.clone()), bus);
    tokio::spawn(relay.run());

    let auth_state = AuthState {
        validator: Arc::new(JwtValidator::new(config.jwt_secret.as_bytes())),
    };
    let api = crate::api::verification::router(VerificationApiState { service }).layer(
        axum::middleware::from_fn_with_state(auth_state, auth_middleware),
    );
    let app = finalize(
        Router::new()
            .nest("/api/v1/verifications", api)
            .merge(crate::api::health_router("verification-service")),
    )?;

    serve(app, config.listen_addr).await
}

/// Start the certificate service: HTTP API, issuance consumer.
pub async fn run_certificate_service() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    info!(addr = %config.listen_addr, "Starting certificate service");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    crate::migrations::run_certificate(&pool).await?;
    info!("Database ready");

    let nats = connect(&config.nats_url).await?;
    let bus = Arc::new(EventBus::new(nats.clone()).await?);

    let store = Arc::new(PgCertificateStore::new(pool));
    let renderer = Arc::new(HttpPdfRenderer::new(config.renderer_url.clone()));
    let service = Arc::new(CertificateService::new(store, bus, renderer));

    let consumer = EventConsumer::new(
        nats,
        "certificate-service",
        vec![
            SUBJECT_TRIP_VERIFIED.to_string(),
            SUBJECT_CREDIT_PURCHASED.to_string(),
        ],
    );
    let handler = Arc::new(CertificateEventHandler::new(service.clone()));
    tokio::spawn(async move {
        if let Err(e) = consumer.run(handler).await {
            tracing::error!(error = %e, "Issuance consumer exited");
        }
    });

    let auth_state = AuthState {
        validator: Arc::new(JwtValidator::new(config.jwt_secret.as_bytes())),
    };
    let state = CertificateApiState { service };
    let api = crate::api::certificate::router(state.clone()).layer(
        axum::middleware::from_fn_with_state(auth_state, auth_middleware),
    );
    let public = crate::api::certificate::public_router(state);
    let app = finalize(
        Router::new()
            .nest("/api/certificates", api.merge(public))
            .merge(crate::api::health_router("certificate-service")),
    )?;

    serve(app, config.listen_addr).await
}

fn finalize(router: Router) -> anyhow::Result<Router> {
    let mut router = router.layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer_from_env()? {
        router = router.layer(cors);
    }
    Ok(router)
}

async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}
