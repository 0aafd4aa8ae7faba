//! Assessment session backend
//!
//! Scoring authority, draft store and submission endpoint for timed
//! assessment sessions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SESSION CLOUD                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐ │
//! │  │  API      │  │  Admin    │  │  Scoring                │ │
//! │  │  Gateway  │  │  Key      │  │  (weighted, monotonic)  │ │
//! │  │  (Axum)   │  │  (SHA256) │  │                         │ │
//! │  └─────┬─────┘  └─────┬─────┘  └────────────┬────────────┘ │
//! │        └──────────────┼──────────────────────┘              │
//! │                       ▼                                     │
//! │                ┌─────────────┐                             │
//! │                │  In-memory  │                             │
//! │                │  Store      │                             │
//! │                └─────────────┘                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod handlers;
mod middleware;
mod models;
mod scoring;
mod store;


use anyhow::Context;
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_cloud=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env();

    tracing::info!("Session Cloud starting ({})", config.environment);
    if config.is_production() && config.admin_key.starts_with("dev-") {
        tracing::warn!("ADMIN_KEY is the development default");
    }

    let state = AppState::new(config.clone());
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<store::Store>,
    pub config: config::Config,
}

impl AppState {
    pub fn new(config: config::Config) -> Self {
        Self {
            store: Arc::new(store::Store::new()),
            config,
        }
    }
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Session routes (the session token is the credential)
    let session_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/v1/sessions/:token", get(handlers::sessions::get))
        .route("/api/v1/sessions/:token/start", post(handlers::sessions::start))
        .route("/api/v1/sessions/:token/submit", post(handlers::sessions::submit))
        .route("/api/v1/sessions/:token/violations", post(handlers::violations::report))
        .route("/api/v1/sessions/:token/integrity/config", get(handlers::violations::config))
        .route(
            "/api/v1/sessions/:token/drafts",
            get(handlers::drafts::list).post(handlers::drafts::save),
        )
        .route("/api/v1/sessions/:token/drafts/beacon", post(handlers::drafts::beacon));

    // Admin routes (admin key)
    let admin_routes = Router::new()
        .route("/api/v1/sessions", post(handlers::sessions::create))
        .route("/api/v1/sessions/:token/review", get(handlers::sessions::review))
        .route("/api/v1/sessions/:token/reinstate", post(handlers::sessions::reinstate))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin,
        ));

    Router::new()
        .merge(session_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
