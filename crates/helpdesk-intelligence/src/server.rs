//! HTTP server through which the surrounding application invokes the pipeline

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::{api::ticket_api, config::Config, shared_state::AppState};

/// Attachments may be inlined, so allow larger bodies than axum's default.
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    let addr = cfg.api_addr()?;
    // Each request runs several model calls back to back.
    let request_timeout = cfg.step_timeout() * 8;
    let state = AppState::from_config(cfg)?;

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state, request_timeout)).await?;

    Ok(())
}

pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/tickets/:id/intake", post(ticket_api::intake_ticket))
        .route("/tickets/:id/resolve", post(ticket_api::resolve_ticket))
        .route("/tickets/:id/draft", post(ticket_api::draft_response))
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(crate::metrics::get_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
