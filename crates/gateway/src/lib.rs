//! HTTP playground for Easel.
//!
//! Exposes the agent catalog over REST so a browser UI (or curl) can chat
//! with any agent. Built on Axum.

pub mod playground;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use easel_agent::AgentFactory;
use easel_core::event::EventBus;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use playground::{PlaygroundState, SharedPlaygroundState, playground_router};

/// Build the full router: health check plus the playground under `/v1`.
pub fn build_router(state: SharedPlaygroundState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1/playground", playground_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the playground HTTP server and serve until Ctrl-C.
pub async fn start(config: easel_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let event_bus = Arc::new(EventBus::default());
    let factory = AgentFactory::from_config(&config, event_bus)?;
    let state = Arc::new(PlaygroundState::new(factory, config.gateway.max_sessions));

    let app = build_router(Arc::clone(&state));

    info!(addr = %addr, "Playground starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown_all().await;
    info!("Playground stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
