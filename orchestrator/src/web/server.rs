// File: orchestrator/src/web/server.rs
use crate::web::{handlers, AppState};
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Serve the control API until `shutdown` is cancelled
pub async fn start_web_server(state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === DASHBOARD ===
        .route("/api/status", get(handlers::get_status))
        // === SERVICE UNITS ===
        .route("/api/services", get(handlers::list_services))
        .route("/api/services/{name}", get(handlers::get_service))
        .route("/api/services/{name}/start", post(handlers::start_service))
        .route("/api/services/{name}/stop", post(handlers::stop_service))
        .route(
            "/api/services/{name}/restart",
            post(handlers::restart_service),
        )
        .route(
            "/api/services/{name}/config",
            post(handlers::update_service_config),
        )
        // === SCHEDULER ===
        .route("/api/scheduler/jobs", get(handlers::list_jobs))
        .route(
            "/api/scheduler/jobs/{job_id}/pause",
            post(handlers::pause_job),
        )
        .route(
            "/api/scheduler/jobs/{job_id}/resume",
            post(handlers::resume_job),
        )
        // === RATE LIMITERS ===
        .route("/api/rate-limiters", get(handlers::list_rate_limiters))
        .route(
            "/api/rate-limiters/{name}/reset",
            post(handlers::reset_rate_limiter),
        )
        // === HEALTH HISTORY ===
        .route("/api/health/latest", get(handlers::get_latest_health))
        .route("/api/health/history", get(handlers::get_health_history))
        // Add middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
