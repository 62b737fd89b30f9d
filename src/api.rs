use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::engine::SharedTracker;
use crate::models::EndpointState;

/// Raw result of the latest probe per endpoint, e.g. `{"Bugtracker": true, "Octadesk": false}`.
pub async fn get_status(State(tracker): State<SharedTracker>) -> Json<BTreeMap<String, bool>> {
    let tracker = tracker.lock().await;
    Json(tracker.snapshot())
}

pub async fn get_endpoints(State(tracker): State<SharedTracker>) -> Json<Vec<EndpointState>> {
    let tracker = tracker.lock().await;
    Json(tracker.states())
}

pub async fn get_endpoint(
    State(tracker): State<SharedTracker>,
    Path(name): Path<String>,
) -> Result<Json<EndpointState>, StatusCode> {
    let tracker = tracker.lock().await;
    tracker.state(&name).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub fn create_router(tracker: SharedTracker) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/api/endpoints", get(get_endpoints))
        .route("/api/endpoints/{name}", get(get_endpoint))
        .layer(CorsLayer::permissive())
        .with_state(tracker)
}

pub async fn start_server(port: u16, tracker: SharedTracker) -> Result<()> {
    let app = create_router(tracker);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status port {port}"))?;
    info!("Status endpoint: http://localhost:{}/status", addr.port());
    axum::serve(listener, app).await.context("Status server stopped")?;
    Ok(())
}
