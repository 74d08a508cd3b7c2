//! Axum router and handlers for the front-end HTTP surface.
//!
//! Routing failures never produce a non-2xx status: the command envelope
//! always carries `{ response, intent, confidence, ... }`, and 5xx is
//! reserved for orchestrator-internal bugs.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use switchboard::{CommandRequest, CommandResponse};
use tower_http::cors::CorsLayer;

use crate::AppState;

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/command", post(command))
        .route("/api/analytics", get(analytics))
        .route("/api/services", get(services))
        .route("/api/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommandRequest>,
) -> Json<CommandResponse> {
    Json(state.orchestrator.process_command(request).await)
}

#[derive(Deserialize)]
struct AnalyticsQuery {
    service: Option<String>,
    metric: Option<String>,
}

async fn analytics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> Json<serde_json::Value> {
    let analytics = state.orchestrator.analytics(query.service.as_deref());
    Json(json!({
        "analytics": analytics,
        "metric": query.metric.as_deref().unwrap_or("response_time"),
    }))
}

async fn services(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "services": state.orchestrator.services() }))
}

#[derive(Deserialize)]
struct HealthQuery {
    service: Option<String>,
}

async fn health(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HealthQuery>,
) -> Json<serde_json::Value> {
    Json(json!({ "health": state.orchestrator.health(query.service.as_deref()) }))
}
