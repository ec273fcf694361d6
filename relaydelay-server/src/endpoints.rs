//! HTTP endpoints for scraping metrics and health checks.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use relaydelay_log::LogError;
use relaydelay_metrics::MetricsRegistry;
use serde::Serialize;

use crate::{HealthState, IsHealthy};

/// Content type of the Prometheus text exposition format.
const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// State shared by all endpoints.
#[derive(Clone)]
pub struct ServiceState {
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthState>,
    metrics_enabled: bool,
}

impl ServiceState {
    /// Creates the endpoint state.
    ///
    /// If `metrics_enabled` is `false`, `/metrics` responds with `404`.
    pub fn new(
        metrics: Arc<MetricsRegistry>,
        health: Arc<HealthState>,
        metrics_enabled: bool,
    ) -> Self {
        Self {
            metrics,
            health,
            metrics_enabled,
        }
    }
}

#[derive(Serialize)]
struct Status {
    is_healthy: bool,
}

async fn handle_health(
    State(state): State<ServiceState>,
    Path(kind): Path<IsHealthy>,
) -> impl IntoResponse {
    let is_healthy = state.health.check(kind);
    let status = match is_healthy {
        true => StatusCode::OK,
        false => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, axum::Json(Status { is_healthy }))
}

async fn handle_metrics(State(state): State<ServiceState>) -> Response {
    if !state.metrics_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match state.metrics.encode_text() {
        Ok(text) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], text).into_response(),
        Err(error) => {
            relaydelay_log::error!("failed to encode metrics: {}", LogError(&error));
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Builds the router with all endpoints.
pub fn routes(state: ServiceState) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .route("/api/health/{kind}", get(handle_health))
        .with_state(state)
}
