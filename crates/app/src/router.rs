use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::proxy::{self, ProxyForwarder};
use crate::telemetry;

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    forwarder: ProxyForwarder,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, forwarder: ProxyForwarder) -> Self {
        Self { metrics, forwarder }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn forwarder(&self) -> &ProxyForwarder {
        &self.forwarder
    }
}

/// Development proxy: local health/metrics routes, everything else is
/// forwarded when it falls under the configured prefix.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .fallback(proxy::forward)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let forwarder = state.forwarder();
    let body = telemetry::render_metrics(state.metrics(), forwarder.prefix(), forwarder.target());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
}
