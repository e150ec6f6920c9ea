use std::{
    fmt::Write as _,
    io,
    sync::{Mutex, OnceLock},
};

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self as tracing_fmt, time::UtcTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer, Registry,
};
use url::Url;

use requerimiento_util::{AppConfig, Environment};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error("failed to initialize prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();
static METRICS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Installs the global subscriber: pretty in development and test, JSON in
/// production. Events go to stderr so `submit` output on stdout stays clean.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryError> {
    if TRACING_INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base = tracing_fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_timer(UtcTime::rfc_3339());
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.environment {
        Environment::Production => base.json().boxed(),
        Environment::Development | Environment::Test => base
            .event_format(tracing_fmt::format().pretty())
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    TRACING_INIT.set(()).ok();
    tracing::info!(stage = "telemetry", env = %config.environment.as_str(), "tracing initialized");
    Ok(())
}

/// Installs the Prometheus recorder once per process and returns its handle.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let mut installed = METRICS_HANDLE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(handle) = installed.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_counter!(
        "proxy_requests_total",
        "Requests handled by the development proxy, labelled by outcome"
    );
    describe_histogram!(
        "proxy_upstream_latency_seconds",
        "Round-trip time of requests forwarded upstream"
    );
    describe_counter!(
        "registro_submissions_total",
        "Requerimiento submission attempts, labelled by result"
    );

    *installed = Some(handle.clone());
    Ok(handle)
}

/// Recorded metrics followed by a `proxy_route_info` line naming where the
/// prefix is forwarded.
pub fn render_metrics(handle: &PrometheusHandle, prefix: &str, target: &Url) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    body.push_str("# TYPE proxy_route_info gauge\n");
    let _ = writeln!(
        body,
        "proxy_route_info{{prefix=\"{}\",target=\"{}\",version=\"{}\"}} 1",
        escape_label(prefix),
        escape_label(target.as_str()),
        env!("CARGO_PKG_VERSION")
    );
    body
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
