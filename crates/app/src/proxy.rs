use std::{sync::Arc, time::Instant};

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use metrics::{counter, histogram};
use reqwest::{redirect, Client};
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

use requerimiento_util::ProxyConfig;

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Largest request body buffered before forwarding; fits a few minutes of voice note.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Forwards requests under a path prefix to a fixed upstream origin.
#[derive(Clone)]
pub struct ProxyForwarder {
    http: Client,
    prefix: Arc<str>,
    target: Url,
}

impl ProxyForwarder {
    /// Builds the forwarder; certificate validation is skipped when the
    /// configuration asks for it.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(config.insecure_tls)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self::new(&config.prefix, config.target.clone(), http))
    }

    pub fn new(prefix: &str, target: Url, http: Client) -> Self {
        Self {
            http,
            prefix: Arc::from(prefix),
            target,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Maps a local path and query to the upstream URL.
    ///
    /// Returns `None` when the path is outside the prefix.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Option<Url> {
        let rest = strip_prefix(path, &self.prefix)?;
        let mut url = self.target.clone();
        let joined = format!("{}{}", self.target.path().trim_end_matches('/'), rest);
        url.set_path(&joined);
        url.set_query(query);
        Some(url)
    }

    fn origin(&self) -> String {
        self.target.origin().ascii_serialization()
    }
}

/// Strips `prefix` from `path` on a segment boundary.
///
/// `/api` and `/api/` map to `/`; `/apiary` is not under `/api`.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Copies request headers for the upstream, rewriting `Origin` to the target.
///
/// `Host` is dropped so the client sets it from the upstream URL.
fn upstream_headers(incoming: &HeaderMap, origin: &str) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len());
    for (name, value) in incoming {
        if name == header::HOST || is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if headers.contains_key(header::ORIGIN) {
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert(header::ORIGIN, value);
        }
    }
    headers
}

fn downstream_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Fallback handler: forwards anything under the prefix, 404 otherwise.
pub async fn forward(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ProblemResponse> {
    let forwarder = state.forwarder();
    let start = Instant::now();
    let (parts, body) = request.into_parts();

    let Some(url) = forwarder.upstream_url(parts.uri.path(), parts.uri.query()) else {
        counter!("proxy_requests_total", "outcome" => "not_found").increment(1);
        return Err(ProblemResponse::not_found(format!(
            "{} is outside the proxied prefix {}",
            parts.uri.path(),
            forwarder.prefix()
        )));
    };

    let op_id = Uuid::new_v4();
    info!(stage = "proxy", %op_id, method = %parts.method, uri = %parts.uri, upstream = %url, "sending request");

    let bytes = body::to_bytes(body, MAX_BODY_BYTES).await.map_err(|err| {
        counter!("proxy_requests_total", "outcome" => "body_rejected").increment(1);
        error!(stage = "proxy", %op_id, error = %err, "failed to read request body");
        ProblemResponse::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "body_unreadable",
            format!("request body could not be buffered: {err}"),
        )
    })?;

    let headers = upstream_headers(&parts.headers, &forwarder.origin());
    let upstream = forwarder
        .http
        .request(parts.method.clone(), url)
        .headers(headers)
        .body(bytes)
        .send()
        .await
        .map_err(|err| upstream_failure(op_id, &err))?;

    let status = upstream.status();
    let headers = downstream_headers(upstream.headers());
    let bytes = upstream
        .bytes()
        .await
        .map_err(|err| upstream_failure(op_id, &err))?;

    histogram!("proxy_upstream_latency_seconds").record(start.elapsed().as_secs_f64());
    counter!("proxy_requests_total", "outcome" => "forwarded").increment(1);
    info!(stage = "proxy", %op_id, status = status.as_u16(), uri = %parts.uri, size_bytes = bytes.len(), "received response");

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn upstream_failure(op_id: Uuid, err: &reqwest::Error) -> ProblemResponse {
    counter!("proxy_requests_total", "outcome" => "upstream_error").increment(1);
    error!(stage = "proxy", %op_id, error = %err, "proxy error");
    ProblemResponse::bad_gateway(format!("upstream request failed: {err}"))
}
