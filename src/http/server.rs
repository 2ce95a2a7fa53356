//! HTTP server setup and the per-request proxy pipeline.
//!
//! # Responsibilities
//! - Create the Axum router with a single wildcard proxy handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Apply the redirect policy before any upstream work
//! - Resolve the upstream URL (with Referer-based API context recovery)
//! - Issue the single outbound fetch and stream the response back,
//!   rewriting HTML bodies through the content rewriter
//!
//! # Design Decisions
//! - Exactly one outbound fetch per request, no retries, no caching;
//!   upstream failures surface as 502 without masking
//! - Each response gets a fresh rewriter bound to its own page context;
//!   the only shared state is the read-only configuration and resolvers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, request::Parts, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use url::Url;

use crate::config::MirrorConfig;
use crate::http::device;
use crate::http::request::{RequestIdLayer, X_REQUEST_ID};
use crate::mapping::{self, MappedLocation, ProxyContext, ProxyResolver, UpstreamResolver};
use crate::observability::metrics;
use crate::rewrite::HtmlRewriter;

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MirrorConfig>,
    pub upstream: Arc<UpstreamResolver>,
    pub proxied: Arc<ProxyResolver>,
    pub client: reqwest::Client,
}

/// HTTP server for the mirror proxy.
pub struct HttpServer {
    router: Router,
    config: Arc<MirrorConfig>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: MirrorConfig) -> Result<Self, reqwest::Error> {
        let config = Arc::new(config);
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .build()?;

        let state = AppState {
            upstream: Arc::new(UpstreamResolver::new(
                &config.proxy.front_domain,
                &config.upstream.scheme,
            )),
            proxied: Arc::new(ProxyResolver::new(&config.proxy.front_domain)),
            client,
            config: config.clone(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &MirrorConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections until shutdown is signaled.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            front_domain = %self.config.proxy.front_domain,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }
}

/// Main proxy handler: redirect policy, resolution, fetch, rewrite.
///
/// The request is split into parts and body up front; the body type is not
/// `Sync`, so only the owned body and the `Sync` parts may be held across
/// the outbound await.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let request_id = parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let device = device::classify(&parts.headers);

    let Some(page_url) = request_url(&state.config, &parts) else {
        metrics::record_request(StatusCode::BAD_REQUEST, "bad-request");
        return (StatusCode::BAD_REQUEST, "missing or invalid host").into_response();
    };

    tracing::debug!(
        request_id = %request_id,
        url = %page_url,
        device = device.as_str(),
        "proxying request"
    );

    // Canonicalize bare roots before any upstream work.
    if let Some(target) = mapping::redirect_target(&page_url, &state.config.proxy.front_domain) {
        tracing::debug!(request_id = %request_id, target = %target, "bare root canonicalized");
        metrics::record_redirect();
        return redirect_response(state.config.redirect.status_code(), &target);
    }

    let referer = parts
        .headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok());
    let location = match state.upstream.resolve_with_referer(&page_url, referer) {
        Ok(location) => location,
        Err(err) => {
            tracing::warn!(request_id = %request_id, url = %page_url, error = %err, "unresolvable request");
            metrics::record_request(StatusCode::NOT_FOUND, "unrecognized");
            return (StatusCode::NOT_FOUND, "no known project for this host").into_response();
        }
    };

    tracing::debug!(request_id = %request_id, upstream = %location.url, "resolved upstream");

    let upstream_response = match fetch_upstream(&state, &parts, body, &location).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(request_id = %request_id, upstream = %location.url, error = %err, "upstream fetch failed");
            metrics::record_request(StatusCode::BAD_GATEWAY, "fetch-error");
            return (StatusCode::BAD_GATEWAY, "upstream fetch failed").into_response();
        }
    };

    let status = upstream_response.status();
    metrics::record_request(status, "proxied");

    let mut headers = upstream_response.headers().clone();
    strip_hop_headers(&mut headers);

    // Rule (b) still applies with absolute rewriting off, so HTML is only
    // passed through untouched when neither rule can fire.
    let rewriting_inert =
        !state.config.rewrite.absolute_links && location.region.is_none();

    if is_html(&headers) && !rewriting_inert {
        // The rewritten length is unknowable up front; the transfer
        // re-derives framing.
        headers.remove(header::CONTENT_LENGTH);
        let context = ProxyContext::new(location);
        let rewriter = HtmlRewriter::new(
            state.proxied.clone(),
            context,
            state.config.rewrite.absolute_links,
        );
        let rewritten = rewriter.rewrite_stream(upstream_response.bytes_stream());
        build_response(status, headers, Body::from_stream(rewritten))
    } else {
        let stream = upstream_response.bytes_stream();
        build_response(status, headers, Body::from_stream(stream))
    }
}

/// Reconstruct the absolute request URL from the front scheme, the Host
/// header (or HTTP/2 authority) and the request target.
fn request_url(config: &MirrorConfig, parts: &Parts) -> Option<Url> {
    let authority = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))?;
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Url::parse(&format!(
        "{}://{}{}",
        config.proxy.front_scheme, authority, target
    ))
    .ok()
}

/// Issue the single outbound fetch. With a connect override the TCP
/// destination is fixed but the resolved upstream host is preserved in the
/// Host header, mirroring how ordinary reverse proxies address backends.
async fn fetch_upstream(
    state: &AppState,
    parts: &Parts,
    body: Body,
    location: &MappedLocation,
) -> Result<reqwest::Response, reqwest::Error> {
    let mut fetch_url = location.url.clone();
    let mut host_header = None;

    if let Some(addr) = state.config.upstream.override_socket() {
        host_header = location.url.host_str().map(str::to_owned);
        let _ = fetch_url.set_scheme("http");
        let _ = fetch_url.set_ip_host(addr.ip());
        let _ = fetch_url.set_port(Some(addr.port()));
    }

    let mut outbound = state.client.request(parts.method.clone(), fetch_url);
    if let Some(host) = host_header {
        outbound = outbound.header(header::HOST, host);
    }
    for name in [header::USER_AGENT, header::ACCEPT_LANGUAGE, header::CONTENT_TYPE] {
        if let Some(value) = parts.headers.get(&name) {
            outbound = outbound.header(name, value);
        }
    }
    if parts.method != Method::GET && parts.method != Method::HEAD {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }
    outbound.send().await
}

fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("text/html"))
        .unwrap_or(false)
}

/// Connection-scoped headers that must not be forwarded, plus lengths the
/// transfer re-derives.
fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::TRAILER,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");
}

fn redirect_response(status: StatusCode, target: &Url) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    if let Ok(value) = header::HeaderValue::from_str(target.as_str()) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Wait for Ctrl+C or a programmatic shutdown trigger.
async fn shutdown_signal(mut shutdown: broadcast::Receiver<()>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if result.is_err() {
                tracing::error!("failed to install Ctrl+C handler");
            }
        }
        _ = shutdown.recv() => {}
    }
    tracing::info!("shutdown signal received");
}
