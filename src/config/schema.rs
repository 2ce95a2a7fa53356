//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML, and every
//! section has defaults so a minimal config file (or none at all) works.

use std::net::SocketAddr;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Root configuration for the mirror proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MirrorConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Front-facing identity of the proxy.
    pub proxy: FrontConfig,

    /// Upstream fetch settings.
    pub upstream: UpstreamConfig,

    /// Bare-root canonicalization settings.
    pub redirect: RedirectConfig,

    /// Content rewriting settings.
    pub rewrite: RewriteConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// The public-facing domain the proxy answers on.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FrontConfig {
    /// Front domain; project hosts hang off it as `wikipedia.<front_domain>`.
    pub front_domain: String,

    /// Scheme the proxy is reached on, used when reconstructing request
    /// URLs and redirect targets behind a TLS terminator.
    pub front_scheme: String,
}

impl Default for FrontConfig {
    fn default() -> Self {
        Self {
            front_domain: "example.com".to_string(),
            front_scheme: "https".to_string(),
        }
    }
}

/// Upstream fetch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Scheme for resolved upstream URLs.
    pub scheme: String,

    /// Optional fixed connect address. The resolved upstream host is kept
    /// in the Host header; the TCP connection goes here instead. Used for
    /// testing and for deployments behind a fixed egress.
    pub override_addr: Option<String>,
}

impl UpstreamConfig {
    pub fn override_socket(&self) -> Option<SocketAddr> {
        self.override_addr.as_ref().and_then(|a| a.parse().ok())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            override_addr: None,
        }
    }
}

/// Bare-root canonicalization settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// HTTP status for the redirect to `/www/`.
    pub status: u16,
}

impl RedirectConfig {
    /// The validated status; validation guarantees this is a redirect code.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::MOVED_PERMANENTLY)
    }
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self { status: 301 }
    }
}

/// Content rewriting settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Rewrite absolute and protocol-relative links whose hosts match a
    /// recognized project. Root-relative region prefixing stays active
    /// regardless.
    pub absolute_links: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            absolute_links: true,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when RUST_LOG is not set.
    pub log_level: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "wikimirror=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
