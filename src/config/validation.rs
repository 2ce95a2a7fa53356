//! Configuration validation.
//!
//! Semantic checks on top of what serde already guarantees. Returns all
//! violations, not just the first.

use axum::http::StatusCode;
use thiserror::Error;

use crate::config::schema::MirrorConfig;

#[derive(Debug, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

fn err(field: &'static str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field,
        message: message.into(),
    }
}

/// Validate a configuration. Pure function, no side effects.
pub fn validate_config(config: &MirrorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(err(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }

    let domain = &config.proxy.front_domain;
    if domain.is_empty() {
        errors.push(err("proxy.front_domain", "must not be empty"));
    } else if domain.contains('/') || domain.contains(':') || domain.starts_with('.') {
        errors.push(err(
            "proxy.front_domain",
            format!("`{domain}` is not a bare domain name"),
        ));
    }

    if !matches!(config.proxy.front_scheme.as_str(), "http" | "https") {
        errors.push(err(
            "proxy.front_scheme",
            format!("`{}` is not http or https", config.proxy.front_scheme),
        ));
    }

    if !matches!(config.upstream.scheme.as_str(), "http" | "https") {
        errors.push(err(
            "upstream.scheme",
            format!("`{}` is not http or https", config.upstream.scheme),
        ));
    }

    if let Some(addr) = &config.upstream.override_addr {
        if config.upstream.override_socket().is_none() {
            errors.push(err(
                "upstream.override_addr",
                format!("`{addr}` is not a socket address"),
            ));
        }
    }

    match StatusCode::from_u16(config.redirect.status) {
        Ok(status) if status.is_redirection() => {}
        _ => errors.push(err(
            "redirect.status",
            format!("`{}` is not a redirect status code", config.redirect.status),
        )),
    }

    if config.timeouts.request_secs == 0 || config.timeouts.connect_secs == 0 {
        errors.push(err("timeouts", "timeouts must be non-zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
