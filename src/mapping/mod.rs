//! Bidirectional URL-mapping engine.
//!
//! # Data Flow
//! ```text
//! Inbound request URL (front domain)
//!     → redirect.rs (canonicalize bare roots to /www/)
//!     → upstream.rs (proxied → upstream, region/mobile extraction,
//!                    Referer-based recovery for API paths)
//!     → single outbound fetch
//!     → rewrite (uses proxied.rs: upstream → proxied, the exact inverse)
//! ```
//!
//! # Design Decisions
//! - Explicit tokenization: hosts split on `.`, paths split on `/`,
//!   matched against the registry tables. No regex construction.
//! - One canonical mobile convention enforced by both directions:
//!   upstream host `<region>.m.<family>.org` ⇄ proxied path `/<region>/m/...`
//! - Round-trip law: `proxied(upstream(u).url) == u` over host and path for
//!   every proxied URL the upstream resolver accepts, and conversely for
//!   every recognized upstream host shape.

use thiserror::Error;
use url::Url;

pub mod location;
pub mod proxied;
pub mod redirect;
pub mod upstream;

pub use location::{MappedLocation, ProxyContext, RegionContext, MOBILE_MARKER};
pub use proxied::ProxyResolver;
pub use redirect::redirect_target;
pub use upstream::UpstreamResolver;

/// Errors from the proxied → upstream direction. The inverse direction
/// never errors; it degrades to pass-through instead.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("host `{host}` names no recognized project under the front domain")]
    UnrecognizedHost { host: String },

    #[error("request URL carries no host")]
    MissingHost,

    #[error("rebuilding URL failed: {0}")]
    Rebuild(String),
}

/// Rebuild `src` with a new scheme, host and path, dropping any explicit
/// port and keeping the query string.
fn with_host_path(src: &Url, scheme: &str, host: &str, path: &str) -> Result<Url, ResolveError> {
    let mut url = src.clone();
    url.set_scheme(scheme)
        .map_err(|_| ResolveError::Rebuild(format!("scheme `{scheme}` rejected")))?;
    url.set_host(Some(host))
        .map_err(|e| ResolveError::Rebuild(e.to_string()))?;
    url.set_path(path);
    let _ = url.set_port(None);
    Ok(url)
}
