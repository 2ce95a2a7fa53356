//! Proxied → upstream resolution.
//!
//! # Responsibilities
//! - Strip the front-domain suffix and classify the remaining label
//! - Apply the grammar rules in strict precedence: special project,
//!   `/www/` desktop root, region(+mobile) path prefix, unprefixed
//!   API/static fallthrough
//! - Recover missing region context for API-shaped paths from the Referer
//!
//! # Design Decisions
//! - First match wins; rules are checked in the documented order
//! - A front host naming no known project is an explicit error, answered
//!   by the caller, never silently fetched (that would loop back to us)
//! - Referer recovery is best effort: any parse or resolution failure
//!   degrades to "no region", never fails the request

use url::Url;

use crate::mapping::location::{MappedLocation, RegionContext, MOBILE_MARKER};
use crate::mapping::{with_host_path, ResolveError};
use crate::registry;

/// Path prefixes that carry no region of their own and may borrow one
/// from the referring page.
const API_PATH_PREFIXES: &[&str] = &["/w/api.php", "/w/load.php", "/api/", "/static/"];

/// True for API/static-asset paths eligible for Referer region recovery.
pub fn is_api_path(path: &str) -> bool {
    API_PATH_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Maps a proxied request URL to the equivalent upstream URL, extracting
/// region/mobile context along the way.
#[derive(Debug, Clone)]
pub struct UpstreamResolver {
    /// Suffix to strip from inbound hosts, `.{front_domain}`.
    front_suffix: String,
    upstream_scheme: String,
}

impl UpstreamResolver {
    pub fn new(front_domain: &str, upstream_scheme: &str) -> Self {
        Self {
            front_suffix: format!(".{}", front_domain.to_ascii_lowercase()),
            upstream_scheme: upstream_scheme.to_string(),
        }
    }

    /// Resolve a proxied URL. Applies the grammar rules in precedence order.
    pub fn resolve(&self, url: &Url) -> Result<MappedLocation, ResolveError> {
        let host = url.host_str().ok_or(ResolveError::MissingHost)?;
        let label = self
            .front_label(host)
            .ok_or_else(|| ResolveError::UnrecognizedHost { host: host.to_string() })?;

        // Rule 1: special project, global host, no regional context.
        if let Some(special) = registry::special(label) {
            let upstream = with_host_path(
                url,
                &self.upstream_scheme,
                &format!("{}.org", special),
                url.path(),
            )?;
            return Ok(MappedLocation::new(upstream, None));
        }

        let family = registry::family(label)
            .ok_or_else(|| ResolveError::UnrecognizedHost { host: host.to_string() })?;
        let path = url.path();

        // Rule 2: canonical desktop-root form.
        if path == "/www" || path.starts_with("/www/") {
            let rest = &path["/www".len()..];
            let rest = if rest.is_empty() { "/" } else { rest };
            let upstream = with_host_path(
                url,
                &self.upstream_scheme,
                &format!("www.{}.org", family),
                rest,
            )?;
            return Ok(MappedLocation::new(upstream, None));
        }

        // Rule 3: region (and optional mobile marker) encoded in the path.
        if let Some((ctx, rest)) = split_region_prefix(path) {
            let upstream = with_host_path(
                url,
                &self.upstream_scheme,
                &format!("{}{}.org", ctx.host_prefix(), family),
                rest,
            )?;
            return Ok(MappedLocation::new(upstream, Some(ctx)));
        }

        // Rule 4: unprefixed API/static path, bare family host.
        let upstream = with_host_path(
            url,
            &self.upstream_scheme,
            &format!("{}.org", family),
            path,
        )?;
        Ok(MappedLocation::new(upstream, None))
    }

    /// Resolve a proxied URL, first splicing region/mobile context recovered
    /// from the Referer onto API-shaped paths that carry none of their own.
    pub fn resolve_with_referer(
        &self,
        url: &Url,
        referer: Option<&str>,
    ) -> Result<MappedLocation, ResolveError> {
        if is_api_path(url.path()) && self.names_family(url) {
            if let Some(ctx) = referer.and_then(|r| self.referer_region(r)) {
                let mut spliced = url.clone();
                spliced.set_path(&format!("{}{}", ctx.path_prefix(), url.path()));
                return self.resolve(&spliced);
            }
        }
        self.resolve(url)
    }

    fn names_family(&self, url: &Url) -> bool {
        url.host_str()
            .and_then(|h| self.front_label(h))
            .is_some_and(registry::is_family)
    }

    /// Region context of the referring page, if it resolves to one.
    fn referer_region(&self, referer: &str) -> Option<RegionContext> {
        let url = Url::parse(referer).ok()?;
        self.resolve(&url).ok()?.region
    }

    /// The host with the front-domain suffix stripped, e.g.
    /// `wikipedia.example.com` → `wikipedia`. `None` when the host is not
    /// under the front domain.
    fn front_label<'a>(&self, host: &'a str) -> Option<&'a str> {
        host.strip_suffix(self.front_suffix.as_str())
            .filter(|label| !label.is_empty())
    }
}

/// Consume a leading `/<region>[/m]` prefix. Returns the extracted context
/// and the remaining path (normalized to `/` when fully consumed).
fn split_region_prefix(path: &str) -> Option<(RegionContext, &str)> {
    let trimmed = path.strip_prefix('/')?;
    let mut segments = trimmed.splitn(3, '/');
    let first = segments.next()?;
    let code = registry::region(first)?;

    let mut consumed = 1 + first.len();
    let mut mobile = false;
    if segments.next() == Some(MOBILE_MARKER) {
        mobile = true;
        consumed += 1 + MOBILE_MARKER.len();
    }

    let rest = &path[consumed..];
    let rest = if rest.is_empty() { "/" } else { rest };
    Some((RegionContext { code, mobile }, rest))
}
