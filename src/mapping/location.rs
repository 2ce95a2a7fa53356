//! Value types produced by the resolvers.

use url::Url;

use crate::registry::RegionCode;

/// Path segment / host label marking the mobile variant of a regional site.
pub const MOBILE_MARKER: &str = "m";

/// Regional context extracted from a host or path during resolution.
///
/// The mobile flag is only meaningful together with a region; URLs without
/// a recognized region carry no context at all (`Option<RegionContext>`),
/// which encodes the invariant directly in the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionContext {
    pub code: RegionCode,
    pub mobile: bool,
}

impl RegionContext {
    /// Path prefix form, `/zh` or `/zh/m`. No trailing slash so it can be
    /// concatenated with an absolute path without doubling the separator.
    pub fn path_prefix(&self) -> String {
        if self.mobile {
            format!("/{}/{}", self.code, MOBILE_MARKER)
        } else {
            format!("/{}", self.code)
        }
    }

    /// Leading host labels, `zh.` or `zh.m.`.
    pub fn host_prefix(&self) -> String {
        if self.mobile {
            format!("{}.{}.", self.code, MOBILE_MARKER)
        } else {
            format!("{}.", self.code)
        }
    }
}

/// Result of one resolution step: the translated URL plus whatever
/// regional context the source host/path encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedLocation {
    pub url: Url,
    pub region: Option<RegionContext>,
}

impl MappedLocation {
    pub fn new(url: Url, region: Option<RegionContext>) -> Self {
        Self { url, region }
    }

    /// A location that leaves the source URL untouched.
    pub fn passthrough(url: Url) -> Self {
        Self { url, region: None }
    }
}

/// Context established for the top-level page request, threaded immutably
/// into the content rewriter for that one response.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    /// The upstream location the page was fetched from.
    pub upstream: MappedLocation,
}

impl ProxyContext {
    pub fn new(upstream: MappedLocation) -> Self {
        Self { upstream }
    }

    pub fn region(&self) -> Option<&RegionContext> {
        self.upstream.region.as_ref()
    }

    /// Scheme of the fetched page, used to complete protocol-relative links.
    pub fn scheme(&self) -> &str {
        self.upstream.url.scheme()
    }
}
