//! Upstream → proxied resolution, the exact inverse of [`upstream`].
//!
//! # Responsibilities
//! - Recognize upstream host shapes by tokenizing the host into dot labels
//! - Re-derive region/mobile context from the host labels
//! - Produce the proxied URL with an explicit `/www`, `/<region>` or
//!   `/<region>/m` path prefix
//!
//! # Design Decisions
//! - Returns `None` for unrecognized hosts; the caller passes the URL
//!   through unchanged. Unknown input is a safe no-op, never an error.
//! - Must be the left inverse of the upstream resolver for every location
//!   it can produce; the round-trip tests in the parent module pin this.
//!
//! [`upstream`]: super::upstream

use url::Url;

use crate::mapping::location::{MappedLocation, RegionContext, MOBILE_MARKER};
use crate::mapping::with_host_path;
use crate::registry;

/// Maps an absolute upstream URL back to its proxied form.
#[derive(Debug, Clone)]
pub struct ProxyResolver {
    front_domain: String,
}

impl ProxyResolver {
    pub fn new(front_domain: &str) -> Self {
        Self {
            front_domain: front_domain.to_ascii_lowercase(),
        }
    }

    /// Resolve an upstream URL to its proxied form, or `None` when the host
    /// matches no recognized family/special pattern.
    pub fn resolve(&self, url: &Url) -> Option<MappedLocation> {
        let host = url.host_str()?;
        let body = host.strip_suffix(".org")?;

        // Rule 1: special project host, path unchanged.
        if let Some(special) = registry::special(body) {
            let proxied = self.rebuild(url, &format!("{}.{}", special, self.front_domain), url.path())?;
            return Some(MappedLocation::new(proxied, None));
        }

        let labels: Vec<&str> = body.split('.').collect();
        match labels.as_slice() {
            // Rule 2: www.<family>.org → /www prefix.
            ["www", family] => {
                let family = registry::family(family)?;
                let proxied = self.rebuild(
                    url,
                    &format!("{}.{}", family, self.front_domain),
                    &format!("/www{}", url.path()),
                )?;
                Some(MappedLocation::new(proxied, None))
            }
            // Rule 3: [<region>[.m].]<family>.org with a recognized region.
            [region, family] => {
                let ctx = RegionContext {
                    code: registry::region(region)?,
                    mobile: false,
                };
                self.regional(url, family, ctx)
            }
            [region, marker, family] if *marker == MOBILE_MARKER => {
                let ctx = RegionContext {
                    code: registry::region(region)?,
                    mobile: true,
                };
                self.regional(url, family, ctx)
            }
            // Bare family host: API/static paths, no context in either form.
            [family] => {
                let family = registry::family(family)?;
                let proxied =
                    self.rebuild(url, &format!("{}.{}", family, self.front_domain), url.path())?;
                Some(MappedLocation::new(proxied, None))
            }
            // Rule 4: no recognized shape, pass through.
            _ => None,
        }
    }

    fn regional(&self, url: &Url, family: &str, ctx: RegionContext) -> Option<MappedLocation> {
        let family = registry::family(family)?;
        let proxied = self.rebuild(
            url,
            &format!("{}.{}", family, self.front_domain),
            &format!("{}{}", ctx.path_prefix(), url.path()),
        )?;
        Some(MappedLocation::new(proxied, Some(ctx)))
    }

    fn rebuild(&self, src: &Url, host: &str, path: &str) -> Option<Url> {
        with_host_path(src, src.scheme(), host, path).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ProxyResolver {
        ProxyResolver::new("example.com")
    }

    fn parse(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn special_project_host() {
        let loc = resolver()
            .resolve(&parse("https://upload.wikimedia.org/wikipedia/commons/x.png"))
            .unwrap();
        assert_eq!(
            loc.url.as_str(),
            "https://upload.wikimedia.example.com/wikipedia/commons/x.png"
        );
        assert!(loc.region.is_none());
    }

    #[test]
    fn www_host_gains_www_prefix() {
        let loc = resolver()
            .resolve(&parse("https://www.wikipedia.org/wiki/Test"))
            .unwrap();
        assert_eq!(loc.url.as_str(), "https://wikipedia.example.com/www/wiki/Test");
        assert!(loc.region.is_none());
    }

    #[test]
    fn regional_host_gains_region_prefix() {
        let loc = resolver()
            .resolve(&parse("https://en.wikipedia.org/wiki/Bar"))
            .unwrap();
        assert_eq!(loc.url.as_str(), "https://wikipedia.example.com/en/wiki/Bar");
        let ctx = loc.region.unwrap();
        assert_eq!(ctx.code.as_str(), "en");
        assert!(!ctx.mobile);
    }

    #[test]
    fn mobile_host_gains_region_and_marker_prefix() {
        let loc = resolver()
            .resolve(&parse("https://zh.m.wikipedia.org/wiki/Foo"))
            .unwrap();
        assert_eq!(loc.url.as_str(), "https://wikipedia.example.com/zh/m/wiki/Foo");
        assert!(loc.region.unwrap().mobile);
    }

    #[test]
    fn bare_family_host_keeps_path() {
        let loc = resolver()
            .resolve(&parse("https://wikipedia.org/w/api.php?action=query"))
            .unwrap();
        assert_eq!(loc.url.host_str(), Some("wikipedia.example.com"));
        assert_eq!(loc.url.path(), "/w/api.php");
        assert_eq!(loc.url.query(), Some("action=query"));
    }

    #[test]
    fn root_path_does_not_double_separator() {
        let loc = resolver().resolve(&parse("https://zh.wikipedia.org/")).unwrap();
        assert_eq!(loc.url.path(), "/zh/");
    }

    #[test]
    fn unrecognized_hosts_pass_through() {
        assert!(resolver().resolve(&parse("https://example.org/x")).is_none());
        assert!(resolver().resolve(&parse("https://en.example.org/x")).is_none());
        assert!(resolver().resolve(&parse("https://third-party.com/x")).is_none());
        // Unknown leading label on a family host.
        assert!(resolver()
            .resolve(&parse("https://nosuchregion.wikipedia.org/x"))
            .is_none());
        // Too many labels for any recognized shape.
        assert!(resolver()
            .resolve(&parse("https://a.b.c.wikipedia.org/x"))
            .is_none());
    }

    #[test]
    fn scheme_is_preserved() {
        let loc = resolver()
            .resolve(&parse("http://en.wikipedia.org/wiki/Bar"))
            .unwrap();
        assert_eq!(loc.url.scheme(), "http");
    }
}
