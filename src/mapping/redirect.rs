//! Canonicalization of bare root requests.
//!
//! A project-family host asked for `/`, `/m` or `/m/` has not chosen a
//! region yet; those three forms are redirected to the explicit `/www/`
//! desktop-root form before any upstream fetch happens.

use url::Url;

use crate::registry;

const BARE_ROOTS: &[&str] = &["/", "/m", "/m/"];

/// Returns the redirect target when the request is a bare root on a
/// project-family host, `None` otherwise.
pub fn redirect_target(url: &Url, front_domain: &str) -> Option<Url> {
    let host = url.host_str()?;
    let label = host.strip_suffix(&format!(".{}", front_domain.to_ascii_lowercase()))?;
    registry::family(label)?;

    if !BARE_ROOTS.contains(&url.path()) {
        return None;
    }

    // Only the path changes; a query on the bare root survives the hop.
    let mut target = url.clone();
    target.set_path("/www/");
    Some(target)
}
