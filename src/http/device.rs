//! Device-class classification from the User-Agent header.
//!
//! The mapping core never consults this; the class is recorded on the
//! request span for diagnostics. Substring list matches the mobile
//! platforms the mirrored sites serve dedicated variants for.

use axum::http::HeaderMap;

const MOBILE_MARKERS: &[&str] = &["android", "iphone", "ipad", "ipod", "symbianos", "windows phone"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
        }
    }
}

/// Classify the requesting device. Absent or unreadable User-Agent counts
/// as desktop.
pub fn classify(headers: &HeaderMap) -> DeviceClass {
    let Some(agent) = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    else {
        return DeviceClass::Desktop;
    };

    let agent = agent.to_ascii_lowercase();
    if MOBILE_MARKERS.iter().any(|m| agent.contains(m)) {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::USER_AGENT;

    fn headers_with(agent: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, agent.parse().unwrap());
        headers
    }

    #[test]
    fn mobile_agents() {
        for agent in [
            "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X)",
            "Mozilla/5.0 (Linux; Android 13; Pixel 7)",
            "Mozilla/5.0 (Windows Phone 10.0)",
        ] {
            assert_eq!(classify(&headers_with(agent)), DeviceClass::Mobile, "{agent}");
        }
    }

    #[test]
    fn desktop_agents() {
        assert_eq!(
            classify(&headers_with("Mozilla/5.0 (X11; Linux x86_64) Firefox/115.0")),
            DeviceClass::Desktop
        );
        assert_eq!(classify(&HeaderMap::new()), DeviceClass::Desktop);
    }
}
