//! User-Agent strings for download traffic.
//!
//! The default header identifies the tool (good citizenship; RFC 9308). Some
//! hosts drop connections for unfamiliar clients, so a small fixed rotation of
//! common browser strings is available as a fallback after connection-level
//! failures.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/nicksrandall/pdfetch";

/// Browser-like fallbacks tried in order when connections fail under the
/// identifying header. Rotation wraps around.
const FALLBACK_USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "curl/8.4.0",
];

/// Default User-Agent for download requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("pdfetch/{version} (document-fetcher; +{PROJECT_UA_URL})")
}

/// Returns the `rotation`-th fallback User-Agent, wrapping around.
#[must_use]
pub(crate) fn fallback_user_agent(rotation: usize) -> &'static str {
    FALLBACK_USER_AGENTS[rotation % FALLBACK_USER_AGENTS.len()]
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ua_identifies_tool_and_version() {
        let ua = default_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL");
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("pdfetch/")
                .and_then(|s| s.split(' ').next())
                .expect("UA has version"),
            "UA must contain crate version"
        );
    }

    #[test]
    fn test_fallback_rotation_wraps() {
        let first = fallback_user_agent(0);
        assert!(first.starts_with("Mozilla/5.0"));
        assert_eq!(
            fallback_user_agent(FALLBACK_USER_AGENTS.len()),
            first,
            "rotation must wrap"
        );
        // Consecutive rotations differ
        assert_ne!(fallback_user_agent(0), fallback_user_agent(1));
    }
}
