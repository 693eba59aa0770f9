//! Filename derivation and sanitization for downloads.
//!
//! The destination filename comes from the caller when supplied, otherwise
//! from the URL's final path segment, with a domain/timestamp fallback when
//! the segment is empty or unusable after sanitization.

use url::Url;

/// Resolves the destination filename for a download.
///
/// Precedence:
/// 1. Caller-supplied name (sanitized)
/// 2. URL final path segment (percent-decoded, sanitized)
/// 3. Generated `domain_timestamp.pdf` fallback
///
/// The result always carries a `.pdf` extension.
#[must_use]
pub(crate) fn resolve_filename(url: &Url, requested: Option<&str>) -> String {
    let candidate = requested
        .map(sanitize_filename_component)
        .filter(|name| !name.is_empty())
        .or_else(|| filename_from_url(url))
        .unwrap_or_else(|| generated_fallback(url));

    ensure_pdf_extension(candidate)
}

/// Extracts a usable filename from the URL's final path segment.
fn filename_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    let cleaned = sanitize_filename_component(&decoded);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Builds a `domain_timestamp.pdf`-style name when the URL offers nothing usable.
fn generated_fallback(url: &Url) -> String {
    let domain = url
        .host_str()
        .map(|h| sanitize_filename_component(&h.replace('.', "-")))
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| "download".to_string());
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{domain}_{timestamp}")
}

/// Appends `.pdf` unless the name already ends with it (case-insensitive).
fn ensure_pdf_extension(name: String) -> String {
    if name.to_lowercase().ends_with(".pdf") {
        name
    } else {
        format!("{name}.pdf")
    }
}

/// Replaces filesystem-hostile characters and collapses runs of separators.
pub(crate) fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\'' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches('_').trim_matches('.').to_string()
}
