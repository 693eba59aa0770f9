//! Failure classification and exponential backoff for download retries.
//!
//! Every failed attempt is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - temporary failures that may succeed on retry
//! - [`FailureType::RateLimited`] - HTTP 429, retried while honoring Retry-After
//! - [`FailureType::Corrupted`] - a completed transfer failed validation; retried,
//!   but any partial bytes on disk are suspect and never resumed from
//! - [`FailureType::Permanent`] - failures that won't succeed regardless of retries
//!
//! The [`RetryPolicy`] then decides whether to retry based on the failure type
//! and attempt count, computing exponential backoff delays with jitter.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use pdfetch::download::{DownloadError, RetryPolicy, RetryDecision, classify_error};
//!
//! let policy = RetryPolicy::new(4, Duration::from_secs(1));
//! let error = DownloadError::http_status("https://example.com/file.pdf", 503);
//!
//! match policy.should_retry(classify_error(&error), 1, None) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::constants::{JITTER_FRACTION, MAX_BACKOFF};
use super::DownloadError;

/// Classification of download failure types.
///
/// Used to determine whether a failed attempt should be retried and whether
/// partial bytes already on disk can be trusted for a range resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: network timeout, 5xx server errors, connection refused,
    /// TLS handshake failures.
    Transient,

    /// Server rate limiting (HTTP 429).
    ///
    /// Retried with backoff; a parsed Retry-After header overrides the
    /// computed delay when it is larger.
    RateLimited,

    /// A completed transfer failed post-hoc validation.
    ///
    /// Retried like [`FailureType::Transient`], but the bytes from the failed
    /// attempt are discarded instead of being offered for resume.
    Corrupted,

    /// Permanent failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 403 Forbidden, invalid URL, unwritable
    /// destination.
    Permanent,
}

/// Decision on whether to retry a failed download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the download after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the download.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Delay Calculation
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), 120s) + jitter
/// ```
///
/// where `jitter` is uniform in `[0, delay * 0.1]`. Attempt 1's retry waits
/// the base delay, attempt 2's retry waits double, and so on. A server
/// suggested delay (Retry-After) overrides the computed value when larger,
/// still subject to the 120 second ceiling.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a new retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including initial (clamped to >= 1)
    /// * `base_delay` - Base delay for the first retry
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry a failed download attempt.
    ///
    /// # Arguments
    ///
    /// * `failure_type` - Classification of the failure
    /// * `attempt` - The attempt number that just failed (1-indexed)
    /// * `server_delay` - Parsed Retry-After duration, when the server sent one
    ///
    /// # Returns
    ///
    /// A [`RetryDecision`] indicating whether to retry and with what delay.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(
        &self,
        failure_type: FailureType,
        attempt: u32,
        server_delay: Option<Duration>,
    ) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited | FailureType::Corrupted => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.delay_for(attempt, server_delay);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Computes the full delay for a retry: capped backoff plus jitter,
    /// with the server-suggested delay taking precedence when larger.
    fn delay_for(&self, attempt: u32, server_delay: Option<Duration>) -> Duration {
        let computed = self.backoff_delay(attempt);

        let chosen = match server_delay {
            Some(suggested) if suggested > computed => suggested.min(MAX_BACKOFF),
            _ => computed,
        };

        chosen + jitter_for(chosen)
    }

    /// Calculates the deterministic (jitter-free) backoff delay for an attempt.
    ///
    /// Formula: `min(base_delay * 2^(attempt-1), MAX_BACKOFF)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay_secs = self.base_delay.as_secs_f64() * 2f64.powi(exponent.min(32) as i32);
        Duration::from_secs_f64(delay_secs.min(MAX_BACKOFF.as_secs_f64()))
    }
}

/// Generates uniform random jitter in `[0, delay * JITTER_FRACTION]`.
///
/// Jitter decorrelates simultaneous retries from independent callers,
/// preventing thundering-herd retry storms.
fn jitter_for(delay: Duration) -> Duration {
    let max_jitter = delay.as_secs_f64() * JITTER_FRACTION;
    if max_jitter <= 0.0 {
        return Duration::ZERO;
    }
    let mut rng = rand::thread_rng();
    Duration::from_secs_f64(rng.gen_range(0.0..=max_jitter))
}

/// Classifies a download error into a failure type for retry decisions.
///
/// This function is total: every error, including unclassified conditions,
/// maps to some [`FailureType`]. Unknown conditions default to
/// [`FailureType::Transient`].
///
/// # HTTP Status Code Classification
///
/// | Status | Type | Rationale |
/// |--------|------|-----------|
/// | 400 | Permanent | Bad request - won't succeed on retry |
/// | 401 | Permanent | Unauthorized - no auth flow to retry with |
/// | 403 | Permanent | Forbidden - won't succeed on retry |
/// | 404 | Permanent | Not found - resource doesn't exist |
/// | 408 | Transient | Request timeout - may succeed |
/// | 410 | Permanent | Gone - permanently removed |
/// | 429 | RateLimited | Rate limited - retry honoring Retry-After |
/// | 5xx | Transient | Server error - may be temporary |
///
/// # Non-HTTP Errors
///
/// | Error | Type | Rationale |
/// |-------|------|-----------|
/// | Timeout | Transient | Network may recover |
/// | Network (incl. TLS) | Transient | Server or handshake may recover |
/// | Validation | Corrupted | Bytes are suspect, refetch from scratch |
/// | IO | Permanent | Local file system issue |
/// | InvalidUrl | Permanent | Won't succeed |
/// | Config | Permanent | Rejected before any attempt |
#[instrument]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),

        DownloadError::Timeout { .. } => FailureType::Transient,

        // TLS/certificate handshake failures arrive as reqwest errors and are
        // retried: rotating to a fallback User-Agent sometimes gets past
        // middleboxes that reset handshakes.
        DownloadError::Network { .. } => FailureType::Transient,

        DownloadError::Validation { .. } => FailureType::Corrupted,

        DownloadError::Io { .. } => FailureType::Permanent,

        DownloadError::InvalidUrl { .. } => FailureType::Permanent,

        DownloadError::Config { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
///
/// Explicit match arms are used for each status code for documentation purposes,
/// even though some return the same value.
#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        // Client errors - mostly permanent
        400 => FailureType::Permanent,   // Bad Request
        401 => FailureType::Permanent,   // Unauthorized
        403 => FailureType::Permanent,   // Forbidden
        404 => FailureType::Permanent,   // Not Found
        408 => FailureType::Transient,   // Request Timeout
        410 => FailureType::Permanent,   // Gone
        429 => FailureType::RateLimited, // Too Many Requests

        // Other 4xx are generally permanent
        status if (400..500).contains(&status) => FailureType::Permanent,

        // 5xx are transient
        status if (500..600).contains(&status) => FailureType::Transient,

        // Anything else is unexpected; classification must stay total, and
        // unknown conditions default to retry.
        _ => FailureType::Transient,
    }
}

/// Parses a Retry-After header value into a duration.
///
/// Accepts both forms from RFC 7231: integer seconds and HTTP-date. Values
/// are capped at [`MAX_BACKOFF`]; negative or unparseable values yield `None`
/// and the caller falls back to computed backoff.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    // Try parsing as integer seconds first (most common)
    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        }

        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);

        if duration > MAX_BACKOFF {
            warn!(
                seconds,
                max_seconds = MAX_BACKOFF.as_secs(),
                "Retry-After exceeds maximum, capping"
            );
            return Some(MAX_BACKOFF);
        }

        return Some(duration);
    }

    // Try parsing as HTTP-date
    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();

        if let Ok(duration) = datetime.duration_since(now) {
            if duration > MAX_BACKOFF {
                warn!(
                    delay_secs = duration.as_secs(),
                    max_secs = MAX_BACKOFF.as_secs(),
                    "Retry-After date exceeds maximum, capping"
                );
                return Some(MAX_BACKOFF);
            }
            Some(duration)
        } else {
            // Date is in the past
            debug!(
                header_value,
                "Retry-After date is in the past, returning zero"
            );
            Some(Duration::ZERO)
        }
    } else {
        debug!(header_value, "unparseable Retry-After value");
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::error::ValidationFailure;

    // ==================== Delay Calculation Tests ====================

    #[test]
    fn test_backoff_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_delay_strictly_increases_until_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100));
        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = policy.backoff_delay(attempt);
            assert!(
                delay > previous || delay == MAX_BACKOFF,
                "delay {delay:?} for attempt {attempt} did not increase past {previous:?}"
            );
            previous = delay;
        }
    }

    #[test]
    fn test_backoff_delay_capped_at_max() {
        let policy = RetryPolicy::new(10, Duration::from_secs(60));
        // 60 * 2^9 is far over the cap
        assert_eq!(policy.backoff_delay(10), MAX_BACKOFF);
    }

    #[test]
    fn test_jitter_within_ten_percent_of_delay() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        for _ in 0..100 {
            let delay = policy.delay_for(1, None);
            assert!(delay >= Duration::from_secs(1));
            assert!(
                delay <= Duration::from_millis(1100),
                "delay {delay:?} outside [1s, 1.1s]"
            );
        }
    }

    #[test]
    fn test_server_delay_overrides_when_larger() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        // Attempt 1 computes 1s; server says 30s
        let delay = policy.delay_for(1, Some(Duration::from_secs(30)));
        assert!(delay >= Duration::from_secs(30));
        assert!(delay <= Duration::from_secs(33));
    }

    #[test]
    fn test_server_delay_ignored_when_smaller() {
        let policy = RetryPolicy::new(10, Duration::from_secs(4));
        // Attempt 2 computes 8s; server says 1s, backoff wins
        let delay = policy.delay_for(2, Some(Duration::from_secs(1)));
        assert!(delay >= Duration::from_secs(8));
    }

    #[test]
    fn test_server_delay_subject_to_ceiling() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        let delay = policy.delay_for(1, Some(Duration::from_secs(100_000)));
        // Capped delay plus at most 10% jitter
        assert!(delay <= MAX_BACKOFF + MAX_BACKOFF / 10 + Duration::from_millis(1));
    }

    // ==================== Should Retry Decision Tests ====================

    #[test]
    fn test_should_retry_permanent_does_not_retry() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let decision = policy.should_retry(FailureType::Permanent, 1, None);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
        if let RetryDecision::DoNotRetry { reason } = decision {
            assert!(reason.contains("permanent"));
        }
    }

    #[test]
    fn test_should_retry_transient_retries() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let decision = policy.should_retry(FailureType::Transient, 1, None);
        assert!(matches!(
            decision,
            RetryDecision::Retry { attempt: 2, .. }
        ));
    }

    #[test]
    fn test_should_retry_corrupted_retries() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let decision = policy.should_retry(FailureType::Corrupted, 1, None);
        assert!(matches!(decision, RetryDecision::Retry { .. }));
    }

    #[test]
    fn test_should_retry_rate_limited_retries() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let decision = policy.should_retry(FailureType::RateLimited, 1, None);
        assert!(matches!(decision, RetryDecision::Retry { .. }));
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1, None),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 2, None),
            RetryDecision::Retry { .. }
        ));

        let decision = policy.should_retry(FailureType::Transient, 3, None);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
        if let RetryDecision::DoNotRetry { reason } = decision {
            assert!(reason.contains("exhausted"));
        }
    }

    #[test]
    fn test_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
    }

    // ==================== Error Classification Tests ====================

    #[test]
    fn test_classify_http_400_permanent() {
        let error = DownloadError::http_status("http://example.com", 400);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_http_401_permanent() {
        let error = DownloadError::http_status("http://example.com", 401);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_http_403_permanent() {
        let error = DownloadError::http_status("http://example.com", 403);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_http_404_permanent() {
        let error = DownloadError::http_status("http://example.com", 404);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_http_408_transient() {
        let error = DownloadError::http_status("http://example.com", 408);
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_http_410_permanent() {
        let error = DownloadError::http_status("http://example.com", 410);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_http_429_rate_limited() {
        let error = DownloadError::http_status("http://example.com", 429);
        assert_eq!(classify_error(&error), FailureType::RateLimited);
    }

    #[test]
    fn test_classify_http_5xx_transient() {
        for status in [500, 502, 503, 504] {
            let error = DownloadError::http_status("http://example.com", status);
            assert_eq!(
                classify_error(&error),
                FailureType::Transient,
                "status {status}"
            );
        }
    }

    #[test]
    fn test_classify_unknown_status_transient() {
        // Classification is total; oddball statuses default to retry.
        let error = DownloadError::http_status("http://example.com", 999);
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_timeout_transient() {
        let error = DownloadError::timeout("http://example.com");
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_validation_corrupted() {
        let error = DownloadError::validation("/tmp/doc.pdf.part", ValidationFailure::Empty);
        assert_eq!(classify_error(&error), FailureType::Corrupted);
    }

    #[test]
    fn test_classify_invalid_url_permanent() {
        let error = DownloadError::invalid_url("not-a-url");
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_io_error_permanent() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = DownloadError::io("/path/to/file", io_err);
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_config_permanent() {
        let error = DownloadError::config("timeout_secs 1.0 out of range");
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    // ==================== Retry-After Parsing Tests ====================

    #[test]
    fn test_parse_retry_after_integer_seconds() {
        assert_eq!(parse_retry_after("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_negative_rejected() {
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn test_parse_retry_after_capped() {
        assert_eq!(parse_retry_after("999999"), Some(MAX_BACKOFF));
    }

    #[test]
    fn test_parse_retry_after_http_date_future() {
        let future = std::time::SystemTime::now() + Duration::from_secs(60);
        let formatted = httpdate::fmt_http_date(future);
        let parsed = parse_retry_after(&formatted).unwrap();
        assert!(parsed <= Duration::from_secs(60));
        assert!(parsed >= Duration::from_secs(55));
    }

    #[test]
    fn test_parse_retry_after_http_date_past_is_zero() {
        let past = std::time::SystemTime::now() - Duration::from_secs(60);
        let formatted = httpdate::fmt_http_date(past);
        assert_eq!(parse_retry_after(&formatted), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_garbage() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }
}
