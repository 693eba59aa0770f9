//! Request and outcome types for a single download run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use super::constants::{
    BASE_RETRY_DELAY_RANGE_SECS, DEFAULT_BASE_RETRY_DELAY_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_TIMEOUT_SECS, MAX_RETRIES_CEILING, TIMEOUT_RANGE_SECS,
};
use super::error::DownloadError;

/// Parameters for one logical download.
///
/// Field bounds are validated by [`DownloadRequest::validate`] before any
/// network attempt; violations surface as a failed outcome with a
/// configuration error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Absolute HTTP(S) URL of the file to fetch.
    pub url: String,

    /// Directory the final file is written into. Must already exist and be
    /// writable; creating it is the caller's concern.
    pub destination_dir: PathBuf,

    /// Custom filename. Derived from the URL when absent.
    #[serde(default)]
    pub filename: Option<String>,

    /// Retry attempts after the initial one, `0..=10`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff in seconds, `0.1..=60.0`.
    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay_secs: f64,

    /// Per-attempt network timeout in seconds, `5.0..=300.0`.
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_base_retry_delay() -> f64 {
    DEFAULT_BASE_RETRY_DELAY_SECS
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

impl DownloadRequest {
    /// Creates a request with default retry/timeout settings.
    #[must_use]
    pub fn new(url: impl Into<String>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination_dir: destination_dir.into(),
            filename: None,
            max_retries: DEFAULT_MAX_RETRIES,
            base_retry_delay_secs: DEFAULT_BASE_RETRY_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Checks all field bounds, returning the parsed URL on success.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Config`] for out-of-range numeric fields and
    /// [`DownloadError::InvalidUrl`] for anything that is not an absolute
    /// http/https URL.
    pub fn validate(&self) -> Result<Url, DownloadError> {
        if self.url.trim().is_empty() {
            return Err(DownloadError::config("url must not be empty"));
        }

        let parsed =
            Url::parse(&self.url).map_err(|_| DownloadError::invalid_url(self.url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(self.url.clone()));
        }

        if self.max_retries > MAX_RETRIES_CEILING {
            return Err(DownloadError::config(format!(
                "max_retries {} out of range 0..={MAX_RETRIES_CEILING}",
                self.max_retries
            )));
        }

        let (delay_min, delay_max) = BASE_RETRY_DELAY_RANGE_SECS;
        if !self.base_retry_delay_secs.is_finite()
            || self.base_retry_delay_secs < delay_min
            || self.base_retry_delay_secs > delay_max
        {
            return Err(DownloadError::config(format!(
                "base_retry_delay_secs {} out of range {delay_min}..={delay_max}",
                self.base_retry_delay_secs
            )));
        }

        let (timeout_min, timeout_max) = TIMEOUT_RANGE_SECS;
        if !self.timeout_secs.is_finite()
            || self.timeout_secs < timeout_min
            || self.timeout_secs > timeout_max
        {
            return Err(DownloadError::config(format!(
                "timeout_secs {} out of range {timeout_min}..={timeout_max}",
                self.timeout_secs
            )));
        }

        Ok(parsed)
    }
}

/// Final, immutable result of one download run.
///
/// Exactly one of (`success == true` with `local_path` present) or
/// (`success == false` with `error_message` present) holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Whether the file was downloaded, validated, and finalized.
    pub success: bool,

    /// Absolute path of the final file; present iff `success`.
    pub local_path: Option<PathBuf>,

    /// Size of the finalized file in bytes (0 on failure).
    pub file_size_bytes: u64,

    /// Total bytes on disk for the finalized file, including bytes carried
    /// over from earlier attempts on a resumed run (0 on failure).
    pub bytes_downloaded: u64,

    /// Attempts consumed, at most `max_retries + 1`. Zero when the request
    /// was rejected before any attempt.
    pub attempts_used: u32,

    /// Time spent in transfer attempts, in seconds.
    pub download_time_secs: f64,

    /// Wall-clock time of the whole run, in seconds.
    pub total_time_secs: f64,

    /// Average transfer speed; 0 when no bytes moved.
    pub average_speed_bytes_per_sec: f64,

    /// True iff a ranged attempt was honored with 206 during this run.
    pub resumed: bool,

    /// Human-readable failure summary; present iff not `success`.
    pub error_message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid_request() -> DownloadRequest {
        DownloadRequest::new("https://example.com/paper.pdf", "/tmp/downloads")
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let mut request = valid_request();
        request.url = "  ".to_string();
        assert!(matches!(
            request.validate(),
            Err(DownloadError::Config { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_relative_url() {
        let mut request = valid_request();
        request.url = "not-a-url".to_string();
        assert!(matches!(
            request.validate(),
            Err(DownloadError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let mut request = valid_request();
        request.url = "ftp://example.com/file.pdf".to_string();
        assert!(matches!(
            request.validate(),
            Err(DownloadError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_excessive_retries() {
        let mut request = valid_request();
        request.max_retries = 11;
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_delay() {
        for delay in [0.05, 61.0, f64::NAN] {
            let mut request = valid_request();
            request.base_retry_delay_secs = delay;
            assert!(
                request.validate().is_err(),
                "delay {delay} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range_timeout() {
        for timeout in [1.0, 4.9, 300.1] {
            let mut request = valid_request();
            request.timeout_secs = timeout;
            assert!(
                request.validate().is_err(),
                "timeout {timeout} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_boundary_values_accepted() {
        let mut request = valid_request();
        request.max_retries = 10;
        request.base_retry_delay_secs = 0.1;
        request.timeout_secs = 300.0;
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: DownloadRequest = serde_json::from_str(
            r#"{"url": "https://x.test/a.pdf", "destination_dir": "/tmp"}"#,
        )
        .unwrap();
        assert_eq!(request.max_retries, DEFAULT_MAX_RETRIES);
        assert!(request.filename.is_none());
        assert!((request.timeout_secs - DEFAULT_TIMEOUT_SECS).abs() < f64::EPSILON);
    }

    #[test]
    fn test_outcome_round_trips_through_json() {
        let outcome = DownloadOutcome {
            success: true,
            local_path: Some(PathBuf::from("/tmp/a.pdf")),
            file_size_bytes: 1024,
            bytes_downloaded: 1024,
            attempts_used: 2,
            download_time_secs: 1.5,
            total_time_secs: 3.0,
            average_speed_bytes_per_sec: 682.7,
            resumed: true,
            error_message: None,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: DownloadOutcome = serde_json::from_str(&json).unwrap();
        assert!(back.success);
        assert_eq!(back.attempts_used, 2);
        assert_eq!(back.local_path.as_deref(), Some(std::path::Path::new("/tmp/a.pdf")));
    }
}
