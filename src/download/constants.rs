//! Constants for the download module (timeouts, retry bounds, validation).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default maximum retry attempts after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay between retries (5 seconds).
pub const DEFAULT_BASE_RETRY_DELAY_SECS: f64 = 5.0;

/// Default per-attempt network timeout (30 seconds).
pub const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

/// Upper bound on `max_retries` accepted in a request.
pub const MAX_RETRIES_CEILING: u32 = 10;

/// Accepted range for the base retry delay, in seconds.
pub const BASE_RETRY_DELAY_RANGE_SECS: (f64, f64) = (0.1, 60.0);

/// Accepted range for the per-attempt timeout, in seconds.
pub const TIMEOUT_RANGE_SECS: (f64, f64) = (5.0, 300.0);

/// Hard ceiling on any computed or server-suggested retry delay (2 minutes).
pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Fraction of the computed delay added as random jitter (anti-thundering-herd).
pub const JITTER_FRACTION: f64 = 0.1;

/// Suffix appended to the final filename while a download is in progress.
pub const PART_SUFFIX: &str = "part";

/// Smallest byte count a real PDF can plausibly have.
pub const MIN_PDF_SIZE: u64 = 100;

/// How many leading/trailing bytes are inspected during validation.
pub const VALIDATION_CHUNK_SIZE: usize = 1024;
