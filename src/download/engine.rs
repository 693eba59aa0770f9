//! Download engine driving one logical download through retries.
//!
//! This module provides the [`DownloadEngine`] which orchestrates a single
//! download end-to-end: it issues attempts, classifies failures, waits out
//! exponential backoff, negotiates range resumes, validates the completed
//! transfer, and finalizes the file atomically.
//!
//! # Overview
//!
//! One [`DownloadEngine::run`] invocation drives exactly one download. Runs
//! are independent: each owns its attempt state and part file, so an engine
//! may serve many concurrent runs for different requests. Within a run
//! execution is strictly sequential.
//!
//! # Example
//!
//! ```no_run
//! use pdfetch::download::{DownloadEngine, DownloadRequest};
//!
//! # async fn example() {
//! let engine = DownloadEngine::new();
//! let request = DownloadRequest::new("https://example.com/paper.pdf", "./downloads");
//! let outcome = engine.run(&request).await;
//! if outcome.success {
//!     println!("saved to {}", outcome.local_path.unwrap().display());
//! } else {
//!     eprintln!("{}", outcome.error_message.unwrap());
//! }
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::client::{HttpClient, TransferResult};
use super::constants::PART_SUFFIX;
use super::filename::resolve_filename;
use super::request::{DownloadOutcome, DownloadRequest};
use super::resume::{discard_part, negotiate_resume, ResumePlan};
use super::retry::{classify_error, parse_retry_after, FailureType, RetryDecision, RetryPolicy};
use super::validate::PdfValidator;
use super::DownloadError;
use crate::user_agent;

/// Engine for a single-file download with retry, resume, and validation.
///
/// The engine is cheap to clone and safe to share: it holds only the pooled
/// HTTP client, the validator configuration, and the identification
/// User-Agent. All mutable state lives inside each `run` call.
#[derive(Debug, Clone, Default)]
pub struct DownloadEngine {
    client: HttpClient,
    validator: PdfValidator,
    user_agent: Option<String>,
}

/// Mutable per-run attempt state, owned exclusively by one `run` call.
struct AttemptState {
    /// 1-indexed attempt counter; ceiling is `max_retries + 1`.
    attempt: u32,
    /// True once any ranged attempt was honored with 206.
    resumed: bool,
    /// Accumulated time spent inside transfer attempts.
    download_time: Duration,
    /// Index into the fallback User-Agent rotation; 0 means the default.
    ua_rotation: usize,
    /// Last classified failure, used by resume negotiation.
    last_failure: Option<FailureType>,
    /// Last raw error, used for the terminal failure message.
    last_error: Option<DownloadError>,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            attempt: 0,
            resumed: false,
            download_time: Duration::ZERO,
            ua_rotation: 0,
            last_failure: None,
            last_error: None,
        }
    }
}

impl DownloadEngine {
    /// Creates an engine with default client, validator, and User-Agent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the PDF validator (e.g. to soften the structural check).
    #[must_use]
    pub fn with_validator(mut self, validator: PdfValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Overrides the identification User-Agent sent on first attempts.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Runs one logical download to completion.
    ///
    /// Never returns an error: all failure modes surface in the outcome's
    /// `error_message`.
    pub async fn run(&self, request: &DownloadRequest) -> DownloadOutcome {
        self.run_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Runs one logical download, abortable through `cancel`.
    ///
    /// Cancellation aborts an in-flight attempt, skips any pending backoff,
    /// removes the part file, and returns a failure outcome.
    #[instrument(skip(self, request, cancel), fields(url = %request.url))]
    pub async fn run_with_cancel(
        &self,
        request: &DownloadRequest,
        cancel: CancellationToken,
    ) -> DownloadOutcome {
        let run_start = Instant::now();

        let parsed_url = match request.validate() {
            Ok(url) => url,
            Err(error) => {
                warn!(%error, "request rejected before any attempt");
                return failure_outcome(0, false, Duration::ZERO, run_start, error.to_string());
            }
        };

        let filename = resolve_filename(&parsed_url, request.filename.as_deref());
        let final_path = request.destination_dir.join(&filename);
        let part_path = part_path_for(&final_path);
        debug!(path = %final_path.display(), "resolved destination");

        // Partial files never outlive a run; anything left over from an
        // earlier process is untrusted.
        discard_part(&part_path).await;

        let policy = RetryPolicy::new(
            request.max_retries + 1,
            Duration::from_secs_f64(request.base_retry_delay_secs),
        );
        let timeout = Duration::from_secs_f64(request.timeout_secs);
        let mut state = AttemptState::new();

        loop {
            state.attempt += 1;
            let ua = self.user_agent_for(state.ua_rotation);
            debug!(attempt = state.attempt, "attempting download");

            // The HEAD capability probe can take up to the attempt timeout,
            // so it observes cancellation the same way the transfer does.
            let plan = tokio::select! {
                plan = self.plan_for_attempt(&request.url, &part_path, &ua, timeout, &state) => plan,
                () = cancel.cancelled() => {
                    info!(attempt = state.attempt, "download cancelled during resume negotiation");
                    discard_part(&part_path).await;
                    return failure_outcome(
                        state.attempt,
                        state.resumed,
                        state.download_time,
                        run_start,
                        format!("cancelled during attempt {}", state.attempt),
                    );
                }
            };
            let offset = match plan {
                ResumePlan::Resume { offset } => {
                    info!(offset, "resuming from partial file");
                    offset
                }
                ResumePlan::Fresh => 0,
            };

            let attempt_start = Instant::now();
            let transfer = tokio::select! {
                result = self.attempt_transfer(&request.url, &part_path, offset, &ua, timeout) => result,
                () = cancel.cancelled() => {
                    info!(attempt = state.attempt, "download cancelled mid-attempt");
                    discard_part(&part_path).await;
                    return failure_outcome(
                        state.attempt,
                        state.resumed,
                        state.download_time,
                        run_start,
                        format!("cancelled during attempt {}", state.attempt),
                    );
                }
            };
            state.download_time += attempt_start.elapsed();

            match transfer {
                Ok((result, file_size)) => {
                    if result.resumed {
                        state.resumed = true;
                    }
                    match self.finalize(&part_path, &final_path).await {
                        Ok(()) => {
                            info!(
                                path = %final_path.display(),
                                bytes = file_size,
                                attempts = state.attempt,
                                resumed = state.resumed,
                                "download complete"
                            );
                            return success_outcome(
                                final_path,
                                file_size,
                                result.total_bytes,
                                &state,
                                run_start,
                            );
                        }
                        Err(error) => {
                            // Rename failures are local filesystem problems;
                            // treat like any other attempt failure below.
                            state.last_failure = Some(classify_error(&error));
                            state.last_error = Some(error);
                        }
                    }
                }
                Err(error) => {
                    warn!(attempt = state.attempt, %error, "attempt failed");
                    let failure = classify_error(&error);
                    if failure == FailureType::Corrupted {
                        // Suspect bytes must never be offered for resume.
                        discard_part(&part_path).await;
                    }
                    state.last_failure = Some(failure);
                    state.last_error = Some(error);
                }
            }

            let failure = state.last_failure.unwrap_or(FailureType::Transient);
            // Retry-After pertains to rate limiting only; validation failures
            // always use computed backoff.
            let server_delay = if failure == FailureType::RateLimited {
                server_suggested_delay(state.last_error.as_ref())
            } else {
                None
            };

            match policy.should_retry(failure, state.attempt, server_delay) {
                RetryDecision::Retry { delay, attempt } => {
                    info!(
                        next_attempt = attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = server_delay.is_some(),
                        "retrying download"
                    );

                    // Connection-level failures sometimes clear up under a
                    // different User-Agent; rotate through the fallbacks.
                    if matches!(
                        state.last_error,
                        Some(DownloadError::Network { .. } | DownloadError::Timeout { .. })
                    ) {
                        state.ua_rotation += 1;
                    }

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = cancel.cancelled() => {
                            info!("download cancelled during backoff");
                            discard_part(&part_path).await;
                            return failure_outcome(
                                state.attempt,
                                state.resumed,
                                state.download_time,
                                run_start,
                                format!("cancelled after attempt {}", state.attempt),
                            );
                        }
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, "not retrying download");
                    discard_part(&part_path).await;
                    let message = terminal_failure_message(state.attempt, state.last_error.as_ref());
                    return failure_outcome(
                        state.attempt,
                        state.resumed,
                        state.download_time,
                        run_start,
                        message,
                    );
                }
            }
        }
    }

    /// Decides fresh-vs-resume for the upcoming attempt.
    ///
    /// Resume is only negotiated after transient or rate-limit failures; the
    /// first attempt and retries after validation failures start fresh.
    async fn plan_for_attempt(
        &self,
        url: &str,
        part_path: &Path,
        user_agent: &str,
        timeout: Duration,
        state: &AttemptState,
    ) -> ResumePlan {
        match state.last_failure {
            Some(prior @ (FailureType::Transient | FailureType::RateLimited)) => {
                negotiate_resume(&self.client, url, part_path, user_agent, timeout, prior).await
            }
            Some(_) => {
                discard_part(part_path).await;
                ResumePlan::Fresh
            }
            None => ResumePlan::Fresh,
        }
    }

    /// Performs the network transfer and the post-transfer validation.
    ///
    /// Returns the transfer result together with the validated file size.
    async fn attempt_transfer(
        &self,
        url: &str,
        part_path: &Path,
        offset: u64,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<(TransferResult, u64), DownloadError> {
        let result = self
            .client
            .fetch_to_part(url, part_path, offset, user_agent, timeout)
            .await?;

        let file_size = self
            .validator
            .validate(part_path, result.content_length)
            .await?;

        Ok((result, file_size))
    }

    /// Promotes the validated part file to its final name.
    async fn finalize(&self, part_path: &Path, final_path: &Path) -> Result<(), DownloadError> {
        tokio::fs::rename(part_path, final_path)
            .await
            .map_err(|e| DownloadError::io(final_path, e))
    }

    /// Picks the User-Agent for an attempt: the identification header first,
    /// then the fixed fallback rotation after blocking-type failures.
    fn user_agent_for(&self, rotation: usize) -> String {
        if rotation == 0 {
            self.user_agent
                .clone()
                .unwrap_or_else(user_agent::default_user_agent)
        } else {
            user_agent::fallback_user_agent(rotation - 1).to_string()
        }
    }
}

/// Extracts a parsed Retry-After duration from the last error, if any.
fn server_suggested_delay(error: Option<&DownloadError>) -> Option<Duration> {
    match error {
        Some(DownloadError::HttpStatus {
            retry_after: Some(header),
            ..
        }) => parse_retry_after(header),
        _ => None,
    }
}

/// Builds the in-progress path for a final destination path.
fn part_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(".");
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Summarizes a terminal failure for the outcome, never a raw backtrace.
fn terminal_failure_message(attempts: u32, last_error: Option<&DownloadError>) -> String {
    let noun = if attempts == 1 { "attempt" } else { "attempts" };
    match last_error {
        Some(error) => format!("failed after {attempts} {noun}: {error}"),
        None => format!("failed after {attempts} {noun}"),
    }
}

fn success_outcome(
    final_path: PathBuf,
    file_size: u64,
    bytes_downloaded: u64,
    state: &AttemptState,
    run_start: Instant,
) -> DownloadOutcome {
    let download_time = state.download_time.as_secs_f64();
    let average_speed = if download_time > 0.0 && bytes_downloaded > 0 {
        bytes_downloaded as f64 / download_time
    } else {
        0.0
    };
    DownloadOutcome {
        success: true,
        local_path: Some(final_path),
        file_size_bytes: file_size,
        bytes_downloaded,
        attempts_used: state.attempt,
        download_time_secs: download_time,
        total_time_secs: run_start.elapsed().as_secs_f64(),
        average_speed_bytes_per_sec: average_speed,
        resumed: state.resumed,
        error_message: None,
    }
}

fn failure_outcome(
    attempts: u32,
    resumed: bool,
    download_time: Duration,
    run_start: Instant,
    message: String,
) -> DownloadOutcome {
    DownloadOutcome {
        success: false,
        local_path: None,
        file_size_bytes: 0,
        bytes_downloaded: 0,
        attempts_used: attempts,
        download_time_secs: download_time.as_secs_f64(),
        total_time_secs: run_start.elapsed().as_secs_f64(),
        average_speed_bytes_per_sec: 0.0,
        resumed,
        error_message: Some(message),
    }
}
