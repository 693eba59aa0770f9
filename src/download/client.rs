//! HTTP client wrapper for streaming downloads.
//!
//! This module provides the `HttpClient` struct which performs a single
//! network attempt: a GET (optionally ranged) streamed into the part file,
//! plus the HEAD capability probe used by resume negotiation.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_RANGES, CONTENT_LENGTH, RANGE, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};

use super::constants::CONNECT_TIMEOUT_SECS;
use super::error::DownloadError;

/// Accept header sent with every request.
const ACCEPT_VALUE: &str = "application/pdf,application/octet-stream,*/*";

/// HTTP client for single-attempt streaming transfers.
///
/// Designed to be created once per engine and reused across attempts and
/// runs, taking advantage of connection pooling. Per-attempt read deadlines
/// are supplied by the caller; only the connect timeout is fixed here.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Result of one completed network attempt.
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// Bytes streamed over the network during this attempt.
    pub bytes_this_attempt: u64,
    /// Total bytes on disk in the part file after this attempt.
    pub total_bytes: u64,
    /// Expected total size, when the server declared one.
    pub content_length: Option<u64>,
    /// Whether the server honored a ranged request with 206 Partial Content.
    pub resumed: bool,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with the default connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Performs one GET attempt, streaming the body into `part_path`.
    ///
    /// When `resume_offset` is non-zero a `Range: bytes=<offset>-` header is
    /// sent. If the server answers 206 the body is appended to the part file;
    /// if it answers 200 the resume was not honored and the part file is
    /// truncated before streaming, so the returned bytes are never assumed to
    /// be a continuation.
    ///
    /// The part file is left in place on stream errors so the caller can
    /// negotiate a resume on the next attempt.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the request fails (network error, timeout),
    /// the server returns an error status, or writing to disk fails.
    #[must_use = "transfer result carries byte counts needed for validation"]
    #[instrument(skip(self, part_path), fields(url = %url, resume_offset))]
    pub async fn fetch_to_part(
        &self,
        url: &str,
        part_path: &Path,
        resume_offset: u64,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<TransferResult, DownloadError> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, ACCEPT_VALUE)
            .timeout(timeout);
        if resume_offset > 0 {
            request = request.header(RANGE, format!("bytes={resume_offset}-"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let honored = resume_offset > 0 && status == StatusCode::PARTIAL_CONTENT;
        if resume_offset > 0 && !honored {
            warn!(
                offset = resume_offset,
                "server ignored range request, restarting from scratch"
            );
        }

        // Append only when the server actually sent partial content;
        // a 200 answer always truncates.
        let mut file = if honored {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(part_path)
                .await
                .map_err(|e| DownloadError::io(part_path, e))?
        } else {
            File::create(part_path)
                .await
                .map_err(|e| DownloadError::io(part_path, e))?
        };

        let content_length = declared_total_length(&response, if honored { resume_offset } else { 0 });

        let bytes_this_attempt = stream_to_file(&mut file, response, url, part_path).await?;

        let total_bytes = if honored {
            resume_offset.saturating_add(bytes_this_attempt)
        } else {
            bytes_this_attempt
        };

        debug!(
            bytes = bytes_this_attempt,
            total = total_bytes,
            resumed = honored,
            "attempt transfer complete"
        );

        Ok(TransferResult {
            bytes_this_attempt,
            total_bytes,
            content_length,
            resumed: honored,
        })
    }

    /// Issues a HEAD capability probe to check byte-range support.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the probe request itself fails or the
    /// server answers with an error status; the caller treats any error as
    /// "ranges unsupported".
    #[instrument(skip(self), fields(url = %url))]
    pub async fn supports_byte_ranges(
        &self,
        url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<bool, DownloadError> {
        let response = self
            .client
            .head(url)
            .header(USER_AGENT, user_agent)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(url)
                } else {
                    DownloadError::network(url, e)
                }
            })?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        let supported = response
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
        Ok(supported)
    }
}

/// Derives the expected total file size from response headers.
///
/// For a 206 answer the Content-Length covers only the remainder, so the
/// resume offset is added back. Responses with Content-Encoding applied
/// carry no usable length and yield `None`.
fn declared_total_length(response: &reqwest::Response, existing_bytes: u64) -> Option<u64> {
    // reqwest strips Content-Length when it will decompress the body; going
    // through the raw header keeps behavior explicit.
    if response.headers().get(reqwest::header::CONTENT_ENCODING).is_some() {
        return None;
    }
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|len| len.saturating_add(existing_bytes))
}

/// Streams the response body to the file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
    }

    // Ensure all data is flushed to disk before validation reads it back
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path.to_path_buf(), e))?;

    Ok(bytes_written)
}
