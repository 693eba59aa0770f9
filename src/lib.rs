//! pdfetch core library
//!
//! A resilient single-file PDF downloader: streaming HTTP transfers with
//! failure classification, exponential backoff, range resume of interrupted
//! transfers, and structural validation of the downloaded document.
//!
//! # Architecture
//!
//! - [`download`] - the download engine and its supporting pieces: HTTP
//!   client, retry policy, resume negotiation, PDF validation, and the
//!   request/outcome types.
//!
//! The typical entry point is [`DownloadEngine::run`], which drives one
//! logical download to a terminal outcome and never panics or errors out of
//! band; every failure mode is reported through [`DownloadOutcome`].

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
mod user_agent;

// Re-export commonly used types
pub use download::{
    DownloadEngine, DownloadError, DownloadOutcome, DownloadRequest, FailureType, HttpClient,
    PdfValidator, RetryDecision, RetryPolicy, StructuralCheck, ValidationFailure, classify_error,
    parse_retry_after,
};
