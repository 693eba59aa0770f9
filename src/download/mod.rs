//! HTTP download engine with retry, range resume, and PDF validation.
//!
//! This module provides everything needed to drive one logical download:
//! a streaming HTTP client, failure classification, exponential backoff with
//! jitter, resume negotiation over HTTP ranges, and post-transfer validation
//! of the downloaded PDF.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Exponential backoff with jitter, capped, honoring `Retry-After`
//! - Range resume of interrupted transfers via a `.part` file
//! - PDF signature and trailer validation before finalizing
//! - Cancellation with guaranteed partial-file cleanup
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
//! println!("success: {}, attempts: {}", outcome.success, outcome.attempts_used);
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
mod request;
mod resume;
mod retry;
mod validate;

pub use client::{HttpClient, TransferResult};
pub use engine::DownloadEngine;
pub use error::{DownloadError, ValidationFailure};
pub use request::{DownloadOutcome, DownloadRequest};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error, parse_retry_after};
pub use validate::{PdfValidator, StructuralCheck};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
