//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use pdfetch::download::constants::{
    DEFAULT_BASE_RETRY_DELAY_SECS, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS,
};

/// Download a single PDF with retries, resume, and validation.
///
/// pdfetch fetches one document over HTTP(S), retries transient failures with
/// exponential backoff, resumes interrupted transfers when the server supports
/// byte ranges, and validates the result is a structurally plausible PDF
/// before keeping it. The outcome is printed as JSON on stdout.
#[derive(Parser, Debug)]
#[command(name = "pdfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URL of the PDF to download
    pub url: String,

    /// Directory to save the file into
    #[arg(short = 'd', long, default_value = ".")]
    pub dest: PathBuf,

    /// Filename to save as (derived from the URL when omitted)
    #[arg(short = 'f', long)]
    pub filename: Option<String>,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: u32,

    /// Base delay between retries in seconds (0.1-60)
    #[arg(long, default_value_t = DEFAULT_BASE_RETRY_DELAY_SECS)]
    pub retry_delay: f64,

    /// Per-attempt network timeout in seconds (5-300)
    #[arg(short = 't', long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: f64,

    /// Accept PDFs that are missing trailer structure (warn instead of reject)
    #[arg(long)]
    pub soft_structure: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
