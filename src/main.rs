//! CLI entry point for the pdfetch tool.

use anyhow::Result;
use clap::Parser;
use pdfetch::{DownloadEngine, DownloadRequest, PdfValidator, StructuralCheck};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    info!(url = %args.url, "pdfetch starting");

    let mut request = DownloadRequest::new(args.url, args.dest);
    request.filename = args.filename;
    request.max_retries = args.max_retries;
    request.base_retry_delay_secs = args.retry_delay;
    request.timeout_secs = args.timeout;

    let structural = if args.soft_structure {
        StructuralCheck::Soft
    } else {
        StructuralCheck::Hard
    };
    let engine = DownloadEngine::new().with_validator(PdfValidator::new(structural));

    // Ctrl-C aborts the in-flight attempt and cleans up the partial file
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling download");
            signal_cancel.cancel();
        }
    });

    let outcome = engine.run_with_cancel(&request, cancel).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
