//! Resume-vs-restart negotiation between retry attempts.
//!
//! Before each retry the engine asks this module whether the next attempt may
//! continue from the bytes already in the part file. Resumability is
//! best-effort and revalidated every time; nothing persists beyond the run.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::client::HttpClient;
use super::retry::FailureType;

/// How the next attempt should open the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResumePlan {
    /// Start over from byte zero.
    Fresh,
    /// Request `Range: bytes=<offset>-` and append on 206.
    Resume {
        /// Byte offset to continue from (current part file length).
        offset: u64,
    },
}

/// Decides whether the next attempt resumes from the part file.
///
/// Restart conditions, checked in order:
/// 1. The prior failure was a validation failure: the bytes are suspect and
///    the part file is discarded outright.
/// 2. No partial file, or it is empty.
/// 3. The HEAD capability probe fails or the server does not advertise
///    `Accept-Ranges: bytes`: the part file is discarded.
///
/// Otherwise the next attempt resumes from the part file's current length.
#[instrument(skip(client, part_path), fields(url = %url, part = %part_path.display()))]
pub(crate) async fn negotiate_resume(
    client: &HttpClient,
    url: &str,
    part_path: &Path,
    user_agent: &str,
    timeout: Duration,
    prior_failure: FailureType,
) -> ResumePlan {
    if prior_failure == FailureType::Corrupted {
        debug!("prior attempt failed validation, discarding suspect bytes");
        discard_part(part_path).await;
        return ResumePlan::Fresh;
    }

    let existing_bytes = tokio::fs::metadata(part_path)
        .await
        .map(|meta| meta.len())
        .unwrap_or(0);
    if existing_bytes == 0 {
        return ResumePlan::Fresh;
    }

    match client.supports_byte_ranges(url, user_agent, timeout).await {
        Ok(true) => {
            debug!(offset = existing_bytes, "server supports ranges, resuming");
            ResumePlan::Resume {
                offset: existing_bytes,
            }
        }
        Ok(false) => {
            debug!("server does not advertise byte ranges, restarting");
            discard_part(part_path).await;
            ResumePlan::Fresh
        }
        Err(error) => {
            warn!(%error, "resume capability probe failed, restarting");
            discard_part(part_path).await;
            ResumePlan::Fresh
        }
    }
}

/// Best-effort removal of the part file.
pub(crate) async fn discard_part(part_path: &Path) {
    match tokio::fs::remove_file(part_path).await {
        Ok(()) => debug!(part = %part_path.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(part = %part_path.display(), error = %e, "failed to remove partial file"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_UA: &str = "pdfetch-test/0.0";
    const TIMEOUT: Duration = Duration::from_secs(10);

    async fn mock_head(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("HEAD"))
            .and(path("/doc.pdf"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_negotiate_resumes_at_part_length() {
        let server = MockServer::start().await;
        mock_head(
            &server,
            ResponseTemplate::new(200).insert_header("Accept-Ranges", "bytes"),
        )
        .await;

        let dir = TempDir::new().unwrap();
        let part = dir.path().join("doc.pdf.part");
        std::fs::write(&part, vec![0u8; 1234]).unwrap();

        let plan = negotiate_resume(
            &HttpClient::new(),
            &format!("{}/doc.pdf", server.uri()),
            &part,
            TEST_UA,
            TIMEOUT,
            FailureType::Transient,
        )
        .await;

        assert_eq!(plan, ResumePlan::Resume { offset: 1234 });
        assert!(part.exists());
    }

    #[tokio::test]
    async fn test_negotiate_fresh_when_no_part_file() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("doc.pdf.part");

        let plan = negotiate_resume(
            &HttpClient::new(),
            &format!("{}/doc.pdf", server.uri()),
            &part,
            TEST_UA,
            TIMEOUT,
            FailureType::Transient,
        )
        .await;

        assert_eq!(plan, ResumePlan::Fresh);
    }

    #[tokio::test]
    async fn test_negotiate_discards_part_when_ranges_unsupported() {
        let server = MockServer::start().await;
        mock_head(&server, ResponseTemplate::new(200)).await;

        let dir = TempDir::new().unwrap();
        let part = dir.path().join("doc.pdf.part");
        std::fs::write(&part, b"partial").unwrap();

        let plan = negotiate_resume(
            &HttpClient::new(),
            &format!("{}/doc.pdf", server.uri()),
            &part,
            TEST_UA,
            TIMEOUT,
            FailureType::Transient,
        )
        .await;

        assert_eq!(plan, ResumePlan::Fresh);
        assert!(!part.exists(), "unsupported ranges must discard the part file");
    }

    #[tokio::test]
    async fn test_negotiate_discards_part_when_probe_fails() {
        let server = MockServer::start().await;
        mock_head(&server, ResponseTemplate::new(500)).await;

        let dir = TempDir::new().unwrap();
        let part = dir.path().join("doc.pdf.part");
        std::fs::write(&part, b"partial").unwrap();

        let plan = negotiate_resume(
            &HttpClient::new(),
            &format!("{}/doc.pdf", server.uri()),
            &part,
            TEST_UA,
            TIMEOUT,
            FailureType::Transient,
        )
        .await;

        assert_eq!(plan, ResumePlan::Fresh);
        assert!(!part.exists());
    }

    #[tokio::test]
    async fn test_negotiate_never_resumes_after_validation_failure() {
        // Even with a range-capable server, corrupted bytes are not trusted.
        let server = MockServer::start().await;
        mock_head(
            &server,
            ResponseTemplate::new(200).insert_header("Accept-Ranges", "bytes"),
        )
        .await;

        let dir = TempDir::new().unwrap();
        let part = dir.path().join("doc.pdf.part");
        std::fs::write(&part, b"suspect bytes").unwrap();

        let plan = negotiate_resume(
            &HttpClient::new(),
            &format!("{}/doc.pdf", server.uri()),
            &part,
            TEST_UA,
            TIMEOUT,
            FailureType::Corrupted,
        )
        .await;

        assert_eq!(plan, ResumePlan::Fresh);
        assert!(!part.exists());
    }
}
