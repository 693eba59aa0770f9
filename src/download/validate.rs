//! Post-transfer validation of downloaded PDF files.
//!
//! A completed transfer is checked before the part file is promoted to its
//! final name: the byte count must match the declared Content-Length, the
//! leading bytes must carry the `%PDF-` signature, and the trailing bytes
//! should contain a recognizable trailer. The trailer check is advisory and
//! can be softened to a warning; the size and signature checks always reject.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, instrument, warn};

use super::constants::{MIN_PDF_SIZE, VALIDATION_CHUNK_SIZE};
use super::error::{DownloadError, ValidationFailure};

/// PDF magic bytes; the version digits after the dash vary.
const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// End-of-file marker a well-formed PDF ends with.
const PDF_EOF_MARKER: &[u8] = b"%%EOF";

/// Trailer keywords accepted when the EOF marker is absent.
const PDF_TRAILER_MARKERS: [&[u8]; 3] = [b"trailer", b"startxref", b"xref"];

/// How strictly the trailer/structure check is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructuralCheck {
    /// Missing trailer rejects the transfer (default).
    #[default]
    Hard,
    /// Missing trailer only logs a warning.
    Soft,
}

/// Validates downloaded PDF files before they are finalized.
///
/// Checks, in order:
/// 1. Size: non-empty, at least [`MIN_PDF_SIZE`] bytes, and equal to the
///    declared Content-Length when one was sent.
/// 2. Signature: `%PDF-` within the first KiB (some generators prepend junk).
/// 3. Trailer: `%%EOF` or trailer keywords within the last KiB, enforced
///    per [`StructuralCheck`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfValidator {
    structural: StructuralCheck,
}

impl PdfValidator {
    /// Creates a validator with the given trailer strictness.
    #[must_use]
    pub fn new(structural: StructuralCheck) -> Self {
        Self { structural }
    }

    /// Validates the file at `path`, returning its size in bytes.
    ///
    /// Runs exactly once per completed attempt, after all bytes are written
    /// and before the file is finalized.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Validation`] describing the first failed
    /// check, or [`DownloadError::Io`] if the file cannot be read.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn validate(
        &self,
        path: &Path,
        expected_len: Option<u64>,
    ) -> Result<u64, DownloadError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        let file_size = metadata.len();

        if file_size == 0 {
            return Err(DownloadError::validation(path, ValidationFailure::Empty));
        }

        if let Some(expected) = expected_len {
            if expected != file_size {
                return Err(DownloadError::validation(
                    path,
                    ValidationFailure::SizeMismatch {
                        expected,
                        actual: file_size,
                    },
                ));
            }
        }

        if file_size < MIN_PDF_SIZE {
            return Err(DownloadError::validation(
                path,
                ValidationFailure::TooSmall { size: file_size },
            ));
        }

        let header = read_chunk(path, 0, VALIDATION_CHUNK_SIZE).await?;
        if !header_has_signature(&header) {
            return Err(DownloadError::validation(
                path,
                ValidationFailure::MissingSignature,
            ));
        }

        let footer_offset = file_size.saturating_sub(VALIDATION_CHUNK_SIZE as u64);
        let footer = read_chunk(path, footer_offset, VALIDATION_CHUNK_SIZE).await?;
        match footer_trailer_state(&footer) {
            TrailerState::Eof => {}
            TrailerState::KeywordsOnly => {
                warn!("PDF has trailer structure but no %%EOF marker");
            }
            TrailerState::Missing => match self.structural {
                StructuralCheck::Hard => {
                    return Err(DownloadError::validation(
                        path,
                        ValidationFailure::MissingTrailer,
                    ));
                }
                StructuralCheck::Soft => {
                    warn!("no PDF trailer found, accepting anyway (soft structural check)");
                }
            },
        }

        debug!(bytes = file_size, "PDF validation passed");
        Ok(file_size)
    }
}

/// What the trailing bytes of the file revealed.
enum TrailerState {
    Eof,
    KeywordsOnly,
    Missing,
}

/// Checks for the PDF signature, at the start or anywhere in the first chunk
/// (some servers prepend whitespace or comment bytes).
fn header_has_signature(header: &[u8]) -> bool {
    if header.starts_with(PDF_SIGNATURE) {
        return true;
    }
    if contains_subslice(header, PDF_SIGNATURE) {
        warn!("PDF signature found but not at file start");
        return true;
    }
    false
}

fn footer_trailer_state(footer: &[u8]) -> TrailerState {
    if contains_subslice(footer, PDF_EOF_MARKER) {
        return TrailerState::Eof;
    }
    if PDF_TRAILER_MARKERS
        .iter()
        .any(|marker| contains_subslice(footer, marker))
    {
        return TrailerState::KeywordsOnly;
    }
    TrailerState::Missing
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Reads up to `len` bytes starting at `offset`.
async fn read_chunk(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>, DownloadError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    let mut buffer = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let read = file
            .read(&mut buffer[filled..])
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    buffer.truncate(filled);
    Ok(buffer)
}
