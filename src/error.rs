//! Error types for the edgequake-exam-scan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExamScanError`] — **Fatal**: the scan cannot start at all (image file
//!   missing, no pages, invalid configuration, unknown provider). Returned as
//!   `Err(ExamScanError)` from the top-level `scan*` functions.
//!
//! * [`PipelineError`] — **Non-fatal**: one page, chunk, or diagram failed
//!   but the run goes on. A failed chunk becomes a placeholder section asking
//!   the user to rescan that range; a failed crop leaves its question in the
//!   "needs crop" state. The error is kept on [`crate::output::ChunkResult`]
//!   so callers can report it.
//!
//! Each `PipelineError` variant has a fixed scope:
//!
//! | Variant | Scope | Becomes |
//! |---------|-------|---------|
//! | `ImageProcessing` | one page | failure of the containing chunk |
//! | `TranscriptionRequest` | one chunk | placeholder section |
//! | `TranscriptionParse` | one chunk | placeholder section |
//! | `DiagramCrop` | one question | diagram left unresolved |

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-exam-scan library.
#[derive(Debug, Error)]
pub enum ExamScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Image file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// The scan was started with an empty page list.
    #[error("No pages to scan.\nCapture or import at least one page first.")]
    NoPages,

    /// A session operation referred to a page that does not exist.
    #[error("Page {page} is out of range (session has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// An explicitly named provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error scoped to a single page, chunk, or question.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PipelineError {
    /// The page image could not be decoded, resized, or re-encoded.
    #[error("Image processing failed for '{path}': {detail}")]
    ImageProcessing { path: PathBuf, detail: String },

    /// The call to the transcription endpoint failed (network, HTTP status,
    /// missing or rejected API key, timeout).
    #[error("Transcription request failed: {detail}")]
    TranscriptionRequest { detail: String },

    /// The response could not be parsed, even after rescue attempts.
    #[error("Transcription response could not be parsed: {detail}")]
    TranscriptionParse { detail: String },

    /// Cropping or persisting a diagram failed.
    #[error("Diagram crop failed: {detail}")]
    DiagramCrop { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_out_of_range_display() {
        let e = ExamScanError::PageOutOfRange { page: 7, total: 4 };
        let msg = e.to_string();
        assert!(msg.contains("Page 7"), "got: {msg}");
        assert!(msg.contains("4 pages"), "got: {msg}");
    }

    #[test]
    fn provider_not_configured_display() {
        let e = ExamScanError::ProviderNotConfigured {
            provider: "mistral".into(),
            hint: "unknown provider".into(),
        };
        assert!(e.to_string().contains("mistral"));
        assert!(e.to_string().contains("unknown provider"));
    }

    #[test]
    fn image_processing_display_names_file() {
        let e = PipelineError::ImageProcessing {
            path: PathBuf::from("/tmp/page1.jpg"),
            detail: "unsupported format".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page1.jpg"), "got: {msg}");
        assert!(msg.contains("unsupported format"), "got: {msg}");
    }

    #[test]
    fn pipeline_error_serialises() {
        let e = PipelineError::TranscriptionParse {
            detail: "EOF while parsing".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        assert!(json.contains("TranscriptionParse"));
        let back: PipelineError = serde_json::from_str(&json).expect("deserialise");
        assert!(matches!(back, PipelineError::TranscriptionParse { .. }));
    }
}
