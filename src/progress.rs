//! Progress-callback trait for scan events.
//!
//! Inject an [`Arc<dyn ScanProgressCallback>`] via
//! [`crate::config::ScanConfigBuilder::progress_callback`] to receive events
//! as the pipeline works through chunks and diagrams.
//!
//! Status milestones are typed ([`ScanStatus`]), but their `Display` output
//! keeps the keywords existing step-tracker screens match on: `optimizing`,
//! `cooling down`, `reading`, `formatting`, `cropping diagram N`.
//!
//! # Example
//!
//! ```rust
//! use edgequake_exam_scan::{ScanConfig, ScanProgressCallback, ScanStatus};
//! use std::sync::Arc;
//!
//! struct PrintStatus;
//!
//! impl ScanProgressCallback for PrintStatus {
//!     fn on_status(&self, status: &ScanStatus) {
//!         eprintln!("{status}");
//!     }
//! }
//!
//! let config = ScanConfig::builder()
//!     .progress_callback(Arc::new(PrintStatus))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// A pipeline milestone.
///
/// Page numbers are 1-indexed and inclusive; chunk numbers are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    /// Resizing and compressing the pages of a chunk.
    Optimizing {
        chunk: usize,
        total_chunks: usize,
        first_page: usize,
        last_page: usize,
    },
    /// Waiting out the inter-chunk delay.
    CoolingDown {
        chunk: usize,
        total_chunks: usize,
        delay_ms: u64,
    },
    /// Waiting for the model to read a chunk.
    Reading {
        chunk: usize,
        total_chunks: usize,
        first_page: usize,
        last_page: usize,
    },
    /// All chunks done; assembling the result.
    Formatting,
    /// Cropping the `index`-th flagged diagram.
    CroppingDiagram { index: usize, total: usize },
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Optimizing {
                chunk,
                total_chunks,
                first_page,
                last_page,
            } => write!(
                f,
                "optimizing pages {first_page}-{last_page} (batch {chunk}/{total_chunks})…"
            ),
            ScanStatus::CoolingDown {
                chunk,
                total_chunks,
                delay_ms,
            } => write!(
                f,
                "cooling down {:.1}s before batch {chunk}/{total_chunks}…",
                *delay_ms as f64 / 1000.0
            ),
            ScanStatus::Reading {
                chunk,
                total_chunks,
                first_page,
                last_page,
            } => write!(
                f,
                "reading pages {first_page}-{last_page} (batch {chunk}/{total_chunks})…"
            ),
            ScanStatus::Formatting => write!(f, "formatting questions…"),
            ScanStatus::CroppingDiagram { index, total } => {
                write!(f, "cropping diagram {index} of {total}…")
            }
        }
    }
}

/// Called by the pipeline as it processes a scan.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Callbacks run inline with the pipeline: keep them
/// cheap and never block in them.
pub trait ScanProgressCallback: Send + Sync {
    /// Called once before the first chunk.
    fn on_scan_start(&self, total_pages: usize, total_chunks: usize) {
        let _ = (total_pages, total_chunks);
    }

    /// Called at every milestone.
    fn on_status(&self, status: &ScanStatus) {
        let _ = status;
    }

    /// Called when a chunk was transcribed successfully.
    ///
    /// * `chunk` — 1-indexed chunk number
    /// * `question_count` — questions read from the chunk
    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, question_count: usize) {
        let _ = (chunk, total_chunks, question_count);
    }

    /// Called when a chunk failed and was replaced by a placeholder.
    fn on_chunk_error(&self, chunk: usize, total_chunks: usize, error: &str) {
        let _ = (chunk, total_chunks, error);
    }

    /// Called once after transcription and cropping have finished.
    fn on_scan_complete(&self, total_chunks: usize, failed_chunks: usize) {
        let _ = (total_chunks, failed_chunks);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ScanProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ScanConfig`].
pub type ProgressCallback = Arc<dyn ScanProgressCallback>;
