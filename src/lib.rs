//! # edgequake-exam-scan
//!
//! Turn photographed, handwritten exam pages into structured question
//! papers using a vision-capable model.
//!
//! ## Why this crate?
//!
//! OCR engines read characters; they do not know that "1(a)" is a question
//! label, that "[4]" is a mark allocation, that "Answer any three" is an
//! instruction, or where a hand-drawn diagram starts and ends. A vision model
//! can do all of that in one pass. This crate feeds it pages in small,
//! rate-limited chunks, repairs its output when it is cut off, maps every
//! question back to its source page, and crops the diagrams out of the
//! full-resolution photos.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ScanSession (ordered page photos)
//!  │
//!  ├─ 1. Prepare    resize to ≤800 px, JPEG q70 (CPU-bound, spawn_blocking)
//!  ├─ 2. Schedule   chunks of 3, strictly sequential, 2.5 s apart
//!  ├─ 3. Request    prompt + images + response schema
//!  ├─ 4. Transcribe Gemini generateContent, or any edgequake-llm provider
//!  ├─ 5. Rescue     close truncated JSON with a fixed suffix list
//!  ├─ 6. Reindex    chunk-local page_index → absolute page, fresh ids
//!  └─ 7. Crop       padded boxes cut from the originals, stored as PNG
//! ```
//!
//! A failed chunk never aborts the run: it becomes a "Pages a-b (Scan
//! Failed)" section asking the user to rescan those pages.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_exam_scan::{scan_images, ScanConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from GEMINI_API_KEY / GOOGLE_API_KEY
//!     let config = ScanConfig::default();
//!     let output = scan_images(&["page1.jpg", "page2.jpg"], &config).await?;
//!     for q in output.questions() {
//!         println!("{} {} {}", q.number, q.text, q.marks);
//!     }
//!     for (first, last) in output.failed_ranges() {
//!         eprintln!("rescan pages {first}-{last}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `exam-scan` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-exam-scan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod scan;
pub mod session;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{ExamScanError, PipelineError};
pub use output::{
    BoundingBox, ChunkResult, DiagramRef, LayoutHint, QuestionType, ScanOutput, ScanStats,
    TranscribedQuestion, TranscribedSection,
};
pub use pipeline::client::{GeminiClient, ProviderClient, TranscriptionClient};
pub use pipeline::crop::{BlobStore, FsBlobStore};
pub use pipeline::prepare::{ImageCodec, ImageCrateCodec, PreparedImage};
pub use pipeline::reindex::{IdGenerator, UuidIdGenerator};
pub use pipeline::schedule::{ScanDeps, Sleeper, TokioSleeper};
pub use progress::{NoopProgressCallback, ProgressCallback, ScanProgressCallback, ScanStatus};
pub use scan::{resolve_deps, scan, scan_images, scan_sync, scan_to_file, scan_with};
pub use session::{Page, Rotation, ScanSession};
pub use stream::{scan_stream, scan_stream_with, ChunkStream};
