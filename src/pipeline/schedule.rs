//! Chunk scheduling: strictly sequential, paced transcription of all pages.
//!
//! Pages are split into chunks of at most `chunk_size` and processed one at a
//! time. Before every chunk except the first the scheduler sleeps for
//! `chunk_delay_ms` so the external endpoint's rate limit is never hit.
//!
//! ## Why never concurrent?
//!
//! Free-tier transcription keys allow only a handful of requests per minute.
//! Overlapping requests would trade one fast run for a burst of 429s; serial
//! chunks with a fixed pause finish reliably. For the same reason nothing is
//! retried: a failed chunk becomes a placeholder section telling the user
//! which pages to rescan, and the run moves on.

use crate::config::ScanConfig;
use crate::error::PipelineError;
use crate::output::{ChunkResult, LayoutHint, QuestionType, TranscribedQuestion, TranscribedSection};
use crate::pipeline::client::TranscriptionClient;
use crate::pipeline::crop::BlobStore;
use crate::pipeline::prepare::ImageCodec;
use crate::pipeline::reindex::{plan_chunks, reindex, ChunkSpan, IdGenerator};
use crate::pipeline::request::build_request;
use crate::pipeline::rescue::rescue_transcription;
use crate::progress::ScanStatus;
use crate::session::Page;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pauses between chunks.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// The external capabilities one scan run uses.
///
/// Built from a [`ScanConfig`] by [`crate::scan::resolve_deps`], or assembled
/// by hand to run the pipeline against fakes.
#[derive(Clone)]
pub struct ScanDeps {
    pub client: Arc<dyn TranscriptionClient>,
    pub codec: Arc<dyn ImageCodec>,
    pub store: Arc<dyn BlobStore>,
    pub sleeper: Arc<dyn Sleeper>,
    pub ids: Arc<dyn IdGenerator>,
}

/// Title of the placeholder section for a failed chunk.
pub fn failure_title(span: &ChunkSpan) -> String {
    let (first, last) = span.display_range();
    format!("Pages {first}-{last} (Scan Failed)")
}

/// The single placeholder section standing in for a failed chunk.
pub fn failure_section(span: &ChunkSpan, pages: &[Page], ids: &dyn IdGenerator) -> TranscribedSection {
    let (first, last) = span.display_range();
    let source_image = pages
        .get(span.start)
        .map(|p| p.source.clone())
        .unwrap_or_default();

    TranscribedSection {
        title: failure_title(span),
        layout: LayoutHint::OneColumn,
        questions: vec![TranscribedQuestion {
            id: ids.next_id(),
            number: String::new(),
            text: format!(
                "Pages {first}-{last} could not be read. Please rescan pages {first}-{last} individually."
            ),
            marks: String::new(),
            kind: QuestionType::Standard,
            options: Vec::new(),
            has_diagram: false,
            bbox: None,
            page_index: span.start,
            source_image,
            diagram: None,
        }],
    }
}

/// Process one chunk end to end, without diagram cropping.
///
/// Never fails: any error becomes the placeholder section and is recorded on
/// the returned [`ChunkResult`].
pub async fn run_chunk(
    span: &ChunkSpan,
    total_chunks: usize,
    pages: &[Page],
    deps: &ScanDeps,
    config: &ScanConfig,
) -> ChunkResult {
    let start = Instant::now();
    let chunk = span.index + 1;

    let outcome = transcribe_chunk(span, total_chunks, pages, deps, config).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(sections) => {
            let questions: usize = sections.iter().map(|s| s.questions.len()).sum();
            info!(
                "Chunk {}/{}: {} sections, {} questions in {}ms",
                chunk,
                total_chunks,
                sections.len(),
                questions,
                duration_ms
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_chunk_complete(chunk, total_chunks, questions);
            }
            ChunkResult {
                chunk_index: span.index,
                first_page: span.start,
                page_count: span.len,
                sections,
                duration_ms,
                error: None,
            }
        }
        Err(e) => {
            let (first, last) = span.display_range();
            warn!(
                "Chunk {}/{} (pages {}-{}) failed: {}",
                chunk, total_chunks, first, last, e
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_chunk_error(chunk, total_chunks, &e.to_string());
            }
            ChunkResult {
                chunk_index: span.index,
                first_page: span.start,
                page_count: span.len,
                sections: vec![failure_section(span, pages, deps.ids.as_ref())],
                duration_ms,
                error: Some(e),
            }
        }
    }
}

/// The fallible part of [`run_chunk`].
async fn transcribe_chunk(
    span: &ChunkSpan,
    total_chunks: usize,
    pages: &[Page],
    deps: &ScanDeps,
    config: &ScanConfig,
) -> Result<Vec<TranscribedSection>, PipelineError> {
    let chunk = span.index + 1;
    let (first_page, last_page) = span.display_range();
    let report = |status: ScanStatus| {
        if let Some(ref cb) = config.progress_callback {
            cb.on_status(&status);
        }
    };

    // ── Prepare ──────────────────────────────────────────────────────────
    report(ScanStatus::Optimizing {
        chunk,
        total_chunks,
        first_page,
        last_page,
    });
    let mut images = Vec::with_capacity(span.len);
    for page in span.pages(pages) {
        images.push(deps.codec.prepare(page.source()).await?);
    }
    let request = build_request(images, config);

    // ── Pace ─────────────────────────────────────────────────────────────
    if span.index > 0 && config.chunk_delay_ms > 0 {
        report(ScanStatus::CoolingDown {
            chunk,
            total_chunks,
            delay_ms: config.chunk_delay_ms,
        });
        deps.sleeper
            .sleep(Duration::from_millis(config.chunk_delay_ms))
            .await;
    }

    // ── Transcribe ───────────────────────────────────────────────────────
    report(ScanStatus::Reading {
        chunk,
        total_chunks,
        first_page,
        last_page,
    });
    let text = deps.client.transcribe(&request).await?;
    debug!("Chunk {}: {} chars of response", chunk, text.len());

    let raw = rescue_transcription(&text)?;
    Ok(reindex(raw, span, pages, deps.ids.as_ref()))
}

/// Transcribe every page, chunk by chunk, in order.
///
/// Ends with a `Formatting` status once all chunks are done.
pub async fn transcribe_pages(pages: &[Page], deps: &ScanDeps, config: &ScanConfig) -> Vec<ChunkResult> {
    let plan = plan_chunks(pages.len(), config.chunk_size);
    let total_chunks = plan.len();

    let mut results = Vec::with_capacity(total_chunks);
    for span in &plan {
        results.push(run_chunk(span, total_chunks, pages, deps, config).await);
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_status(&ScanStatus::Formatting);
    }
    results
}
