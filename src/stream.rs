//! Streaming scan API: emit each chunk as soon as it is done.
//!
//! ## Why stream?
//!
//! A ten-page exam takes four requests and at least 7.5 s of pacing. With
//! [`scan_stream`] a UI can show the first three pages' questions while the
//! rest are still being read, instead of a spinner for the whole run.
//!
//! Chunks are still processed strictly one after another, so results arrive
//! in page order. Diagrams are cropped per chunk before the chunk is
//! yielded; file names stay unique across the run. After the last chunk the
//! progress callback gets the same `formatting` status and
//! `on_scan_complete` call as an eager scan.

use crate::config::ScanConfig;
use crate::error::ExamScanError;
use crate::output::ChunkResult;
use crate::pipeline::crop::DiagramNamer;
use crate::pipeline::reindex::plan_chunks;
use crate::pipeline::schedule::{run_chunk, ScanDeps};
use crate::progress::ScanStatus;
use crate::scan::{crop_chunks, resolve_deps};
use crate::session::{Page, ScanSession};
use futures::future;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of chunk results, in page order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = ChunkResult> + Send>>;

/// Scan a session, streaming one [`ChunkResult`] per chunk.
///
/// Failed chunks are yielded too, carrying their placeholder section and
/// `error`. Nothing is requested until the stream is polled.
///
/// # Returns
/// - `Ok(ChunkStream)` — a stream of `ChunkResult`
/// - `Err(ExamScanError)` — fatal error (empty session, unknown provider)
pub async fn scan_stream(
    session: &ScanSession,
    config: &ScanConfig,
) -> Result<ChunkStream, ExamScanError> {
    let deps = resolve_deps(config)?;
    scan_stream_with(session.pages().to_vec(), deps, config)
}

/// [`scan_stream`] with explicit collaborators.
pub fn scan_stream_with(
    pages: Vec<Page>,
    deps: ScanDeps,
    config: &ScanConfig,
) -> Result<ChunkStream, ExamScanError> {
    if pages.is_empty() {
        return Err(ExamScanError::NoPages);
    }

    let plan = plan_chunks(pages.len(), config.chunk_size);
    let total_chunks = plan.len();
    info!(
        "Starting streaming scan: {} pages in {} chunks",
        pages.len(),
        total_chunks
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_start(pages.len(), total_chunks);
    }

    let pages = Arc::new(pages);
    let namer = Arc::new(DiagramNamer::new());
    let failed = Arc::new(AtomicUsize::new(0));
    let config_clone = config.clone();
    let failed_in_chunks = Arc::clone(&failed);

    let chunks = stream::iter(plan).then(move |span| {
        let pages = Arc::clone(&pages);
        let namer = Arc::clone(&namer);
        let failed = Arc::clone(&failed_in_chunks);
        let deps = deps.clone();
        let cfg = config_clone.clone();
        async move {
            let mut result = run_chunk(&span, total_chunks, &pages, &deps, &cfg).await;
            if result.error.is_some() {
                failed.fetch_add(1, Ordering::Relaxed);
            }
            if cfg.crop_diagrams {
                crop_chunks(std::slice::from_mut(&mut result), &deps, &namer, &cfg).await;
            }
            result
        }
    });

    let callback = config.progress_callback.clone();
    let finish = stream::once(async move {
        let failed_chunks = failed.load(Ordering::Relaxed);
        info!(
            "Streaming scan complete: {}/{} chunks failed",
            failed_chunks, total_chunks
        );
        if let Some(cb) = callback {
            cb.on_status(&ScanStatus::Formatting);
            cb.on_scan_complete(total_chunks, failed_chunks);
        }
    })
    .filter_map(|()| future::ready(None::<ChunkResult>));

    Ok(Box::pin(chunks.chain(finish)))
}
