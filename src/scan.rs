//! Eager (whole-session) scan entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: transcribe every chunk, crop every
//! flagged diagram, then return one [`ScanOutput`]. Use
//! [`crate::stream::scan_stream`] instead when the UI should show sections as
//! each chunk finishes.

use crate::config::{ScanConfig, DEFAULT_MODEL};
use crate::error::ExamScanError;
use crate::output::{ChunkResult, ScanOutput, ScanStats};
use crate::pipeline::client::{GeminiClient, ProviderClient, TranscriptionClient};
use crate::pipeline::crop::{CropSummary, DiagramCropper, DiagramNamer, FsBlobStore};
use crate::pipeline::prepare::ImageCrateCodec;
use crate::pipeline::reindex::{plan_chunks, UuidIdGenerator};
use crate::pipeline::schedule::{transcribe_pages, ScanDeps, TokioSleeper};
use crate::session::{Page, ScanSession};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default model for non-Gemini providers when none is configured.
const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// Scan every page of `session` into structured questions.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ScanOutput)` whenever the run started, even if some chunks failed
/// (check `output.stats.failed_chunks` and [`ScanOutput::failed_ranges`]).
///
/// # Errors
/// Returns `Err(ExamScanError)` only for fatal errors:
/// - The session is empty
/// - An explicitly named provider cannot be created
/// - The image codec's scratch directory cannot be created
pub async fn scan(session: &ScanSession, config: &ScanConfig) -> Result<ScanOutput, ExamScanError> {
    let deps = resolve_deps(config)?;
    scan_with(session.pages(), &deps, config).await
}

/// Scan a list of image files, in order.
///
/// Every path must exist; a missing file is reported before any request is
/// made.
pub async fn scan_images<P: AsRef<Path>>(
    paths: &[P],
    config: &ScanConfig,
) -> Result<ScanOutput, ExamScanError> {
    let session = session_from_paths(paths)?;
    scan(&session, config).await
}

/// Scan image files and write the JSON result directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn scan_to_file<P: AsRef<Path>>(
    paths: &[P],
    output_path: impl AsRef<Path>,
    config: &ScanConfig,
) -> Result<ScanStats, ExamScanError> {
    let output = scan_images(paths, config).await?;
    let path = output_path.as_ref();
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| ExamScanError::Internal(format!("JSON serialisation failed: {e}")))?;

    let write_err = |e: std::io::Error| ExamScanError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    Ok(output.stats)
}

/// Synchronous wrapper around [`scan`].
///
/// Creates a temporary tokio runtime internally.
pub fn scan_sync(session: &ScanSession, config: &ScanConfig) -> Result<ScanOutput, ExamScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExamScanError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(scan(session, config))
}

/// Run the full pipeline with explicit collaborators.
///
/// This is what [`scan`] calls after resolving its dependencies; call it
/// directly to plug in a custom client, codec, or diagram store.
pub async fn scan_with(
    pages: &[Page],
    deps: &ScanDeps,
    config: &ScanConfig,
) -> Result<ScanOutput, ExamScanError> {
    if pages.is_empty() {
        return Err(ExamScanError::NoPages);
    }

    let total_start = Instant::now();
    let total_chunks = plan_chunks(pages.len(), config.chunk_size).len();
    info!(
        "Starting scan: {} pages in {} chunks of ≤{}",
        pages.len(),
        total_chunks,
        config.chunk_size
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_start(pages.len(), total_chunks);
    }

    // ── Step 1: Transcribe ───────────────────────────────────────────────
    let transcribe_start = Instant::now();
    let mut chunks = transcribe_pages(pages, deps, config).await;
    let transcription_duration_ms = transcribe_start.elapsed().as_millis() as u64;

    // ── Step 2: Crop diagrams ────────────────────────────────────────────
    let crop_start = Instant::now();
    let crops = if config.crop_diagrams {
        let namer = DiagramNamer::new();
        crop_chunks(&mut chunks, deps, &namer, config).await
    } else {
        let flagged = chunks
            .iter()
            .flat_map(|c| c.sections.iter())
            .flat_map(|s| s.questions.iter())
            .filter(|q| q.needs_crop())
            .count();
        debug!("Diagram cropping disabled; {} diagrams left flagged", flagged);
        CropSummary {
            flagged,
            cropped: 0,
            unresolved: flagged,
        }
    };
    let crop_duration_ms = crop_start.elapsed().as_millis() as u64;

    // ── Step 3: Assemble ─────────────────────────────────────────────────
    let sections: Vec<_> = chunks.iter().flat_map(|c| c.sections.clone()).collect();
    let failed_chunks = chunks.iter().filter(|c| c.error.is_some()).count();

    let stats = ScanStats {
        total_pages: pages.len(),
        total_chunks,
        failed_chunks,
        total_sections: sections.len(),
        total_questions: sections.iter().map(|s| s.questions.len()).sum(),
        diagrams_flagged: crops.flagged,
        diagrams_cropped: crops.cropped,
        diagrams_unresolved: crops.unresolved,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        transcription_duration_ms,
        crop_duration_ms,
    };

    info!(
        "Scan complete: {} questions from {}/{} chunks, {}ms total",
        stats.total_questions,
        total_chunks - failed_chunks,
        total_chunks,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_scan_complete(total_chunks, failed_chunks);
    }

    Ok(ScanOutput {
        sections,
        chunks,
        stats,
    })
}

/// Crop every flagged diagram across `chunks`, sharing one file namer.
pub(crate) async fn crop_chunks(
    chunks: &mut [ChunkResult],
    deps: &ScanDeps,
    namer: &DiagramNamer,
    config: &ScanConfig,
) -> CropSummary {
    let cropper = DiagramCropper::new(deps.codec.as_ref(), deps.store.as_ref(), namer, config);
    let mut total = CropSummary::default();
    for chunk in chunks.iter_mut() {
        let s = cropper.crop_sections(&mut chunk.sections, config).await;
        total.flagged += s.flagged;
        total.cropped += s.cropped;
        total.unresolved += s.unresolved;
    }
    total
}

/// Build a session from file paths, checking that each exists.
pub fn session_from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<ScanSession, ExamScanError> {
    let pages = paths
        .iter()
        .map(|p| {
            let path = p.as_ref();
            if path.is_file() {
                Ok(Page::new(path))
            } else {
                Err(ExamScanError::ImageNotFound {
                    path: path.to_path_buf(),
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ScanSession::from_pages(pages))
}

// ── Dependency resolution ────────────────────────────────────────────────

/// Build the production collaborators for `config`.
pub fn resolve_deps(config: &ScanConfig) -> Result<ScanDeps, ExamScanError> {
    let client = resolve_client(config)?;
    let codec = ImageCrateCodec::new(config.max_image_width, config.jpeg_quality)
        .map_err(|e| ExamScanError::Internal(format!("scratch directory: {e}")))?;
    let store = FsBlobStore::new(
        config
            .diagram_dir
            .clone()
            .unwrap_or_else(FsBlobStore::default_root),
    );
    debug!("Diagrams will be stored in {}", store.root().display());

    Ok(ScanDeps {
        client,
        codec: Arc::new(codec),
        store: Arc::new(store),
        sleeper: Arc::new(TokioSleeper),
        ids: Arc::new(UuidIdGenerator),
    })
}

/// The Gemini API key: config first, then `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
pub fn gemini_api_key(config: &ScanConfig) -> Option<String> {
    config
        .api_key
        .clone()
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

fn gemini_client(config: &ScanConfig, api_key: Option<String>) -> Result<Arc<dyn TranscriptionClient>, ExamScanError> {
    let client = GeminiClient::new(
        config.api_base_url.clone(),
        config.model_or_default(),
        api_key,
        config.api_timeout_secs,
    )
    .map_err(|e| ExamScanError::ProviderNotConfigured {
        provider: "gemini".to_string(),
        hint: e.to_string(),
    })?;
    Ok(Arc::new(client))
}

fn provider_client(provider: Arc<dyn LLMProvider>, config: &ScanConfig) -> Arc<dyn TranscriptionClient> {
    Arc::new(ProviderClient::new(provider, config.api_timeout_secs))
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExamScanError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExamScanError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the transcription client, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.client`), used as-is.
/// 2. **Pre-built provider** (`config.provider`), wrapped in a [`ProviderClient`].
/// 3. **Named provider** (`config.provider_name`). `"gemini"` with a key
///    available uses the native client; anything else goes through
///    [`ProviderFactory::create_llm_provider`]. Failure here is fatal: the
///    caller asked for this provider by name.
/// 4. **Gemini key** in config or environment → native [`GeminiClient`].
/// 5. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 6. **Auto-detection** (`ProviderFactory::from_env`).
/// 7. A keyless [`GeminiClient`]: the run still starts and every chunk
///    fails with a "missing API key" placeholder.
pub fn resolve_client(config: &ScanConfig) -> Result<Arc<dyn TranscriptionClient>, ExamScanError> {
    // 1) User-provided client takes priority
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }

    // 2) User-provided provider
    if let Some(ref provider) = config.provider {
        return Ok(provider_client(Arc::clone(provider), config));
    }

    let api_key = gemini_api_key(config);

    // 3) Provider name + model
    if let Some(ref name) = config.provider_name {
        if name.eq_ignore_ascii_case("gemini") && api_key.is_some() {
            return gemini_client(config, api_key);
        }
        let model = match config.model.as_deref() {
            Some(m) => m,
            None if name.eq_ignore_ascii_case("gemini") => DEFAULT_MODEL,
            None => DEFAULT_PROVIDER_MODEL,
        };
        let provider = create_vision_provider(name, model)?;
        return Ok(provider_client(provider, config));
    }

    // 4) Native Gemini when a key is available
    if api_key.is_some() {
        return gemini_client(config, api_key);
    }

    // 5) EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL when both set
    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            let provider = create_vision_provider(&prov, &model)?;
            return Ok(provider_client(provider, config));
        }
    }

    // 6) Auto-detect from environment
    match ProviderFactory::from_env() {
        Ok((llm_provider, _embedding)) => Ok(provider_client(llm_provider, config)),
        Err(e) => {
            warn!(
                "No API key found (set GEMINI_API_KEY or another provider key): {}. \
                 Every chunk will fail until one is configured.",
                e
            );
            gemini_client(config, None)
        }
    }
}
