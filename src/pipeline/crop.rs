//! Diagram cropping: cut flagged diagrams out of the full-resolution pages.
//!
//! The model reports each diagram as a box on a 0–1000 grid relative to the
//! image it saw. Because the transmitted image keeps the original aspect
//! ratio, the same normalised box applies to the full-resolution photo, so
//! cropping runs against the original and loses no detail.
//!
//! ## Padding
//!
//! Model boxes are approximate and tend to hug the drawing too tightly,
//! clipping axis labels and annotations. Each axis is padded by
//! `max(5 % of that dimension, 50 px)` and the result is clamped to the
//! image:
//!
//! ```text
//! origin = max(0, box_origin − pad)
//! extent = min(image_extent − origin, box_extent + 2·pad)
//! ```
//!
//! A rectangle with a non-positive extent is never cropped; the question
//! stays in the "needs crop" state for the user to fix by hand.

use crate::config::ScanConfig;
use crate::error::PipelineError;
use crate::output::{BoundingBox, DiagramRef, TranscribedQuestion, TranscribedSection};
use crate::pipeline::prepare::ImageCodec;
use crate::progress::ScanStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// A pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Padding applied around a diagram box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropPadding {
    /// Fraction of the image dimension, per axis.
    pub fraction: f64,
    /// Lower bound in pixels.
    pub min_px: f64,
}

impl Default for CropPadding {
    fn default() -> Self {
        Self {
            fraction: 0.05,
            min_px: 50.0,
        }
    }
}

impl CropPadding {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            fraction: config.diagram_padding_fraction,
            min_px: config.diagram_min_padding_px as f64,
        }
    }

    /// Padding for an axis of length `extent` pixels.
    pub fn for_extent(&self, extent: f64) -> f64 {
        (extent * self.fraction).max(self.min_px)
    }
}

/// Compute the padded, clamped crop rectangle for `bbox` on an
/// `image_width`×`image_height` image.
///
/// Returns `None` when the rectangle would be empty.
pub fn compute_crop_rect(
    bbox: &BoundingBox,
    image_width: u32,
    image_height: u32,
    padding: &CropPadding,
) -> Option<CropRect> {
    let scale = BoundingBox::SCALE as f64;
    let (w, h) = (image_width as f64, image_height as f64);

    let x_min = bbox.xmin as f64 * w / scale;
    let x_max = bbox.xmax as f64 * w / scale;
    let y_min = bbox.ymin as f64 * h / scale;
    let y_max = bbox.ymax as f64 * h / scale;

    let pad_x = padding.for_extent(w);
    let pad_y = padding.for_extent(h);

    let origin_x = (x_min - pad_x).max(0.0);
    let origin_y = (y_min - pad_y).max(0.0);
    let extent_x = (w - origin_x).min((x_max - x_min) + 2.0 * pad_x);
    let extent_y = (h - origin_y).min((y_max - y_min) + 2.0 * pad_y);

    if extent_x <= 0.0 || extent_y <= 0.0 {
        return None;
    }

    let rect = CropRect {
        x: origin_x.floor() as u32,
        y: origin_y.floor() as u32,
        width: extent_x.floor() as u32,
        height: extent_y.floor() as u32,
    };
    (rect.width > 0 && rect.height > 0).then_some(rect)
}

// ── Durable storage ──────────────────────────────────────────────────────

/// Durable storage for cropped diagrams.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `name` and return the durable location.
    async fn persist(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError>;
}

/// [`BlobStore`] writing one file per diagram into a directory.
///
/// The directory is created on first use. Writes go to a temporary name
/// first and are renamed into place, so a crash never leaves a truncated
/// PNG behind under the final name.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<data_dir>/edgequake-exam-scan/diagrams`, or a directory under the
    /// system temp dir when the platform has no data directory.
    pub fn default_root() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("edgequake-exam-scan")
            .join("diagrams")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn persist(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError> {
        let io_err = |what: &str, e: std::io::Error| PipelineError::DiagramCrop {
            detail: format!("{what} '{}': {e}", self.root.display()),
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_err("cannot create diagram directory", e))?;

        let path = self.root.join(name);
        let tmp = path.with_extension("png.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| io_err("cannot write diagram into", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err("cannot finalise diagram in", e))?;

        debug!("Persisted diagram {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

/// Generates collision-resistant diagram file names for one run:
/// `diagram_<run timestamp>_<ordinal>.png`.
#[derive(Debug)]
pub struct DiagramNamer {
    stamp: String,
    next: AtomicUsize,
}

impl DiagramNamer {
    pub fn new() -> Self {
        Self::with_stamp(chrono::Utc::now().format("%Y%m%dT%H%M%S%3f").to_string())
    }

    pub fn with_stamp(stamp: impl Into<String>) -> Self {
        Self {
            stamp: stamp.into(),
            next: AtomicUsize::new(1),
        }
    }

    pub fn next_name(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("diagram_{}_{n}.png", self.stamp)
    }
}

impl Default for DiagramNamer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Cropping ─────────────────────────────────────────────────────────────

/// Crop counts for one pass over a set of sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropSummary {
    /// Questions flagged with a diagram.
    pub flagged: usize,
    pub cropped: usize,
    /// Flagged questions still in the "needs crop" state afterwards.
    pub unresolved: usize,
}

/// Crops diagrams using an [`ImageCodec`] and persists them to a [`BlobStore`].
pub struct DiagramCropper<'a> {
    codec: &'a dyn ImageCodec,
    store: &'a dyn BlobStore,
    namer: &'a DiagramNamer,
    padding: CropPadding,
    fallback_size: u32,
}

impl<'a> DiagramCropper<'a> {
    pub fn new(
        codec: &'a dyn ImageCodec,
        store: &'a dyn BlobStore,
        namer: &'a DiagramNamer,
        config: &ScanConfig,
    ) -> Self {
        Self {
            codec,
            store,
            namer,
            padding: CropPadding::from_config(config),
            fallback_size: config.fallback_image_size,
        }
    }

    /// Crop one question's diagram and attach the durable reference.
    ///
    /// Returns `Ok(None)` when there is nothing to crop (no diagram flag, no
    /// box, or an empty rectangle) and the question is left as it was.
    pub async fn crop_question(
        &self,
        question: &mut TranscribedQuestion,
    ) -> Result<Option<PathBuf>, PipelineError> {
        if !question.has_diagram {
            warn!("Question {} has no diagram flag; nothing to crop", question.id);
            return Ok(None);
        }
        let Some(bbox) = question.bbox else {
            warn!(
                "Question {} is flagged with a diagram but has no box; leaving it for manual cropping",
                question.id
            );
            return Ok(None);
        };

        let (width, height) = match self.codec.dimensions(&question.source_image).await {
            Ok(dims) => dims,
            Err(e) => {
                warn!(
                    "Cannot read size of {} ({e}); assuming {}x{}",
                    question.source_image.display(),
                    self.fallback_size,
                    self.fallback_size
                );
                (self.fallback_size, self.fallback_size)
            }
        };

        let Some(rect) = compute_crop_rect(&bbox, width, height, &self.padding) else {
            warn!(
                "Question {}: box {:?} gives an empty crop on a {}x{} image",
                question.id, bbox, width, height
            );
            return Ok(None);
        };

        let png = self
            .codec
            .crop_lossless(&question.source_image, rect)
            .await
            .map_err(|e| match e {
                PipelineError::DiagramCrop { .. } => e,
                other => PipelineError::DiagramCrop {
                    detail: other.to_string(),
                },
            })?;
        let path = self.store.persist(&self.namer.next_name(), &png).await?;

        question.diagram = Some(DiagramRef::Cropped(path.clone()));
        Ok(Some(path))
    }

    /// Crop every flagged diagram in `sections`, in order.
    ///
    /// A failure affects only its own question, which stays in the
    /// "needs crop" state.
    pub async fn crop_sections(
        &self,
        sections: &mut [TranscribedSection],
        config: &ScanConfig,
    ) -> CropSummary {
        let flagged = sections
            .iter()
            .flat_map(|s| s.questions.iter())
            .filter(|q| q.needs_crop())
            .count();
        let mut summary = CropSummary {
            flagged,
            ..Default::default()
        };
        if flagged == 0 {
            return summary;
        }

        let mut index = 0;
        for question in sections
            .iter_mut()
            .flat_map(|s| s.questions.iter_mut())
            .filter(|q| q.needs_crop())
        {
            index += 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_status(&ScanStatus::CroppingDiagram {
                    index,
                    total: flagged,
                });
            }

            match self.crop_question(question).await {
                Ok(Some(_)) => summary.cropped += 1,
                Ok(None) => {}
                Err(e) => warn!("Question {}: {e}", question.id),
            }
        }

        summary.unresolved = summary.flagged - summary.cropped;
        info!(
            "Cropped {}/{} diagrams ({} left for manual cropping)",
            summary.cropped, summary.flagged, summary.unresolved
        );
        summary
    }
}
