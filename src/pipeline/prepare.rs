//! Image preparation: page photo → downsized base64 JPEG for the model.
//!
//! Phone photos are 3000–4000 px wide and several megabytes each. Three of
//! them base64-encoded exceed what the transcription endpoint accepts in one
//! request, and the extra pixels do not help the model read handwriting.
//! Each page is therefore resized to at most `max_image_width` pixels wide
//! and re-encoded as JPEG before transmission.
//!
//! The original file is never modified: diagram cropping later reads the
//! full-resolution source, not the prepared copy.
//!
//! ## Why spawn_blocking?
//!
//! Decoding a 12-megapixel JPEG and resampling it takes hundreds of
//! milliseconds of pure CPU. Running that on a Tokio worker would stall every
//! other task on the runtime, so [`ImageCrateCodec`] moves the work onto the
//! blocking pool.

use crate::error::PipelineError;
use crate::pipeline::crop::CropRect;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A page image ready to send to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    /// Base64-encoded image bytes.
    pub data: String,
    pub mime_type: String,
    /// Width after resizing.
    pub width: u32,
    /// Height after resizing.
    pub height: u32,
    /// The resized copy on disk, when the codec keeps one.
    pub derived_path: Option<PathBuf>,
}

/// Image operations the pipeline needs.
#[async_trait]
pub trait ImageCodec: Send + Sync {
    /// Downsize and re-encode a page for transmission.
    async fn prepare(&self, source: &Path) -> Result<PreparedImage, PipelineError>;

    /// True pixel dimensions `(width, height)` of an image.
    async fn dimensions(&self, source: &Path) -> Result<(u32, u32), PipelineError>;

    /// Crop `rect` out of the full-resolution image and encode it losslessly (PNG).
    async fn crop_lossless(&self, source: &Path, rect: CropRect) -> Result<Vec<u8>, PipelineError>;
}

/// [`ImageCodec`] backed by the `image` crate.
///
/// Resized copies are written to a scratch directory owned by the codec and
/// removed when it is dropped.
pub struct ImageCrateCodec {
    max_width: u32,
    jpeg_quality: u8,
    scratch: TempDir,
}

impl ImageCrateCodec {
    pub fn new(max_width: u32, jpeg_quality: u8) -> std::io::Result<Self> {
        Ok(Self {
            max_width,
            jpeg_quality: jpeg_quality.clamp(1, 100),
            scratch: TempDir::new()?,
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

#[async_trait]
impl ImageCodec for ImageCrateCodec {
    async fn prepare(&self, source: &Path) -> Result<PreparedImage, PipelineError> {
        let path = source.to_path_buf();
        let max_width = self.max_width;
        let quality = self.jpeg_quality;
        let derived = self
            .scratch
            .path()
            .join(format!("prepared_{}.jpg", uuid::Uuid::new_v4()));

        tokio::task::spawn_blocking(move || prepare_blocking(&path, max_width, quality, derived))
            .await
            .map_err(|e| PipelineError::ImageProcessing {
                path: source.to_path_buf(),
                detail: format!("prepare task panicked: {e}"),
            })?
    }

    async fn dimensions(&self, source: &Path) -> Result<(u32, u32), PipelineError> {
        let path = source.to_path_buf();
        tokio::task::spawn_blocking(move || image::image_dimensions(&path))
            .await
            .map_err(|e| image_error(source, format!("dimension task panicked: {e}")))?
            .map_err(|e| image_error(source, e.to_string()))
    }

    async fn crop_lossless(&self, source: &Path, rect: CropRect) -> Result<Vec<u8>, PipelineError> {
        let path = source.to_path_buf();
        tokio::task::spawn_blocking(move || crop_blocking(&path, rect))
            .await
            .map_err(|e| PipelineError::DiagramCrop {
                detail: format!("crop task panicked: {e}"),
            })?
    }
}

fn image_error(path: &Path, detail: String) -> PipelineError {
    PipelineError::ImageProcessing {
        path: path.to_path_buf(),
        detail,
    }
}

/// Blocking implementation of page preparation.
fn prepare_blocking(
    path: &Path,
    max_width: u32,
    quality: u8,
    derived: PathBuf,
) -> Result<PreparedImage, PipelineError> {
    let img = image::open(path).map_err(|e| image_error(path, e.to_string()))?;
    let resized = downscale(img, max_width);
    let (width, height) = (resized.width(), resized.height());

    // JPEG has no alpha channel; flatten first.
    let rgb = resized.to_rgb8();
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| image_error(path, format!("JPEG encoding failed: {e}")))?;

    std::fs::write(&derived, &buf)
        .map_err(|e| image_error(path, format!("writing resized copy failed: {e}")))?;

    let data = STANDARD.encode(&buf);
    debug!(
        "Prepared {} → {}x{} px, {} bytes base64",
        path.display(),
        width,
        height,
        data.len()
    );

    Ok(PreparedImage {
        data,
        mime_type: "image/jpeg".to_string(),
        width,
        height,
        derived_path: Some(derived),
    })
}

/// Shrink `img` so its width is at most `max_width`, keeping the aspect
/// ratio. Narrower images are returned untouched.
pub fn downscale(img: DynamicImage, max_width: u32) -> DynamicImage {
    if img.width() <= max_width {
        return img;
    }
    let (w, h) = scaled_dimensions(img.width(), img.height(), max_width);
    img.resize_exact(w, h, FilterType::Triangle)
}

/// Target dimensions for a `width`×`height` image capped at `max_width`.
pub fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let h = (height as f64 * max_width as f64 / width as f64).round().max(1.0) as u32;
    (max_width, h)
}

/// Blocking implementation of a lossless crop.
fn crop_blocking(path: &Path, rect: CropRect) -> Result<Vec<u8>, PipelineError> {
    let img = image::open(path).map_err(|e| PipelineError::DiagramCrop {
        detail: format!("cannot open '{}': {e}", path.display()),
    })?;
    let cropped = img.crop_imm(rect.x, rect.y, rect.width, rect.height);
    if cropped.width() == 0 || cropped.height() == 0 {
        return Err(PipelineError::DiagramCrop {
            detail: format!("crop {rect:?} is empty for '{}'", path.display()),
        });
    }

    let mut buf = Vec::new();
    cropped
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| PipelineError::DiagramCrop {
            detail: format!("PNG encoding failed: {e}"),
        })?;
    debug!(
        "Cropped {} at {:?} → {} bytes PNG",
        path.display(),
        rect,
        buf.len()
    );
    Ok(buf)
}
