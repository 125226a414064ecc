//! Configuration types for a scan run.
//!
//! All pipeline behaviour is controlled through [`ScanConfig`], built via its
//! [`ScanConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share a config between the eager and streaming entry points and to log
//! exactly what a run used.

use crate::error::ExamScanError;
use crate::pipeline::client::TranscriptionClient;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default Gemini REST endpoint used by [`crate::pipeline::client::GeminiClient`].
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Configuration for a scan run.
///
/// Built via [`ScanConfig::builder()`] or using [`ScanConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_exam_scan::ScanConfig;
///
/// let config = ScanConfig::builder()
///     .chunk_size(3)
///     .chunk_delay_ms(2500)
///     .model("gemini-2.0-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// Pages per transcription request. Default: 3.
    ///
    /// Three photographed pages stay well inside request-size limits after
    /// compression and keep each response short enough that truncation is
    /// rare. Larger chunks mean fewer requests but more pages lost when one
    /// request fails.
    pub chunk_size: usize,

    /// Pause before every chunk except the first, in milliseconds. Default: 2500.
    ///
    /// Matches the request rate the transcription endpoint tolerates on
    /// free-tier keys. Chunks are never sent concurrently.
    pub chunk_delay_ms: u64,

    /// Maximum width of the image sent to the model, in pixels. Default: 800.
    ///
    /// Height scales proportionally. Handwriting stays legible at 800 px
    /// while a page shrinks to roughly 100 KB of JPEG.
    pub max_image_width: u32,

    /// JPEG quality of the transmitted image (1–100). Default: 70.
    pub jpeg_quality: u8,

    /// Model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// edgequake-llm provider name (e.g. "openai", "anthropic", "gemini").
    /// When set, the named provider is used through
    /// [`crate::pipeline::client::ProviderClient`].
    pub provider_name: Option<String>,

    /// Pre-constructed edgequake-llm provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed transcription client. Takes precedence over everything else.
    pub client: Option<Arc<dyn TranscriptionClient>>,

    /// API key for the native Gemini client. Falls back to `GEMINI_API_KEY`
    /// then `GOOGLE_API_KEY`.
    pub api_key: Option<String>,

    /// Base URL of the Gemini REST API. Default: [`DEFAULT_API_BASE_URL`].
    pub api_base_url: String,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription must be faithful, not creative.
    pub temperature: f32,

    /// Output-size cap per request, in tokens. Default: 8192.
    ///
    /// Three dense pages of questions fit comfortably; when they don't, the
    /// response rescuer closes the truncated JSON.
    pub max_output_tokens: usize,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Custom transcription prompt. `{image_count}` is replaced by the
    /// number of images in the chunk. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,

    /// Crop flagged diagrams after transcription. Default: true.
    pub crop_diagrams: bool,

    /// Directory for cropped diagrams. If None, uses
    /// `<data_dir>/edgequake-exam-scan/diagrams`.
    pub diagram_dir: Option<PathBuf>,

    /// Crop padding as a fraction of the image dimension. Default: 0.05.
    pub diagram_padding_fraction: f64,

    /// Minimum crop padding in pixels. Default: 50.
    ///
    /// Box coordinates from the model are approximate; handwriting labels
    /// around a diagram are easily clipped without a floor on the padding.
    pub diagram_min_padding_px: u32,

    /// Assumed square image size when the true size cannot be read. Default: 1000.
    pub fallback_image_size: u32,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 3,
            chunk_delay_ms: 2500,
            max_image_width: 800,
            jpeg_quality: 70,
            model: None,
            provider_name: None,
            provider: None,
            client: None,
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            temperature: 0.1,
            max_output_tokens: 8192,
            api_timeout_secs: 120,
            system_prompt: None,
            crop_diagrams: true,
            diagram_dir: None,
            diagram_padding_fraction: 0.05,
            diagram_min_padding_px: 50,
            fallback_image_size: 1000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_delay_ms", &self.chunk_delay_ms)
            .field("max_image_width", &self.max_image_width)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("client", &self.client.as_ref().map(|_| "<dyn TranscriptionClient>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("crop_diagrams", &self.crop_diagrams)
            .field("diagram_dir", &self.diagram_dir)
            .finish()
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured model, or [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn chunk_delay_ms(mut self, ms: u64) -> Self {
        self.config.chunk_delay_ms = ms;
        self
    }

    pub fn max_image_width(mut self, px: u32) -> Self {
        self.config.max_image_width = px;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn client(mut self, client: Arc<dyn TranscriptionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn crop_diagrams(mut self, v: bool) -> Self {
        self.config.crop_diagrams = v;
        self
    }

    pub fn diagram_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.diagram_dir = Some(dir.into());
        self
    }

    pub fn diagram_padding_fraction(mut self, f: f64) -> Self {
        self.config.diagram_padding_fraction = f;
        self
    }

    pub fn diagram_min_padding_px(mut self, px: u32) -> Self {
        self.config.diagram_min_padding_px = px;
        self
    }

    pub fn fallback_image_size(mut self, px: u32) -> Self {
        self.config.fallback_image_size = px.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, ExamScanError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(ExamScanError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(ExamScanError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.max_image_width < 100 {
            return Err(ExamScanError::InvalidConfig(format!(
                "Max image width must be ≥ 100 px, got {}",
                c.max_image_width
            )));
        }
        if !(0.0..=1.0).contains(&c.diagram_padding_fraction) {
            return Err(ExamScanError::InvalidConfig(format!(
                "Diagram padding fraction must be 0–1, got {}",
                c.diagram_padding_fraction
            )));
        }
        if c.max_output_tokens == 0 {
            return Err(ExamScanError::InvalidConfig(
                "Max output tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
