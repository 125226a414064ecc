//! Transcription clients: send one chunk's request, return the raw text.
//!
//! Two implementations are provided:
//!
//! * [`GeminiClient`] — talks to the Gemini `generateContent` REST endpoint
//!   directly with `reqwest`, passing the response schema natively
//!   (`responseMimeType: application/json` + `responseSchema`). This is the
//!   default because the schema constraint is enforced server-side.
//! * [`ProviderClient`] — wraps any `edgequake_llm::LLMProvider` (OpenAI,
//!   Anthropic, Ollama, …). Those APIs do not all accept a schema, so the
//!   schema travels inside the system prompt and the response rescuer does
//!   the rest.
//!
//! Neither client retries. A failed request fails its chunk, which the
//! scheduler turns into a "rescan these pages" placeholder; pacing between
//! chunks is the scheduler's job too.

use crate::error::PipelineError;
use crate::pipeline::request::TranscriptionRequest;
use crate::prompts::{images_caption, SCHEMA_INSTRUCTION};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sends a transcription request and returns the model's raw text.
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<String, PipelineError>;
}

fn request_error(detail: impl Into<String>) -> PipelineError {
    PipelineError::TranscriptionRequest {
        detail: detail.into(),
    }
}

// ── Gemini REST client ───────────────────────────────────────────────────

/// Native Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    /// Create a client. A missing `api_key` is not an error here: every
    /// request then fails, and so does each chunk, which is how a missing
    /// key surfaces to the user.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| request_error(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    Text(&'a str),
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
        data: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    max_output_tokens: usize,
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

/// Build the Gemini request body for `request`.
fn gemini_body(request: &TranscriptionRequest) -> GenerateRequest<'_> {
    let mut parts = Vec::with_capacity(request.images.len() + 1);
    parts.push(Part::Text(&request.prompt));
    for image in &request.images {
        parts.push(Part::InlineData {
            mime_type: &image.mime_type,
            data: &image.data,
        });
    }
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            response_mime_type: "application/json",
            response_schema: &request.response_schema,
        },
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(body: &str) -> Result<String, PipelineError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| request_error(format!("unexpected response envelope: {e}")))?;

    if let Some(usage) = &parsed.usage_metadata {
        debug!(
            "Gemini usage: {} input tokens, {} output tokens",
            usage.prompt_token_count, usage.candidates_token_count
        );
    }

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| request_error("response contained no candidates"))?;

    if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
        warn!("Response hit the output-token cap; it will need rescuing");
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(request_error(format!(
            "empty response (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }
    Ok(text)
}

#[async_trait]
impl TranscriptionClient for GeminiClient {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<String, PipelineError> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            request_error("no API key configured; set GEMINI_API_KEY or pass --api-key")
        })?;

        let body = serde_json::to_vec(&gemini_body(request))
            .map_err(|e| request_error(format!("request serialisation failed: {e}")))?;

        let start = Instant::now();
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    request_error(format!("timed out after {}ms", start.elapsed().as_millis()))
                } else {
                    request_error(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| request_error(format!("reading response body failed: {e}")))?;

        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            let detail = match status.as_u16() {
                401 | 403 => format!("API key rejected (HTTP {status}): {snippet}"),
                429 => format!("rate limited (HTTP {status}): {snippet}"),
                _ => format!("HTTP {status}: {snippet}"),
            };
            return Err(request_error(detail));
        }

        debug!(
            "Gemini {} answered {} images in {}ms",
            self.model,
            request.image_count(),
            start.elapsed().as_millis()
        );
        extract_text(&text)
    }
}

// ── edgequake-llm provider client ────────────────────────────────────────

/// Transcription through any edgequake-llm provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, timeout_secs: u64) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Build the chat messages for `request`.
///
/// ## Message Layout
///
/// 1. **System message** — the transcription prompt followed by the response
///    schema as pretty-printed JSON
/// 2. **User message** — a one-line caption plus the page images in order
pub fn provider_messages(request: &TranscriptionRequest) -> Vec<ChatMessage> {
    let schema = serde_json::to_string_pretty(&request.response_schema).unwrap_or_default();
    let system = format!("{}\n\n{}\n{}", request.prompt, SCHEMA_INSTRUCTION, schema);

    let images: Vec<ImageData> = request
        .images
        .iter()
        .map(|img| ImageData::new(img.data.clone(), img.mime_type.clone()).with_detail("high"))
        .collect();

    let caption = images_caption(request.image_count());
    vec![
        ChatMessage::system(system),
        ChatMessage::user_with_images(&caption, images),
    ]
}

#[async_trait]
impl TranscriptionClient for ProviderClient {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<String, PipelineError> {
        let messages = provider_messages(request);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_output_tokens),
            ..Default::default()
        };

        let start = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| request_error(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| request_error(e.to_string()))?;

        debug!(
            "Provider answered {} images: {} input tokens, {} output tokens, {}ms",
            request.image_count(),
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed().as_millis()
        );

        if response.content.trim().is_empty() {
            return Err(request_error("provider returned an empty response"));
        }
        Ok(response.content)
    }
}
