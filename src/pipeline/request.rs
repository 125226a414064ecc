//! Transcription request construction for one chunk.
//!
//! Pure: turns prepared images plus config into a [`TranscriptionRequest`].
//! Each [`crate::pipeline::client::TranscriptionClient`] maps this neutral
//! shape onto its own wire format.

use crate::config::ScanConfig;
use crate::pipeline::prepare::PreparedImage;
use crate::pipeline::schema::response_schema;
use crate::prompts::{transcription_prompt, DEFAULT_TRANSCRIPTION_PROMPT};
use serde_json::Value;

/// Everything needed to ask the model to transcribe one chunk.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    /// Instruction text, already parameterised by the image count.
    pub prompt: String,
    /// Images in chunk order.
    pub images: Vec<PreparedImage>,
    /// JSON schema the response must follow.
    pub response_schema: Value,
    pub temperature: f32,
    pub max_output_tokens: usize,
}

impl TranscriptionRequest {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// Build the request for one chunk of prepared images.
pub fn build_request(images: Vec<PreparedImage>, config: &ScanConfig) -> TranscriptionRequest {
    let template = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_TRANSCRIPTION_PROMPT);

    TranscriptionRequest {
        prompt: transcription_prompt(template, images.len()),
        images,
        response_schema: response_schema(),
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
    }
}
