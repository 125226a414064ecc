//! Response rescue: parse model output, repairing truncated JSON.
//!
//! ## Why rescue at all?
//!
//! When a chunk holds dense pages the model can hit its output-token cap
//! mid-object. The text is then valid JSON up to the cut and merely lacks its
//! closing brackets. Rather than lose all three pages, we append a fixed,
//! ordered list of closing suffixes (each matching a common truncation
//! point in the response schema) and keep the first candidate that parses
//! into the response shape.
//!
//! This is best-effort. A suffix can produce JSON that parses but drops the
//! last, partially-written question; that loss is accepted. What must never
//! happen is a panic, a hang, or a non-conforming value slipping through.

use crate::error::PipelineError;
use crate::pipeline::schema::RawTranscription;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Closing suffixes tried in order against truncated output.
///
/// Each entry names the innermost construct left open when the text was cut.
pub const RESCUE_SUFFIXES: &[&str] = &[
    // inside a string value of a question
    "\"}]}]}",
    // after a complete value inside a question object
    "}]}]}",
    // questions array open, last question closed
    "]}]}",
    // inside a string of a question's options array
    "\"]}]}]}",
    // options or box_2d array open
    "]}]}]}",
    // inside a string value of a section (its title)
    "\"}]}",
    // section object open after its questions array closed
    "}]}",
    // sections array open
    "]}",
    // inside a top-level string value
    "\"}",
    // top-level object open
    "}",
];

static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap());
static RE_TRAILING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?```\s*$").unwrap());

/// Remove a surrounding markdown code fence, tolerating a missing closing
/// fence (which is exactly what truncation produces).
pub fn strip_code_fences(input: &str) -> &str {
    let start = RE_LEADING_FENCE
        .find(input)
        .map(|m| m.end())
        .unwrap_or(0);
    let body = &input[start..];
    let end = RE_TRAILING_FENCE
        .find(body)
        .map(|m| m.start())
        .unwrap_or(body.len());
    body[..end].trim()
}

/// Parse a transcription response, rescuing truncated output.
///
/// Pure: depends only on `text`.
pub fn rescue_transcription(text: &str) -> Result<RawTranscription, PipelineError> {
    let body = strip_code_fences(text);
    if body.is_empty() {
        return Err(PipelineError::TranscriptionParse {
            detail: "empty response".into(),
        });
    }

    let direct_err = match parse_candidate(body) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };
    debug!("Direct parse failed ({direct_err}); trying rescue suffixes");

    // A cut right after a separator leaves a dangling comma that no suffix
    // can close over, so try the trimmed text as well.
    let trimmed = body.trim_end().trim_end_matches(',').trim_end();
    let mut bases = vec![body];
    if trimmed.len() != body.len() {
        bases.push(trimmed);
    }

    for suffix in RESCUE_SUFFIXES {
        for base in &bases {
            let candidate = format!("{base}{suffix}");
            if let Ok(parsed) = parse_candidate(&candidate) {
                warn!(
                    "Rescued truncated response with suffix {:?} ({} sections)",
                    suffix,
                    parsed.sections.len()
                );
                return Ok(parsed);
            }
        }
    }

    Err(PipelineError::TranscriptionParse {
        detail: format!(
            "{direct_err}; no rescue suffix produced valid JSON ({} bytes received)",
            body.len()
        ),
    })
}

/// Parse one candidate into the response shape.
///
/// A bare array is read as the `sections` list; some models drop the
/// wrapping object.
fn parse_candidate(candidate: &str) -> Result<RawTranscription, serde_json::Error> {
    let value: Value = serde_json::from_str(candidate)?;
    match value {
        Value::Array(_) => serde_json::from_value(serde_json::json!({ "sections": value })),
        other => serde_json::from_value(other),
    }
}
