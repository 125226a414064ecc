//! Output types: transcribed questions, sections, per-chunk results, stats.
//!
//! Everything here derives `Serialize`/`Deserialize` so a whole
//! [`ScanOutput`] can be written as JSON by the CLI and read back by the
//! editor stage without a separate wire format.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The three question kinds the transcription model distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// An ordinary written-answer question. (default)
    #[default]
    Standard,
    /// Multiple choice: carries up to four options.
    Mcq,
    /// An instructional subheading ("Answer any three questions"); no label
    /// and no marks.
    Instruction,
}

impl QuestionType {
    /// Parse the model's `type` tag. Unknown tags fall back to `Standard`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "mcq" | "multiple_choice" | "multiple-choice" => QuestionType::Mcq,
            "instruction" | "instructions" | "heading" => QuestionType::Instruction,
            _ => QuestionType::Standard,
        }
    }
}

/// Column layout hint for a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutHint {
    /// One question per row. (default)
    #[default]
    OneColumn,
    /// Two columns, typical for short-answer grids.
    TwoColumn,
    /// Three columns, typical for dense MCQ blocks.
    ThreeColumn,
}

impl LayoutHint {
    /// Parse the model's `layout_hint`. Unknown hints fall back to one column.
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "two_column" | "2" | "two" | "double" => LayoutHint::TwoColumn,
            "three_column" | "3" | "three" | "triple" => LayoutHint::ThreeColumn,
            _ => LayoutHint::OneColumn,
        }
    }

    /// Number of columns this hint stands for.
    pub fn columns(self) -> u8 {
        match self {
            LayoutHint::OneColumn => 1,
            LayoutHint::TwoColumn => 2,
            LayoutHint::ThreeColumn => 3,
        }
    }
}

/// A normalised bounding box on the 0–1000 scale, ordered like the model
/// emits it: `[ymin, xmin, ymax, xmax]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: u16,
    pub xmin: u16,
    pub ymax: u16,
    pub xmax: u16,
}

impl BoundingBox {
    /// Upper bound of the normalised coordinate space.
    pub const SCALE: u16 = 1000;

    /// Build a box from the model's `box_2d` array.
    ///
    /// Returns `None` unless exactly four finite values are present. Values
    /// are rounded and clamped into `0..=1000`.
    pub fn from_model(values: &[f64]) -> Option<Self> {
        if values.len() != 4 || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let c = |v: f64| v.round().clamp(0.0, Self::SCALE as f64) as u16;
        Some(Self {
            ymin: c(values[0]),
            xmin: c(values[1]),
            ymax: c(values[2]),
            xmax: c(values[3]),
        })
    }
}

/// Where a question's diagram stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "path", rename_all = "snake_case")]
pub enum DiagramRef {
    /// The model flagged a diagram but no crop exists yet. The editor shows
    /// a manual-crop affordance for these.
    NeedsCrop,
    /// Cropped and persisted to durable storage.
    Cropped(PathBuf),
}

/// The atomic unit of output: one transcribed question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribedQuestion {
    /// Unique across the whole run.
    pub id: String,
    /// Ordinal label, e.g. `"1(a)"`. Empty for instructions.
    pub number: String,
    /// Question body.
    pub text: String,
    /// Marks as written on the paper, e.g. `"[4]"`. Empty for instructions.
    pub marks: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    /// MCQ options in order (at most four). Empty for other kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    pub has_diagram: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    /// Absolute 0-based index into the scanned page sequence.
    pub page_index: usize,
    /// Full-resolution image of the source page.
    pub source_image: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<DiagramRef>,
}

impl TranscribedQuestion {
    /// True while a flagged diagram has not been cropped yet.
    pub fn needs_crop(&self) -> bool {
        matches!(self.diagram, Some(DiagramRef::NeedsCrop))
    }
}

/// A titled, ordered group of questions sharing a layout.
///
/// Sections from different chunks are never merged, even when the model
/// gives them the same title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribedSection {
    pub title: String,
    pub layout: LayoutHint,
    pub questions: Vec<TranscribedQuestion>,
}

/// Outcome of one chunk of pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    /// 0-based chunk ordinal.
    pub chunk_index: usize,
    /// Absolute index of the chunk's first page.
    pub first_page: usize,
    /// Number of pages in the chunk.
    pub page_count: usize,
    /// Sections read from the chunk, or the single placeholder section when
    /// the chunk failed.
    pub sections: Vec<TranscribedSection>,
    pub duration_ms: u64,
    /// Set when the chunk failed and `sections` holds the placeholder.
    pub error: Option<PipelineError>,
}

/// Aggregate statistics for a scan run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_pages: usize,
    pub total_chunks: usize,
    pub failed_chunks: usize,
    pub total_sections: usize,
    pub total_questions: usize,
    pub diagrams_flagged: usize,
    pub diagrams_cropped: usize,
    pub diagrams_unresolved: usize,
    pub total_duration_ms: u64,
    pub transcription_duration_ms: u64,
    pub crop_duration_ms: u64,
}

/// The complete result of a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutput {
    /// All sections, in page order.
    pub sections: Vec<TranscribedSection>,
    /// Per-chunk outcomes. Serialised as summaries without their sections,
    /// which already appear in `sections`.
    #[serde(default, with = "chunk_summaries")]
    pub chunks: Vec<ChunkResult>,
    pub stats: ScanStats,
}

impl ScanOutput {
    /// Iterate every question across all sections, in order.
    pub fn questions(&self) -> impl Iterator<Item = &TranscribedQuestion> {
        self.sections.iter().flat_map(|s| s.questions.iter())
    }

    /// Page ranges (1-indexed, inclusive) of the chunks that failed and must
    /// be rescanned.
    pub fn failed_ranges(&self) -> Vec<(usize, usize)> {
        self.chunks
            .iter()
            .filter(|c| c.error.is_some())
            .map(|c| (c.first_page + 1, c.first_page + c.page_count))
            .collect()
    }
}

/// Serde adapter writing [`ChunkResult`]s without their sections, so a
/// saved output keeps its failed ranges without repeating every question.
mod chunk_summaries {
    use super::ChunkResult;
    use crate::error::PipelineError;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct SummaryRef<'a> {
        chunk_index: usize,
        first_page: usize,
        page_count: usize,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'a PipelineError>,
    }

    #[derive(Deserialize)]
    struct Summary {
        chunk_index: usize,
        first_page: usize,
        page_count: usize,
        #[serde(default)]
        duration_ms: u64,
        #[serde(default)]
        error: Option<PipelineError>,
    }

    pub fn serialize<S: Serializer>(chunks: &[ChunkResult], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(chunks.iter().map(|c| SummaryRef {
            chunk_index: c.chunk_index,
            first_page: c.first_page,
            page_count: c.page_count,
            duration_ms: c.duration_ms,
            error: c.error.as_ref(),
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ChunkResult>, D::Error> {
        let summaries = Vec::<Summary>::deserialize(d)?;
        Ok(summaries
            .into_iter()
            .map(|s| ChunkResult {
                chunk_index: s.chunk_index,
                first_page: s.first_page,
                page_count: s.page_count,
                sections: Vec::new(),
                duration_ms: s.duration_ms,
                error: s.error,
            })
            .collect())
    }
}
