//! Prompts for transcribing handwritten exam pages.
//!
//! Every prompt lives here so that changing what the model is asked to do
//! means editing exactly one place, and so tests can inspect prompts without
//! a model. Callers can override the transcription prompt via
//! [`crate::config::ScanConfig::system_prompt`]; the constants here are used
//! only when no override is provided.

/// Placeholder replaced by the number of images in the chunk.
pub const IMAGE_COUNT_PLACEHOLDER: &str = "{image_count}";

/// Default transcription prompt. `{image_count}` is filled in per chunk.
pub const DEFAULT_TRANSCRIPTION_PROMPT: &str = r#"You are given {image_count} photographed page image(s) of a handwritten exam paper, in order. Transcribe every question into the JSON structure described by the response schema.

Follow these rules precisely:

1. EXACT TRANSCRIPTION
   - Copy the wording exactly as written. Do not correct, summarise, or answer questions.
   - Keep mathematical notation readable in plain text.

2. NUMBERING
   - Put the full question label in "number", including nested parts, e.g. "1", "1(a)", "2(b)(ii)".
   - Never repeat the label inside "text".

3. MARKS
   - Put the marks exactly as written (e.g. "[4]", "(2 marks)") in "marks"; use "" when none are shown.

4. INSTRUCTIONS
   - Instructional subheadings ("Answer ALL questions", "Section B") are questions of type "instruction" with empty "number" and "marks".

5. MULTIPLE CHOICE
   - Questions with lettered choices are of type "mcq"; put each choice, without its letter, in "options" (at most 4).
   - All other questions are of type "standard".

6. DIAGRAMS
   - If a question includes a drawn diagram, figure, graph, or table, set "has_diagram" to true and give "box_2d" as [ymin, xmin, ymax, xmax] normalised to 0-1000 relative to that page image.

7. PAGE INDEX
   - Set "page_index" on every question to the 0-based index of the image it appears on (0 to {max_page_index}).

8. SECTIONS
   - Group questions under the headings written on the paper. Use "layout_hint" "one_column" unless the questions are short enough to sit in "two_column" or "three_column" rows.

Output ONLY the JSON object."#;

/// Instruction appended for providers without native schema support.
///
/// The schema JSON is placed after this text.
pub const SCHEMA_INSTRUCTION: &str =
    "Respond with a single JSON object that validates against this JSON schema. \
Do not wrap it in markdown fences and do not add commentary.";

/// User-turn text accompanying the images.
pub fn images_caption(image_count: usize) -> String {
    format!("Transcribe the {image_count} attached exam page image(s).")
}

/// Render a transcription prompt template for a chunk of `image_count` images.
pub fn transcription_prompt(template: &str, image_count: usize) -> String {
    template
        .replace(IMAGE_COUNT_PLACEHOLDER, &image_count.to_string())
        .replace(
            "{max_page_index}",
            &image_count.saturating_sub(1).to_string(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_parameterised_by_image_count() {
        let p = transcription_prompt(DEFAULT_TRANSCRIPTION_PROMPT, 3);
        assert!(p.contains("given 3 photographed"));
        assert!(p.contains("0 to 2"));
        assert!(!p.contains("{image_count}"));
        assert!(!p.contains("{max_page_index}"));
    }

    #[test]
    fn prompt_covers_every_rule() {
        let p = DEFAULT_TRANSCRIPTION_PROMPT;
        for needle in ["1(a)", "instruction", "mcq", "box_2d", "page_index", "0-based"] {
            assert!(p.contains(needle), "prompt should mention {needle}");
        }
    }

    #[test]
    fn single_image_prompt() {
        let p = transcription_prompt(DEFAULT_TRANSCRIPTION_PROMPT, 1);
        assert!(p.contains("0 to 0"));
    }

    #[test]
    fn custom_template_substitution() {
        let p = transcription_prompt("read {image_count} pages", 2);
        assert_eq!(p, "read 2 pages");
    }
}
