//! Chunk planning and result re-indexing.
//!
//! The model only ever sees one chunk, so every `page_index` it returns is
//! local to that chunk. Re-indexing turns those into absolute page indices,
//! resolves the source image for each question, and assigns run-wide ids.

use crate::output::{
    BoundingBox, DiagramRef, LayoutHint, QuestionType, TranscribedQuestion, TranscribedSection,
};
use crate::pipeline::schema::RawTranscription;
use crate::session::Page;
use std::path::PathBuf;
use tracing::debug;

/// Maximum MCQ options kept per question.
pub const MAX_MCQ_OPTIONS: usize = 4;

/// Source of question identifiers. Must be unique across a run.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// A contiguous run of pages sent in one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// 0-based chunk ordinal.
    pub index: usize,
    /// Absolute index of the first page.
    pub start: usize,
    /// Number of pages (1..=chunk_size).
    pub len: usize,
}

impl ChunkSpan {
    /// Page range as shown to users: 1-indexed, inclusive.
    pub fn display_range(&self) -> (usize, usize) {
        (self.start + 1, self.start + self.len)
    }

    pub fn pages<'a>(&self, pages: &'a [Page]) -> &'a [Page] {
        let end = (self.start + self.len).min(pages.len());
        &pages[self.start.min(end)..end]
    }
}

/// Split `total_pages` into consecutive chunks of at most `chunk_size`.
///
/// Yields `ceil(total_pages / chunk_size)` spans; only the last may be short.
pub fn plan_chunks(total_pages: usize, chunk_size: usize) -> Vec<ChunkSpan> {
    let size = chunk_size.max(1);
    (0..total_pages)
        .step_by(size)
        .enumerate()
        .map(|(index, start)| ChunkSpan {
            index,
            start,
            len: size.min(total_pages - start),
        })
        .collect()
}

/// Map one chunk's parsed response onto absolute pages.
///
/// A missing or out-of-range local `page_index` is clamped to the chunk's
/// first page.
pub fn reindex(
    raw: RawTranscription,
    span: &ChunkSpan,
    pages: &[Page],
    ids: &dyn IdGenerator,
) -> Vec<TranscribedSection> {
    raw.sections
        .into_iter()
        .map(|section| TranscribedSection {
            title: section.title,
            layout: LayoutHint::from_hint(&section.layout_hint),
            questions: section
                .questions
                .into_iter()
                .map(|q| {
                    let local = q.page_index.filter(|&i| i < span.len).unwrap_or_else(|| {
                        debug!(
                            "Question {:?}: page_index {:?} outside chunk of {}; using 0",
                            q.number, q.page_index, span.len
                        );
                        0
                    });
                    let page_index = span.start + local;
                    let kind = QuestionType::from_tag(&q.kind);
                    let options = match kind {
                        QuestionType::Mcq => {
                            q.options.into_iter().take(MAX_MCQ_OPTIONS).collect()
                        }
                        _ => Vec::new(),
                    };

                    TranscribedQuestion {
                        id: ids.next_id(),
                        number: q.number,
                        text: q.text,
                        marks: q.marks,
                        kind,
                        options,
                        has_diagram: q.has_diagram,
                        bbox: q.box_2d.as_deref().and_then(BoundingBox::from_model),
                        page_index,
                        source_image: pages
                            .get(page_index)
                            .map(|p| p.source.clone())
                            .unwrap_or_else(PathBuf::new),
                        diagram: q.has_diagram.then_some(DiagramRef::NeedsCrop),
                    }
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::{RawQuestion, RawSection};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SequentialIds(AtomicUsize);

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> String {
            format!("q{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn pages(n: usize) -> Vec<Page> {
        (0..n).map(|i| Page::new(format!("/scans/p{i}.jpg"))).collect()
    }

    fn question(number: &str, page_index: Option<usize>) -> RawQuestion {
        RawQuestion {
            number: number.into(),
            text: format!("text {number}"),
            marks: "[2]".into(),
            kind: "standard".into(),
            page_index,
            ..Default::default()
        }
    }

    fn raw(questions: Vec<RawQuestion>) -> RawTranscription {
        RawTranscription {
            sections: vec![RawSection {
                title: "Section A".into(),
                layout_hint: "two_column".into(),
                questions,
            }],
        }
    }

    #[test]
    fn plan_covers_every_page_once() {
        let plan = plan_chunks(7, 3);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0], ChunkSpan { index: 0, start: 0, len: 3 });
        assert_eq!(plan[2], ChunkSpan { index: 2, start: 6, len: 1 });
        assert_eq!(plan.iter().map(|c| c.len).sum::<usize>(), 7);
        assert!(plan_chunks(0, 3).is_empty());
        assert_eq!(plan_chunks(6, 3).len(), 2);
    }

    #[test]
    fn local_index_maps_to_absolute() {
        let pages = pages(9);
        let span = ChunkSpan { index: 2, start: 6, len: 3 };
        let ids = SequentialIds(AtomicUsize::new(0));
        let out = reindex(raw(vec![question("1", Some(1))]), &span, &pages, &ids);
        let q = &out[0].questions[0];
        assert_eq!(q.page_index, 7);
        assert_eq!(q.source_image, PathBuf::from("/scans/p7.jpg"));
        assert_eq!(out[0].layout, LayoutHint::TwoColumn);
    }

    #[test]
    fn out_of_range_and_missing_clamp_to_chunk_start() {
        let pages = pages(9);
        let span = ChunkSpan { index: 1, start: 3, len: 3 };
        let ids = SequentialIds(AtomicUsize::new(0));
        let out = reindex(
            raw(vec![question("1", Some(3)), question("2", None), question("3", Some(99))]),
            &span,
            &pages,
            &ids,
        );
        for q in &out[0].questions {
            assert_eq!(q.page_index, 3);
        }
    }

    #[test]
    fn diagram_flag_sets_needs_crop() {
        let pages = pages(3);
        let span = ChunkSpan { index: 0, start: 0, len: 3 };
        let mut with = question("1", Some(0));
        with.has_diagram = true;
        with.box_2d = Some(vec![100.0, 100.0, 200.0, 200.0]);
        let without = question("2", Some(0));
        let ids = SequentialIds(AtomicUsize::new(0));

        let out = reindex(raw(vec![with, without]), &span, &pages, &ids);
        assert_eq!(out[0].questions[0].diagram, Some(DiagramRef::NeedsCrop));
        assert!(out[0].questions[0].bbox.is_some());
        assert_eq!(out[0].questions[1].diagram, None);
    }

    #[test]
    fn options_kept_only_for_mcq() {
        let pages = pages(1);
        let span = ChunkSpan { index: 0, start: 0, len: 1 };
        let mut mcq = question("1", Some(0));
        mcq.kind = "mcq".into();
        mcq.options = ["a", "b", "c", "d", "e"].map(String::from).to_vec();
        let mut plain = question("2", Some(0));
        plain.options = vec!["stray".into()];
        let ids = SequentialIds(AtomicUsize::new(0));

        let out = reindex(raw(vec![mcq, plain]), &span, &pages, &ids);
        assert_eq!(out[0].questions[0].options, vec!["a", "b", "c", "d"]);
        assert!(out[0].questions[1].options.is_empty());
    }

    #[test]
    fn reindex_is_idempotent_apart_from_ids() {
        let pages = pages(6);
        let span = ChunkSpan { index: 1, start: 3, len: 3 };
        let input = raw(vec![question("1", Some(2)), question("2", Some(0))]);

        let first = reindex(input.clone(), &span, &pages, &SequentialIds(AtomicUsize::new(0)));
        let second = reindex(input, &span, &pages, &SequentialIds(AtomicUsize::new(100)));

        let strip = |sections: Vec<TranscribedSection>| {
            sections
                .into_iter()
                .map(|mut s| {
                    s.questions.iter_mut().for_each(|q| q.id.clear());
                    s
                })
                .collect::<Vec<_>>()
        };
        assert_ne!(first[0].questions[0].id, second[0].questions[0].id);
        assert_eq!(strip(first), strip(second));
    }

    #[test]
    fn uuid_ids_are_unique() {
        let ids = UuidIdGenerator;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
