//! Integration tests for the scan pipeline.
//!
//! Every external capability (image codec, transcription endpoint, diagram
//! store, sleeper, id source) is replaced by an in-memory fake, so these run
//! offline and instantly.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_exam_scan::pipeline::crop::CropRect;
use edgequake_exam_scan::pipeline::request::TranscriptionRequest;
use edgequake_exam_scan::{
    scan_stream_with, scan_with, BlobStore, DiagramRef, ExamScanError, IdGenerator, ImageCodec,
    Page, PipelineError, PreparedImage, QuestionType, ScanConfig, ScanDeps, ScanOutput,
    ScanProgressCallback, ScanStatus, Sleeper, TranscriptionClient,
};
use futures::StreamExt;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

type EventLog = Arc<Mutex<Vec<String>>>;

/// Codec that never touches the filesystem. Pages whose name contains
/// "corrupt" fail to prepare, "nodims" report no size, and "nocrop" cannot
/// be cropped.
#[derive(Default)]
struct FakeCodec {
    crops: Mutex<Vec<(PathBuf, CropRect)>>,
}

#[async_trait]
impl ImageCodec for FakeCodec {
    async fn prepare(&self, source: &Path) -> Result<PreparedImage, PipelineError> {
        let name = source.display().to_string();
        if name.contains("corrupt") {
            return Err(PipelineError::ImageProcessing {
                path: source.to_path_buf(),
                detail: "cannot decode".into(),
            });
        }
        Ok(PreparedImage {
            data: name,
            mime_type: "image/jpeg".into(),
            width: 800,
            height: 800,
            derived_path: None,
        })
    }

    async fn dimensions(&self, source: &Path) -> Result<(u32, u32), PipelineError> {
        if source.display().to_string().contains("nodims") {
            return Err(PipelineError::ImageProcessing {
                path: source.to_path_buf(),
                detail: "unreadable header".into(),
            });
        }
        Ok((1000, 1000))
    }

    async fn crop_lossless(&self, source: &Path, rect: CropRect) -> Result<Vec<u8>, PipelineError> {
        if source.display().to_string().contains("nocrop") {
            return Err(PipelineError::ImageProcessing {
                path: source.to_path_buf(),
                detail: "truncated image data".into(),
            });
        }
        self.crops.lock().unwrap().push((source.to_path_buf(), rect));
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

/// Client replaying scripted responses in order.
struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String, PipelineError>>>,
    image_counts: Mutex<Vec<usize>>,
    events: EventLog,
}

impl ScriptedClient {
    fn new(responses: Vec<Result<String, PipelineError>>, events: EventLog) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            image_counts: Mutex::new(Vec::new()),
            events,
        }
    }
}

#[async_trait]
impl TranscriptionClient for ScriptedClient {
    async fn transcribe(&self, request: &TranscriptionRequest) -> Result<String, PipelineError> {
        self.image_counts.lock().unwrap().push(request.image_count());
        self.events.lock().unwrap().push("request".into());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(empty_response()))
    }
}

struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
    events: EventLog,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.events.lock().unwrap().push("sleep".into());
    }
}

/// Store keeping blobs in memory. The first `failures` writes fail.
#[derive(Default)]
struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    failures: AtomicUsize,
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn persist(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PipelineError::DiagramCrop {
                detail: format!("cannot write {name}: disk full"),
            });
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        Ok(PathBuf::from("/mem").join(name))
    }
}

#[derive(Default)]
struct SequentialIds(AtomicUsize);

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        format!("q{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Default)]
struct RecordingProgress {
    statuses: Mutex<Vec<String>>,
    chunk_errors: Mutex<Vec<usize>>,
    completed: Mutex<Option<(usize, usize)>>,
}

impl ScanProgressCallback for RecordingProgress {
    fn on_status(&self, status: &ScanStatus) {
        self.statuses.lock().unwrap().push(status.to_string());
    }

    fn on_chunk_error(&self, chunk: usize, _total_chunks: usize, _error: &str) {
        self.chunk_errors.lock().unwrap().push(chunk);
    }

    fn on_scan_complete(&self, total_chunks: usize, failed_chunks: usize) {
        *self.completed.lock().unwrap() = Some((total_chunks, failed_chunks));
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    deps: ScanDeps,
    codec: Arc<FakeCodec>,
    client: Arc<ScriptedClient>,
    sleeper: Arc<RecordingSleeper>,
    store: Arc<MemoryStore>,
    events: EventLog,
}

fn harness(responses: Vec<Result<String, PipelineError>>) -> Harness {
    let events: EventLog = Arc::default();
    let codec = Arc::new(FakeCodec::default());
    let client = Arc::new(ScriptedClient::new(responses, Arc::clone(&events)));
    let sleeper = Arc::new(RecordingSleeper {
        sleeps: Mutex::new(Vec::new()),
        events: Arc::clone(&events),
    });
    let store = Arc::new(MemoryStore::default());

    let deps = ScanDeps {
        client: client.clone(),
        codec: codec.clone(),
        store: store.clone(),
        sleeper: sleeper.clone(),
        ids: Arc::new(SequentialIds::default()),
    };
    Harness {
        deps,
        codec,
        client,
        sleeper,
        store,
        events,
    }
}

fn pages(n: usize) -> Vec<Page> {
    (0..n)
        .map(|i| Page::new(format!("/scans/page{i}.jpg")))
        .collect()
}

fn empty_response() -> String {
    json!({ "sections": [] }).to_string()
}

fn one_question(number: &str, page_index: usize) -> String {
    json!({
        "sections": [{
            "title": format!("Section {number}"),
            "layout_hint": "one_column",
            "questions": [{
                "number": number,
                "text": format!("Question {number}"),
                "marks": "[2]",
                "type": "standard",
                "page_index": page_index
            }]
        }]
    })
    .to_string()
}

fn diagram_response() -> String {
    json!({
        "sections": [{
            "title": "Geometry",
            "layout_hint": "two_column",
            "questions": [
                {
                    "number": "1",
                    "text": "Find angle x.",
                    "marks": "[3]",
                    "type": "standard",
                    "has_diagram": true,
                    "box_2d": [100, 100, 200, 200],
                    "page_index": 0
                },
                {
                    "number": "2",
                    "text": "State the theorem used.",
                    "marks": "[1]",
                    "type": "standard",
                    "has_diagram": false,
                    "page_index": 0
                },
                {
                    "number": "3",
                    "text": "Which is a prime?",
                    "marks": "[1]",
                    "type": "mcq",
                    "options": ["4", "6", "7", "9"],
                    "page_index": 0
                }
            ]
        }]
    })
    .to_string()
}

/// Two flagged diagrams, one on each of the chunk's first two pages.
fn two_diagram_response() -> String {
    json!({
        "sections": [{
            "title": "Graphs",
            "questions": [
                {
                    "number": "1", "text": "Sketch y = x².", "marks": "[2]", "type": "standard",
                    "has_diagram": true, "box_2d": [100, 100, 200, 200], "page_index": 0
                },
                {
                    "number": "2", "text": "Label the axes.", "marks": "[1]", "type": "standard",
                    "has_diagram": true, "box_2d": [100, 100, 200, 200], "page_index": 1
                }
            ]
        }]
    })
    .to_string()
}

fn config() -> ScanConfig {
    ScanConfig::default()
}

// ── Scheduling ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn seven_pages_make_three_paced_chunks() {
    let h = harness(vec![]);
    let out = scan_with(&pages(7), &h.deps, &config()).await.unwrap();

    assert_eq!(out.stats.total_chunks, 3);
    assert_eq!(out.chunks.len(), 3);
    assert_eq!(*h.client.image_counts.lock().unwrap(), vec![3, 3, 1]);

    let sleeps = h.sleeper.sleeps.lock().unwrap().clone();
    assert_eq!(sleeps.len(), 2, "no delay before the first chunk");
    assert!(sleeps.iter().all(|d| *d >= Duration::from_millis(2500)));

    let events = h.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec!["request", "sleep", "request", "sleep", "request"]
    );
}

#[tokio::test]
async fn custom_chunk_size_and_delay() {
    let h = harness(vec![]);
    let config = ScanConfig::builder()
        .chunk_size(2)
        .chunk_delay_ms(0)
        .build()
        .unwrap();
    let out = scan_with(&pages(5), &h.deps, &config).await.unwrap();
    assert_eq!(out.stats.total_chunks, 3);
    assert_eq!(*h.client.image_counts.lock().unwrap(), vec![2, 2, 1]);
    assert!(h.sleeper.sleeps.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_page_list_is_fatal() {
    let h = harness(vec![]);
    let err = scan_with(&[], &h.deps, &config()).await.unwrap_err();
    assert!(matches!(err, ExamScanError::NoPages));
}

// ── Failure isolation ────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_chunk_becomes_placeholder_and_run_continues() {
    let h = harness(vec![
        Ok(one_question("1", 0)),
        Err(PipelineError::TranscriptionRequest {
            detail: "connection reset".into(),
        }),
        Ok(one_question("7", 0)),
    ]);
    let progress = Arc::new(RecordingProgress::default());
    let config = ScanConfig::builder()
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    let out = scan_with(&pages(7), &h.deps, &config).await.unwrap();

    assert_eq!(out.stats.failed_chunks, 1);
    assert_eq!(out.failed_ranges(), vec![(4, 6)]);
    assert_eq!(h.client.image_counts.lock().unwrap().len(), 3);

    let titles: Vec<&str> = out.sections.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Section 1", "Pages 4-6 (Scan Failed)", "Section 7"]
    );
    let placeholder = &out.sections[1].questions[0];
    assert!(placeholder.text.contains("rescan pages 4-6 individually"));
    assert_eq!(placeholder.page_index, 3);
    assert_eq!(out.sections[2].questions[0].page_index, 6);

    assert_eq!(*progress.chunk_errors.lock().unwrap(), vec![2]);
    assert_eq!(*progress.completed.lock().unwrap(), Some((3, 1)));
}

#[tokio::test]
async fn unparseable_response_fails_only_its_chunk() {
    let h = harness(vec![Ok("I'm sorry, I can't read this.".into()), Ok(one_question("4", 0))]);
    let out = scan_with(&pages(4), &h.deps, &config()).await.unwrap();

    assert_eq!(out.failed_ranges(), vec![(1, 3)]);
    assert!(matches!(
        out.chunks[0].error,
        Some(PipelineError::TranscriptionParse { .. })
    ));
    assert_eq!(out.sections[1].questions[0].number, "4");
}

#[tokio::test]
async fn image_failure_fails_chunk_without_request() {
    let h = harness(vec![Ok(one_question("4", 0))]);
    let mut pages = pages(4);
    pages[1] = Page::new("/scans/corrupt.jpg");

    let out = scan_with(&pages, &h.deps, &config()).await.unwrap();

    assert_eq!(out.failed_ranges(), vec![(1, 3)]);
    assert!(matches!(
        out.chunks[0].error,
        Some(PipelineError::ImageProcessing { .. })
    ));
    // Only the second chunk reached the endpoint.
    assert_eq!(*h.client.image_counts.lock().unwrap(), vec![1]);
    assert_eq!(out.sections[1].questions[0].text, "Question 4");
}

#[tokio::test]
async fn response_without_sections_fails_its_chunk() {
    let h = harness(vec![
        Ok(r#"{"candidates_blocked":true}"#.into()),
        Ok(r#"{"message":"quota exceeded"#.into()),
    ]);
    let config = ScanConfig::builder().chunk_size(2).build().unwrap();
    let out = scan_with(&pages(4), &h.deps, &config).await.unwrap();

    assert_eq!(out.stats.failed_chunks, 2);
    assert_eq!(out.failed_ranges(), vec![(1, 2), (3, 4)]);
    assert!(out
        .chunks
        .iter()
        .all(|c| matches!(c.error, Some(PipelineError::TranscriptionParse { .. }))));
    let titles: Vec<&str> = out.sections.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Pages 1-2 (Scan Failed)", "Pages 3-4 (Scan Failed)"]
    );
}

#[tokio::test]
async fn truncated_response_is_rescued() {
    let truncated = r#"{"sections":[{"title":"A","questions":[{"number":"1","text":"x"#;
    let h = harness(vec![Ok(truncated.into())]);
    let out = scan_with(&pages(1), &h.deps, &config()).await.unwrap();

    assert_eq!(out.stats.failed_chunks, 0);
    assert_eq!(out.sections[0].title, "A");
    assert_eq!(out.sections[0].questions[0].text, "x");
}

// ── Re-indexing ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn local_page_index_resolves_to_absolute_page() {
    let h = harness(vec![
        Ok(empty_response()),
        Ok(empty_response()),
        Ok(one_question("9", 1)),
    ]);
    let out = scan_with(&pages(9), &h.deps, &config()).await.unwrap();

    let q = out.questions().next().expect("one question");
    assert_eq!(q.page_index, 7);
    assert_eq!(q.source_image, PathBuf::from("/scans/page7.jpg"));
}

#[tokio::test]
async fn out_of_range_page_index_clamps_to_chunk_start() {
    let h = harness(vec![Ok(empty_response()), Ok(one_question("5", 3))]);
    let out = scan_with(&pages(5), &h.deps, &config()).await.unwrap();

    // Second chunk holds pages 3..5 (two pages); local index 3 is invalid.
    let q = out.questions().next().unwrap();
    assert_eq!(q.page_index, 3);
}

#[tokio::test]
async fn ids_are_unique_across_chunks() {
    let h = harness(vec![
        Ok(diagram_response()),
        Ok(diagram_response()),
    ]);
    let out = scan_with(&pages(6), &h.deps, &config()).await.unwrap();
    let mut ids: Vec<&str> = out.questions().map(|q| q.id.as_str()).collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
    assert_eq!(total, 6);
}

// ── Diagram cropping ─────────────────────────────────────────────────────────

#[tokio::test]
async fn flagged_diagram_is_cropped_and_persisted() {
    let h = harness(vec![Ok(diagram_response())]);
    let out = scan_with(&pages(1), &h.deps, &config()).await.unwrap();

    let questions: Vec<_> = out.questions().collect();
    match &questions[0].diagram {
        Some(DiagramRef::Cropped(path)) => {
            assert!(path.starts_with("/mem"));
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.starts_with("diagram_") && name.ends_with(".png"));
        }
        other => panic!("expected a cropped diagram, got {other:?}"),
    }
    assert_eq!(questions[1].diagram, None);
    assert_eq!(questions[2].kind, QuestionType::Mcq);
    assert_eq!(questions[2].options, vec!["4", "6", "7", "9"]);

    let crops = h.codec.crops.lock().unwrap().clone();
    assert_eq!(crops.len(), 1, "only the flagged question is cropped");
    assert_eq!(crops[0].0, PathBuf::from("/scans/page0.jpg"));
    assert_eq!(
        crops[0].1,
        CropRect {
            x: 50,
            y: 50,
            width: 200,
            height: 200
        }
    );
    assert_eq!(h.store.blobs.lock().unwrap().len(), 1);

    assert_eq!(out.stats.diagrams_flagged, 1);
    assert_eq!(out.stats.diagrams_cropped, 1);
    assert_eq!(out.stats.diagrams_unresolved, 0);
}

#[tokio::test]
async fn unreadable_dimensions_fall_back_to_square() {
    let h = harness(vec![Ok(diagram_response())]);
    let pages = vec![Page::new("/scans/nodims.jpg")];
    let out = scan_with(&pages, &h.deps, &config()).await.unwrap();

    assert_eq!(out.stats.diagrams_cropped, 1);
    assert_eq!(h.codec.crops.lock().unwrap()[0].1.width, 200);
}

#[tokio::test]
async fn diagram_without_box_stays_unresolved() {
    let response = json!({
        "sections": [{
            "title": "A",
            "questions": [{
                "number": "1", "text": "Sketch", "marks": "[2]", "type": "standard",
                "has_diagram": true, "box_2d": [1, 2], "page_index": 0
            }]
        }]
    })
    .to_string();
    let h = harness(vec![Ok(response)]);
    let out = scan_with(&pages(1), &h.deps, &config()).await.unwrap();

    let q = out.questions().next().unwrap();
    assert!(q.needs_crop());
    assert!(q.bbox.is_none());
    assert!(h.codec.crops.lock().unwrap().is_empty());
    assert_eq!(out.stats.diagrams_unresolved, 1);
}

#[tokio::test]
async fn failed_crop_leaves_question_flagged_and_batch_continues() {
    let h = harness(vec![Ok(two_diagram_response())]);
    let pages = vec![Page::new("/scans/nocrop.jpg"), Page::new("/scans/page1.jpg")];
    let out = scan_with(&pages, &h.deps, &config()).await.unwrap();

    let questions: Vec<_> = out.questions().collect();
    assert!(questions[0].needs_crop());
    assert!(matches!(questions[1].diagram, Some(DiagramRef::Cropped(_))));
    assert_eq!(h.codec.crops.lock().unwrap().len(), 1);
    assert_eq!(h.store.blobs.lock().unwrap().len(), 1);

    assert_eq!(out.stats.failed_chunks, 0);
    assert_eq!(out.stats.diagrams_flagged, 2);
    assert_eq!(out.stats.diagrams_cropped, 1);
    assert_eq!(out.stats.diagrams_unresolved, 1);
}

#[tokio::test]
async fn failed_persist_leaves_question_flagged_and_batch_continues() {
    let h = harness(vec![Ok(two_diagram_response())]);
    h.store.failures.store(1, Ordering::SeqCst);
    let out = scan_with(&pages(2), &h.deps, &config()).await.unwrap();

    let questions: Vec<_> = out.questions().collect();
    assert!(questions[0].needs_crop());
    match &questions[1].diagram {
        Some(DiagramRef::Cropped(path)) => assert!(path.starts_with("/mem")),
        other => panic!("expected a cropped diagram, got {other:?}"),
    }
    assert_eq!(h.codec.crops.lock().unwrap().len(), 2);
    assert_eq!(h.store.blobs.lock().unwrap().len(), 1);

    assert_eq!(out.stats.diagrams_cropped, 1);
    assert_eq!(out.stats.diagrams_unresolved, 1);
}

#[tokio::test]
async fn cropping_can_be_disabled() {
    let h = harness(vec![Ok(diagram_response())]);
    let config = ScanConfig::builder().crop_diagrams(false).build().unwrap();
    let out = scan_with(&pages(1), &h.deps, &config).await.unwrap();

    assert!(out.questions().next().unwrap().needs_crop());
    assert!(h.codec.crops.lock().unwrap().is_empty());
    assert_eq!(out.stats.diagrams_flagged, 1);
    assert_eq!(out.stats.diagrams_unresolved, 1);
}

// ── Progress ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_milestones_in_order() {
    let h = harness(vec![Ok(empty_response()), Ok(diagram_response())]);
    let progress = Arc::new(RecordingProgress::default());
    let config = ScanConfig::builder()
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    scan_with(&pages(4), &h.deps, &config).await.unwrap();

    let statuses = progress.statuses.lock().unwrap().clone();
    let keywords: Vec<&str> = statuses
        .iter()
        .map(|s| {
            ["optimizing", "cooling down", "reading", "formatting", "cropping diagram 1"]
                .into_iter()
                .find(|k| s.starts_with(k))
                .unwrap_or("?")
        })
        .collect();
    assert_eq!(
        keywords,
        vec![
            "optimizing",
            "reading",
            "optimizing",
            "cooling down",
            "reading",
            "formatting",
            "cropping diagram 1",
        ]
    );
    assert!(statuses[0].contains("pages 1-3"));
    assert!(statuses[2].contains("pages 4-4"));
}

// ── Streaming ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_yields_chunks_in_page_order() {
    let h = harness(vec![
        Ok(one_question("1", 0)),
        Err(PipelineError::TranscriptionRequest {
            detail: "HTTP 429".into(),
        }),
        Ok(diagram_response()),
    ]);
    let stream = scan_stream_with(pages(7), h.deps.clone(), &config()).unwrap();
    let chunks: Vec<_> = stream.collect().await;

    assert_eq!(chunks.len(), 3);
    let firsts: Vec<usize> = chunks.iter().map(|c| c.first_page).collect();
    assert_eq!(firsts, vec![0, 3, 6]);
    assert!(chunks[1].error.is_some());
    assert_eq!(chunks[1].sections[0].title, "Pages 4-6 (Scan Failed)");

    let cropped = &chunks[2].sections[0].questions[0];
    assert!(matches!(cropped.diagram, Some(DiagramRef::Cropped(_))));
    assert_eq!(cropped.page_index, 6);
}

#[tokio::test]
async fn stream_reports_formatting_and_completion_after_last_chunk() {
    let h = harness(vec![
        Ok(one_question("1", 0)),
        Err(PipelineError::TranscriptionRequest {
            detail: "HTTP 503".into(),
        }),
    ]);
    let progress = Arc::new(RecordingProgress::default());
    let config = ScanConfig::builder()
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    let stream = scan_stream_with(pages(4), h.deps.clone(), &config).unwrap();
    let chunks: Vec<_> = stream.collect().await;

    assert_eq!(chunks.len(), 2);
    let statuses = progress.statuses.lock().unwrap().clone();
    assert!(statuses.last().unwrap().starts_with("formatting"));
    assert_eq!(
        statuses.iter().filter(|s| s.starts_with("formatting")).count(),
        1
    );
    assert_eq!(*progress.completed.lock().unwrap(), Some((2, 1)));
}

// ── Serialisation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn output_round_trips_through_json() {
    let h = harness(vec![Ok(diagram_response())]);
    let out = scan_with(&pages(2), &h.deps, &config()).await.unwrap();

    let text = serde_json::to_string(&out).unwrap();
    let back: ScanOutput = serde_json::from_str(&text).unwrap();
    assert_eq!(back.sections, out.sections);
    assert_eq!(back.stats.total_questions, 3);
    assert_eq!(back.chunks.len(), 1);
    assert!(back.chunks[0].sections.is_empty());

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let q0 = &value["sections"][0]["questions"][0];
    assert_eq!(q0["type"], "standard");
    assert_eq!(q0["diagram"]["state"], "cropped");
    assert_eq!(q0["bbox"]["xmin"], 100);
}

#[tokio::test]
async fn failed_ranges_survive_json_round_trip() {
    let h = harness(vec![
        Ok(one_question("1", 0)),
        Err(PipelineError::TranscriptionRequest {
            detail: "connection reset".into(),
        }),
    ]);
    let out = scan_with(&pages(4), &h.deps, &config()).await.unwrap();
    assert_eq!(out.failed_ranges(), vec![(4, 4)]);

    let text = serde_json::to_string(&out).unwrap();
    let back: ScanOutput = serde_json::from_str(&text).unwrap();
    assert_eq!(back.failed_ranges(), vec![(4, 4)]);
    assert!(matches!(
        back.chunks[1].error,
        Some(PipelineError::TranscriptionRequest { .. })
    ));
}

#[test]
fn blocking_run_with_tokio_test() {
    let h = harness(vec![Ok(one_question("1", 0))]);
    let config = ScanConfig::builder().crop_diagrams(false).build().unwrap();
    let out = tokio_test::block_on(scan_with(&pages(1), &h.deps, &config)).unwrap();
    assert_eq!(out.stats.total_questions, 1);
}
