//! Whole-run tests with in-memory engine, merger and converter.
//!
//! Every slide document carries its id in `<title>`; the fake engine reads
//! the staged file to decide how that slide behaves, and writes a one-line
//! "page" naming it. The fake merger concatenates those lines, so the merged
//! file spells out the final page order.

use async_trait::async_trait;
use html2pptx::pipeline::assemble::PageMerger;
use html2pptx::pipeline::engine::{EngineSession, RenderEngine, Viewport};
use html2pptx::pipeline::office::DocumentConverter;
use html2pptx::{
    convert_with, AssemblyError, Collaborators, ConversionError, ConversionProgressCallback,
    DeckConfig, DeckError, PageGeometry, RenderAttemptError, RenderOutcome, RunStatus,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct Behaviour {
    fail: bool,
    height: u32,
    delay_ms: u64,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            fail: false,
            height: 720,
            delay_ms: 0,
        }
    }
}

#[derive(Default)]
struct FakeEngine {
    behaviours: HashMap<String, Behaviour>,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    launches: Arc<AtomicUsize>,
    /// Staged markup seen per slide id.
    documents: Arc<Mutex<HashMap<String, String>>>,
}

impl FakeEngine {
    fn with(mut self, id: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(id.to_string(), behaviour);
        self
    }
}

struct FakeSession {
    behaviours: HashMap<String, Behaviour>,
    current: Option<(String, Behaviour)>,
    live: Arc<AtomicUsize>,
    documents: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn launch(&self, _viewport: Viewport) -> Result<Box<dyn EngineSession>, RenderAttemptError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            behaviours: self.behaviours.clone(),
            current: None,
            live: Arc::clone(&self.live),
            documents: Arc::clone(&self.documents),
        }))
    }
}

fn title_of(html: &str) -> Option<String> {
    let start = html.find("<title>")? + "<title>".len();
    let end = html[start..].find("</title>")? + start;
    Some(html[start..end].to_string())
}

#[async_trait]
impl EngineSession for FakeSession {
    async fn load(&mut self, document: &Path, _timeout: Duration) -> Result<(), RenderAttemptError> {
        let html = fs::read_to_string(document)?;
        let id = title_of(&html).ok_or_else(|| RenderAttemptError::Navigation("no title".into()))?;
        let behaviour = self.behaviours.get(&id).copied().unwrap_or_default();
        self.documents.lock().unwrap().insert(id.clone(), html);
        if behaviour.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(behaviour.delay_ms)).await;
        }
        if behaviour.fail {
            return Err(RenderAttemptError::Navigation(format!("{id}: simulated crash")));
        }
        self.current = Some((id, behaviour));
        Ok(())
    }

    async fn content_height(&mut self, _selector: &str) -> Result<u32, RenderAttemptError> {
        let (_, behaviour) = self
            .current
            .as_ref()
            .ok_or_else(|| RenderAttemptError::Measure("nothing loaded".into()))?;
        Ok(behaviour.height)
    }

    async fn set_viewport(&mut self, _viewport: Viewport) -> Result<(), RenderAttemptError> {
        Ok(())
    }

    async fn print_pdf(&mut self, geometry: &PageGeometry, output: &Path) -> Result<(), RenderAttemptError> {
        let (id, _) = self
            .current
            .as_ref()
            .ok_or_else(|| RenderAttemptError::Print("nothing loaded".into()))?;
        fs::write(output, format!("page:{id}:{}\n", geometry.effective_height()))?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ConcatMerger;

#[async_trait]
impl PageMerger for ConcatMerger {
    async fn merge(&self, pages: &[PathBuf], output: &Path) -> Result<(), AssemblyError> {
        let mut merged = String::new();
        for page in pages {
            merged.push_str(&fs::read_to_string(page).map_err(|e| AssemblyError::Merge(e.to_string()))?);
        }
        fs::write(output, merged).map_err(|e| AssemblyError::Merge(e.to_string()))
    }
}

struct BrokenMerger;

#[async_trait]
impl PageMerger for BrokenMerger {
    async fn merge(&self, _pages: &[PathBuf], _output: &Path) -> Result<(), AssemblyError> {
        Err(AssemblyError::Merge("pdfium could not open page 2".into()))
    }
}

#[derive(Default)]
struct FakeConverter {
    fail: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert(&self, merged_pdf: &Path) -> Result<PathBuf, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ConversionError::Failed {
                exit_code: Some(1),
                stderr: "Error: source file could not be loaded".into(),
            });
        }
        let out = merged_pdf.with_extension("pptx");
        fs::write(&out, b"pptx").map_err(|e| ConversionError::Spawn(e.to_string()))?;
        Ok(out)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

struct Deck {
    dir: TempDir,
    descriptor: PathBuf,
}

impl Deck {
    fn source_dir(&self) -> &Path {
        self.dir.path()
    }

    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn config(&self) -> html2pptx::DeckConfigBuilder {
        DeckConfig::builder()
            .output_dir(self.output_dir())
            .retry_backoff_ms(0)
            .settle_delay_ms(0)
    }

    fn merged_lines(&self) -> Vec<String> {
        fs::read_to_string(self.output_dir().join("presentation.pdf"))
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// Write a deck whose slide `id` has `body` inside `.slide-container`.
/// Ids listed in `missing` are named in the descriptor but not written.
fn deck(slides: &[(&str, &str)], missing: &[&str]) -> Deck {
    let dir = TempDir::new().unwrap();
    for (id, body) in slides {
        fs::write(
            dir.path().join(format!("{id}.html")),
            format!(
                "<!DOCTYPE html><html><head><title>{id}</title></head>\
                 <body><div class=\"slide-container\">{body}</div></body></html>"
            ),
        )
        .unwrap();
    }
    let mut ids: Vec<&str> = slides.iter().map(|(id, _)| *id).collect();
    ids.extend_from_slice(missing);
    let descriptor = dir.path().join("deck.json");
    fs::write(&descriptor, serde_json::json!({ "slide_ids": ids }).to_string()).unwrap();
    Deck { dir, descriptor }
}

fn plain(ids: &[&'static str]) -> Vec<(&'static str, &'static str)> {
    ids.iter().map(|id| (*id, "<h1>slide</h1>")).collect()
}

fn collaborators(engine: FakeEngine, converter: Arc<FakeConverter>) -> (Collaborators, Arc<FakeEngine>) {
    let engine = Arc::new(engine);
    (
        Collaborators {
            engine: Arc::clone(&engine) as Arc<dyn RenderEngine>,
            merger: Arc::new(ConcatMerger),
            converter,
        },
        engine,
    )
}

fn failing() -> Behaviour {
    Behaviour {
        fail: true,
        ..Behaviour::default()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_slide_is_omitted_and_order_is_kept() {
    let deck = deck(&plain(&["s1", "s2", "s3", "s4", "s5"]), &[]);
    let converter = Arc::new(FakeConverter::default());
    let (collab, engine) = collaborators(FakeEngine::default().with("s3", failing()), converter.clone());
    let config = deck.config().concurrency(3).build().unwrap();

    let output = convert_with(&deck.descriptor, &config, &collab).await.unwrap();

    assert_eq!(
        deck.merged_lines(),
        vec!["page:s1:720", "page:s2:720", "page:s4:720", "page:s5:720"]
    );
    assert_eq!(output.status, RunStatus::Partial { succeeded: 4, total: 5 });
    assert_eq!(output.status.to_string(), "partial success (4 of 5 slides)");
    assert_eq!(output.omitted.len(), 1);
    assert_eq!(output.omitted[0].id, "s3");
    assert_eq!(output.omitted[0].attempts, 3);

    // One result per slide, in slide order.
    let ids: Vec<_> = output.slides.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3", "s4", "s5"]);

    // Four slides once each, the failing one three times.
    assert_eq!(engine.launches.load(Ordering::SeqCst), 4 + 3);
    assert_eq!(engine.live.load(Ordering::SeqCst), 0, "sessions leaked");

    assert_eq!(output.pptx, Some(deck.output_dir().join("presentation.pptx")));
    assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(output.stats.failed_slides, 1);
}

#[tokio::test]
async fn concurrency_ceiling_is_respected() {
    let ids = ["a", "b", "c", "d", "e", "f", "g", "h"];
    let deck = deck(&plain(&ids), &[]);
    let mut engine = FakeEngine::default();
    for (i, id) in ids.iter().enumerate() {
        engine = engine.with(
            id,
            Behaviour {
                delay_ms: 5 + (i as u64 % 3) * 10,
                ..Behaviour::default()
            },
        );
    }
    let (collab, engine) = collaborators(engine, Arc::new(FakeConverter::default()));
    let config = deck.config().concurrency(2).pdf_only(true).build().unwrap();

    let output = convert_with(&deck.descriptor, &config, &collab).await.unwrap();

    assert_eq!(output.status, RunStatus::Complete);
    let peak = engine.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak of {peak} live sessions exceeds limit");
    assert_eq!(engine.live.load(Ordering::SeqCst), 0);
    assert_eq!(deck.merged_lines().len(), ids.len());
    assert!(deck.merged_lines()[0].starts_with("page:a"));
    assert!(deck.merged_lines()[7].starts_with("page:h"));
}

#[tokio::test]
async fn missing_source_is_reported_not_fatal() {
    let deck = deck(&plain(&["intro", "outro"]), &["ghost"]);
    let (collab, _) = collaborators(FakeEngine::default(), Arc::new(FakeConverter::default()));
    let config = deck.config().pdf_only(true).build().unwrap();

    let output = convert_with(&deck.descriptor, &config, &collab).await.unwrap();

    assert_eq!(output.status, RunStatus::Complete);
    assert_eq!(output.unresolved.len(), 1);
    assert_eq!(output.unresolved[0].id, "ghost");
    assert_eq!(output.stats.requested_slides, 3);
    assert_eq!(output.stats.scheduled_slides, 2);
    assert_eq!(deck.merged_lines(), vec!["page:intro:720", "page:outro:720"]);
}

#[tokio::test]
async fn no_resolvable_slides_is_fatal() {
    let deck = deck(&[], &["a", "b"]);
    let (collab, engine) = collaborators(FakeEngine::default(), Arc::new(FakeConverter::default()));
    let config = deck.config().build().unwrap();

    let err = convert_with(&deck.descriptor, &config, &collab).await.unwrap_err();

    assert!(matches!(err, DeckError::NoResolvableSlides { requested: 2, .. }), "got {err:?}");
    assert_eq!(engine.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_descriptor_is_fatal() {
    let dir = TempDir::new().unwrap();
    let (collab, _) = collaborators(FakeEngine::default(), Arc::new(FakeConverter::default()));
    let config = DeckConfig::builder().output_dir(dir.path().join("out")).build().unwrap();

    let err = convert_with(dir.path().join("nope.json"), &config, &collab)
        .await
        .unwrap_err();
    assert!(matches!(err, DeckError::DescriptorNotFound { .. }));
}

#[tokio::test]
async fn every_slide_failing_is_total_failure() {
    let deck = deck(&plain(&["x", "y"]), &[]);
    let engine = FakeEngine::default().with("x", failing()).with("y", failing());
    let converter = Arc::new(FakeConverter::default());
    let (collab, _) = collaborators(engine, converter.clone());
    let config = deck.config().max_retries(2).build().unwrap();

    let err = convert_with(&deck.descriptor, &config, &collab).await.unwrap_err();

    match err {
        DeckError::AllSlidesFailed { total, first_error } => {
            assert_eq!(total, 2);
            assert!(first_error.contains("simulated crash"), "got: {first_error}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
    assert!(!deck.output_dir().join(".slides").exists());
}

#[tokio::test]
async fn converter_failure_keeps_the_merged_pdf() {
    let deck = deck(&plain(&["only"]), &[]);
    let converter = Arc::new(FakeConverter {
        fail: true,
        ..FakeConverter::default()
    });
    let (collab, _) = collaborators(FakeEngine::default(), converter);
    let config = deck.config().build().unwrap();

    let output = convert_with(&deck.descriptor, &config, &collab).await.unwrap();

    assert!(output.merged_pdf.exists());
    assert!(output.pptx.is_none());
    assert!(matches!(
        output.conversion_error,
        Some(ConversionError::Failed { exit_code: Some(1), .. })
    ));
    assert_eq!(output.status, RunStatus::Complete);
}

#[tokio::test]
async fn pdf_only_skips_the_converter() {
    let deck = deck(&plain(&["one"]), &[]);
    let converter = Arc::new(FakeConverter::default());
    let (collab, _) = collaborators(FakeEngine::default(), converter.clone());
    let config = deck.config().pdf_only(true).build().unwrap();

    let output = convert_with(&deck.descriptor, &config, &collab).await.unwrap();

    assert!(output.pptx.is_none());
    assert!(output.conversion_error.is_none());
    assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn intermediates_are_removed_unless_kept() {
    let deck_a = deck(&plain(&["p1", "p2"]), &[]);
    let (collab, _) = collaborators(FakeEngine::default(), Arc::new(FakeConverter::default()));
    let config = deck_a.config().pdf_only(true).build().unwrap();
    convert_with(&deck_a.descriptor, &config, &collab).await.unwrap();

    assert!(!deck_a.output_dir().join(".slides").exists());
    let leftovers: Vec<_> = fs::read_dir(deck_a.source_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("html2pptx"))
        .collect();
    assert!(leftovers.is_empty(), "staged files left behind: {leftovers:?}");

    let deck_b = deck(&plain(&["p1", "p2"]), &[]);
    let (collab, _) = collaborators(FakeEngine::default(), Arc::new(FakeConverter::default()));
    let config = deck_b.config().pdf_only(true).keep_intermediates(true).build().unwrap();
    convert_with(&deck_b.descriptor, &config, &collab).await.unwrap();

    let slides = deck_b.output_dir().join(".slides");
    assert!(slides.join("001-p1.pdf").exists());
    assert!(slides.join("002-p2.pdf").exists());
    assert!(deck_b.source_dir().join(".001-p1.html2pptx.html").exists());
}

#[tokio::test]
async fn failed_merge_keeps_slide_pages() {
    let deck = deck(&plain(&["p1", "p2"]), &[]);
    let (mut collab, _) = collaborators(FakeEngine::default(), Arc::new(FakeConverter::default()));
    collab.merger = Arc::new(BrokenMerger);
    let config = deck.config().pdf_only(true).build().unwrap();

    let err = convert_with(&deck.descriptor, &config, &collab).await.unwrap_err();

    match err {
        DeckError::MergeFailed { detail, .. } => assert!(detail.contains("page 2"), "detail: {detail}"),
        other => panic!("unexpected error: {other:?}"),
    }
    let slides = deck.output_dir().join(".slides");
    assert!(slides.join("001-p1.pdf").exists());
    assert!(slides.join("002-p2.pdf").exists());
}

#[tokio::test]
async fn tall_slide_gets_a_tall_page() {
    let deck = deck(&plain(&["short", "tall"]), &[]);
    let engine = FakeEngine::default().with(
        "tall",
        Behaviour {
            height: 1400,
            ..Behaviour::default()
        },
    );
    let (collab, _) = collaborators(engine, Arc::new(FakeConverter::default()));
    let config = deck.config().pdf_only(true).build().unwrap();

    let output = convert_with(&deck.descriptor, &config, &collab).await.unwrap();

    let heights: Vec<u32> = output
        .slides
        .iter()
        .map(|r| match r.outcome {
            RenderOutcome::Success { page_height, .. } => page_height,
            RenderOutcome::Failure { .. } => 0,
        })
        .collect();
    assert_eq!(heights, vec![720, 1400]);
    assert_eq!(deck.merged_lines()[1], "page:tall:1400");
}

#[tokio::test]
async fn icon_glyphs_reach_the_engine_as_inline_svg() {
    let deck = deck(
        &[(
            "icons",
            "<style>.card i { color: #c00; }</style>\
             <div class=\"card\"><i class=\"fa-solid fa-house\"></i> Home \
             <i class=\"fa-solid fa-no-such-icon\"></i></div>",
        )],
        &[],
    );
    let (collab, engine) = collaborators(FakeEngine::default(), Arc::new(FakeConverter::default()));
    let config = deck.config().pdf_only(true).build().unwrap();

    let output = convert_with(&deck.descriptor, &config, &collab).await.unwrap();

    let staged = engine.documents.lock().unwrap().get("icons").cloned().unwrap();
    assert!(staged.contains("<svg"), "no svg in: {staged}");
    assert!(staged.contains("data-icon=\"house\""));
    assert!(!staged.contains("fa-house\"></i>"));
    assert!(staged.contains("fa-no-such-icon\"></i>"), "unknown glyph must pass through");
    assert!(staged.contains(".card i, .card svg"));
    assert!(staged.contains("html2pptx-print-safety"));
    assert_eq!(output.stats.glyphs_replaced, 1);
    assert_eq!(output.stats.glyphs_unresolved, 1);

    // The source file itself is never modified.
    let source = fs::read_to_string(deck.source_dir().join("icons.html")).unwrap();
    assert!(source.contains("<i class=\"fa-solid fa-house\"></i>"));
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl ConversionProgressCallback for Recorder {
    fn on_conversion_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("start:{total}"));
    }
    fn on_slide_retry(&self, id: &str, attempt: u32, max: u32, _error: &str) {
        self.events.lock().unwrap().push(format!("retry:{id}:{attempt}/{max}"));
    }
    fn on_slide_complete(&self, id: &str, _index: usize, _total: usize, _h: u32) {
        self.events.lock().unwrap().push(format!("ok:{id}"));
    }
    fn on_slide_error(&self, id: &str, _index: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("err:{id}"));
    }
    fn on_conversion_complete(&self, total: usize, ok: usize) {
        self.events.lock().unwrap().push(format!("done:{ok}/{total}"));
    }
}

#[tokio::test]
async fn progress_events_cover_every_slide() {
    let deck = deck(&plain(&["good", "bad"]), &[]);
    let recorder = Arc::new(Recorder::default());
    let (collab, _) = collaborators(
        FakeEngine::default().with("bad", failing()),
        Arc::new(FakeConverter::default()),
    );
    let config = deck
        .config()
        .concurrency(1)
        .pdf_only(true)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    convert_with(&deck.descriptor, &config, &collab).await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start:2",
            "ok:good",
            "retry:bad:1/3",
            "retry:bad:2/3",
            "err:bad",
            "done:1/2",
        ]
    );
}
