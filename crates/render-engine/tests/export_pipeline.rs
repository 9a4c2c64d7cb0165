//! End-to-end export runs against in-memory renderers and sinks.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use scenestitch_common::{StitchError, StitchResult};
use scenestitch_render_engine::{
    CancelHandle, ExportEngine, ExportPhase, ExportProgress, FfmpegSink, FrameSink, ModuleRegistry,
    ModuleRenderer, PreRenderOptions, PreRenderer, SolidHostRenderer,
};
use scenestitch_timeline_model::{
    ElementKind, ExportSettings, Timeline, TimelineDocument, TimelineElement, Track,
};

const BACKGROUND: [u8; 4] = [16, 16, 20, 255];
const MODULE_RED: [u8; 4] = [220, 30, 30, 255];

#[derive(Clone, Default)]
struct MemorySink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    aborted: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn begin(&mut self, _width: u32, _height: u32, _fps: u32) -> StitchResult<()> {
        self.frames.lock().unwrap().clear();
        Ok(())
    }

    async fn push_frame(&mut self, rgba: &[u8]) -> StitchResult<()> {
        self.frames.lock().unwrap().push(rgba.to_vec());
        Ok(())
    }

    async fn finish(&mut self) -> StitchResult<PathBuf> {
        Ok(PathBuf::from("memory://export"))
    }

    async fn abort(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

/// Solid module content.
struct SolidModule;

impl ModuleRenderer for SolidModule {
    fn render_frame(&self, _frame: u64, width: u32, height: u32) -> StitchResult<RgbaImage> {
        Ok(RgbaImage::from_pixel(width, height, Rgba(MODULE_RED)))
    }

    fn total_frames(&self) -> u64 {
        0
    }
}

fn options(name: &str) -> PreRenderOptions {
    PreRenderOptions {
        width: 8,
        height: 8,
        fps: 10.0,
        concurrency: 1,
        frame_root: std::env::temp_dir().join(format!("scenestitch-export-{name}-{}", std::process::id())),
        estimated_ms_per_frame: 10,
    }
}

fn document(timeline: Timeline) -> TimelineDocument {
    let mut doc = TimelineDocument::new("test", timeline);
    doc.settings = ExportSettings {
        width: 8,
        height: 8,
        fps: 10,
        background: "#101014".to_string(),
        ..ExportSettings::default()
    };
    doc
}

fn host_only_timeline() -> Timeline {
    Timeline {
        version: "1.0".to_string(),
        tracks: vec![Track::new("base").with_element(TimelineElement::new(
            "clip",
            ElementKind::Video,
            0.0,
            1.0,
        ))],
    }
}

fn module_timeline() -> Timeline {
    Timeline {
        version: "1.0".to_string(),
        tracks: vec![
            Track::new("base").with_element(TimelineElement::new("clip", ElementKind::Video, 0.0, 1.5)),
            Track::new("overlay").with_element(TimelineElement::module("scene", "intro", 0.5, 1.0)),
        ],
    }
}

struct Harness {
    engine: ExportEngine,
    sink: MemorySink,
    progress: Arc<Mutex<Vec<ExportProgress>>>,
}

fn harness(name: &str, module: Option<SolidModule>) -> Harness {
    let mut registry = ModuleRegistry::new();
    if let Some(module) = module {
        registry.register("intro", Arc::new(module));
    }
    let prerenderer = PreRenderer::new(Arc::new(registry), options(name));
    let sink = MemorySink::default();
    let progress: Arc<Mutex<Vec<ExportProgress>>> = Arc::new(Mutex::new(vec![]));
    let seen = Arc::clone(&progress);
    let engine = ExportEngine::new(
        prerenderer,
        Box::new(SolidHostRenderer::new(BACKGROUND)),
        Box::new(sink.clone()),
    )
    .with_progress(Box::new(move |p: ExportProgress| seen.lock().unwrap().push(p)));
    Harness {
        engine,
        sink,
        progress,
    }
}

fn pixel(frame: &[u8], x: usize, y: usize) -> [u8; 4] {
    let i = (y * 8 + x) * 4;
    [frame[i], frame[i + 1], frame[i + 2], frame[i + 3]]
}

fn assert_monotonic(progress: &[ExportProgress]) {
    for pair in progress.windows(2) {
        assert!(
            pair[1].overall_progress >= pair[0].overall_progress,
            "{} -> {}",
            pair[0].overall_progress,
            pair[1].overall_progress
        );
    }
}

#[tokio::test]
async fn test_timeline_without_modules_skips_compositing() {
    let mut h = harness("host-only", None);
    let outcome = h.engine.export(&document(host_only_timeline())).await.unwrap();

    assert_eq!(
        h.engine.phase_history(),
        &[ExportPhase::Analyzing, ExportPhase::Encoding, ExportPhase::Complete]
    );
    assert_eq!(outcome.frames_encoded, 10);
    assert_eq!(outcome.layers_drawn, 0);
    assert_eq!(h.sink.frames.lock().unwrap().len(), 10);
    assert_eq!(h.engine.cleanup_runs(), 0);

    let progress = h.progress.lock().unwrap();
    assert!(progress
        .iter()
        .all(|p| p.phase != ExportPhase::Prerendering && p.phase != ExportPhase::Compositing));
    assert_monotonic(&progress);
}

#[tokio::test]
async fn test_module_is_composited_inside_its_window() {
    let mut h = harness("composite", Some(SolidModule));
    let outcome = h.engine.export(&document(module_timeline())).await.unwrap();

    assert_eq!(
        h.engine.phase_history(),
        &[
            ExportPhase::Analyzing,
            ExportPhase::Prerendering,
            ExportPhase::Compositing,
            ExportPhase::Encoding,
            ExportPhase::Cleanup,
            ExportPhase::Complete,
        ]
    );
    assert_eq!(h.engine.phase(), ExportPhase::Complete);
    assert_eq!(h.engine.cleanup_runs(), 1);
    assert_eq!(outcome.frames_encoded, 15);
    assert_eq!(outcome.layers_drawn, 10);
    assert_eq!(outcome.elements.len(), 1);
    assert_eq!(outcome.elements[0].rendered_frames, 10);

    let frames = h.sink.frames.lock().unwrap();
    assert_eq!(frames.len(), 15);
    assert_eq!(pixel(&frames[0], 4, 4), BACKGROUND);
    assert_eq!(pixel(&frames[4], 4, 4), BACKGROUND);
    assert_eq!(pixel(&frames[5], 4, 4), MODULE_RED);
    assert_eq!(pixel(&frames[14], 0, 7), MODULE_RED);

    for result in h.engine.prerender_results() {
        assert!(!result.store_dir.as_ref().unwrap().exists());
    }
}

#[tokio::test]
async fn test_progress_reaches_100_only_at_complete() {
    let mut h = harness("progress", Some(SolidModule));
    h.engine.export(&document(module_timeline())).await.unwrap();

    let progress = h.progress.lock().unwrap();
    assert_monotonic(&progress);
    let last = progress.last().unwrap();
    assert_eq!(last.phase, ExportPhase::Complete);
    assert_eq!(last.overall_progress, 100.0);
    assert!(progress[..progress.len() - 1]
        .iter()
        .all(|p| p.overall_progress < 100.0));
    assert!(progress
        .iter()
        .any(|p| p.phase == ExportPhase::Prerendering && p.current_element.as_deref() == Some("scene")));
}

/// Trips the engine's own cancel handle while rendering frame 3.
struct CancellingModule {
    handle: Arc<Mutex<Option<CancelHandle>>>,
}

impl ModuleRenderer for CancellingModule {
    fn render_frame(&self, frame: u64, width: u32, height: u32) -> StitchResult<RgbaImage> {
        if frame == 3 {
            if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                handle.cancel();
            }
        }
        Ok(RgbaImage::from_pixel(width, height, Rgba(MODULE_RED)))
    }

    fn total_frames(&self) -> u64 {
        0
    }
}

#[tokio::test]
async fn test_cancel_mid_prerender_cleans_up_once() {
    let shared = Arc::new(Mutex::new(None));
    let registry = ModuleRegistry::new().with(
        "intro",
        Arc::new(CancellingModule {
            handle: Arc::clone(&shared),
        }),
    );

    let sink = MemorySink::default();
    let progress: Arc<Mutex<Vec<ExportProgress>>> = Arc::new(Mutex::new(vec![]));
    let seen = Arc::clone(&progress);
    let mut engine = ExportEngine::new(
        PreRenderer::new(Arc::new(registry), options("cancel")),
        Box::new(SolidHostRenderer::new(BACKGROUND)),
        Box::new(sink.clone()),
    )
    .with_progress(Box::new(move |p: ExportProgress| seen.lock().unwrap().push(p)));
    *shared.lock().unwrap() = Some(engine.cancel_handle());

    let err = engine.export(&document(module_timeline())).await.unwrap_err();
    assert!(matches!(err, StitchError::Cancelled));
    assert_eq!(engine.phase(), ExportPhase::Error);
    assert_eq!(engine.cleanup_runs(), 1);
    assert!(engine.phase_history().contains(&ExportPhase::Prerendering));
    assert!(!engine.phase_history().contains(&ExportPhase::Compositing));
    assert!(sink.aborted.load(Ordering::SeqCst));

    let results = engine.prerender_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].frame_paths.len(), 4);
    assert!(!results[0].store_dir.as_ref().unwrap().exists());

    {
        let progress = progress.lock().unwrap();
        assert_eq!(progress.last().unwrap().phase, ExportPhase::Error);
        assert!(progress.iter().all(|p| p.overall_progress < 100.0));
    }

    // A cancelled engine keeps failing until reset.
    assert!(engine.export(&document(host_only_timeline())).await.is_err());
    engine.reset_cancel();
    assert!(engine.export(&document(host_only_timeline())).await.is_ok());
}

#[tokio::test]
async fn test_missing_module_renderer_is_not_fatal() {
    let mut h = harness("missing", None);
    let outcome = h.engine.export(&document(module_timeline())).await.unwrap();

    assert_eq!(outcome.layers_drawn, 0);
    assert!(!outcome.elements[0].success);
    let frames = h.sink.frames.lock().unwrap();
    assert_eq!(frames.len(), 15);
    assert!(frames.iter().all(|f| pixel(f, 4, 4) == BACKGROUND));
}

#[tokio::test]
async fn test_cancelled_before_start_leaves_existing_output() {
    let output = std::env::temp_dir().join(format!("scenestitch-keep-{}.mp4", std::process::id()));
    std::fs::write(&output, b"previous render").unwrap();

    let doc = document(host_only_timeline());
    let mut engine = ExportEngine::new(
        PreRenderer::new(Arc::new(ModuleRegistry::new()), options("keep")),
        Box::new(SolidHostRenderer::new(BACKGROUND)),
        Box::new(FfmpegSink::new("scenestitch-no-such-encoder", &output, &doc.settings)),
    );
    engine.cancel();

    let err = engine.export(&doc).await.unwrap_err();
    assert!(matches!(err, StitchError::Cancelled));
    assert_eq!(engine.phase(), ExportPhase::Error);
    assert_eq!(std::fs::read(&output).unwrap(), b"previous render");
    std::fs::remove_file(&output).unwrap();
}
