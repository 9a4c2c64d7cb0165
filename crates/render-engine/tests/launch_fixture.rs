//! Layer ordering and a PNG-sequence export of the launch teaser fixture.

use std::path::PathBuf;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use scenestitch_common::StitchResult;
use scenestitch_render_engine::{
    compute_layer_order, load_frame, ExportEngine, ExportPhase, ImageSequenceSink, LayerSource,
    ModuleRegistry, ModuleRenderer, PreRenderOptions, PreRenderer, SolidHostRenderer,
};
use scenestitch_timeline_model::{BlendMode, TimelineDocument};

fn fixture() -> TimelineDocument {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("timelines")
        .join("launch.timeline.json");
    TimelineDocument::load(path).expect("fixture should load")
}

fn ids_at(doc: &TimelineDocument, frame: u64) -> Vec<String> {
    compute_layer_order(&doc.timeline.tracks, frame, 30.0)
        .into_iter()
        .map(|l| l.element_id)
        .collect()
}

#[test]
fn test_layers_follow_fixture_windows() {
    let doc = fixture();
    assert_eq!(ids_at(&doc, 44), vec!["clip-1"]);
    assert_eq!(ids_at(&doc, 45), vec!["clip-1", "launch-scene"]);
    assert_eq!(ids_at(&doc, 134), vec!["clip-1", "launch-scene", "caption"]);
    assert_eq!(ids_at(&doc, 135), vec!["clip-1", "caption"]);

    let layers = compute_layer_order(&doc.timeline.tracks, 60, 30.0);
    let scene = &layers[1];
    assert_eq!(scene.z_index, 1);
    assert_eq!(scene.source, LayerSource::Module);
    assert_eq!(scene.blend_mode, BlendMode::Screen);
    assert!((scene.opacity - 0.9).abs() < 1e-9);
    assert!((scene.transform.scale - 0.8).abs() < 1e-9);

    let caption = compute_layer_order(&doc.timeline.tracks, 150, 30.0)
        .into_iter()
        .find(|l| l.element_id == "caption")
        .unwrap();
    assert!(!caption.visible);
    assert_eq!(caption.source, LayerSource::Host);
}

struct Amber;

impl ModuleRenderer for Amber {
    fn render_frame(&self, _frame: u64, width: u32, height: u32) -> StitchResult<RgbaImage> {
        Ok(RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255])))
    }

    fn total_frames(&self) -> u64 {
        250
    }
}

#[tokio::test]
async fn test_fixture_exports_to_png_sequence() {
    scenestitch_common::logging::init_default_logging();
    let mut doc = fixture();
    doc.settings.width = 32;
    doc.settings.height = 18;
    doc.settings.fps = 10;

    let tmp = std::env::temp_dir().join(format!("scenestitch-launch-{}", std::process::id()));
    let out_dir = tmp.join("frames");
    let options = PreRenderOptions {
        width: 32,
        height: 18,
        fps: 10.0,
        concurrency: 3,
        frame_root: tmp.join("stores"),
        estimated_ms_per_frame: 5,
    };
    let registry = ModuleRegistry::new().with("product_launch", Arc::new(Amber));
    let prerenderer = PreRenderer::new(Arc::new(registry), options);
    assert_eq!(prerenderer.estimate_total_frames(&doc.timeline.module_elements()), 30);

    let mut engine = ExportEngine::new(
        prerenderer,
        Box::new(SolidHostRenderer::new(doc.settings.background_rgba())),
        Box::new(ImageSequenceSink::new(&out_dir)),
    );
    let outcome = engine.export(&doc).await.unwrap();

    assert_eq!(engine.phase(), ExportPhase::Complete);
    assert_eq!(outcome.frames_encoded, 60);
    assert_eq!(outcome.layers_drawn, 30);
    assert!(out_dir.join("manifest.json").exists());

    let background = Rgba([16, 16, 20, 255]);
    let before = load_frame(&out_dir.join("frame_000010.png")).unwrap();
    assert_eq!(before.get_pixel(16, 9), &background);

    let during = load_frame(&out_dir.join("frame_000020.png")).unwrap();
    assert_ne!(during.get_pixel(16, 9), &background);
    // Scaled to 0.8 about the centre, so the corner stays uncovered.
    assert_eq!(during.get_pixel(0, 0), &background);

    let after = load_frame(&out_dir.join("frame_000045.png")).unwrap();
    assert_eq!(after.get_pixel(16, 9), &background);

    let _ = std::fs::remove_dir_all(&tmp);
}
