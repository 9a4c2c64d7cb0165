//! Estimate pre-render work for a timeline.

use std::path::PathBuf;
use std::sync::Arc;

use scenestitch_common::clock::frames_covering;
use scenestitch_common::AppConfig;
use scenestitch_render_engine::{ModuleRegistry, PreRenderOptions, PreRenderer};

use super::load_document;

pub fn run(config: &AppConfig, path: PathBuf) -> anyhow::Result<()> {
    let doc = load_document(&path)?;
    let s = &doc.settings;
    let fps = s.fps_f64();

    let options = PreRenderOptions::from_config(&config.prerender, s.width, s.height, fps);
    let prerenderer = PreRenderer::new(Arc::new(ModuleRegistry::new()), options);

    let modules = doc.timeline.module_elements();
    println!("Timeline: {}", doc.name);
    println!(
        "  Output frames: {} ({:.2}s @ {}fps)",
        frames_covering(doc.timeline.duration(), fps),
        doc.timeline.duration(),
        s.fps
    );
    println!("  Module elements: {}", modules.len());

    for el in &modules {
        println!(
            "    {:<16} {:<20} {:>6} frames",
            el.id,
            el.module_id.as_deref().unwrap_or("-"),
            prerenderer.element_frame_count(el)
        );
    }

    let total = prerenderer.estimate_total_frames(&modules);
    let eta = prerenderer.estimate_render_time(&modules);
    println!();
    println!("  Pre-render frames: {total}");
    println!(
        "  Estimated pre-render time: {:.1}s ({} in flight, {}ms/frame)",
        eta.as_secs_f64(),
        config.prerender.concurrency.max(1),
        config.prerender.estimated_ms_per_frame
    );

    Ok(())
}
