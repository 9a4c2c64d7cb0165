//! Export a timeline to video.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scenestitch_common::AppConfig;
use scenestitch_render_engine::{
    ExportEngine, ExportProgress, FfmpegSink, FrameSink, ImageSequenceSink, ModuleRegistry,
    PreRenderOptions, PreRenderer, SolidHostRenderer,
};
use scenestitch_sequence_analysis::SequenceAnalysisService;
use scenestitch_timeline_model::{ExportFormat, TimelineDocument};

use super::load_document;
use crate::preview::StructurePreviewRenderer;

const MODULE_EXTENSIONS: [&str; 4] = ["tsx", "jsx", "ts", "js"];

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: Option<PathBuf>,
    modules_dir: PathBuf,
    frames: bool,
    format: Option<String>,
) -> anyhow::Result<()> {
    let mut doc = load_document(&path)?;
    if let Some(format) = format {
        doc.settings.format = parse_format(&format)?;
    }

    let output = output.unwrap_or_else(|| {
        if frames {
            path.with_extension("frames")
        } else {
            path.with_extension(doc.settings.format.extension())
        }
    });

    println!("Exporting timeline: {}", path.display());
    println!("  Output: {}", output.display());
    println!(
        "  Resolution: {}x{} @ {}fps",
        doc.settings.width, doc.settings.height, doc.settings.fps
    );

    let registry = build_registry(config, &doc, &modules_dir);
    let options = PreRenderOptions::from_config(
        &config.prerender,
        doc.settings.width,
        doc.settings.height,
        doc.settings.fps_f64(),
    );
    let prerenderer = PreRenderer::new(Arc::new(registry), options);

    let sink: Box<dyn FrameSink> = if frames {
        Box::new(ImageSequenceSink::new(&output))
    } else {
        let sink = FfmpegSink::new(&config.export.ffmpeg_binary, &output, &doc.settings);
        if !sink.is_available() {
            anyhow::bail!(
                "{} not found in PATH; install ffmpeg or pass --frames",
                config.export.ffmpeg_binary
            );
        }
        Box::new(sink)
    };

    let progress_cb = Box::new(|p: ExportProgress| {
        print!(
            "\r  [{:<12}] {:5.1}%  {:<40}",
            p.phase.as_str(),
            p.overall_progress,
            p.status_message
        );
        let _ = std::io::stdout().flush();
    });

    let mut engine = ExportEngine::new(
        prerenderer,
        Box::new(SolidHostRenderer::new(doc.settings.background_rgba())),
        sink,
    )
    .with_progress(progress_cb)
    .with_report(true);

    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match engine.export(&doc).await {
        Ok(outcome) => {
            println!();
            println!("Export complete: {}", outcome.output.display());
            println!(
                "  {} frames, {} module layers in {:.1}s",
                outcome.frames_encoded,
                outcome.layers_drawn,
                outcome.elapsed.as_secs_f64()
            );
            for el in outcome.elements.iter().filter(|el| !el.success) {
                println!(
                    "  [WARN] {} was left out: {}",
                    el.element_id,
                    el.error.as_deref().unwrap_or("no frames rendered")
                );
            }
            Ok(())
        }
        Err(e) => {
            println!();
            Err(anyhow::anyhow!("Export failed: {e}"))
        }
    }
}

fn parse_format(name: &str) -> anyhow::Result<ExportFormat> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).map_err(|_| {
        anyhow::anyhow!("Unknown format: {name}. Use: mp4-h264, mp4-h265, webm, gif")
    })
}

/// Analyze every referenced module and register a preview renderer for it.
fn build_registry(config: &AppConfig, doc: &TimelineDocument, modules_dir: &Path) -> ModuleRegistry {
    let mut service = SequenceAnalysisService::new(&config.analysis);
    let mut registry = ModuleRegistry::new();

    for el in doc.timeline.module_elements() {
        let Some(module_id) = el.module_id.as_deref() else {
            continue;
        };
        let Some(source_path) = find_module_source(modules_dir, module_id) else {
            tracing::warn!(module = module_id, dir = %modules_dir.display(), "Module source not found");
            continue;
        };
        let source = match std::fs::read_to_string(&source_path) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(path = %source_path.display(), error = %e, "Failed to read module source");
                continue;
            }
        };

        let result = service.analyze(module_id, &source);
        for err in &result.parsed.errors {
            tracing::warn!(module = module_id, "{err}");
        }
        match &result.structure {
            Some(structure) => {
                registry.register(module_id, Arc::new(StructurePreviewRenderer::new(structure.clone())))
            }
            None => tracing::warn!(module = module_id, "Module declares no sequences"),
        }
    }

    let stats = service.cache_stats();
    tracing::debug!(analyzed = stats.misses, reused = stats.hits, "Module analysis done");
    registry
}

fn find_module_source(dir: &Path, module_id: &str) -> Option<PathBuf> {
    MODULE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{module_id}.{ext}")))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format_names() {
        assert_eq!(parse_format("mp4-h265").unwrap(), ExportFormat::Mp4H265);
        assert_eq!(parse_format("gif").unwrap(), ExportFormat::Gif);
        assert!(parse_format("avi").is_err());
    }

    #[test]
    fn test_fixture_modules_resolve() {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("fixtures")
            .join("modules");
        assert!(find_module_source(&dir, "product_launch").is_some());
        assert!(find_module_source(&dir, "missing").is_none());
    }
}
