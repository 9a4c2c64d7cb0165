//! Export engine: pre-render module elements, composite them over the host
//! raster frame by frame, and stream the result into a frame sink.
//!
//! Phases run `analyzing → prerendering → compositing → encoding → cleanup →
//! complete`. A timeline without module elements goes straight from
//! `analyzing` to a host-only `encoding` pass. Any failure or cancellation
//! moves to the terminal `error` phase after cleanup has run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::RgbaImage;
use scenestitch_common::clock::{elapsed_frame, frame_to_secs, frames_covering, Stopwatch};
use scenestitch_common::{StitchError, StitchResult};
use scenestitch_timeline_model::{Timeline, TimelineDocument, TimelineElement};
use serde::Serialize;

use crate::compositor::FrameCompositor;
use crate::encoder::FrameSink;
use crate::frame_store::load_frame;
use crate::host::HostRenderer;
use crate::layer::{compute_layer_order, CompositeLayer, LayerSource};
use crate::prerender::{PreRenderResult, PreRenderer};

/// Export pipeline phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportPhase {
    Analyzing,
    Prerendering,
    Compositing,
    Encoding,
    Cleanup,
    Complete,
    Error,
}

impl ExportPhase {
    /// Phases that carry progress weight, in pipeline order.
    pub const WEIGHTED: [ExportPhase; 5] = [
        ExportPhase::Analyzing,
        ExportPhase::Prerendering,
        ExportPhase::Compositing,
        ExportPhase::Encoding,
        ExportPhase::Cleanup,
    ];

    /// Share of overall progress, out of 100.
    pub fn weight(self) -> f64 {
        match self {
            ExportPhase::Analyzing => 5.0,
            ExportPhase::Prerendering => 40.0,
            ExportPhase::Compositing => 35.0,
            ExportPhase::Encoding => 15.0,
            ExportPhase::Cleanup => 5.0,
            ExportPhase::Complete | ExportPhase::Error => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportPhase::Analyzing => "analyzing",
            ExportPhase::Prerendering => "prerendering",
            ExportPhase::Compositing => "compositing",
            ExportPhase::Encoding => "encoding",
            ExportPhase::Cleanup => "cleanup",
            ExportPhase::Complete => "complete",
            ExportPhase::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExportPhase::Complete | ExportPhase::Error)
    }

    /// Overall progress for `phase_progress` (0–100) within this phase.
    /// Every earlier weighted phase counts in full, skipped or not.
    pub fn overall_progress(self, phase_progress: f64) -> f64 {
        if self == ExportPhase::Complete {
            return 100.0;
        }
        let Some(position) = Self::WEIGHTED.iter().position(|p| *p == self) else {
            return 0.0;
        };
        let done: f64 = Self::WEIGHTED[..position].iter().map(|p| p.weight()).sum();
        done + phase_progress.clamp(0.0, 100.0) / 100.0 * self.weight()
    }
}

/// Export progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    /// 0–100, non-decreasing within a run. Exactly 100 only at `complete`.
    pub overall_progress: f64,
    /// 0–100 within `phase`.
    pub phase_progress: f64,
    pub status_message: String,
    pub current_element: Option<String>,
    pub frames_completed: Option<u64>,
    pub total_frames: Option<u64>,
}

impl ExportProgress {
    fn new(phase: ExportPhase, phase_progress: f64, status_message: impl Into<String>) -> Self {
        Self {
            phase,
            overall_progress: 0.0,
            phase_progress: phase_progress.clamp(0.0, 100.0),
            status_message: status_message.into(),
            current_element: None,
            frames_completed: None,
            total_frames: None,
        }
    }

    fn element(mut self, id: &str) -> Self {
        self.current_element = Some(id.to_string());
        self
    }

    fn frames(mut self, completed: u64, total: u64) -> Self {
        self.frames_completed = Some(completed);
        self.total_frames = Some(total);
        self
    }
}

/// Progress callback for export runs.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Highest value reported before the run is complete.
const MAX_INCOMPLETE_PROGRESS: f64 = 99.9;

/// Keeps overall progress monotonic and forwards reports to the callback.
#[derive(Default)]
struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last_overall: Mutex<f64>,
}

impl ProgressReporter {
    fn reset(&self) {
        *self.last_overall.lock().unwrap_or_else(|p| p.into_inner()) = 0.0;
    }

    fn emit(&self, mut progress: ExportProgress) {
        let mut last = self.last_overall.lock().unwrap_or_else(|p| p.into_inner());
        progress.overall_progress = match progress.phase {
            ExportPhase::Complete => 100.0,
            ExportPhase::Error => *last,
            phase => phase
                .overall_progress(progress.phase_progress)
                .min(MAX_INCOMPLETE_PROGRESS)
                .max(*last),
        };
        *last = progress.overall_progress;
        drop(last);

        if let Some(cb) = &self.callback {
            cb(progress);
        }
    }
}

/// Requests cancellation of a running export from another task.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        tracing::info!("Export cancellation requested");
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-element line of the export report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementReport {
    pub element_id: String,
    pub success: bool,
    pub total_frames: u64,
    pub rendered_frames: usize,
    pub error: Option<String>,
}

impl From<&PreRenderResult> for ElementReport {
    fn from(result: &PreRenderResult) -> Self {
        Self {
            element_id: result.element_id.clone(),
            success: result.success,
            total_frames: result.total_frames,
            rendered_frames: result.frame_paths.len(),
            error: result.error.clone(),
        }
    }
}

/// Summary of a finished export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportOutcome {
    pub output: PathBuf,
    pub frames_encoded: u64,
    /// Composited module layers across all frames.
    pub layers_drawn: u64,
    pub elements: Vec<ElementReport>,
    pub phases: Vec<ExportPhase>,
    #[serde(skip)]
    pub elapsed: Duration,
}

pub struct ExportEngine {
    prerenderer: PreRenderer,
    compositor: Option<FrameCompositor>,
    host: Box<dyn HostRenderer>,
    sink: Box<dyn FrameSink>,
    reporter: ProgressReporter,
    phase: ExportPhase,
    phase_history: Vec<ExportPhase>,
    results: Vec<PreRenderResult>,
    cleaned: bool,
    cleanup_runs: usize,
    write_report: bool,
}

impl ExportEngine {
    pub fn new(prerenderer: PreRenderer, host: Box<dyn HostRenderer>, sink: Box<dyn FrameSink>) -> Self {
        Self {
            prerenderer,
            compositor: None,
            host,
            sink,
            reporter: ProgressReporter::default(),
            phase: ExportPhase::Analyzing,
            phase_history: vec![],
            results: vec![],
            cleaned: false,
            cleanup_runs: 0,
            write_report: false,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.reporter.callback = Some(callback);
        self
    }

    /// Write `<output>.export.json` after a successful run.
    pub fn with_report(mut self, enabled: bool) -> Self {
        self.write_report = enabled;
        self
    }

    /// Handle sharing the pre-renderer's abort flag.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.prerenderer.cancel_flag())
    }

    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// Clear a previous cancellation. A cancelled engine fails every later
    /// export until this is called.
    pub fn reset_cancel(&self) {
        self.prerenderer.reset_abort();
    }

    pub fn phase(&self) -> ExportPhase {
        self.phase
    }

    /// Phases entered during the last run, in order.
    pub fn phase_history(&self) -> &[ExportPhase] {
        &self.phase_history
    }

    /// Cleanup passes performed by the last run.
    pub fn cleanup_runs(&self) -> usize {
        self.cleanup_runs
    }

    /// Pre-render results of the last run.
    pub fn prerender_results(&self) -> &[PreRenderResult] {
        &self.results
    }

    pub fn prerenderer(&self) -> &PreRenderer {
        &self.prerenderer
    }

    /// Run the full pipeline for `document`.
    pub async fn export(&mut self, document: &TimelineDocument) -> StitchResult<ExportOutcome> {
        self.phase_history.clear();
        self.results.clear();
        self.cleaned = false;
        self.cleanup_runs = 0;
        self.reporter.reset();

        tracing::info!(
            name = %document.name,
            width = document.settings.width,
            height = document.settings.height,
            fps = document.settings.fps,
            sink = self.sink.name(),
            "Starting export"
        );

        match self.run(document).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn run(&mut self, document: &TimelineDocument) -> StitchResult<ExportOutcome> {
        let stopwatch = Stopwatch::start();
        let settings = &document.settings;
        let timeline = &document.timeline;
        let (width, height) = (settings.width, settings.height);
        let fps = settings.fps_f64();

        self.enter(ExportPhase::Analyzing, "Analyzing timeline");
        self.check_cancelled()?;
        for problem in timeline.validate() {
            tracing::warn!(problem = %problem, "Timeline validation");
        }
        self.prerenderer.configure_output(width, height, fps);

        let modules = timeline.module_elements();
        let output_frames = frames_covering(timeline.duration(), fps);
        let prerender_frames = self.prerenderer.estimate_total_frames(&modules);
        tracing::info!(
            modules = modules.len(),
            output_frames,
            prerender_frames,
            estimate_ms = self.prerenderer.estimate_render_time(&modules).as_millis() as u64,
            "Timeline analyzed"
        );
        self.reporter.emit(
            ExportProgress::new(
                ExportPhase::Analyzing,
                100.0,
                format!("Found {} module element(s)", modules.len()),
            )
            .frames(0, output_frames),
        );

        self.sink.begin(width, height, settings.fps).await?;

        if modules.is_empty() {
            self.enter(ExportPhase::Encoding, "Encoding timeline");
            let frames = self.encode_host_only(timeline, output_frames, fps, width, height).await?;
            let output = self.sink.finish().await?;
            return Ok(self.complete(output, frames, 0, stopwatch));
        }

        self.enter(ExportPhase::Prerendering, "Pre-rendering module elements");
        self.prerender_modules(&modules, prerender_frames).await?;

        self.enter(ExportPhase::Compositing, "Compositing frames");
        let layers_drawn = self.composite_all(timeline, output_frames, fps, width, height).await?;

        self.enter(ExportPhase::Encoding, "Finalizing encoder");
        let output = self.sink.finish().await?;
        self.reporter
            .emit(ExportProgress::new(ExportPhase::Encoding, 100.0, "Encoding finished"));

        self.enter(ExportPhase::Cleanup, "Removing pre-rendered frames");
        self.run_cleanup();
        self.reporter
            .emit(ExportProgress::new(ExportPhase::Cleanup, 100.0, "Cleanup finished"));

        Ok(self.complete(output, output_frames, layers_drawn, stopwatch))
    }

    async fn encode_host_only(
        &mut self,
        timeline: &Timeline,
        total: u64,
        fps: f64,
        width: u32,
        height: u32,
    ) -> StitchResult<u64> {
        for frame in 0..total {
            self.check_cancelled()?;
            let time = frame_to_secs(frame, fps);
            let raster = self.host.render_frame(timeline, time, width, height).await?;
            self.sink.push_frame(raster.as_raw()).await?;
            self.reporter.emit(
                ExportProgress::new(ExportPhase::Encoding, percent(frame + 1, total), "Encoding frames")
                    .frames(frame + 1, total),
            );
        }
        Ok(total)
    }

    async fn prerender_modules(
        &mut self,
        modules: &[&TimelineElement],
        estimate: u64,
    ) -> StitchResult<()> {
        let mut frames_before = 0u64;
        for element in modules {
            self.check_cancelled()?;

            let reporter = &self.reporter;
            let completed = AtomicU64::new(frames_before);
            let on_frame = |id: &str, _percent: f64, _frame: u64, _total: u64| {
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                reporter.emit(
                    ExportProgress::new(
                        ExportPhase::Prerendering,
                        percent(done, estimate),
                        format!("Pre-rendering {id}"),
                    )
                    .element(id)
                    .frames(done, estimate),
                );
            };
            let result = self.prerenderer.pre_render_element(element, Some(&on_frame)).await;

            if !result.success {
                tracing::warn!(
                    element = %result.element_id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Module element failed to pre-render; it will be left out"
                );
            }
            frames_before += result.total_frames;
            self.results.push(result);
        }
        self.check_cancelled()
    }

    async fn composite_all(
        &mut self,
        timeline: &Timeline,
        total: u64,
        fps: f64,
        width: u32,
        height: u32,
    ) -> StitchResult<u64> {
        let cancel = self.prerenderer.cancel_flag();
        let results: HashMap<&str, &PreRenderResult> = self
            .results
            .iter()
            .map(|r| (r.element_id.as_str(), r))
            .collect();
        let compositor = self
            .compositor
            .get_or_insert_with(|| FrameCompositor::new(width, height));
        if (compositor.width(), compositor.height()) != (width, height) {
            compositor.resize(width, height);
        }

        let mut layers_drawn = 0u64;
        for frame in 0..total {
            if cancel.load(Ordering::SeqCst) {
                return Err(StitchError::Cancelled);
            }
            let time = frame_to_secs(frame, fps);
            let base = self.host.render_frame(timeline, time, width, height).await?;

            let mut frames: HashMap<String, RgbaImage> = HashMap::new();
            let layers: Vec<CompositeLayer> = compute_layer_order(&timeline.tracks, frame, fps)
                .into_iter()
                .filter(|layer| layer.source == LayerSource::Module && layer.visible)
                .filter(|layer| {
                    match module_frame(timeline, &results, &layer.element_id, time, fps) {
                        Some(raster) => {
                            frames.insert(layer.element_id.clone(), raster);
                            true
                        }
                        None => false,
                    }
                })
                .collect();

            let composite = compositor.composite_frame(Some(&base), &frames, &layers);
            layers_drawn += composite.layer_count as u64;
            if composite.image_data.is_empty() {
                self.sink.push_frame(base.as_raw()).await?;
            } else {
                self.sink.push_frame(composite.image_data).await?;
            }

            self.reporter.emit(
                ExportProgress::new(ExportPhase::Compositing, percent(frame + 1, total), "Compositing frames")
                    .frames(frame + 1, total),
            );
        }

        tracing::info!(frames = total, layers_drawn, "Compositing finished");
        Ok(layers_drawn)
    }

    fn complete(&mut self, output: PathBuf, frames: u64, layers_drawn: u64, stopwatch: Stopwatch) -> ExportOutcome {
        self.phase = ExportPhase::Complete;
        self.phase_history.push(ExportPhase::Complete);
        self.reporter
            .emit(ExportProgress::new(ExportPhase::Complete, 100.0, "Export complete").frames(frames, frames));

        let outcome = ExportOutcome {
            output,
            frames_encoded: frames,
            layers_drawn,
            elements: self.results.iter().map(ElementReport::from).collect(),
            phases: self.phase_history.clone(),
            elapsed: stopwatch.elapsed(),
        };

        if self.write_report {
            write_report(&outcome);
        }

        tracing::info!(
            output = %outcome.output.display(),
            frames,
            layers_drawn,
            elapsed_secs = outcome.elapsed.as_secs_f64(),
            "Export finished"
        );
        outcome
    }

    async fn fail(&mut self, err: &StitchError) {
        if err.is_cancelled() {
            tracing::info!(phase = self.phase.as_str(), "Export cancelled");
        } else {
            tracing::error!(phase = self.phase.as_str(), error = %err, "Export failed");
        }
        self.run_cleanup();
        self.sink.abort().await;

        self.phase = ExportPhase::Error;
        self.phase_history.push(ExportPhase::Error);
        self.reporter
            .emit(ExportProgress::new(ExportPhase::Error, 0.0, err.to_string()));
    }

    fn run_cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        self.cleanup_runs += 1;
        let removed = self.prerenderer.cleanup(&self.results);
        if let Some(mut compositor) = self.compositor.take() {
            compositor.release();
        }
        tracing::info!(removed, "Export cleanup finished");
    }

    fn enter(&mut self, phase: ExportPhase, message: &str) {
        tracing::info!(phase = phase.as_str(), "{message}");
        self.phase = phase;
        self.phase_history.push(phase);
        self.reporter.emit(ExportProgress::new(phase, 0.0, message));
    }

    fn check_cancelled(&self) -> StitchResult<()> {
        if self.prerenderer.is_aborted() {
            Err(StitchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Pre-rendered raster for `element_id` at timeline time `time`, if any.
fn module_frame(
    timeline: &Timeline,
    results: &HashMap<&str, &PreRenderResult>,
    element_id: &str,
    time: f64,
    fps: f64,
) -> Option<RgbaImage> {
    let element = timeline.find_element(element_id)?;
    let local = elapsed_frame(time, element.visible_start(), fps)?;
    let path = results.get(element_id)?.frame_paths.get(&local)?;
    match load_frame(path) {
        Ok(raster) => Some(raster),
        Err(e) => {
            tracing::warn!(element = element_id, frame = local, error = %e, "Skipping unreadable frame");
            None
        }
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64 * 100.0).min(100.0)
    }
}

fn write_report(outcome: &ExportOutcome) {
    let mut name = outcome.output.as_os_str().to_owned();
    name.push(".export.json");
    let path = PathBuf::from(name);
    let written = serde_json::to_string_pretty(outcome)
        .map_err(StitchError::from)
        .and_then(|json| std::fs::write(&path, json).map_err(StitchError::from));
    match written {
        Ok(()) => tracing::info!(report = %path.display(), "Wrote export report"),
        Err(e) => tracing::warn!(error = %e, report = %path.display(), "Failed to write export report"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_weights_sum_to_100() {
        let total: f64 = ExportPhase::WEIGHTED.iter().map(|p| p.weight()).sum();
        assert_eq!(total, 100.0);
    }

    #[test]
    fn test_overall_progress_interpolates() {
        assert_eq!(ExportPhase::Analyzing.overall_progress(0.0), 0.0);
        assert_eq!(ExportPhase::Prerendering.overall_progress(50.0), 25.0);
        assert_eq!(ExportPhase::Compositing.overall_progress(0.0), 45.0);
        assert_eq!(ExportPhase::Encoding.overall_progress(100.0), 95.0);
        assert_eq!(ExportPhase::Complete.overall_progress(0.0), 100.0);
        assert_eq!(ExportPhase::Error.overall_progress(50.0), 0.0);
    }

    #[test]
    fn test_reporter_is_monotonic_and_capped() {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter {
            callback: Some(Box::new(move |p: ExportProgress| sink.lock().unwrap().push(p))),
            last_overall: Mutex::new(0.0),
        };
        reporter.emit(ExportProgress::new(ExportPhase::Compositing, 50.0, "a"));
        reporter.emit(ExportProgress::new(ExportPhase::Prerendering, 10.0, "b"));
        reporter.emit(ExportProgress::new(ExportPhase::Cleanup, 100.0, "c"));
        reporter.emit(ExportProgress::new(ExportPhase::Error, 0.0, "d"));

        let overall: Vec<f64> = seen.lock().unwrap().iter().map(|p| p.overall_progress).collect();
        assert_eq!(overall, vec![62.5, 62.5, 99.9, 99.9]);
    }

    #[test]
    fn test_percent_handles_empty_totals() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(1, 4), 25.0);
    }
}
