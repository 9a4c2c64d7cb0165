//! Pre-render pass: rasterize module elements into frame stores ahead of
//! compositing.
//!
//! Frames of one element are rendered by blocking tasks kept in a bounded,
//! in-order sliding window. Abort is cooperative: it is checked before each
//! frame starts, frames already in flight run to completion.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scenestitch_common::clock::{frames_in, Stopwatch};
use scenestitch_common::{PreRenderConfig, StitchError, StitchResult};
use scenestitch_timeline_model::TimelineElement;
use tokio::task::JoinHandle;

use crate::frame_store::FrameStore;
use crate::rasterizer::RasterBackend;

/// `(element_id, percent, current_frame, total_frames)`, fired once per
/// successfully stored frame, in increasing frame order.
pub type PreRenderProgress<'a> = dyn Fn(&str, f64, u64, u64) + Send + Sync + 'a;

/// Output and scheduling parameters for a pre-render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PreRenderOptions {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frame renders in flight at once, per element.
    pub concurrency: usize,
    /// Parent directory of the per-run frame stores.
    pub frame_root: PathBuf,
    /// Planning estimate for one frame render.
    pub estimated_ms_per_frame: u64,
}

impl PreRenderOptions {
    pub fn from_config(config: &PreRenderConfig, width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            concurrency: config.concurrency.max(1),
            frame_root: config.frame_root.clone(),
            estimated_ms_per_frame: config.estimated_ms_per_frame,
        }
    }
}

/// Outcome of pre-rendering one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreRenderResult {
    pub element_id: String,
    /// Whether any usable frames were produced (or none were needed).
    pub success: bool,
    pub total_frames: u64,
    /// Stored frames by store index. Fewer than `total_frames` after an
    /// abort or failed frames.
    pub frame_paths: BTreeMap<u64, PathBuf>,
    pub render_duration: Duration,
    /// Last failure reason, if any frame or setup step failed.
    pub error: Option<String>,
    /// Frame store directory, for cleanup.
    pub store_dir: Option<PathBuf>,
    /// Abort was observed before every frame started.
    pub aborted: bool,
}

impl PreRenderResult {
    fn new(element_id: &str, total_frames: u64) -> Self {
        Self {
            element_id: element_id.to_string(),
            total_frames,
            ..Self::default()
        }
    }

    /// Every frame was rendered and stored.
    pub fn is_complete(&self) -> bool {
        self.frame_paths.len() as u64 == self.total_frames
    }
}

pub struct PreRenderer {
    backend: Arc<dyn RasterBackend>,
    options: PreRenderOptions,
    cancel: Arc<AtomicBool>,
    run_id: String,
}

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

impl PreRenderer {
    pub fn new(backend: Arc<dyn RasterBackend>, options: PreRenderOptions) -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let run_id = format!(
            "run-{}-{millis}-{}",
            std::process::id(),
            RUN_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        tracing::debug!(backend = backend.name(), run = %run_id, "Created pre-renderer");
        Self {
            backend,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
            run_id,
        }
    }

    pub fn options(&self) -> &PreRenderOptions {
        &self.options
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Update output size and frame rate for subsequent passes.
    pub fn configure_output(&mut self, width: u32, height: u32, fps: f64) {
        self.options.width = width;
        self.options.height = height;
        self.options.fps = fps;
    }

    /// Shared abort flag. Setting it has the same effect as [`abort`](Self::abort).
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Stop starting new frames. In-flight frames still complete.
    pub fn abort(&self) {
        tracing::info!(run = %self.run_id, "Pre-render abort requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Clear a previous abort so the renderer can be reused.
    pub fn reset_abort(&self) {
        self.cancel.store(false, Ordering::SeqCst);
    }

    /// Frames needed for `element`'s visible window.
    pub fn element_frame_count(&self, element: &TimelineElement) -> u64 {
        frames_in(element.visible_duration(), self.options.fps)
    }

    /// Render every visible frame of `element` into a fresh frame store.
    ///
    /// Never fails outright: setup and frame errors are recorded in the
    /// result so a bad element does not stop its batch.
    pub async fn pre_render_element(
        &self,
        element: &TimelineElement,
        on_progress: Option<&PreRenderProgress<'_>>,
    ) -> PreRenderResult {
        let stopwatch = Stopwatch::start();
        let total = self.element_frame_count(element);
        let mut result = PreRenderResult::new(&element.id, total);

        if total == 0 {
            tracing::debug!(element = %element.id, "Nothing to pre-render");
            result.success = true;
            return result;
        }

        let Some(renderer) = self.backend.renderer_for(element) else {
            let module = element.module_id.as_deref().unwrap_or("<none>");
            tracing::warn!(element = %element.id, module, "No renderer for module element");
            result.error = Some(format!("No renderer for module '{module}'"));
            return result;
        };

        let store = match FrameStore::create(&self.options.frame_root, &self.run_id, &element.id) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!(element = %element.id, error = %e, "Failed to create frame store");
                result.error = Some(e.to_string());
                return result;
            }
        };
        result.store_dir = Some(store.dir().to_path_buf());

        let content_offset = frames_in(element.trim_start, self.options.fps);
        let content_total = renderer.total_frames();
        let (width, height) = (self.options.width, self.options.height);
        let concurrency = self.options.concurrency.max(1);

        tracing::info!(
            element = %element.id,
            frames = total,
            content_offset,
            concurrency,
            "Pre-rendering element"
        );

        let mut in_flight: VecDeque<(u64, JoinHandle<StitchResult<PathBuf>>)> = VecDeque::new();
        let mut next = 0u64;
        loop {
            while in_flight.len() < concurrency && next < total && !self.is_aborted() {
                let index = next;
                let mut content_frame = content_offset + index;
                if content_total > 0 {
                    content_frame = content_frame.min(content_total - 1);
                }
                let renderer = Arc::clone(&renderer);
                let store = store.clone();
                let handle = tokio::task::spawn_blocking(move || {
                    let frame = renderer.render_frame(content_frame, width, height)?;
                    store.write_png(index, &frame)
                });
                in_flight.push_back((index, handle));
                next += 1;
            }

            let Some((index, handle)) = in_flight.pop_front() else {
                break;
            };
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(StitchError::prerender(format!("Frame task failed: {e}"))));
            match outcome {
                Ok(path) => {
                    result.frame_paths.insert(index, path);
                    if let Some(cb) = on_progress {
                        let percent = (index + 1) as f64 / total as f64 * 100.0;
                        cb(&element.id, percent, index, total);
                    }
                }
                Err(e) => {
                    tracing::warn!(element = %element.id, frame = index, error = %e, "Frame render failed");
                    result.error = Some(e.to_string());
                }
            }
        }

        result.aborted = next < total;
        result.success = !result.frame_paths.is_empty() || (result.aborted && result.error.is_none());
        result.render_duration = stopwatch.elapsed();

        tracing::info!(
            element = %element.id,
            rendered = result.frame_paths.len(),
            total,
            aborted = result.aborted,
            elapsed_ms = stopwatch.elapsed_ms(),
            "Pre-render finished"
        );
        result
    }

    /// Pre-render each element in turn. Always one result per element.
    pub async fn pre_render_all(
        &self,
        elements: &[&TimelineElement],
        on_progress: Option<&PreRenderProgress<'_>>,
    ) -> Vec<PreRenderResult> {
        let mut results = Vec::with_capacity(elements.len());
        for element in elements {
            results.push(self.pre_render_element(element, on_progress).await);
        }
        results
    }

    /// Elements whose visible window overlaps `[range_start, range_end)`.
    pub fn get_elements_for_pre_render<'a>(
        &self,
        elements: &[&'a TimelineElement],
        range_start: f64,
        range_end: f64,
    ) -> Vec<&'a TimelineElement> {
        elements
            .iter()
            .copied()
            .filter(|el| el.overlaps(range_start, range_end))
            .collect()
    }

    pub fn estimate_total_frames(&self, elements: &[&TimelineElement]) -> u64 {
        elements.iter().map(|el| self.element_frame_count(el)).sum()
    }

    /// Wall-clock estimate for pre-rendering `elements`.
    pub fn estimate_render_time(&self, elements: &[&TimelineElement]) -> Duration {
        let frames = self.estimate_total_frames(elements);
        let concurrency = self.options.concurrency.max(1) as u64;
        Duration::from_millis(frames * self.options.estimated_ms_per_frame / concurrency)
    }

    /// Delete the frame stores of `results`. Returns how many were removed.
    pub fn cleanup(&self, results: &[PreRenderResult]) -> usize {
        let mut removed = 0;
        for result in results {
            let Some(dir) = &result.store_dir else {
                continue;
            };
            match FrameStore::open(dir.clone()).remove() {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(element = %result.element_id, error = %e, "Failed to remove frame store")
                }
            }
        }
        tracing::debug!(removed, "Frame stores cleaned up");
        removed
    }
}
