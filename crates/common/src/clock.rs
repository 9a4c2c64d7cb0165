//! Frame/time conversions and render timing.
//!
//! Timeline positions are expressed in seconds; module content and output
//! frames are addressed by integer frame index. Every conversion between the
//! two goes through this module so that rounding is consistent across the
//! pre-render and compositing passes.

use std::time::{Duration, Instant};

/// Number of whole frames that fit in `duration_secs` at `fps`.
///
/// Negative or non-finite inputs yield zero.
pub fn frames_in(duration_secs: f64, fps: f64) -> u64 {
    let frames = (duration_secs * fps).floor();
    if frames.is_finite() && frames > 0.0 {
        frames as u64
    } else {
        0
    }
}

/// Number of output frames needed to cover `duration_secs`, including a
/// trailing partial frame.
pub fn frames_covering(duration_secs: f64, fps: f64) -> u64 {
    let frames = (duration_secs * fps).ceil();
    if frames.is_finite() && frames > 0.0 {
        frames as u64
    } else {
        0
    }
}

/// Time in seconds of frame `index` at `fps`.
pub fn frame_to_secs(index: u64, fps: f64) -> f64 {
    if fps <= 0.0 {
        return 0.0;
    }
    index as f64 / fps
}

/// Frame index elapsed since `origin_secs` at `time_secs`.
///
/// Returns `None` before the origin.
pub fn elapsed_frame(time_secs: f64, origin_secs: f64, fps: f64) -> Option<u64> {
    let elapsed = time_secs - origin_secs;
    if elapsed < 0.0 {
        return None;
    }
    // Guard against 0.999999 style drift when the time was derived from a frame index.
    let frames = (elapsed * fps + 1e-6).floor();
    if frames.is_finite() {
        Some(frames as u64)
    } else {
        None
    }
}

/// Wall-clock stopwatch for measuring render passes.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start a stopwatch anchored to now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time elapsed since start.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Milliseconds elapsed since start.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
