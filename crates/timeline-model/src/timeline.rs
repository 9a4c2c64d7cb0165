//! Timeline, tracks, and elements.
//!
//! The timeline is owned by the editing collaborator; the render crates only
//! read it. Track order is significant: earlier tracks are drawn first.

use serde::{Deserialize, Serialize};

use crate::blend::BlendMode;

/// The editing timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    /// Schema version.
    pub version: String,

    /// Tracks in stacking order (index 0 is the bottom-most).
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// A single track of elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stable track identifier.
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Elements in stacking order within the track.
    #[serde(default)]
    pub elements: Vec<TimelineElement>,
}

/// Kind of content an element contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Video,
    Image,
    Text,
    Audio,
    /// An embedded scene module, rasterized by the pre-render pass.
    Module,
}

/// A positioned, time-windowed element on a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineElement {
    /// Unique element identifier.
    pub id: String,

    /// Content kind.
    #[serde(rename = "type")]
    pub kind: ElementKind,

    /// Start position on the timeline (seconds).
    pub start_time: f64,

    /// Untrimmed duration (seconds).
    pub duration: f64,

    /// Seconds hidden from the head of the element.
    #[serde(default)]
    pub trim_start: f64,

    /// Seconds hidden from the tail of the element.
    #[serde(default)]
    pub trim_end: f64,

    /// Hidden elements stay on the timeline but are not drawn.
    #[serde(default)]
    pub hidden: bool,

    /// Horizontal offset in output pixels.
    #[serde(default)]
    pub x: f64,

    /// Vertical offset in output pixels.
    #[serde(default)]
    pub y: f64,

    /// Uniform scale factor.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Rotation in degrees, clockwise.
    #[serde(default)]
    pub rotation: f64,

    /// Opacity in `[0.0, 1.0]`.
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Blend mode used when compositing this element.
    #[serde(default)]
    pub blend_mode: BlendMode,

    /// Scene-module component id (module elements only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

fn default_scale() -> f64 {
    1.0
}

fn default_opacity() -> f64 {
    1.0
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self {
            version: "1.0".to_string(),
            tracks: vec![],
        }
    }

    /// Iterate over every element with its track index, in stacking order.
    pub fn elements(&self) -> impl Iterator<Item = (usize, &TimelineElement)> {
        self.tracks
            .iter()
            .enumerate()
            .flat_map(|(index, track)| track.elements.iter().map(move |el| (index, el)))
    }

    /// All scene-module elements, in stacking order.
    pub fn module_elements(&self) -> Vec<&TimelineElement> {
        self.elements()
            .map(|(_, el)| el)
            .filter(|el| el.is_module())
            .collect()
    }

    /// Find an element by id.
    pub fn find_element(&self, id: &str) -> Option<&TimelineElement> {
        self.elements().map(|(_, el)| el).find(|el| el.id == id)
    }

    /// Timeline length in seconds: the latest visible end of any element.
    pub fn duration(&self) -> f64 {
        self.elements()
            .map(|(_, el)| el.visible_end())
            .fold(0.0, f64::max)
    }

    /// Validate structural invariants, returning human-readable problems.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = vec![];
        let mut seen = std::collections::HashSet::new();

        for (_, el) in self.elements() {
            if !seen.insert(el.id.as_str()) {
                problems.push(format!("Duplicate element id: {}", el.id));
            }
            if el.duration < 0.0 || el.trim_start < 0.0 || el.trim_end < 0.0 {
                problems.push(format!("Element {} has a negative duration or trim", el.id));
            }
            if !(0.0..=1.0).contains(&el.opacity) {
                problems.push(format!("Element {} opacity outside [0, 1]", el.id));
            }
            if el.is_module() && el.module_id.is_none() {
                problems.push(format!("Module element {} has no module_id", el.id));
            }
        }

        problems
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Track {
    /// Create an empty track.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            elements: vec![],
        }
    }

    /// Builder-style element append.
    pub fn with_element(mut self, element: TimelineElement) -> Self {
        self.elements.push(element);
        self
    }
}

impl TimelineElement {
    /// Create an untrimmed, untransformed element.
    pub fn new(id: impl Into<String>, kind: ElementKind, start_time: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            start_time,
            duration,
            trim_start: 0.0,
            trim_end: 0.0,
            hidden: false,
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotation: 0.0,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            module_id: None,
        }
    }

    /// Create a scene-module element bound to `module_id`.
    pub fn module(
        id: impl Into<String>,
        module_id: impl Into<String>,
        start_time: f64,
        duration: f64,
    ) -> Self {
        let mut element = Self::new(id, ElementKind::Module, start_time, duration);
        element.module_id = Some(module_id.into());
        element
    }

    /// Builder-style trim.
    pub fn with_trim(mut self, trim_start: f64, trim_end: f64) -> Self {
        self.trim_start = trim_start;
        self.trim_end = trim_end;
        self
    }

    /// Whether this is a scene-module element.
    pub fn is_module(&self) -> bool {
        self.kind == ElementKind::Module
    }

    /// First visible instant (seconds).
    pub fn visible_start(&self) -> f64 {
        self.start_time + self.trim_start
    }

    /// End of the visible window (seconds, exclusive).
    pub fn visible_end(&self) -> f64 {
        self.start_time + self.duration - self.trim_end
    }

    /// Visible length in seconds, never negative.
    pub fn visible_duration(&self) -> f64 {
        (self.duration - self.trim_start - self.trim_end).max(0.0)
    }

    /// Whether `time_secs` falls in `[visible_start, visible_end)`.
    pub fn is_active_at(&self, time_secs: f64) -> bool {
        time_secs >= self.visible_start() && time_secs < self.visible_end()
    }

    /// Whether the element's visible window overlaps `[range_start, range_end)`.
    pub fn overlaps(&self, range_start: f64, range_end: f64) -> bool {
        self.visible_start() < range_end && self.visible_end() > range_start
    }
}
