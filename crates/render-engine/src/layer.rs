//! Per-frame layer lists.

use kurbo::Affine;
use scenestitch_timeline_model::{BlendMode, TimelineElement, Track};

/// Who produces a layer's pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerSource {
    /// Rendered by the host timeline (video, image, text).
    Host,
    /// Pre-rendered scene-module frames.
    Module,
}

/// 2D placement of a layer on the output surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation_degrees: f64,
    /// Pivot as a fraction of surface width.
    pub anchor_x: f64,
    /// Pivot as a fraction of surface height.
    pub anchor_y: f64,
}

impl Default for LayerTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotation_degrees: 0.0,
            anchor_x: 0.5,
            anchor_y: 0.5,
        }
    }
}

impl LayerTransform {
    /// Transform from a full-surface-sized layer into surface space: move
    /// to the anchor (plus offset), rotate, scale, move back.
    pub fn to_affine(&self, width: u32, height: u32) -> Affine {
        let ax = self.anchor_x * f64::from(width);
        let ay = self.anchor_y * f64::from(height);
        Affine::translate((ax + self.x, ay + self.y))
            * Affine::rotate(self.rotation_degrees.to_radians())
            * Affine::scale(self.scale)
            * Affine::translate((-ax, -ay))
    }
}

/// One visual contribution to a single output frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeLayer {
    pub z_index: usize,
    pub source: LayerSource,
    pub element_id: String,
    pub blend_mode: BlendMode,
    pub opacity: f64,
    /// `false` for elements flagged hidden; the layer is still listed.
    pub visible: bool,
    pub transform: LayerTransform,
}

impl CompositeLayer {
    fn from_element(element: &TimelineElement, z_index: usize) -> Self {
        Self {
            z_index,
            source: if element.is_module() {
                LayerSource::Module
            } else {
                LayerSource::Host
            },
            element_id: element.id.clone(),
            blend_mode: element.blend_mode,
            opacity: element.opacity.clamp(0.0, 1.0),
            visible: !element.hidden,
            transform: LayerTransform {
                x: element.x,
                y: element.y,
                scale: element.scale,
                rotation_degrees: element.rotation,
                ..LayerTransform::default()
            },
        }
    }
}

/// Layers for every element whose visible window contains `current_frame`.
///
/// Z-order follows track order, then element order within a track.
pub fn compute_layer_order(tracks: &[Track], current_frame: u64, fps: f64) -> Vec<CompositeLayer> {
    if fps <= 0.0 {
        return vec![];
    }
    let time_secs = current_frame as f64 / fps;

    tracks
        .iter()
        .flat_map(|track| track.elements.iter())
        .filter(|element| element.is_active_at(time_secs))
        .enumerate()
        .map(|(z_index, element)| CompositeLayer::from_element(element, z_index))
        .collect()
}
