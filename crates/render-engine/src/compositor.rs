//! Frame compositor: layers rasters onto one reusable output surface.
//!
//! The surface is owned by the compositor and overwritten by every
//! [`FrameCompositor::composite_frame`] call. The returned [`CompositeFrame`]
//! borrows it, so a frame has to be copied out (`to_image`, `to_png`,
//! `to_blob`) before the next composite or resize.

use std::collections::HashMap;
use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use kurbo::{Affine, Point, Rect};
use scenestitch_common::{StitchError, StitchResult};

use crate::blend::CompositeOp;
use crate::layer::CompositeLayer;

/// Largest surface side the compositor will allocate.
pub const MAX_SURFACE_DIMENSION: u32 = 16_384;

/// Result of one composite, borrowing the compositor's surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeFrame<'a> {
    pub width: u32,
    pub height: u32,
    /// Layers actually drawn after visibility and availability filtering.
    pub layer_count: usize,
    /// Straight-alpha RGBA8, row-major. Empty when no surface exists.
    pub image_data: &'a [u8],
}

pub struct FrameCompositor {
    width: u32,
    height: u32,
    surface: Option<RgbaImage>,
}

impl FrameCompositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            surface: allocate_surface(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether a drawing surface exists.
    pub fn is_available(&self) -> bool {
        self.surface.is_some()
    }

    /// Recreate the surface at a new size.
    pub fn resize(&mut self, width: u32, height: u32) {
        tracing::debug!(width, height, "Resizing compositor surface");
        self.width = width;
        self.height = height;
        self.surface = allocate_surface(width, height);
    }

    /// Draw `base`, then every eligible layer in ascending z-order.
    ///
    /// A layer is skipped when it is hidden or `frames` has no raster for
    /// its element. Without a surface nothing is drawn and `layer_count` is 0.
    pub fn composite_frame(
        &mut self,
        base: Option<&RgbaImage>,
        frames: &HashMap<String, RgbaImage>,
        layers: &[CompositeLayer],
    ) -> CompositeFrame<'_> {
        let (width, height) = (self.width, self.height);
        let Some(surface) = self.surface.as_mut() else {
            return CompositeFrame {
                width,
                height,
                layer_count: 0,
                image_data: &[],
            };
        };

        for pixel in surface.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }

        if let Some(base) = base {
            if base.dimensions() == (width, height) {
                surface.copy_from_slice(base.as_raw());
            } else {
                draw_raster(surface, base, Affine::IDENTITY, CompositeOp::SourceOver, 1.0);
            }
        }

        let mut ordered: Vec<&CompositeLayer> = layers.iter().collect();
        ordered.sort_by_key(|layer| layer.z_index);

        let mut layer_count = 0;
        for layer in ordered {
            if !layer.visible {
                continue;
            }
            let Some(raster) = frames.get(&layer.element_id) else {
                tracing::trace!(element = %layer.element_id, "No raster for layer, skipping");
                continue;
            };
            let affine = layer.transform.to_affine(width, height);
            draw_raster(
                surface,
                raster,
                affine,
                CompositeOp::from(layer.blend_mode),
                layer.opacity as f32,
            );
            layer_count += 1;
        }

        CompositeFrame {
            width,
            height,
            layer_count,
            image_data: surface.as_raw(),
        }
    }

    /// Copy of the current surface.
    pub fn to_image(&self) -> Option<RgbaImage> {
        self.surface.clone()
    }

    /// Current surface encoded as PNG.
    pub fn to_png(&self) -> StitchResult<Vec<u8>> {
        let surface = self.surface()?;
        let mut buf = Cursor::new(Vec::new());
        surface
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| StitchError::composite(format!("PNG encoding failed: {e}")))?;
        Ok(buf.into_inner())
    }

    /// Current surface as raw RGBA8 bytes.
    pub fn to_blob(&self) -> StitchResult<Vec<u8>> {
        Ok(self.surface()?.as_raw().clone())
    }

    /// Drop the surface. A later `resize` allocates a new one.
    pub fn release(&mut self) {
        if self.surface.take().is_some() {
            tracing::debug!("Released compositor surface");
        }
    }

    fn surface(&self) -> StitchResult<&RgbaImage> {
        self.surface
            .as_ref()
            .ok_or_else(|| StitchError::composite("No drawing surface available"))
    }
}

fn allocate_surface(width: u32, height: u32) -> Option<RgbaImage> {
    if width == 0 || height == 0 || width > MAX_SURFACE_DIMENSION || height > MAX_SURFACE_DIMENSION {
        tracing::warn!(width, height, "Cannot allocate compositor surface");
        return None;
    }
    Some(RgbaImage::new(width, height))
}

/// Draw `src` stretched to the full surface, then placed by `layer`.
fn draw_raster(surface: &mut RgbaImage, src: &RgbaImage, layer: Affine, op: CompositeOp, opacity: f32) {
    let (sw, sh) = src.dimensions();
    let (w, h) = surface.dimensions();
    if sw == 0 || sh == 0 || opacity <= 0.0 {
        return;
    }

    let to_surface = layer
        * Affine::scale_non_uniform(f64::from(w) / f64::from(sw), f64::from(h) / f64::from(sh));
    if to_surface.determinant().abs() < 1e-12 {
        return;
    }
    let inverse = to_surface.inverse();

    let bbox = to_surface.transform_rect_bbox(Rect::new(0.0, 0.0, f64::from(sw), f64::from(sh)));
    let x0 = bbox.x0.floor().max(0.0) as u32;
    let y0 = bbox.y0.floor().max(0.0) as u32;
    let x1 = bbox.x1.ceil().min(f64::from(w)) as u32;
    let y1 = bbox.y1.ceil().min(f64::from(h)) as u32;

    let (src_w, src_h) = (f64::from(sw), f64::from(sh));
    for y in y0..y1 {
        for x in x0..x1 {
            let p = inverse * Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            if p.x < 0.0 || p.y < 0.0 || p.x >= src_w || p.y >= src_h {
                continue;
            }
            let sample = sample_bilinear(src, p.x - 0.5, p.y - 0.5);
            let dst = surface.get_pixel_mut(x, y);
            dst.0 = op.composite(dst.0, sample, opacity);
        }
    }
}

/// Bilinear sample at pixel-centre coordinates, clamped to the edges.
/// Interpolates in premultiplied space so transparent texels do not bleed.
fn sample_bilinear(src: &RgbaImage, fx: f64, fy: f64) -> [u8; 4] {
    let (sw, sh) = src.dimensions();
    let fx = fx.clamp(0.0, f64::from(sw - 1));
    let fy = fy.clamp(0.0, f64::from(sh - 1));
    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(sw - 1);
    let y1 = (y0 + 1).min(sh - 1);
    let tx = fx - f64::from(x0);
    let ty = fy - f64::from(y0);

    let taps = [
        (x0, y0, (1.0 - tx) * (1.0 - ty)),
        (x1, y0, tx * (1.0 - ty)),
        (x0, y1, (1.0 - tx) * ty),
        (x1, y1, tx * ty),
    ];

    let mut alpha = 0.0;
    let mut color = [0.0f64; 3];
    for (x, y, weight) in taps {
        if weight == 0.0 {
            continue;
        }
        let px = src.get_pixel(x, y).0;
        let a = f64::from(px[3]) * weight;
        alpha += a;
        for (c, v) in color.iter_mut().zip(&px[..3]) {
            *c += f64::from(*v) * a;
        }
    }

    if alpha <= 0.0 {
        return [0, 0, 0, 0];
    }
    [
        (color[0] / alpha).round().clamp(0.0, 255.0) as u8,
        (color[1] / alpha).round().clamp(0.0, 255.0) as u8,
        (color[2] / alpha).round().clamp(0.0, 255.0) as u8,
        alpha.round().clamp(0.0, 255.0) as u8,
    ]
}
