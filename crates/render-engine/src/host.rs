//! Host-side rendering of the non-module timeline content.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use scenestitch_common::StitchResult;
use scenestitch_timeline_model::Timeline;

/// Produces the host-only raster (video, image and text tracks) for one
/// instant. Module elements are composited on top by the export engine.
#[async_trait]
pub trait HostRenderer: Send {
    async fn render_frame(
        &mut self,
        timeline: &Timeline,
        time_secs: f64,
        width: u32,
        height: u32,
    ) -> StitchResult<RgbaImage>;
}

/// Fills every frame with one colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidHostRenderer {
    color: [u8; 4],
}

impl SolidHostRenderer {
    pub fn new(color: [u8; 4]) -> Self {
        Self { color }
    }
}

#[async_trait]
impl HostRenderer for SolidHostRenderer {
    async fn render_frame(
        &mut self,
        _timeline: &Timeline,
        _time_secs: f64,
        width: u32,
        height: u32,
    ) -> StitchResult<RgbaImage> {
        Ok(RgbaImage::from_pixel(width, height, Rgba(self.color)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_solid_fill() {
        let mut host = SolidHostRenderer::new([16, 16, 20, 255]);
        let frame = host.render_frame(&Timeline::new(), 0.0, 3, 2).await.unwrap();
        assert_eq!(frame.dimensions(), (3, 2));
        assert!(frame.pixels().all(|p| p.0 == [16, 16, 20, 255]));
    }
}
