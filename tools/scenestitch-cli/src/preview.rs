//! Structure preview: renders a scene module as coloured sequence cards.
//!
//! The CLI cannot execute module code, so each frame shows which sequence
//! the analyzed layout puts on screen, tinted per sequence, with a bar along
//! the bottom tracking progress through that sequence.

use image::{Rgba, RgbaImage};
use scenestitch_common::StitchResult;
use scenestitch_render_engine::ModuleRenderer;
use scenestitch_sequence_analysis::SequenceStructure;

const PALETTE: [[u8; 3]; 6] = [
    [66, 133, 244],
    [234, 67, 53],
    [251, 188, 5],
    [52, 168, 83],
    [171, 71, 188],
    [0, 172, 193],
];

const CARD_ALPHA: u8 = 170;
const BAR: Rgba<u8> = Rgba([255, 255, 255, 230]);

pub struct StructurePreviewRenderer {
    structure: SequenceStructure,
}

impl StructurePreviewRenderer {
    pub fn new(structure: SequenceStructure) -> Self {
        Self { structure }
    }
}

impl ModuleRenderer for StructurePreviewRenderer {
    fn render_frame(&self, frame: u64, width: u32, height: u32) -> StitchResult<RgbaImage> {
        let mut img = RgbaImage::new(width, height);
        if width == 0 || height == 0 {
            return Ok(img);
        }
        let Some(index) = self.structure.sequence_at(frame) else {
            return Ok(img);
        };
        let seq = &self.structure.sequences[index];

        let [r, g, b] = PALETTE[index % PALETTE.len()];
        for pixel in img.pixels_mut() {
            *pixel = Rgba([r, g, b, CARD_ALPHA]);
        }

        let elapsed = frame.saturating_sub(seq.from) + 1;
        let progress = elapsed as f64 / seq.duration_in_frames.max(1) as f64;
        let bar_width = (progress.clamp(0.0, 1.0) * f64::from(width)).round() as u32;
        let bar_top = height - (height / 8).max(1);
        for y in bar_top..height {
            for x in 0..bar_width {
                img.put_pixel(x, y, BAR);
            }
        }
        Ok(img)
    }

    fn total_frames(&self) -> u64 {
        self.structure.total_duration_in_frames()
    }
}
