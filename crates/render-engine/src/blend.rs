//! Pixel compositing operators.
//!
//! Each [`BlendMode`] maps to one operator. Colour mixing follows the W3C
//! Compositing and Blending separable blend functions; alpha uses
//! source-over. Rasters are straight (non-premultiplied) RGBA8.

use scenestitch_timeline_model::BlendMode;

/// Surface operator a layer is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeOp {
    SourceOver,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl From<BlendMode> for CompositeOp {
    fn from(mode: BlendMode) -> Self {
        match mode {
            BlendMode::Normal => CompositeOp::SourceOver,
            BlendMode::Multiply => CompositeOp::Multiply,
            BlendMode::Screen => CompositeOp::Screen,
            BlendMode::Overlay => CompositeOp::Overlay,
            BlendMode::Darken => CompositeOp::Darken,
            BlendMode::Lighten => CompositeOp::Lighten,
            BlendMode::ColorDodge => CompositeOp::ColorDodge,
            BlendMode::ColorBurn => CompositeOp::ColorBurn,
            BlendMode::HardLight => CompositeOp::HardLight,
            BlendMode::SoftLight => CompositeOp::SoftLight,
            BlendMode::Difference => CompositeOp::Difference,
            BlendMode::Exclusion => CompositeOp::Exclusion,
        }
    }
}

impl CompositeOp {
    /// Canvas `globalCompositeOperation` name.
    pub fn as_str(self) -> &'static str {
        match self {
            CompositeOp::SourceOver => "source-over",
            CompositeOp::Multiply => "multiply",
            CompositeOp::Screen => "screen",
            CompositeOp::Overlay => "overlay",
            CompositeOp::Darken => "darken",
            CompositeOp::Lighten => "lighten",
            CompositeOp::ColorDodge => "color-dodge",
            CompositeOp::ColorBurn => "color-burn",
            CompositeOp::HardLight => "hard-light",
            CompositeOp::SoftLight => "soft-light",
            CompositeOp::Difference => "difference",
            CompositeOp::Exclusion => "exclusion",
        }
    }

    /// Separable blend function `B(cb, cs)` on unit-range channels.
    pub fn blend_channel(self, cb: f32, cs: f32) -> f32 {
        match self {
            CompositeOp::SourceOver => cs,
            CompositeOp::Multiply => cb * cs,
            CompositeOp::Screen => screen(cb, cs),
            CompositeOp::Overlay => hard_light(cs, cb),
            CompositeOp::Darken => cb.min(cs),
            CompositeOp::Lighten => cb.max(cs),
            CompositeOp::ColorDodge => {
                if cb <= 0.0 {
                    0.0
                } else if cs >= 1.0 {
                    1.0
                } else {
                    (cb / (1.0 - cs)).min(1.0)
                }
            }
            CompositeOp::ColorBurn => {
                if cb >= 1.0 {
                    1.0
                } else if cs <= 0.0 {
                    0.0
                } else {
                    1.0 - ((1.0 - cb) / cs).min(1.0)
                }
            }
            CompositeOp::HardLight => hard_light(cb, cs),
            CompositeOp::SoftLight => {
                if cs <= 0.5 {
                    cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
                } else {
                    let d = if cb <= 0.25 {
                        ((16.0 * cb - 12.0) * cb + 4.0) * cb
                    } else {
                        cb.sqrt()
                    };
                    cb + (2.0 * cs - 1.0) * (d - cb)
                }
            }
            CompositeOp::Difference => (cb - cs).abs(),
            CompositeOp::Exclusion => cb + cs - 2.0 * cb * cs,
        }
    }

    /// Composite straight-alpha `src` onto straight-alpha `dst`, with the
    /// source alpha further scaled by `opacity`.
    pub fn composite(self, dst: [u8; 4], src: [u8; 4], opacity: f32) -> [u8; 4] {
        let alpha_s = unit(src[3]) * opacity.clamp(0.0, 1.0);
        if alpha_s <= 0.0 {
            return dst;
        }
        let alpha_b = unit(dst[3]);
        let alpha_o = alpha_s + alpha_b * (1.0 - alpha_s);
        if alpha_o <= 0.0 {
            return [0, 0, 0, 0];
        }

        let mut out = [0u8; 4];
        for i in 0..3 {
            let cs = unit(src[i]);
            let cb = unit(dst[i]);
            let mixed = (1.0 - alpha_b) * cs + alpha_b * self.blend_channel(cb, cs);
            let premul = alpha_s * mixed + (1.0 - alpha_s) * alpha_b * cb;
            out[i] = to_u8(premul / alpha_o);
        }
        out[3] = to_u8(alpha_o);
        out
    }
}

fn screen(cb: f32, cs: f32) -> f32 {
    cb + cs - cb * cs
}

fn hard_light(cb: f32, cs: f32) -> f32 {
    if cs <= 0.5 {
        cb * (2.0 * cs)
    } else {
        screen(cb, 2.0 * cs - 1.0)
    }
}

fn unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREY: [u8; 4] = [128, 128, 128, 255];

    #[test]
    fn test_every_mode_has_an_operator() {
        let names: Vec<_> = BlendMode::ALL
            .into_iter()
            .map(|m| CompositeOp::from(m).as_str())
            .collect();
        assert_eq!(names[0], "source-over");
        assert_eq!(&names[1..], BlendMode::ALL[1..].iter().map(|m| m.name()).collect::<Vec<_>>());
    }

    #[test]
    fn test_source_over_opaque_replaces() {
        assert_eq!(CompositeOp::SourceOver.composite(GREY, RED, 1.0), RED);
    }

    #[test]
    fn test_zero_opacity_is_noop() {
        for mode in BlendMode::ALL {
            assert_eq!(CompositeOp::from(mode).composite(GREY, RED, 0.0), GREY);
        }
    }

    #[test]
    fn test_transparent_destination_shows_source() {
        for mode in BlendMode::ALL {
            let out = CompositeOp::from(mode).composite([0, 0, 0, 0], [10, 200, 30, 255], 1.0);
            assert_eq!(out, [10, 200, 30, 255], "{mode:?}");
        }
    }

    #[test]
    fn test_separable_formulas() {
        let white = [255, 255, 255, 255];
        let black = [0, 0, 0, 255];
        assert_eq!(CompositeOp::Multiply.composite(GREY, white, 1.0), GREY);
        assert_eq!(CompositeOp::Screen.composite(GREY, black, 1.0), GREY);
        assert_eq!(CompositeOp::Difference.composite(white, GREY, 1.0), [127, 127, 127, 255]);
        assert_eq!(CompositeOp::Darken.composite(GREY, RED, 1.0), [128, 0, 0, 255]);
        assert_eq!(CompositeOp::Lighten.composite(GREY, RED, 1.0), [255, 128, 128, 255]);
        assert_eq!(CompositeOp::ColorDodge.composite(black, white, 1.0), black);
        assert_eq!(CompositeOp::ColorBurn.composite(white, black, 1.0), white);
    }

    #[test]
    fn test_half_opacity_over_opaque() {
        let out = CompositeOp::SourceOver.composite([0, 0, 0, 255], [255, 255, 255, 255], 0.5);
        assert_eq!(out, [128, 128, 128, 255]);
    }
}
