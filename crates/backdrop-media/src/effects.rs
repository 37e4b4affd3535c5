//! Whole-frame background effects.

use image::RgbImage;
use rayon::prelude::*;

use backdrop_models::Effect;

use crate::error::MediaResult;
use crate::filters::gaussian_blur;
use crate::frame::Frame;

/// Default blur radius (21x21 kernel, sigma 3.5).
pub const DEFAULT_BLUR_RADIUS: usize = 10;

/// Contrast lift applied after grayscale conversion.
const GRAYSCALE_ALPHA: f32 = 1.1;
const GRAYSCALE_BETA: f32 = 5.0;

/// Row-major sepia transform on (R, G, B).
const SEPIA: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

/// BT.601 luma in 14-bit fixed point.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + (1 << 13)) >> 14) as u8
}

#[inline]
fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Renders effects over whole frames, independent of any mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectRenderer {
    /// Blur kernel radius in pixels
    pub blur_radius: usize,
}

impl Default for EffectRenderer {
    fn default() -> Self {
        Self {
            blur_radius: DEFAULT_BLUR_RADIUS,
        }
    }
}

impl EffectRenderer {
    pub fn new(blur_radius: usize) -> Self {
        Self { blur_radius }
    }

    /// Produce the fully filtered version of `frame`.
    pub fn render(&self, frame: &Frame, effect: Effect) -> MediaResult<Frame> {
        Ok(match effect {
            Effect::Grayscale => map_pixels(frame, |[r, g, b]| {
                let v = saturate(GRAYSCALE_ALPHA * luma(r, g, b) as f32 + GRAYSCALE_BETA);
                [v, v, v]
            }),
            Effect::Sepia => map_pixels(frame, |[r, g, b]| {
                let (r, g, b) = (r as f32, g as f32, b as f32);
                let apply = |m: [f32; 3]| saturate(m[0] * r + m[1] * g + m[2] * b);
                [apply(SEPIA[0]), apply(SEPIA[1]), apply(SEPIA[2])]
            }),
            Effect::Blur => gaussian_blur(frame, 2 * self.blur_radius as u32 + 1)?,
        })
    }
}

/// Render with default parameters.
pub fn render(frame: &Frame, effect: Effect) -> MediaResult<Frame> {
    EffectRenderer::default().render(frame, effect)
}

fn map_pixels<F>(frame: &Frame, f: F) -> Frame
where
    F: Fn([u8; 3]) -> [u8; 3] + Sync,
{
    let (w, h) = frame.dimensions();
    let mut out = frame.as_raw().clone();
    out.par_chunks_exact_mut(3).for_each(|p| {
        let mapped = f([p[0], p[1], p[2]]);
        p.copy_from_slice(&mapped);
    });
    RgbImage::from_raw(w, h, out).unwrap_or_else(|| frame.clone())
}
