//! Alpha blending of original and filtered frames.

use image::RgbImage;
use rayon::prelude::*;

use crate::frame::{Frame, Mask};

/// Blend `original` over `filtered` using `mask` as the original's weight.
///
/// `out = (o * m + f * (255 - m) + 127) / 255` per channel, which is exact
/// at m = 0 and m = 255.
///
/// # Panics
///
/// Panics if the three inputs differ in size.
pub fn composite(original: &Frame, filtered: &Frame, mask: &Mask) -> Frame {
    assert_eq!(
        original.dimensions(),
        filtered.dimensions(),
        "original and filtered frames must have the same size"
    );
    assert_eq!(
        original.dimensions(),
        mask.dimensions(),
        "mask must match the frame size"
    );

    let (w, h) = original.dimensions();
    let mut out = vec![0u8; original.as_raw().len()];
    out.par_chunks_exact_mut(3)
        .zip(original.as_raw().par_chunks_exact(3))
        .zip(filtered.as_raw().par_chunks_exact(3))
        .zip(mask.as_raw().par_iter())
        .for_each(|(((dst, o), f), &m)| {
            let m = m as u32;
            let inv = 255 - m;
            for c in 0..3 {
                dst[c] = ((o[c] as u32 * m + f[c] as u32 * inv + 127) / 255) as u8;
            }
        });

    RgbImage::from_raw(w, h, out).unwrap_or_else(|| filtered.clone())
}
