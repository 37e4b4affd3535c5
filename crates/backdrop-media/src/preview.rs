//! Mask previews: the detected person tinted green over a dimmed frame.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use rayon::prelude::*;

use crate::error::MediaResult;
use crate::frame::{Frame, Mask};

/// Opacity of the green tint.
const OVERLAY_ALPHA: f32 = 0.3;
const JPEG_QUALITY: u8 = 85;

/// Blend a green layer over `frame` wherever the mask is above 127.
///
/// The whole frame is weighted by `1 - alpha`, so background pixels come
/// out dimmed and person pixels pick up the tint.
pub fn overlay_mask(frame: &Frame, mask: &Mask) -> Frame {
    assert_eq!(frame.dimensions(), mask.dimensions(), "mask must match the frame size");

    let (w, h) = frame.dimensions();
    let mut out = frame.as_raw().clone();
    out.par_chunks_exact_mut(3)
        .zip(mask.as_raw().par_iter())
        .for_each(|(p, &m)| {
            let green = if m > 127 { 255.0 } else { 0.0 };
            let tint = [0.0, green, 0.0];
            for c in 0..3 {
                let v = p[c] as f32 * (1.0 - OVERLAY_ALPHA) + tint[c] * OVERLAY_ALPHA;
                p[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        });
    RgbImage::from_raw(w, h, out).unwrap_or_else(|| frame.clone())
}

/// Encode a frame as a `data:image/jpeg;base64,...` URL.
pub fn jpeg_data_url(frame: &Frame) -> MediaResult<String> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(frame)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)))
}
