//! Frame and mask buffers.

use image::{GrayImage, Luma, RgbImage};

use crate::error::{MediaError, MediaResult};

/// A decoded video frame: 8-bit RGB, row-major.
pub type Frame = RgbImage;

/// Build a frame from a raw rgb24 buffer.
pub fn frame_from_raw(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Frame> {
    let expected = width as usize * height as usize * 3;
    let actual = data.len();
    RgbImage::from_raw(width, height, data).ok_or_else(|| {
        MediaError::invalid_video(format!(
            "Raw frame is {} bytes, expected {} for {}x{}",
            actual, expected, width, height
        ))
    })
}

/// Per-pixel person weight congruent with a frame.
///
/// 0 is pure background, 255 is pure person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask(GrayImage);

impl Mask {
    /// An all-background mask.
    pub fn empty(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// A mask with every pixel set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self(GrayImage::from_pixel(width, height, Luma([value])))
    }

    pub fn from_image(image: GrayImage) -> Self {
        Self(image)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    /// Weight at (x, y).
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.0.get_pixel(x, y)[0]
    }

    /// Raw weights, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// Whether no pixel carries any person weight.
    pub fn is_empty(&self) -> bool {
        self.0.as_raw().iter().all(|&v| v == 0)
    }

    /// Fraction of pixels with weight above 127.
    pub fn coverage(&self) -> f64 {
        let raw = self.0.as_raw();
        if raw.is_empty() {
            return 0.0;
        }
        raw.iter().filter(|&&v| v > 127).count() as f64 / raw.len() as f64
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_image(self) -> GrayImage {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_raw_checks_length() {
        assert!(frame_from_raw(2, 2, vec![0; 12]).is_ok());
        assert!(matches!(
            frame_from_raw(2, 2, vec![0; 11]),
            Err(MediaError::InvalidVideo(_))
        ));
    }

    #[test]
    fn test_mask_coverage() {
        let mut img = GrayImage::new(4, 1);
        img.put_pixel(0, 0, Luma([255]));
        img.put_pixel(1, 0, Luma([128]));
        img.put_pixel(2, 0, Luma([127]));
        let mask = Mask::from_image(img);
        assert!((mask.coverage() - 0.5).abs() < 1e-9);
        assert!(!mask.is_empty());
        assert!(Mask::empty(3, 3).is_empty());
    }
}
