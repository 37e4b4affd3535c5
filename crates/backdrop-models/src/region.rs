use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// X coordinate of the top-left corner
    pub x: i32,
    /// Y coordinate of the top-left corner
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Region {
    /// Create a new region.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Right edge (exclusive).
    #[inline]
    pub fn x2(&self) -> i32 {
        self.x + self.width
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub fn y2(&self) -> i32 {
        self.y + self.height
    }

    /// Area in pixels.
    #[inline]
    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// Whether the region covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Clip the region to a `width` x `height` frame.
    pub fn clamp(&self, width: u32, height: u32) -> Region {
        let x1 = self.x.clamp(0, width as i32);
        let y1 = self.y.clamp(0, height as i32);
        let x2 = self.x2().clamp(0, width as i32);
        let y2 = self.y2().clamp(0, height as i32);
        Region::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
    }

    /// Scale coordinates by `factor` (used to map detections from a
    /// downscaled copy back to the frame).
    pub fn scale(&self, factor: f64) -> Region {
        Region::new(
            (self.x as f64 * factor).round() as i32,
            (self.y as f64 * factor).round() as i32,
            (self.width as f64 * factor).round() as i32,
            (self.height as f64 * factor).round() as i32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_frame() {
        let r = Region::new(-10, 5, 50, 200).clamp(30, 100);
        assert_eq!(r, Region::new(0, 5, 30, 95));
    }

    #[test]
    fn test_clamp_outside_frame_is_empty() {
        assert!(Region::new(500, 500, 10, 10).clamp(100, 100).is_empty());
    }

    #[test]
    fn test_scale() {
        assert_eq!(Region::new(10, 20, 30, 40).scale(2.0), Region::new(20, 40, 60, 80));
    }
}
