//! Person mask construction from detected regions.

use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_ellipse_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};

use backdrop_models::Region;

use crate::error::MediaResult;
use crate::filters::{close_open, gaussian_blur};
use crate::frame::Mask;

const PERSON: Luma<u8> = Luma([255]);

/// How a region is rasterised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskShape {
    #[default]
    Rectangle,
    /// Ellipse inscribed in the region
    Ellipse,
}

/// Mask construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskConfig {
    pub shape: MaskShape,
    /// Side of the square structuring element for closing/opening
    pub kernel_size: usize,
    /// Radius of the final Gaussian (21x21 kernel at 10)
    pub blur_radius: usize,
    /// Grow face boxes to cover head and shoulders
    pub expand_faces: bool,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            shape: MaskShape::Rectangle,
            kernel_size: 15,
            blur_radius: 10,
            expand_faces: true,
        }
    }
}

/// Head-and-shoulders box around a face: twice as wide and three times as
/// tall, starting half a face up and to the left.
///
/// A box that would start outside the frame is shifted to the edge rather
/// than shrunk, then cut to the frame's far edges.
pub fn expand_face(face: &Region, width: u32, height: u32) -> Region {
    let x = (face.x - face.width / 2).max(0);
    let y = (face.y - face.height / 2).max(0);
    Region::new(
        x,
        y,
        (face.width * 2).min(width as i32 - x),
        (face.height * 3).min(height as i32 - y),
    )
}

/// Turns detected regions into a soft-edged person mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskBuilder {
    config: MaskConfig,
}

impl MaskBuilder {
    pub fn new(config: MaskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    /// Build the mask for a `width` x `height` frame.
    pub fn build(&self, faces: &[Region], bodies: &[Region], width: u32, height: u32) -> MediaResult<Mask> {
        let regions: Vec<Region> = faces
            .iter()
            .map(|f| {
                if self.config.expand_faces {
                    expand_face(f, width, height)
                } else {
                    *f
                }
            })
            .chain(bodies.iter().copied())
            .map(|r| r.clamp(width, height))
            .filter(|r| !r.is_empty())
            .collect();

        if regions.is_empty() {
            return Ok(Mask::empty(width, height));
        }

        let mut mask = GrayImage::new(width, height);
        for region in &regions {
            match self.config.shape {
                MaskShape::Rectangle => draw_filled_rect_mut(
                    &mut mask,
                    Rect::at(region.x, region.y).of_size(region.width as u32, region.height as u32),
                    PERSON,
                ),
                MaskShape::Ellipse => {
                    let (rx, ry) = (region.width / 2, region.height / 2);
                    draw_filled_ellipse_mut(&mut mask, (region.x + rx, region.y + ry), rx, ry, PERSON)
                }
            }
        }

        // Close merges face and body boxes, open drops isolated specks
        let mask = close_open(&mask, self.config.kernel_size as u32)?;
        let mask = gaussian_blur(&mask, 2 * self.config.blur_radius as u32 + 1)?;
        Ok(Mask::from_image(mask))
    }
}
