//! Per-frame processing: detect, mask, render, composite.

use std::sync::Arc;

use backdrop_models::Effect;

use crate::compositor::composite;
use crate::detection::{Detections, RegionDetector};
use crate::effects::EffectRenderer;
use crate::error::MediaResult;
use crate::frame::{Frame, Mask};
use crate::mask::MaskBuilder;

/// Result of processing one frame.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub detections: Detections,
}

/// The stateless per-frame chain shared by every job.
#[derive(Clone)]
pub struct FramePipeline {
    detector: Arc<dyn RegionDetector>,
    mask_builder: MaskBuilder,
    renderer: EffectRenderer,
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("mask_builder", &self.mask_builder)
            .field("renderer", &self.renderer)
            .finish_non_exhaustive()
    }
}

impl FramePipeline {
    pub fn new(detector: Arc<dyn RegionDetector>) -> Self {
        Self {
            detector,
            mask_builder: MaskBuilder::default(),
            renderer: EffectRenderer::default(),
        }
    }

    pub fn with_mask_builder(mut self, mask_builder: MaskBuilder) -> Self {
        self.mask_builder = mask_builder;
        self
    }

    pub fn with_renderer(mut self, renderer: EffectRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn detector(&self) -> &Arc<dyn RegionDetector> {
        &self.detector
    }

    /// Detect persons and build the frame's mask.
    pub fn mask_for(&self, frame: &Frame) -> MediaResult<(Mask, Detections)> {
        let detections = self.detector.detect(frame)?;
        let (w, h) = frame.dimensions();
        let mask = self
            .mask_builder
            .build(&detections.faces, &detections.bodies, w, h)?;
        Ok((mask, detections))
    }

    /// Apply `effect` to everything but the detected persons.
    pub fn process(&self, frame: &Frame, effect: Effect) -> MediaResult<ProcessedFrame> {
        let (mask, detections) = self.mask_for(frame)?;
        let filtered = self.renderer.render(frame, effect)?;

        // An empty mask composites to the filtered frame exactly
        let frame = if detections.is_empty() || mask.is_empty() {
            filtered
        } else {
            composite(frame, &filtered, &mask)
        };

        Ok(ProcessedFrame { frame, detections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::NullDetector;
    use crate::effects::render;
    use backdrop_models::Region;
    use image::{Rgb, RgbImage};

    struct FixedDetector(Detections);

    impl RegionDetector for FixedDetector {
        fn detect(&self, _frame: &Frame) -> MediaResult<Detections> {
            Ok(self.0.clone())
        }
    }

    fn frame() -> Frame {
        RgbImage::from_fn(96, 96, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, 90]))
    }

    #[test]
    fn test_no_person_gives_fully_filtered_frame() {
        let pipeline = FramePipeline::new(Arc::new(NullDetector));
        let input = frame();
        let out = pipeline.process(&input, Effect::Sepia).unwrap();
        assert_eq!(out.frame, render(&input, Effect::Sepia).unwrap());
        assert!(out.detections.is_empty());
    }

    #[test]
    fn test_person_region_keeps_original_pixels() {
        let detections = Detections {
            faces: vec![],
            bodies: vec![Region::new(20, 10, 50, 80)],
        };
        let pipeline = FramePipeline::new(Arc::new(FixedDetector(detections)));
        let input = frame();
        let out = pipeline.process(&input, Effect::Grayscale).unwrap();

        // Centre of the body box is fully person
        assert_eq!(out.frame.get_pixel(45, 50), input.get_pixel(45, 50));
        // Far corner is fully background
        let filtered = render(&input, Effect::Grayscale).unwrap();
        assert_eq!(out.frame.get_pixel(94, 94), filtered.get_pixel(94, 94));
    }
}
