//! Person detection with OpenCV Haar cascades.
//!
//! A face cascade and a full-body cascade run on every frame; the regions
//! they find feed the mask builder.

pub mod detector;

pub use detector::{
    to_frame_regions, CascadeDetector, DetectionParams, Detections, DetectorConfig, NullDetector,
    RegionDetector, BODY_CASCADE_FILE, FACE_CASCADE_FILE,
};
