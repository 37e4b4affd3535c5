#![deny(unreachable_patterns)]
//! Media layer for background effects.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a cancellable runner
//! - ffprobe metadata, rgb24 frame decoding and encoding over pipes
//! - Person detection with OpenCV Haar cascades (face + full body)
//! - Mask construction, effect rendering and compositing
//! - Audio remuxing and mask preview images

pub mod command;
pub mod compositor;
pub mod decode;
pub mod detection;
pub mod effects;
pub mod encode;
pub mod error;
pub mod filters;
pub mod frame;
pub mod fs_utils;
pub mod mask;
pub mod pipeline;
pub mod preview;
pub mod probe;
pub mod remux;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compositor::composite;
pub use decode::{extract_frame, FrameReader};
pub use detection::{
    CascadeDetector, DetectionParams, Detections, DetectorConfig, NullDetector, RegionDetector,
};
pub use effects::{render, EffectRenderer};
pub use encode::{EncodeSettings, FrameWriter};
pub use error::{MediaError, MediaResult};
pub use frame::{Frame, Mask};
pub use fs_utils::move_file;
pub use mask::{MaskBuilder, MaskConfig, MaskShape};
pub use pipeline::{FramePipeline, ProcessedFrame};
pub use preview::{jpeg_data_url, overlay_mask};
pub use probe::{probe_video, VideoInfo};
pub use remux::{AudioRemuxer, RemuxOutcome};
