//! Face and full-body detection on video frames.

use std::path::PathBuf;

#[cfg(feature = "opencv")]
use std::{path::Path, sync::Mutex};
#[cfg(feature = "opencv")]
use tracing::{debug, info};

#[cfg(feature = "opencv")]
use opencv::{
    core::{Mat, Rect, Size, Vector},
    imgproc,
    objdetect::CascadeClassifier,
    prelude::*,
};

use backdrop_models::Region;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Default face cascade file name.
pub const FACE_CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";
/// Default full-body cascade file name.
pub const BODY_CASCADE_FILE: &str = "haarcascade_fullbody.xml";

/// Regions found in one frame, in frame coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detections {
    pub faces: Vec<Region>,
    pub bodies: Vec<Region>,
}

impl Detections {
    /// No person found; the mask degrades to all background.
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty() && self.bodies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.faces.len() + self.bodies.len()
    }
}

/// Anything that can locate persons in a frame.
///
/// Stateless per frame: implementations must not carry information from one
/// call to the next.
pub trait RegionDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> MediaResult<Detections>;
}

/// Detector that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDetector;

impl RegionDetector for NullDetector {
    fn detect(&self, _frame: &Frame) -> MediaResult<Detections> {
        Ok(Detections::default())
    }
}

/// Multi-scale scan parameters for one cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Pyramid step between scan scales (> 1)
    pub scale_factor: f64,
    /// Neighbouring hits a candidate needs to be kept
    pub min_neighbors: usize,
    /// Smallest object (width, height) reported
    pub min_size: (u32, u32),
    /// Largest object reported, unbounded when `None`
    pub max_size: Option<(u32, u32)>,
}

impl DetectionParams {
    /// Face tuning: fine pyramid, strict voting.
    pub fn face() -> Self {
        Self {
            scale_factor: 1.05,
            min_neighbors: 3,
            min_size: (20, 20),
            max_size: None,
        }
    }

    /// Body tuning: coarser pyramid, lenient voting.
    pub fn body() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 2,
            min_size: (40, 80),
            max_size: None,
        }
    }

    pub fn validate(&self) -> MediaResult<()> {
        if self.scale_factor.is_nan() || self.scale_factor <= 1.0 {
            return Err(MediaError::cascade(format!(
                "scale factor must be greater than 1, got {}",
                self.scale_factor
            )));
        }
        Ok(())
    }

    /// Size limits for an image resized by `factor`.
    pub fn scaled_sizes(&self, factor: f64) -> Self {
        let scale = |(w, h): (u32, u32)| {
            (
                ((w as f64 * factor).round() as u32).max(1),
                ((h as f64 * factor).round() as u32).max(1),
            )
        };
        Self {
            min_size: scale(self.min_size),
            max_size: self.max_size.map(scale),
            ..*self
        }
    }
}

/// Detector configuration.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Directory holding the cascade XML files
    pub cascade_dir: PathBuf,
    pub face_cascade: String,
    pub body_cascade: String,
    /// Frames wider than this are downscaled before detection (0 = never)
    pub detect_width: u32,
    pub face: DetectionParams,
    pub body: DetectionParams,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cascade_dir: PathBuf::from("/usr/share/opencv4/haarcascades"),
            face_cascade: FACE_CASCADE_FILE.to_string(),
            body_cascade: BODY_CASCADE_FILE.to_string(),
            detect_width: 640,
            face: DetectionParams::face(),
            body: DetectionParams::body(),
        }
    }
}

impl DetectorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cascade_dir: std::env::var("CASCADE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cascade_dir),
            detect_width: std::env::var("DETECT_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.detect_width),
            ..defaults
        }
    }

    pub fn face_cascade_path(&self) -> PathBuf {
        self.cascade_dir.join(&self.face_cascade)
    }

    pub fn body_cascade_path(&self) -> PathBuf {
        self.cascade_dir.join(&self.body_cascade)
    }
}

/// Map detections made on an image downscaled by `factor` back onto the
/// `width` x `height` frame.
pub fn to_frame_regions(found: &[Region], factor: f64, width: u32, height: u32) -> Vec<Region> {
    found
        .iter()
        .map(|r| r.scale(factor).clamp(width, height))
        .filter(|r| !r.is_empty())
        .collect()
}

/// Two independently tuned OpenCV Haar cascades run over a grayscale copy
/// of each frame.
///
/// `detectMultiScale` needs the classifier mutably, so each cascade sits
/// behind its own lock.
#[cfg(feature = "opencv")]
pub struct CascadeDetector {
    face: Mutex<CascadeClassifier>,
    body: Mutex<CascadeClassifier>,
    face_params: DetectionParams,
    body_params: DetectionParams,
    detect_width: u32,
}

#[cfg(feature = "opencv")]
impl std::fmt::Debug for CascadeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeDetector")
            .field("face_params", &self.face_params)
            .field("body_params", &self.body_params)
            .field("detect_width", &self.detect_width)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "opencv")]
fn cascade_err(op: &'static str) -> impl Fn(opencv::Error) -> MediaError {
    move |e| MediaError::cascade(format!("{}: {}", op, e))
}

#[cfg(feature = "opencv")]
fn load_classifier(path: &Path) -> MediaResult<CascadeClassifier> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    let name = path
        .to_str()
        .ok_or_else(|| MediaError::cascade(format!("Non UTF-8 cascade path: {}", path.display())))?;
    let classifier = CascadeClassifier::new(name).map_err(cascade_err("Load cascade"))?;
    if classifier.empty().map_err(cascade_err("Load cascade"))? {
        return Err(MediaError::cascade(format!("Cascade is empty: {}", path.display())));
    }
    Ok(classifier)
}

#[cfg(feature = "opencv")]
impl CascadeDetector {
    /// Load both cascades named by the config.
    pub fn from_config(config: &DetectorConfig) -> MediaResult<Self> {
        config.face.validate()?;
        config.body.validate()?;
        let face = load_classifier(&config.face_cascade_path())?;
        let body = load_classifier(&config.body_cascade_path())?;
        info!(
            cascade_dir = %config.cascade_dir.display(),
            face = %config.face_cascade,
            body = %config.body_cascade,
            "Loaded person cascades"
        );
        Ok(Self {
            face: Mutex::new(face),
            body: Mutex::new(body),
            face_params: config.face,
            body_params: config.body,
            detect_width: config.detect_width,
        })
    }

    fn run(classifier: &Mutex<CascadeClassifier>, gray: &Mat, params: &DetectionParams) -> MediaResult<Vec<Region>> {
        let (min_w, min_h) = params.min_size;
        let (max_w, max_h) = params.max_size.unwrap_or((0, 0));
        let mut found = Vector::<Rect>::new();
        let mut classifier = classifier
            .lock()
            .map_err(|_| MediaError::cascade("Cascade lock poisoned"))?;
        classifier
            .detect_multi_scale(
                gray,
                &mut found,
                params.scale_factor,
                params.min_neighbors as i32,
                0,
                Size::new(min_w as i32, min_h as i32),
                Size::new(max_w as i32, max_h as i32),
            )
            .map_err(cascade_err("detectMultiScale"))?;
        Ok(found
            .iter()
            .map(|r| Region::new(r.x, r.y, r.width, r.height))
            .collect())
    }
}

#[cfg(feature = "opencv")]
impl RegionDetector for CascadeDetector {
    fn detect(&self, frame: &Frame) -> MediaResult<Detections> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(Detections::default());
        }

        let rgb = crate::filters::backend::to_mat(frame)?;
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY)
            .map_err(cascade_err("Gray conversion"))?;

        let (work, factor) = if self.detect_width > 0 && width > self.detect_width {
            let factor = width as f64 / self.detect_width as f64;
            let h = ((height as f64 / factor).round() as i32).max(1);
            let mut small = Mat::default();
            imgproc::resize(
                &gray,
                &mut small,
                Size::new(self.detect_width as i32, h),
                0.0,
                0.0,
                imgproc::INTER_AREA,
            )
            .map_err(cascade_err("Resize"))?;
            (small, factor)
        } else {
            (gray, 1.0)
        };

        let faces = Self::run(&self.face, &work, &self.face_params.scaled_sizes(1.0 / factor))?;
        let bodies = Self::run(&self.body, &work, &self.body_params.scaled_sizes(1.0 / factor))?;

        let detections = Detections {
            faces: to_frame_regions(&faces, factor, width, height),
            bodies: to_frame_regions(&bodies, factor, width, height),
        };
        debug!(
            faces = detections.faces.len(),
            bodies = detections.bodies.len(),
            "Frame detections"
        );
        Ok(detections)
    }
}

/// Stub for builds without OpenCV: loading always fails, so callers fall
/// back to another detector.
#[cfg(not(feature = "opencv"))]
#[derive(Debug, Clone, Copy)]
pub struct CascadeDetector {
    _private: (),
}

#[cfg(not(feature = "opencv"))]
impl CascadeDetector {
    pub fn from_config(_config: &DetectorConfig) -> MediaResult<Self> {
        Err(MediaError::cascade("OpenCV feature not enabled"))
    }
}

#[cfg(not(feature = "opencv"))]
impl RegionDetector for CascadeDetector {
    fn detect(&self, _frame: &Frame) -> MediaResult<Detections> {
        Err(MediaError::cascade("OpenCV feature not enabled"))
    }
}
