//! Job lifecycle tests against an in-memory media backend.

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

use backdrop_media::{
    Detections, EffectRenderer, Frame, FramePipeline, MediaError, MediaResult, NullDetector,
    RegionDetector, RemuxOutcome, VideoInfo,
};
use backdrop_models::{Effect, JobErrorKind, JobId, JobSnapshot, JobStatus};
use backdrop_storage::CacheStore;
use backdrop_worker::{FrameSink, FrameSource, JobManager, MediaBackend, WorkerConfig, WorkerError};

const WIDTH: u32 = 32;
const HEIGHT: u32 = 24;

#[derive(Debug, Clone)]
struct Script {
    frames: u64,
    /// Frame count reported by probing, when it differs from `frames`
    estimate: Option<u64>,
    has_audio: bool,
    fail_probe: bool,
    fail_remux: bool,
    frame_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            frames: 10,
            estimate: None,
            has_audio: false,
            fail_probe: false,
            fail_remux: false,
            frame_delay: Duration::ZERO,
        }
    }
}

fn source_frame(index: u64) -> Frame {
    let i = index as u32;
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        Rgb([
            ((x * 8 + i * 3) % 256) as u8,
            ((y * 10 + i * 5) % 256) as u8,
            ((x + y + i * 7) % 256) as u8,
        ])
    })
}

struct MemoryBackend {
    script: Script,
    probes: AtomicUsize,
    written: Arc<Mutex<Vec<Frame>>>,
}

impl MemoryBackend {
    fn new(script: Script) -> Self {
        Self {
            script,
            probes: AtomicUsize::new(0),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn written(&self) -> Vec<Frame> {
        self.written.lock().unwrap().clone()
    }
}

struct MemorySource {
    next: u64,
    total: u64,
    delay: Duration,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.next >= self.total {
            return Ok(None);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let frame = source_frame(self.next);
        self.next += 1;
        Ok(Some(frame))
    }

    async fn close(self: Box<Self>) {}
}

struct MemorySink {
    path: PathBuf,
    written: Arc<Mutex<Vec<Frame>>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        self.written.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn finish(self: Box<Self>) -> MediaResult<PathBuf> {
        tokio::fs::write(&self.path, b"video").await?;
        Ok(self.path)
    }

    async fn abort(self: Box<Self>) {}
}

#[async_trait]
impl MediaBackend for MemoryBackend {
    async fn probe(&self, source: &str) -> MediaResult<VideoInfo> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_probe {
            return Err(MediaError::FileNotFound(PathBuf::from(source)));
        }
        Ok(VideoInfo {
            duration: self.script.frames as f64 / 10.0,
            width: WIDTH,
            height: HEIGHT,
            rotation: 0,
            fps: 10.0,
            codec: "rawvideo".to_string(),
            nb_frames: Some(self.script.estimate.unwrap_or(self.script.frames)),
            has_audio: self.script.has_audio,
        })
    }

    async fn open_source(&self, _source: &str, _info: &VideoInfo) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(MemorySource {
            next: 0,
            total: self.script.frames,
            delay: self.script.frame_delay,
        }))
    }

    async fn create_sink(&self, path: &Path, _info: &VideoInfo) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            written: Arc::clone(&self.written),
        }))
    }

    async fn frame_at(&self, _source: &str, _info: &VideoInfo, frame_number: u64) -> MediaResult<Frame> {
        Ok(source_frame(frame_number))
    }

    async fn remux(
        &self,
        _source: &str,
        video: &Path,
        output: &Path,
        has_audio: bool,
        _cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<RemuxOutcome> {
        if self.script.fail_remux {
            return Err(MediaError::ffmpeg_failed(
                "Remux failed",
                Some("Could not find tag for codec".to_string()),
                Some(1),
            ));
        }
        if has_audio {
            tokio::fs::write(output, b"video+audio").await?;
            Ok(RemuxOutcome::WithAudio)
        } else {
            tokio::fs::rename(video, output).await?;
            Ok(RemuxOutcome::VideoOnly)
        }
    }
}

/// Detector that breaks on its `fail_at`-th call (0-based).
struct FailingDetector {
    fail_at: usize,
    calls: AtomicUsize,
}

impl RegionDetector for FailingDetector {
    fn detect(&self, _frame: &Frame) -> MediaResult<Detections> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(MediaError::internal("classifier state corrupted"));
        }
        Ok(Detections::default())
    }
}

struct Harness {
    _root: TempDir,
    work_dir: PathBuf,
    output_dir: PathBuf,
    backend: Arc<MemoryBackend>,
    manager: JobManager,
}

async fn harness(script: Script, max_jobs: usize) -> Harness {
    harness_with_detector(script, max_jobs, Arc::new(NullDetector)).await
}

async fn harness_with_detector(script: Script, max_jobs: usize, detector: Arc<dyn RegionDetector>) -> Harness {
    let root = TempDir::new().unwrap();
    let work_dir = root.path().join("work");
    let output_dir = root.path().join("out");
    let config = WorkerConfig {
        max_concurrent_jobs: max_jobs,
        work_dir: work_dir.to_string_lossy().to_string(),
        output_dir: output_dir.to_string_lossy().to_string(),
        remux_timeout: Duration::from_secs(30),
        progress_log_every: 5,
    };
    let cache = Arc::new(CacheStore::open(&output_dir).await.unwrap());
    let backend = Arc::new(MemoryBackend::new(script));
    let pipeline = Arc::new(FramePipeline::new(detector));
    let manager = JobManager::new(config, backend.clone(), pipeline, cache);
    Harness {
        _root: root,
        work_dir,
        output_dir,
        backend,
        manager,
    }
}

/// Poll until the job is terminal, checking progress stays consistent.
async fn wait_terminal(manager: &JobManager, id: &JobId) -> JobSnapshot {
    let mut last_processed = 0;
    for _ in 0..1000 {
        let snap = manager.status(id).expect("job should be registered");
        assert!(snap.processed_frames >= last_processed, "progress went backwards");
        assert!(snap.processed_frames <= snap.total_frames || snap.total_frames == 0);
        last_processed = snap.processed_frames;
        if snap.is_terminal() {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", id);
}

async fn wait_processing(manager: &JobManager, id: &JobId) {
    for _ in 0..1000 {
        let snap = manager.status(id).unwrap();
        if snap.status == JobStatus::Processing && snap.processed_frames > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never started", id);
}

fn dir_entries(path: &Path) -> Vec<String> {
    match std::fs::read_dir(path) {
        Ok(dir) => dir
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_sepia_without_persons_filters_every_frame() {
    let h = harness(Script::default(), 2).await;
    let id = h.manager.submit("synthetic.mp4", Effect::Sepia).await;

    let snap = wait_terminal(&h.manager, &id).await;
    assert_eq!(snap.status, JobStatus::Completed, "{:?}", snap.error);
    assert_eq!(snap.processed_frames, 10);
    assert_eq!(snap.total_frames, 10);
    assert_eq!(snap.progress(), 100.0);
    assert!(!snap.cached);

    let filename = snap.filename.unwrap();
    assert!(filename.starts_with("processed_sepia_"));
    assert!(h.output_dir.join(&filename).exists());

    // No detections: every output frame is the fully filtered source frame
    let renderer = EffectRenderer::default();
    let written = h.backend.written();
    assert_eq!(written.len(), 10);
    for (i, frame) in written.iter().enumerate() {
        assert_eq!(*frame, renderer.render(&source_frame(i as u64), Effect::Sepia).unwrap());
    }

    assert!(dir_entries(&h.work_dir).is_empty(), "temp dir left behind");
}

#[tokio::test]
async fn test_source_without_audio_completes_video_only() {
    let h = harness(Script::default(), 2).await;
    let id = h.manager.submit("silent.mp4", Effect::Grayscale).await;
    let snap = wait_terminal(&h.manager, &id).await;
    assert_eq!(snap.status, JobStatus::Completed);
    let bytes = std::fs::read(h.output_dir.join(snap.filename.unwrap())).unwrap();
    assert_eq!(bytes, b"video");
}

#[tokio::test]
async fn test_source_with_audio_is_remuxed() {
    let script = Script {
        has_audio: true,
        ..Script::default()
    };
    let h = harness(script, 2).await;
    let id = h.manager.submit("talk.mp4", Effect::Blur).await;
    let snap = wait_terminal(&h.manager, &id).await;
    assert_eq!(snap.status, JobStatus::Completed);
    let bytes = std::fs::read(h.output_dir.join(snap.filename.unwrap())).unwrap();
    assert_eq!(bytes, b"video+audio");
}

#[tokio::test]
async fn test_identical_request_is_served_from_cache() {
    let h = harness(Script::default(), 2).await;
    let first = h.manager.submit("clip.mp4", Effect::Blur).await;
    let first = wait_terminal(&h.manager, &first).await;
    assert_eq!(first.status, JobStatus::Completed);

    let second = h.manager.submit("  clip.mp4 ", Effect::Blur).await;
    let second = h.manager.status(&second).unwrap();
    assert_eq!(second.status, JobStatus::Completed);
    assert!(second.cached);
    assert_eq!(second.filename, first.filename);
    assert_eq!(h.backend.probes.load(Ordering::SeqCst), 1);

    // A different effect is a different result
    let third = h.manager.submit("clip.mp4", Effect::Sepia).await;
    let third = wait_terminal(&h.manager, &third).await;
    assert!(!third.cached);
    assert_ne!(third.filename, first.filename);
}

#[tokio::test]
async fn test_cancel_running_job_discards_output() {
    let script = Script {
        frames: 500,
        frame_delay: Duration::from_millis(5),
        ..Script::default()
    };
    let h = harness(script, 2).await;
    let id = h.manager.submit("long.mp4", Effect::Sepia).await;

    wait_processing(&h.manager, &id).await;
    assert!(h.manager.cancel(&id));

    let snap = wait_terminal(&h.manager, &id).await;
    assert_eq!(snap.status, JobStatus::Cancelled);
    assert!(snap.processed_frames < 500);
    assert!(snap.filename.is_none());
    assert!(!h.manager.cancel(&id));

    assert!(dir_entries(&h.work_dir).is_empty(), "temp dir left behind");
    assert!(dir_entries(&h.output_dir).iter().all(|f| !f.ends_with(".mp4")));
    assert_eq!(h.manager.cache().stats().await.count, 0);
}

#[tokio::test]
async fn test_cancel_queued_job() {
    let script = Script {
        frames: 500,
        frame_delay: Duration::from_millis(5),
        ..Script::default()
    };
    let h = harness(script, 1).await;
    let running = h.manager.submit("a.mp4", Effect::Blur).await;
    wait_processing(&h.manager, &running).await;

    let queued = h.manager.submit("b.mp4", Effect::Blur).await;
    assert_eq!(h.manager.status(&queued).unwrap().status, JobStatus::Queued);
    assert!(h.manager.cancel(&queued));
    assert_eq!(h.manager.status(&queued).unwrap().status, JobStatus::Cancelled);

    assert!(h.manager.cancel(&running));
    assert_eq!(wait_terminal(&h.manager, &running).await.status, JobStatus::Cancelled);
}

#[tokio::test]
async fn test_unreadable_source_fails_job() {
    let script = Script {
        fail_probe: true,
        ..Script::default()
    };
    let h = harness(script, 2).await;
    let id = h.manager.submit("missing.mp4", Effect::Sepia).await;
    let snap = wait_terminal(&h.manager, &id).await;
    assert_eq!(snap.status, JobStatus::Failed);
    assert_eq!(snap.error_kind, Some(JobErrorKind::SourceUnavailable));
    assert!(snap.error.unwrap().contains("missing.mp4"));
}

#[tokio::test]
async fn test_remux_failure_fails_job() {
    let script = Script {
        has_audio: true,
        fail_remux: true,
        ..Script::default()
    };
    let h = harness(script, 2).await;
    let id = h.manager.submit("talk.mp4", Effect::Sepia).await;
    let snap = wait_terminal(&h.manager, &id).await;
    assert_eq!(snap.status, JobStatus::Failed);
    assert_eq!(snap.error_kind, Some(JobErrorKind::AudioError));
    assert_eq!(h.manager.cache().stats().await.count, 0);
    assert!(dir_entries(&h.work_dir).is_empty());
}

#[tokio::test]
async fn test_detector_failure_mid_stream_fails_job() {
    let script = Script {
        frames: 20,
        ..Script::default()
    };
    let detector = Arc::new(FailingDetector {
        fail_at: 5,
        calls: AtomicUsize::new(0),
    });
    let h = harness_with_detector(script, 2, detector).await;
    let id = h.manager.submit("clip.mp4", Effect::Blur).await;

    let snap = wait_terminal(&h.manager, &id).await;
    assert_eq!(snap.status, JobStatus::Failed);
    assert_eq!(snap.error_kind, Some(JobErrorKind::PipelineFailure));
    assert!(snap.error.unwrap().contains("classifier state corrupted"));
    assert_eq!(snap.processed_frames, 5);
    assert_eq!(h.backend.written().len(), 5);
    assert!(snap.filename.is_none());
    assert_eq!(h.manager.cache().stats().await.count, 0);
    assert!(dir_entries(&h.work_dir).is_empty(), "temp dir left behind");
}

#[tokio::test]
async fn test_index_write_failure_removes_moved_artifact() {
    let h = harness(Script::default(), 2).await;
    std::fs::create_dir(h.output_dir.join("cache_index.json.tmp")).unwrap();

    let id = h.manager.submit("clip.mp4", Effect::Sepia).await;
    let snap = wait_terminal(&h.manager, &id).await;
    assert_eq!(snap.status, JobStatus::Failed);
    assert_eq!(snap.error_kind, Some(JobErrorKind::Internal));
    assert_eq!(h.manager.cache().stats().await.count, 0);

    let leftovers: Vec<String> = dir_entries(&h.output_dir)
        .into_iter()
        .filter(|name| name.starts_with("processed_"))
        .collect();
    assert!(leftovers.is_empty(), "unindexed artifacts: {:?}", leftovers);
    assert!(dir_entries(&h.work_dir).is_empty(), "temp dir left behind");
}

#[tokio::test]
async fn test_short_frame_estimate_is_raised() {
    let script = Script {
        frames: 7,
        estimate: Some(4),
        ..Script::default()
    };
    let h = harness(script, 2).await;
    let id = h.manager.submit("vfr.mp4", Effect::Grayscale).await;
    let snap = wait_terminal(&h.manager, &id).await;
    assert_eq!(snap.status, JobStatus::Completed);
    assert_eq!((snap.processed_frames, snap.total_frames), (7, 7));
}

#[tokio::test]
async fn test_evict_only_finished_jobs() {
    let script = Script {
        frames: 500,
        frame_delay: Duration::from_millis(5),
        ..Script::default()
    };
    let h = harness(script, 2).await;
    let id = h.manager.submit("long.mp4", Effect::Blur).await;
    wait_processing(&h.manager, &id).await;

    assert!(matches!(h.manager.evict(&id), Err(WorkerError::JobActive(_))));
    h.manager.cancel(&id);
    wait_terminal(&h.manager, &id).await;

    assert!(h.manager.evict(&id).unwrap());
    assert!(h.manager.status(&id).is_none());
    assert!(!h.manager.evict(&id).unwrap());
}

#[tokio::test]
async fn test_list_returns_all_jobs() {
    let h = harness(Script::default(), 2).await;
    let a = h.manager.submit("a.mp4", Effect::Sepia).await;
    let b = h.manager.submit("b.mp4", Effect::Blur).await;
    wait_terminal(&h.manager, &a).await;
    wait_terminal(&h.manager, &b).await;

    let ids: Vec<JobId> = h.manager.list().into_iter().map(|s| s.job_id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&a) && ids.contains(&b));
    assert_eq!(h.manager.active_count(), 0);
}
