//! Media I/O seam between the worker and ffmpeg.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;

use backdrop_media::{
    extract_frame, probe_video, AudioRemuxer, EncodeSettings, Frame, FrameReader, FrameWriter,
    MediaResult, RemuxOutcome, VideoInfo,
};

/// Ordered stream of decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream is exhausted.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Release the decoder, possibly before the end of the stream.
    async fn close(self: Box<Self>);
}

/// Silent video stream being written.
#[async_trait]
pub trait FrameSink: Send {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Flush and close the stream, returning the written file.
    async fn finish(self: Box<Self>) -> MediaResult<PathBuf>;

    /// Drop the stream without finalising it.
    async fn abort(self: Box<Self>);
}

/// Everything a job needs from the media layer.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn probe(&self, source: &str) -> MediaResult<VideoInfo>;

    async fn open_source(&self, source: &str, info: &VideoInfo) -> MediaResult<Box<dyn FrameSource>>;

    async fn create_sink(&self, path: &Path, info: &VideoInfo) -> MediaResult<Box<dyn FrameSink>>;

    /// Decode the single frame at `frame_number` (0-based).
    async fn frame_at(&self, source: &str, info: &VideoInfo, frame_number: u64) -> MediaResult<Frame>;

    /// Put the source's audio next to the video in `video`, writing `output`.
    async fn remux(
        &self,
        source: &str,
        video: &Path,
        output: &Path,
        has_audio: bool,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<RemuxOutcome>;
}

#[async_trait]
impl FrameSource for FrameReader {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        FrameReader::next_frame(self).await
    }

    async fn close(self: Box<Self>) {
        FrameReader::close(*self).await
    }
}

#[async_trait]
impl FrameSink for FrameWriter {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        FrameWriter::write_frame(self, frame).await
    }

    async fn finish(self: Box<Self>) -> MediaResult<PathBuf> {
        FrameWriter::finish(*self).await
    }

    async fn abort(self: Box<Self>) {
        FrameWriter::abort(*self).await
    }
}

/// Production backend driving ffmpeg and ffprobe child processes.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    encode: EncodeSettings,
    remuxer: AudioRemuxer,
}

impl FfmpegBackend {
    pub fn new(remux_timeout: Duration) -> Self {
        Self {
            encode: EncodeSettings::default(),
            remuxer: AudioRemuxer::new().with_timeout(remux_timeout.as_secs()),
        }
    }

    pub fn with_encode_settings(mut self, settings: EncodeSettings) -> Self {
        self.encode = settings;
        self
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, source: &str) -> MediaResult<VideoInfo> {
        probe_video(source).await
    }

    async fn open_source(&self, source: &str, info: &VideoInfo) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(FrameReader::open(source, info)?))
    }

    async fn create_sink(&self, path: &Path, info: &VideoInfo) -> MediaResult<Box<dyn FrameSink>> {
        let writer = FrameWriter::create(path, info.width, info.height, info.fps, &self.encode)?;
        Ok(Box::new(writer))
    }

    async fn frame_at(&self, source: &str, info: &VideoInfo, frame_number: u64) -> MediaResult<Frame> {
        extract_frame(source, info, frame_number).await
    }

    async fn remux(
        &self,
        source: &str,
        video: &Path,
        output: &Path,
        has_audio: bool,
        cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<RemuxOutcome> {
        self.remuxer
            .remux(source, video, output, has_audio, Some(cancel_rx))
            .await
    }
}
