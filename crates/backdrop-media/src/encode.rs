//! Frame encoding through an ffmpeg child reading rgb24 from stdin.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::command::{collect_stderr, FfmpegCommand, PIPE};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// H.264 output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub codec: String,
    pub preset: String,
    pub crf: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
        }
    }
}

fn encoder_command(
    output: &Path,
    width: u32,
    height: u32,
    fps: f64,
    settings: &EncodeSettings,
) -> FfmpegCommand {
    FfmpegCommand::new(PIPE, output.to_string_lossy())
        .input_args([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s".to_string(),
            format!("{}x{}", width, height),
            "-r".to_string(),
            format!("{:.6}", fps),
        ])
        // yuv420p needs even dimensions
        .video_filter("pad=ceil(iw/2)*2:ceil(ih/2)*2")
        .video_codec(settings.codec.clone())
        .preset(settings.preset.clone())
        .crf(settings.crf)
        .pixel_format("yuv420p")
        .no_audio()
        .output_args(["-movflags", "+faststart"])
}

/// Silent video stream being written frame by frame.
pub struct FrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    path: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl FrameWriter {
    /// Start an encoder writing `width` x `height` frames at `fps` to `path`.
    pub fn create(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
        settings: &EncodeSettings,
    ) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };

        let cmd = encoder_command(&path, width, height, fps, settings);
        let mut child = cmd.spawn(Stdio::piped(), Stdio::null())?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdin not captured"))?;
        let stderr = child.stderr.take().map(collect_stderr);

        debug!(path = %path.display(), width, height, fps, "Opened frame writer");

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr,
            path,
            width,
            height,
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append one frame. Frames must match the writer's geometry.
    pub async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MediaError::internal(format!(
                "Frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("Encoder input already closed"))?;

        if let Err(e) = stdin.write_all(frame.as_raw()).await {
            // A broken pipe means the encoder died; report its stderr instead
            self.stdin = None;
            return Err(self.reap(e).await);
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Close the input and wait for the encoder to flush the file.
    pub async fn finish(mut self) -> MediaResult<PathBuf> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await.ok();
            drop(stdin);
        }
        let status = self.child.wait().await?;
        if status.success() {
            Ok(self.path)
        } else {
            let stderr = self.take_stderr().await;
            Err(MediaError::ffmpeg_failed(
                format!("Encoder failed after {} frames", self.frames_written),
                stderr,
                status.code(),
            ))
        }
    }

    /// Kill the encoder and leave whatever it wrote for the caller to remove.
    pub async fn abort(mut self) {
        self.stdin = None;
        let _ = self.child.kill().await;
    }

    async fn take_stderr(&mut self) -> Option<String> {
        match self.stderr.take() {
            Some(handle) => handle.await.ok().filter(|s| !s.is_empty()),
            None => None,
        }
    }

    async fn reap(&mut self, cause: std::io::Error) -> MediaError {
        let status = self.child.wait().await.ok();
        let stderr = self.take_stderr().await;
        MediaError::ffmpeg_failed(
            format!("Encoder stopped accepting frames: {}", cause),
            stderr,
            status.and_then(|s| s.code()),
        )
    }
}
