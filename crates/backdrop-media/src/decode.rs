//! Frame decoding through an ffmpeg child writing rgb24 to stdout.

use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{collect_stderr, FfmpegCommand, PIPE};
use crate::error::{MediaError, MediaResult};
use crate::frame::{frame_from_raw, Frame};
use crate::probe::VideoInfo;

fn rawvideo_command(source: &str, output: &str) -> FfmpegCommand {
    FfmpegCommand::new(source, output)
        .map("0:v:0")
        .no_audio()
        .format("rawvideo")
        .pixel_format("rgb24")
}

/// Sequential reader over the decoded frames of a source, in source order.
pub struct FrameReader {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frame_bytes: usize,
    frames_read: u64,
    finished: bool,
}

impl FrameReader {
    /// Start decoding `source` (path or URL) with the geometry from `info`.
    pub fn open(source: &str, info: &VideoInfo) -> MediaResult<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(MediaError::invalid_video("Video stream has no dimensions"));
        }

        let cmd = rawvideo_command(source, PIPE);
        let mut child = cmd.spawn(Stdio::null(), Stdio::piped())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr = child.stderr.take().map(collect_stderr);

        debug!(source, width = info.width, height = info.height, "Opened frame reader");

        Ok(Self {
            child,
            stdout,
            stderr,
            width: info.width,
            height: info.height,
            frame_bytes: info.frame_bytes(),
            frames_read: 0,
            finished: false,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Next frame, or `None` once the decoder has cleanly reached the end.
    ///
    /// A decoder that exits with an error surfaces as `Err` here.
    pub async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == buf.len() {
            self.frames_read += 1;
            return frame_from_raw(self.width, self.height, buf).map(Some);
        }

        if filled > 0 {
            warn!(
                bytes = filled,
                expected = self.frame_bytes,
                "Discarding truncated trailing frame"
            );
        }
        self.finished = true;
        self.wait().await?;
        Ok(None)
    }

    async fn wait(&mut self) -> MediaResult<()> {
        let status = self.child.wait().await?;
        let stderr = match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("Decoder exited after {} frames", self.frames_read),
                (!stderr.is_empty()).then_some(stderr),
                status.code(),
            ))
        }
    }

    /// Stop decoding early and reap the child.
    pub async fn close(mut self) {
        if !self.finished {
            let _ = self.child.kill().await;
        }
    }
}

/// Decode the single frame at index `frame_number` (0-based).
pub async fn extract_frame(source: &str, info: &VideoInfo, frame_number: u64) -> MediaResult<Frame> {
    let cmd = rawvideo_command(source, PIPE)
        .video_filter(format!("select=eq(n\\,{})", frame_number))
        .single_frame();
    let mut child = cmd.spawn(Stdio::null(), Stdio::piped())?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
    let stderr = child.stderr.take().map(collect_stderr);

    let mut data = Vec::with_capacity(info.frame_bytes());
    stdout.read_to_end(&mut data).await?;
    let status = child.wait().await?;
    let stderr = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };

    if !status.success() {
        return Err(MediaError::ffmpeg_failed(
            "Frame extraction failed",
            (!stderr.is_empty()).then_some(stderr),
            status.code(),
        ));
    }
    if data.len() < info.frame_bytes() {
        return Err(MediaError::invalid_video(format!(
            "Frame {} is past the end of the video",
            frame_number
        )));
    }
    data.truncate(info.frame_bytes());
    frame_from_raw(info.width, info.height, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rawvideo_command_writes_rgb24_to_stdout() {
        let args = rawvideo_command("in.mp4", PIPE).build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-i in.mp4"));
        assert!(joined.contains("-f rawvideo"));
        assert!(joined.contains("-pix_fmt rgb24"));
        // Frames come out upright, matching the probed display geometry
        assert!(!joined.contains("-noautorotate"));
        assert_eq!(args.last().map(String::as_str), Some(PIPE));
    }
}
