//! Re-attach the source's audio to a freshly encoded silent video.

use std::path::Path;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::fs_utils::move_file;

/// What ended up in the final file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemuxOutcome {
    /// Source audio was copied next to the new video stream
    WithAudio,
    /// Source had no audio; the silent stream became the final file
    VideoOnly,
}

fn remux_command(source: &str, video: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(video.to_string_lossy(), output.to_string_lossy())
        .add_input(source)
        .map("0:v:0")
        .map("1:a:0")
        .copy_streams()
        .shortest()
        .output_args(["-movflags", "+faststart"])
}

/// Muxes source audio into silent video streams.
#[derive(Debug, Clone, Default)]
pub struct AudioRemuxer {
    timeout_secs: Option<u64>,
}

impl AudioRemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Produce `output` from the video stream in `video` and the first audio
    /// track of `source`, without re-encoding either.
    ///
    /// When `has_audio` is false the silent file is moved to `output`.
    pub async fn remux(
        &self,
        source: &str,
        video: &Path,
        output: &Path,
        has_audio: bool,
        cancel_rx: Option<watch::Receiver<bool>>,
    ) -> MediaResult<RemuxOutcome> {
        if !has_audio {
            debug!(output = %output.display(), "Source has no audio, keeping video-only stream");
            move_file(video, output).await?;
            return Ok(RemuxOutcome::VideoOnly);
        }

        let mut runner = FfmpegRunner::new();
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }
        if let Some(rx) = cancel_rx {
            runner = runner.with_cancel(rx);
        }

        runner.run(&remux_command(source, video, output)).await?;
        info!(output = %output.display(), "Muxed source audio into output");
        Ok(RemuxOutcome::WithAudio)
    }
}
