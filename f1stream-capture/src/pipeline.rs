//! Screen/audio encoder processes feeding the media session's IVF/OGG
//! readers.
//!
//! Each encoder is an `ffmpeg` child process with its stdout piped;
//! tokio's owned `ChildStdout` handle already behaves like the
//! "anonymous pipe" the design calls for, so there is no need to create
//! one by hand.

use std::process::Stdio;

use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tracing::{info, warn};

pub type EncodedPipe = Box<dyn AsyncRead + Unpin + Send>;

const VIDEO_FPS: u32 = 30;
const AUDIO_BITRATE_KBPS: u32 = 128;

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("failed to spawn encoder: {0}")]
    Spawn(#[source] std::io::Error),
}

pub struct VideoEncoder {
    child: Child,
}

impl VideoEncoder {
    /// Captures `display_id` at a fixed 30fps and encodes to VP8/IVF on
    /// stdout.
    pub async fn spawn(display_id: u32) -> Result<(Self, EncodedPipe), EncoderError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-f",
            "x11grab",
            "-r",
            &VIDEO_FPS.to_string(),
            "-i",
            &format!(":{display_id}"),
            "-c:v",
            "libvpx",
            "-deadline",
            "realtime",
            "-f",
            "ivf",
            "pipe:1",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(EncoderError::Spawn)?;
        let stdout = child.stdout.take().expect("stdout piped");
        info!(display_id, "video encoder started");
        Ok((Self { child }, Box::new(stdout)))
    }

    pub async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill video encoder");
        }
    }
}

pub struct AudioEncoder {
    child: Option<Child>,
}

impl AudioEncoder {
    /// Reads the system null-sink monitor and encodes Opus/OGG at 128
    /// kbit/s with a low-delay application profile. Audio is best-effort:
    /// a spawn failure degrades to an already-closed pipe rather than
    /// failing the whole session.
    pub async fn spawn() -> (Self, EncodedPipe) {
        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-f",
            "pulse",
            "-i",
            "default.monitor",
            "-c:a",
            "libopus",
            "-b:a",
            &format!("{AUDIO_BITRATE_KBPS}k"),
            "-application",
            "lowdelay",
            "-f",
            "ogg",
            "pipe:1",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

        match cmd.spawn() {
            Ok(mut child) => {
                let stdout = child.stdout.take().expect("stdout piped");
                info!("audio encoder started");
                (Self { child: Some(child) }, Box::new(stdout))
            }
            Err(e) => {
                warn!(error = %e, "audio encoder failed to start, degrading to video-only");
                (Self { child: None }, Box::new(tokio::io::empty()))
            }
        }
    }

    pub async fn kill(mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill audio encoder");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn degraded_audio_pipe_is_immediate_eof() {
        let (_encoder, mut pipe) = (AudioEncoder { child: None }, Box::new(tokio::io::empty()) as EncodedPipe);
        let mut buf = [0u8; 1];
        let n = pipe.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
