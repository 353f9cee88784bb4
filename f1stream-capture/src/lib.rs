pub mod display;
pub mod pipeline;

use display::{DisplayError, XvfbHandle};
use pipeline::{AudioEncoder, EncodedPipe, EncoderError, VideoEncoder};

pub use display::DisplayAllocator;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Display(#[from] DisplayError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

/// Everything one browser session needs to produce encoded media: the
/// virtual display and the two encoder processes reading from it.
///
/// Teardown order matters: encoders first (so ffmpeg stops reading from
/// the display cleanly), then the display, then the pipes are dropped.
/// The browser itself is owned by the caller and must be closed before
/// `shutdown` is called.
pub struct CaptureSession {
    display: XvfbHandle,
    video: VideoEncoder,
    audio: AudioEncoder,
}

impl CaptureSession {
    pub async fn start(display_id: u32) -> Result<(Self, EncodedPipe, EncodedPipe), CaptureError> {
        let display = XvfbHandle::spawn(display_id).await?;
        let (video, video_pipe) = VideoEncoder::spawn(display_id).await?;
        let (audio, audio_pipe) = AudioEncoder::spawn().await;
        Ok((Self { display, video, audio }, video_pipe, audio_pipe))
    }

    pub fn display_name(&self) -> String {
        self.display.display_name()
    }

    pub async fn shutdown(self) {
        self.video.kill().await;
        self.audio.kill().await;
        self.display.shutdown().await;
    }
}
