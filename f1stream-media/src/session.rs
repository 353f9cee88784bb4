//! WebRTC media session: one peer connection carrying a VP8 video track
//! and an Opus audio track, fed from the capture pipeline's two pipes.
//!
//! ICE servers always include the public STUN server; a TURN pair is
//! added only when the caller supplies one (the API layer decides which
//! of the internal/public credential bundles to hand to which side — see
//! `turn.rs`). On `Failed` the session's cancellation token fires so the
//! browser-session state machine can unwind capture and browser
//! resources.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidateInit, RTCIceCandidate};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::ivf::IvfReader;
use crate::ogg::OggReader;

const VIDEO_FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 / 30);
const AUDIO_FRAME_DURATION: Duration = Duration::from_millis(20);
const STATS_INTERVAL: Duration = Duration::from_secs(10);

pub struct MediaSession {
    pc: Arc<RTCPeerConnection>,
    video_track: Arc<TrackLocalStaticSample>,
    audio_track: Arc<TrackLocalStaticSample>,
    pub cancel: CancellationToken,
}

impl MediaSession {
    pub async fn new(ice_servers: Vec<RTCIceServer>) -> anyhow::Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await?);

        let video_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: webrtc::api::media_engine::MIME_TYPE_VP8.to_string(),
                ..Default::default()
            },
            "video".to_string(),
            "stream".to_string(),
        ));
        pc.add_track(video_track.clone() as Arc<dyn TrackLocal + Send + Sync>).await?;

        let audio_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: webrtc::api::media_engine::MIME_TYPE_OPUS.to_string(),
                ..Default::default()
            },
            "audio".to_string(),
            "stream".to_string(),
        ));
        pc.add_track(audio_track.clone() as Arc<dyn TrackLocal + Send + Sync>).await?;

        let cancel = CancellationToken::new();
        let cancel_on_failure = cancel.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let cancel = cancel_on_failure.clone();
            Box::pin(async move {
                if state == RTCIceConnectionState::Failed {
                    warn!("ice connection failed, cancelling session");
                    cancel.cancel();
                }
            })
        }));

        Ok(Self { pc, video_track, audio_track, cancel })
    }

    pub fn on_ice_candidate<F>(&self, mut f: F)
    where
        F: FnMut(RTCIceCandidate) + Send + 'static,
    {
        self.pc.on_ice_candidate(Box::new(move |candidate| {
            if let Some(c) = candidate {
                f(c);
            }
            Box::pin(async {})
        }));
    }

    pub async fn create_offer(&self) -> anyhow::Result<String> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(offer.sdp)
    }

    pub async fn set_answer(&self, sdp: String) -> anyhow::Result<()> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> anyhow::Result<()> {
        self.pc.add_ice_candidate(candidate).await?;
        Ok(())
    }

    /// Drives the video pipe until EOF, read error, or cancellation,
    /// writing one IVF frame per tick at the fixed 1/30s duration.
    pub async fn stream_video<R: AsyncRead + Unpin>(&self, pipe: R) {
        let mut reader = IvfReader::new(pipe);
        let track = self.video_track.clone();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                frame = reader.next_frame() => {
                    match frame {
                        Ok(Some(data)) => {
                            if let Err(e) = track
                                .write_sample(&Sample { data: data.into(), duration: VIDEO_FRAME_DURATION, ..Default::default() })
                                .await
                            {
                                warn!(error = %e, "video track write failed");
                                return;
                            }
                        }
                        Ok(None) => return,
                        Err(e) => {
                            warn!(error = %e, "video pipe read error");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Drives the audio pipe until EOF, read error, or cancellation,
    /// writing one Ogg page per tick at the fixed 20ms duration.
    pub async fn stream_audio<R: AsyncRead + Unpin>(&self, pipe: R) {
        let mut reader = OggReader::new(pipe);
        let track = self.audio_track.clone();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                page = reader.next_page() => {
                    match page {
                        Ok(Some(data)) => {
                            if let Err(e) = track
                                .write_sample(&Sample { data: data.into(), duration: AUDIO_FRAME_DURATION, ..Default::default() })
                                .await
                            {
                                warn!(error = %e, "audio track write failed");
                                return;
                            }
                        }
                        Ok(None) => return,
                        Err(e) => {
                            warn!(error = %e, "audio pipe read error");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Logs outbound RTP byte/packet counters every 10s while connected.
    pub async fn run_stats_logger(&self) {
        let pc = self.pc.clone();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(STATS_INTERVAL) => {
                    let report = pc.get_stats().await;
                    debug!(reports = report.reports.len(), "outbound rtp stats tick");
                }
            }
        }
    }

    pub async fn close(&self) {
        self.cancel.cancel();
        if let Err(e) = self.pc.close().await {
            warn!(error = %e, "error closing peer connection");
        } else {
            info!("peer connection closed");
        }
    }
}

/// `ice_servers`: STUN is always present; TURN is appended only when the
/// caller passes a non-empty `TurnCredentials`.
pub fn build_ice_servers(turn: Option<crate::turn::TurnCredentials>) -> Vec<RTCIceServer> {
    let mut servers = vec![RTCIceServer {
        urls: vec!["stun:stun.l.google.com:19302".to_string()],
        ..Default::default()
    }];
    if let Some(turn) = turn {
        servers.push(RTCIceServer {
            urls: turn.urls,
            username: turn.username,
            credential: turn.credential,
            ..Default::default()
        });
    }
    servers
}
