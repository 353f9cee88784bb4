//! Browser session state machine: ties one WebSocket connection to a
//! headless browser instance, a capture pipeline, and a WebRTC media
//! session. Runs until the socket closes, the inactivity timer expires,
//! or ICE negotiation fails.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::fetch::{EnableParams, EventRequestPaused, RequestPattern};
use chromiumoxide::{Browser, BrowserConfig};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{info, warn};

use f1stream_capture::CaptureSession;
use f1stream_media::MediaSession;

use super::messages::{cdp_button_name, IceServerJson, InboundMessage, OutboundMessage};
use crate::state::AppState;

const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const AD_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "google-analytics.com",
    "adservice.google.com",
    "popads.net",
    "propellerads.com",
    "taboola.com",
    "outbrain.com",
];

fn is_ad_host(host: &str) -> bool {
    AD_DOMAINS.iter().any(|ad| host == *ad || host.ends_with(&format!(".{ad}")))
}

/// Sends frames through a session-local mutex: ICE candidates, URL
/// updates and signalling replies all originate from independent tasks
/// and would otherwise race on the same socket.
struct OutboundSink {
    socket: Mutex<futures::stream::SplitSink<WebSocket, Message>>,
}

impl OutboundSink {
    async fn send(&self, msg: OutboundMessage) {
        let text = match serde_json::to_string(&msg) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound message");
                return;
            }
        };
        let mut socket = self.socket.lock().await;
        if let Err(e) = socket.send(Message::Text(text.into())).await {
            warn!(error = %e, "failed to send outbound websocket message");
        }
    }
}

pub async fn run(state: AppState, socket: WebSocket, target_url: String, _slot: tokio::sync::OwnedSemaphorePermit) {
    let (sink, mut stream) = socket.split();
    let sink = Arc::new(OutboundSink { socket: Mutex::new(sink) });

    let display_id = state.display_allocator.allocate();
    let capture = match CaptureSession::start(display_id).await {
        Ok(c) => c,
        Err(e) => {
            sink.send(OutboundMessage::Error { message: format!("capture start failed: {e}") }).await;
            return;
        }
    };
    let (capture, video_pipe, audio_pipe) = capture;

    let (browser, mut handler) = match spawn_browser(&capture.display_name()).await {
        Ok(b) => b,
        Err(e) => {
            sink.send(OutboundMessage::Error { message: format!("browser spawn failed: {e}") }).await;
            capture.shutdown().await;
            return;
        }
    };
    tokio::spawn(async move { while handler.next().await.is_some() {} });

    let page = match browser.new_page(&target_url).await {
        Ok(p) => p,
        Err(e) => {
            sink.send(OutboundMessage::Error { message: format!("navigation failed: {e}") }).await;
            let _ = browser.close().await;
            capture.shutdown().await;
            return;
        }
    };
    if let Err(e) = setup_ad_block(&page).await {
        warn!(error = %e, "failed to install ad-block interception");
    }

    let turn = state.turn_credentials();
    let ice_servers = f1stream_media::build_ice_servers(turn.as_ref().map(|d| d.internal.clone()));
    let client_ice_servers = turn.map(|d| d.public);

    let media = match MediaSession::new(ice_servers).await {
        Ok(m) => m,
        Err(e) => {
            sink.send(OutboundMessage::Error { message: format!("media session failed: {e}") }).await;
            let _ = browser.close().await;
            capture.shutdown().await;
            return;
        }
    };

    {
        let sink = sink.clone();
        media.on_ice_candidate(move |candidate| {
            let sink = sink.clone();
            let json = serde_json::to_value(&candidate).unwrap_or(serde_json::Value::Null);
            tokio::spawn(async move { sink.send(OutboundMessage::Ice { candidate: json }).await });
        });
    }

    let offer = match media.create_offer().await {
        Ok(sdp) => sdp,
        Err(e) => {
            sink.send(OutboundMessage::Error { message: format!("offer creation failed: {e}") }).await;
            media.close().await;
            let _ = browser.close().await;
            capture.shutdown().await;
            return;
        }
    };

    let mut server_list = vec![IceServerJson { urls: vec!["stun:stun.l.google.com:19302".to_string()], username: None, credential: None }];
    if let Some(turn) = client_ice_servers {
        server_list.push(IceServerJson { urls: turn.urls, username: Some(turn.username), credential: Some(turn.credential) });
    }
    sink.send(OutboundMessage::IceServers { list: server_list }).await;
    sink.send(OutboundMessage::Offer { sdp: offer }).await;
    sink.send(OutboundMessage::Ready { width: 1280, height: 720 }).await;

    let media = Arc::new(media);
    tokio::spawn({
        let media_video = media.clone();
        let media_audio = media.clone();
        let media_stats = media.clone();
        async move {
            tokio::join!(
                media_video.stream_video(video_pipe),
                media_audio.stream_audio(audio_pipe),
                media_stats.run_stats_logger(),
            );
        }
    });

    read_loop(&mut stream, &sink, &page, &media).await;

    info!(display_id, "browser session ending");
    let _ = browser.close().await;
    capture.shutdown().await;
}

async fn read_loop(
    stream: &mut futures::stream::SplitStream<WebSocket>,
    sink: &Arc<OutboundSink>,
    page: &chromiumoxide::Page,
    media: &Arc<MediaSession>,
) {
    loop {
        let msg = tokio::time::timeout(INACTIVITY_TIMEOUT, stream.next()).await;
        let frame = match msg {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                warn!(error = %e, "websocket read error");
                return;
            }
            Ok(None) => return,
            Err(_) => {
                info!("browser session inactivity timeout");
                return;
            }
        };

        let text = match frame {
            Message::Text(t) => t,
            Message::Close(_) => return,
            _ => continue,
        };

        let inbound: InboundMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "unrecognised inbound websocket frame");
                continue;
            }
        };

        match inbound {
            InboundMessage::Answer { sdp } => {
                if let Err(e) = media.set_answer(sdp).await {
                    warn!(error = %e, "failed to apply remote answer");
                }
            }
            InboundMessage::Ice { candidate } => match serde_json::from_value(candidate) {
                Ok(init) => {
                    if let Err(e) = media.add_ice_candidate(init).await {
                        warn!(error = %e, "failed to apply remote ice candidate");
                    }
                }
                Err(e) => warn!(error = %e, "malformed ice candidate payload"),
            },
            other => {
                if let Err(e) = dispatch_input(page, other).await {
                    warn!(error = %e, "failed to dispatch input event to browser");
                }
            }
        }
    }
}

async fn dispatch_input(page: &chromiumoxide::Page, msg: InboundMessage) -> Result<(), chromiumoxide::error::CdpError> {
    match msg {
        InboundMessage::Back => {
            let _ = page.evaluate("history.back()").await?;
        }
        InboundMessage::Forward => {
            let _ = page.evaluate("history.forward()").await?;
        }
        InboundMessage::MouseMove { x, y } => {
            let params = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseMoved)
                .x(x)
                .y(y)
                .build()
                .expect("required fields set");
            page.execute(params).await?;
        }
        InboundMessage::MouseDown { x, y, button } => {
            let params = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MousePressed)
                .x(x)
                .y(y)
                .button(parse_button(button))
                .click_count(1)
                .build()
                .expect("required fields set");
            page.execute(params).await?;
        }
        InboundMessage::MouseUp { x, y, button } => {
            let params = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseReleased)
                .x(x)
                .y(y)
                .button(parse_button(button))
                .click_count(1)
                .build()
                .expect("required fields set");
            page.execute(params).await?;
        }
        InboundMessage::Scroll { x, y, dx, dy } => {
            let params = DispatchMouseEventParams::builder()
                .r#type(DispatchMouseEventType::MouseWheel)
                .x(x)
                .y(y)
                .delta_x(dx)
                .delta_y(dy)
                .build()
                .expect("required fields set");
            page.execute(params).await?;
        }
        InboundMessage::KeyDown { key, code, .. } => {
            let params = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyDown)
                .key(key)
                .code(code)
                .build()
                .expect("required fields set");
            page.execute(params).await?;
        }
        InboundMessage::KeyUp { key, code, .. } => {
            let params = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyUp)
                .key(key)
                .code(code)
                .build()
                .expect("required fields set");
            page.execute(params).await?;
        }
        InboundMessage::Answer { .. } | InboundMessage::Ice { .. } => {
            // Handled by the media session directly, not the page.
        }
    }
    Ok(())
}

fn parse_button(button: u8) -> MouseButton {
    match cdp_button_name(button) {
        "middle" => MouseButton::Middle,
        "right" => MouseButton::Right,
        _ => MouseButton::Left,
    }
}

async fn spawn_browser(display_name: &str) -> anyhow::Result<(Browser, chromiumoxide::Handler)> {
    let config = BrowserConfig::builder()
        .headless_mode(chromiumoxide::browser::HeadlessMode::False)
        .env("DISPLAY", display_name)
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;
    let (browser, handler) = Browser::launch(config).await?;
    Ok((browser, handler))
}

async fn setup_ad_block(page: &chromiumoxide::Page) -> Result<(), chromiumoxide::error::CdpError> {
    page.execute(EnableParams {
        patterns: Some(vec![RequestPattern::builder().url_pattern("*").build()]),
        handle_auth_requests: None,
    })
    .await?;

    let mut events = page.event_listener::<EventRequestPaused>().await?;
    let page = page.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let host = url::Url::parse(&event.request.url).ok().and_then(|u| u.host_str().map(str::to_string));
            let blocked = host.as_deref().map(is_ad_host).unwrap_or(false);
            let result = if blocked {
                page.execute(chromiumoxide::cdp::browser_protocol::fetch::FailRequestParams::new(
                    event.request_id.clone(),
                    chromiumoxide::cdp::browser_protocol::network::ErrorReason::BlockedByClient,
                ))
                .await
            } else {
                page.execute(chromiumoxide::cdp::browser_protocol::fetch::ContinueRequestParams::new(event.request_id.clone())).await
            };
            if let Err(e) = result {
                warn!(error = %e, "failed to respond to intercepted request");
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ad_domain_blocked() {
        assert!(is_ad_host("doubleclick.net"));
        assert!(is_ad_host("ads.doubleclick.net"));
    }

    #[test]
    fn unrelated_domain_not_blocked() {
        assert!(!is_ad_host("example.com"));
    }
}
