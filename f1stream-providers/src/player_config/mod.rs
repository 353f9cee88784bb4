//! Player-config resolver: classify a stream URL, run the provider-
//! specific multi-hop extraction, and hand back a playable descriptor.
//! Every result — success or failure — is cached by input URL so a
//! misbehaving upstream cannot be hammered by client retries.

mod daddylive;
mod detect;
mod vipleague;

pub use detect::{detect_stream_type, StreamType};

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use moka::future::Cache;
use serde::{Deserialize, Serialize};

const CONFIG_TTL: Duration = Duration::from_secs(60 * 60);
const CHANNEL_INDEX_TTL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PlayerConfig {
    Hls { hls_url: String },
    DaddyLive { hls_url: String },
    Proxy { error: Option<String> },
}

impl PlayerConfig {
    fn error(msg: impl Into<String>) -> Self {
        PlayerConfig::Proxy { error: Some(msg.into()) }
    }
}

pub struct PlayerConfigResolver {
    client: reqwest::Client,
    config_cache: Cache<String, PlayerConfig>,
    channel_index: Arc<vipleague::ChannelIndexCache>,
}

impl PlayerConfigResolver {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("player-config http client");
        Self {
            client: client.clone(),
            config_cache: Cache::builder().time_to_live(CONFIG_TTL).build(),
            channel_index: Arc::new(vipleague::ChannelIndexCache::new(client, CHANNEL_INDEX_TTL)),
        }
    }

    /// Admin "bust cache" hook: drops every cached player-config (success
    /// or error) and the shared channel index, so the next lookup for any
    /// URL re-runs the provider chain instead of replaying a stale result.
    pub async fn invalidate_all(&self) {
        self.config_cache.invalidate_all();
        self.channel_index.invalidate().await;
    }

    pub async fn resolve(&self, url: &str) -> PlayerConfig {
        if let Some(cached) = self.config_cache.get(url).await {
            return cached;
        }

        let config = self.resolve_uncached(url).await;
        self.config_cache.insert(url.to_string(), config.clone()).await;
        config
    }

    async fn resolve_uncached(&self, url: &str) -> PlayerConfig {
        match detect_stream_type(url) {
            StreamType::Hls => PlayerConfig::Hls { hls_url: hls_route(url) },
            StreamType::DaddyLive => match daddylive::resolve(&self.client, url, None).await {
                Ok(manifest_url) => PlayerConfig::DaddyLive { hls_url: hls_route(&manifest_url) },
                Err(e) => PlayerConfig::error(e.to_string()),
            },
            StreamType::VipLeague => match vipleague::resolve(&self.client, &self.channel_index, url).await {
                Ok(channel_id) => match daddylive::resolve_with_channel_id(&self.client, &channel_id).await {
                    Ok(manifest_url) => PlayerConfig::DaddyLive { hls_url: hls_route(&manifest_url) },
                    Err(e) => PlayerConfig::error(e.to_string()),
                },
                Err(e) => PlayerConfig::error(e.to_string()),
            },
            StreamType::Proxy => PlayerConfig::Proxy { error: None },
        }
    }
}

fn hls_route(url: &str) -> String {
    format!("/hls/{}", base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hls_urls_short_circuit_with_no_network() {
        let resolver = PlayerConfigResolver::new(Duration::from_secs(1));
        let cfg = resolver.resolve("https://cdn.example/stream.m3u8?x=1").await;
        match cfg {
            PlayerConfig::Hls { hls_url } => assert!(hls_url.starts_with("/hls/")),
            other => panic!("expected Hls, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrecognised_url_falls_back_to_proxy() {
        let resolver = PlayerConfigResolver::new(Duration::from_secs(1));
        let cfg = resolver.resolve("https://example.com/watch").await;
        assert_eq!(cfg, PlayerConfig::Proxy { error: None });
    }

    #[tokio::test]
    async fn result_is_cached_by_input_url() {
        let resolver = PlayerConfigResolver::new(Duration::from_secs(1));
        let first = resolver.resolve("https://cdn.example/a.m3u8").await;
        let second = resolver.resolve("https://cdn.example/a.m3u8").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalidate_all_clears_cached_config() {
        let resolver = PlayerConfigResolver::new(Duration::from_secs(1));
        let url = "https://cdn.example/b.m3u8";
        resolver.resolve(url).await;
        assert!(resolver.config_cache.get(url).await.is_some());

        resolver.invalidate_all().await;
        assert!(resolver.config_cache.get(url).await.is_none());
    }
}
