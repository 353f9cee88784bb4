//! Provider-A ("daddylive") multi-hop manifest extraction.
//!
//! A channel-id-bearing URL is resolved into a playable `.m3u8` manifest
//! URL through four network hops: the stream-cast page, its nested
//! iframe, a channel-key-based server lookup, and finally the manifest
//! URL template. Every hop can fail independently; failures are surfaced
//! as `Error::Upstream` so the caller falls back to `{type: proxy}`.

use once_cell::sync::Lazy;
use regex::Regex;

use f1stream_core::{Error, Result};

const PROVIDER_HOST: &str = "dlhd.link";
const LOOKUP_HOST: &str = "chevy.soyspace.cyou";

static CHANNEL_ID_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(?i)/stream/stream-(\d+)\.php").unwrap(),
        Regex::new(r"(?i)/cast/stream-(\d+)\.php").unwrap(),
        Regex::new(r"(?i)/watch/stream-(\d+)\.php").unwrap(),
    ]
});

static IFRAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<iframe[^>]+src=["']([^"']+)["']"#).unwrap());
static AUTH_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)authToken["']?\s*[:=]\s*["']([^"']+)["']"#).unwrap());
static CHANNEL_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)channelKey["']?\s*[:=]\s*["']([^"']+)["']"#).unwrap());
static CHANNEL_SALT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)channelSalt["']?\s*[:=]\s*["']([^"']+)["']"#).unwrap());
static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)timestamp["']?\s*[:=]\s*["']?([0-9]+)["']?"#).unwrap());
static AUTH_MOD_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)authModURL["']?\s*[:=]\s*["']([^"']+)["']"#).unwrap());

struct ExtractedAuth {
    channel_key: String,
    #[allow(dead_code)]
    auth_token: Option<String>,
    #[allow(dead_code)]
    channel_salt: Option<String>,
    #[allow(dead_code)]
    timestamp: Option<String>,
    #[allow(dead_code)]
    auth_mod_url: Option<String>,
}

pub fn extract_channel_id(url: &str) -> Option<String> {
    CHANNEL_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(url).map(|c| c[1].to_string()))
}

/// Full pipeline starting from the original page URL. `forced_channel_id`
/// lets the vipleague resolver skip straight to the cast page once it has
/// already resolved a channel id by name.
pub async fn resolve(client: &reqwest::Client, url: &str, forced_channel_id: Option<String>) -> Result<String> {
    let channel_id = forced_channel_id
        .or_else(|| extract_channel_id(url))
        .ok_or_else(|| Error::Upstream("could not extract channel id from url".to_string()))?;
    resolve_with_channel_id(client, &channel_id).await
}

/// Starts at the cast page for an already-known channel id.
pub async fn resolve_with_channel_id(client: &reqwest::Client, channel_id: &str) -> Result<String> {
    let cast_url = format!("https://{PROVIDER_HOST}/cast/stream-{channel_id}.php");
    let cast_body = get_text(client, &cast_url, &format!("https://{PROVIDER_HOST}/")).await?;

    let iframe_url = IFRAME_RE
        .captures(&cast_body)
        .map(|c| c[1].to_string())
        .ok_or_else(|| Error::Upstream("no iframe found on cast page".to_string()))?;

    let iframe_body = get_text(client, &iframe_url, &cast_url).await?;
    let auth = extract_auth(&iframe_body)?;

    let lookup_url = format!("https://{LOOKUP_HOST}/server_lookup.php?channel_id={}", auth.channel_key);
    let lookup_body = get_text(client, &lookup_url, &iframe_url).await?;
    let lookup: ServerLookupResponse = serde_json::from_str(&lookup_body)
        .map_err(|e| Error::Upstream(format!("decode server lookup: {e}")))?;

    Ok(format!(
        "https://{LOOKUP_HOST}/proxy/{}/{}/mono.m3u8",
        lookup.server_key, auth.channel_key
    ))
}

fn extract_auth(body: &str) -> Result<ExtractedAuth> {
    let channel_key = CHANNEL_KEY_RE
        .captures(body)
        .map(|c| c[1].to_string())
        .ok_or_else(|| Error::Upstream("channelKey not found in iframe body".to_string()))?;
    Ok(ExtractedAuth {
        channel_key,
        auth_token: AUTH_TOKEN_RE.captures(body).map(|c| c[1].to_string()),
        channel_salt: CHANNEL_SALT_RE.captures(body).map(|c| c[1].to_string()),
        timestamp: TIMESTAMP_RE.captures(body).map(|c| c[1].to_string()),
        auth_mod_url: AUTH_MOD_URL_RE.captures(body).map(|c| c[1].to_string()),
    })
}

async fn get_text(client: &reqwest::Client, url: &str, referer: &str) -> Result<String> {
    client
        .get(url)
        .header(reqwest::header::REFERER, referer)
        .send()
        .await
        .map_err(|e| Error::Upstream(format!("fetch {url}: {e}")))?
        .error_for_status()
        .map_err(|e| Error::Upstream(format!("fetch {url}: {e}")))?
        .text()
        .await
        .map_err(|e| Error::Upstream(format!("read body {url}: {e}")))
}

#[derive(serde::Deserialize)]
struct ServerLookupResponse {
    server_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_id_extraction_tries_patterns_in_order() {
        assert_eq!(
            extract_channel_id("https://dlhd.link/stream/stream-42.php"),
            Some("42".to_string())
        );
        assert_eq!(
            extract_channel_id("https://dlhd.link/cast/stream-123.php"),
            Some("123".to_string())
        );
        assert_eq!(extract_channel_id("https://dlhd.link/unrelated"), None);
    }

    #[test]
    fn auth_extraction_requires_channel_key() {
        let body = r#"var authToken = "tok"; var channelSalt = "salt";"#;
        assert!(extract_auth(body).is_err());

        let body = r#"var channelKey = "ck1"; var timestamp = "12345";"#;
        let auth = extract_auth(body).unwrap();
        assert_eq!(auth.channel_key, "ck1");
        assert_eq!(auth.timestamp, Some("12345".to_string()));
    }
}
