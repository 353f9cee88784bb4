//! Provider-B ("vipleague") `zmid` extraction and channel-name resolution.
//!
//! `zmid` names a channel by slug rather than by numeric id; resolving it
//! requires fetching and caching provider-A's 24/7 channel index, then
//! scoring every channel name against a token set derived from the slug.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use once_cell::sync::Lazy;
use regex::Regex;

use f1stream_core::{Error, Result};

const CHANNELS_PAGE_URL: &str = "https://dlhd.link/24-7-channels.php";

const TOKEN_DICTIONARY: &[&str] = &[
    "sky", "sports", "f1", "dazn", "espn", "bein", "fox", "nbc", "bt", "tnt", "viaplay",
    "formula", "racing", "main", "event", "premier", "motogp",
];

static CHANNEL_ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<a[^>]+href=["']([^"']*stream-(\d+)\.php)["'][^>]*>([^<]+)</a>"#).unwrap());
static ZMID_PARAM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[?&]v=([^&#]+)").unwrap());
static ZMID_JS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)zmid\s*[:=]\s*["']([^"']+)["']"#).unwrap());

#[derive(Debug, Clone)]
struct Channel {
    id: String,
    name: String,
}

pub struct ChannelIndexCache {
    client: reqwest::Client,
    cache: Cache<&'static str, Arc<Vec<Channel>>>,
}

impl ChannelIndexCache {
    pub fn new(client: reqwest::Client, ttl: Duration) -> Self {
        Self {
            client,
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate(&"index").await;
    }

    async fn get(&self) -> Result<Arc<Vec<Channel>>> {
        if let Some(cached) = self.cache.get(&"index").await {
            return Ok(cached);
        }
        let body = self
            .client
            .get(CHANNELS_PAGE_URL)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("fetch channel index: {e}")))?
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("read channel index: {e}")))?;

        let channels: Vec<Channel> = CHANNEL_ANCHOR_RE
            .captures_iter(&body)
            .map(|c| Channel {
                id: c[2].to_string(),
                name: c[3].trim().to_string(),
            })
            .collect();
        let channels = Arc::new(channels);
        self.cache.insert("index", channels.clone()).await;
        Ok(channels)
    }
}

/// Resolves a vipleague page URL all the way to a daddylive channel id.
pub async fn resolve(client: &reqwest::Client, index: &ChannelIndexCache, url: &str) -> Result<String> {
    let zmid = extract_zmid(client, url).await?;
    let channels = index.get().await?;
    resolve_zmid_against_index(&zmid, &channels)
}

async fn extract_zmid(client: &reqwest::Client, url: &str) -> Result<String> {
    if let Some(c) = ZMID_PARAM_RE.captures(url) {
        return Ok(c[1].to_string());
    }

    let body = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Upstream(format!("fetch vipleague page: {e}")))?
        .text()
        .await
        .map_err(|e| Error::Upstream(format!("read vipleague page: {e}")))?;
    if let Some(c) = ZMID_JS_RE.captures(&body) {
        return Ok(c[1].to_string());
    }

    Ok(slug_from_path(url))
}

fn slug_from_path(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    let last = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("");
    let last = last
        .trim_end_matches("-streaming")
        .trim_end_matches("-live");
    last.replace('-', " ")
}

fn resolve_zmid_against_index(zmid: &str, channels: &[Channel]) -> Result<String> {
    let tokens = tokenize(zmid);
    if tokens.is_empty() {
        return Err(Error::Upstream(format!("no tokens extracted from zmid {zmid:?}")));
    }

    let mut best: Option<(&Channel, usize)> = None;
    for channel in channels {
        let lower_name = channel.name.to_lowercase();
        let score = tokens.iter().filter(|t| lower_name.contains(t.as_str())).count();
        if score == 0 {
            continue;
        }
        best = Some(match best {
            None => (channel, score),
            Some((prev, prev_score)) => {
                if score > prev_score
                    || (score == prev_score && channel.name.len() < prev.name.len())
                {
                    (channel, score)
                } else {
                    (prev, prev_score)
                }
            }
        });
    }

    best.map(|(c, _)| c.id.clone())
        .ok_or_else(|| Error::Upstream(format!("no channel matched zmid {zmid:?}")))
}

/// Splits on spaces when present; otherwise greedily matches against the
/// known token dictionary (plus bare numeric runs, e.g. channel numbers).
fn tokenize(zmid: &str) -> Vec<String> {
    let lower = zmid.to_lowercase();
    if lower.contains(' ') {
        return lower.split_whitespace().map(str::to_string).collect();
    }

    let mut tokens = Vec::new();
    let bytes = lower.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            tokens.push(lower[start..i].to_string());
            continue;
        }
        let mut matched = false;
        for word in TOKEN_DICTIONARY {
            if lower[i..].starts_with(word) {
                tokens.push((*word).to_string());
                i += word.len();
                matched = true;
                break;
            }
        }
        if !matched {
            i += 1;
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_spaces_when_present() {
        assert_eq!(tokenize("sky sports f1"), vec!["sky", "sports", "f1"]);
    }

    #[test]
    fn tokenize_greedy_matches_dictionary() {
        assert_eq!(tokenize("skysportsf1"), vec!["sky", "sports", "f1"]);
    }

    #[test]
    fn resolve_picks_highest_score_tie_break_shorter_name() {
        let channels = vec![
            Channel { id: "1".to_string(), name: "Sky Sports F1 HD Extra Wide".to_string() },
            Channel { id: "2".to_string(), name: "Sky Sports F1".to_string() },
            Channel { id: "3".to_string(), name: "ESPN".to_string() },
        ];
        let id = resolve_zmid_against_index("sky sports f1", &channels).unwrap();
        assert_eq!(id, "2");
    }

    #[test]
    fn zero_score_is_failure() {
        let channels = vec![Channel { id: "1".to_string(), name: "NBA TV".to_string() }];
        assert!(resolve_zmid_against_index("sky sports f1", &channels).is_err());
    }

    #[test]
    fn slug_from_path_strips_suffix_and_dashes() {
        assert_eq!(slug_from_path("https://vipleague.io/sky-sports-f1-streaming"), "sky sports f1");
    }
}
