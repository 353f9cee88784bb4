//! Stream-type classification. Pure string matching against the URL,
//! ignoring the query string for the `.m3u8` suffix check.

const DADDYLIVE_DOMAINS: &[&str] = &["dlhd.link", "dlhd.sx", "daddylive.one"];
const VIPLEAGUE_DOMAINS: &[&str] = &["vipleague.io", "vipleague.im"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Hls,
    DaddyLive,
    VipLeague,
    Proxy,
}

pub fn detect_stream_type(url: &str) -> StreamType {
    let path = url.split('?').next().unwrap_or(url);
    if path.ends_with(".m3u8") {
        return StreamType::Hls;
    }
    let lower = url.to_lowercase();
    if DADDYLIVE_DOMAINS.iter().any(|d| lower.contains(d)) {
        return StreamType::DaddyLive;
    }
    if VIPLEAGUE_DOMAINS.iter().any(|d| lower.contains(d)) {
        return StreamType::VipLeague;
    }
    StreamType::Proxy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_table() {
        assert_eq!(detect_stream_type("https://cdn/foo.m3u8?x=1"), StreamType::Hls);
        assert_eq!(detect_stream_type("https://dlhd.link/cast/stream-1.php"), StreamType::DaddyLive);
        assert_eq!(detect_stream_type("https://vipleague.io/watch?v=1"), StreamType::VipLeague);
        assert_eq!(detect_stream_type("https://example.com/watch"), StreamType::Proxy);
    }
}
