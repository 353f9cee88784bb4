//! HLS manifest / segment pass-through proxy.
//!
//! `/hls/<base64url>` decodes the payload into an upstream URL, fetches
//! it, and either rewrites every URI inside an `.m3u8` playlist to route
//! back through itself or streams the body through unchanged.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use url::Url;

use f1stream_core::{Error, Result};

const FORWARD_HEADER_PREFIX: &str = "x-hls-forward-";

pub fn encode_hls_url(url: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(url)
}

pub fn decode_hls_payload(payload: &str) -> Result<String> {
    let bytes = decode_base64_flexible(payload)?;
    let url = String::from_utf8(bytes).map_err(|_| Error::Input("hls payload is not utf-8".to_string()))?;
    let parsed = Url::parse(&url).map_err(|_| Error::Input(format!("invalid hls target url: {url}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::Input(format!("unsupported hls scheme: {}", parsed.scheme())));
    }
    Ok(url)
}

fn decode_base64_flexible(s: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(s))
        .map_err(|_| Error::Input("invalid base64 payload".to_string()))
}

pub struct HlsProxy {
    client: reqwest::Client,
}

impl HlsProxy {
    pub fn new(timeout: std::time::Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .redirect(reqwest::redirect::Policy::limited(5))
                .build()
                .expect("hls proxy http client"),
        }
    }

    pub async fn handle(&self, payload: &str, query: &str, incoming_headers: &HeaderMap) -> Response {
        match self.handle_inner(payload, query, incoming_headers).await {
            Ok(resp) => resp,
            Err(Error::Input(msg)) => (StatusCode::BAD_REQUEST, msg).into_response(),
            Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
        }
    }

    async fn handle_inner(&self, payload: &str, query: &str, incoming_headers: &HeaderMap) -> Result<Response> {
        let target = decode_hls_payload(payload)?;
        let target_url = Url::parse(&target).expect("validated above");

        let domain_override = query_param(query, "domain");
        let host = domain_override.unwrap_or_else(|| target_url.host_str().unwrap_or("").to_string());

        let mut req = self.client.get(&target);
        if let Some(ua) = incoming_headers.get(axum::http::header::USER_AGENT) {
            req = req.header(axum::http::header::USER_AGENT, ua.clone());
        }
        req = req
            .header(axum::http::header::REFERER, format!("https://{host}/"))
            .header(axum::http::header::ORIGIN, format!("https://{host}"));

        for (name, value) in incoming_headers {
            let lower = name.as_str().to_lowercase();
            if let Some(forwarded_name) = lower.strip_prefix(FORWARD_HEADER_PREFIX) {
                req = req.header(forwarded_name.to_string(), value.clone());
            }
        }

        let upstream = req.send().await.map_err(|e| Error::Upstream(format!("hls fetch: {e}")))?;
        let status = upstream.status();
        let content_type = upstream
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let cache_control = upstream.headers().get(axum::http::header::CACHE_CONTROL).cloned();
        let accept_ranges = upstream.headers().get(axum::http::header::ACCEPT_RANGES).cloned();

        let is_manifest = content_type.to_lowercase().contains("mpegurl") || target_url.path().ends_with(".m3u8");

        let body = upstream
            .bytes()
            .await
            .map_err(|e| Error::Upstream(format!("hls read body: {e}")))?;

        let mut builder = Response::builder().status(status);
        builder = with_cors(builder);

        if is_manifest {
            let text = String::from_utf8_lossy(&body);
            let rewritten = rewrite_manifest(&text, &target_url);
            builder = builder.header(axum::http::header::CONTENT_TYPE, "application/vnd.apple.mpegurl");
            return builder
                .body(Body::from(rewritten))
                .map_err(|e| Error::Internal(e.to_string()));
        }

        builder = builder.header(axum::http::header::CONTENT_TYPE, content_type);
        if let Some(cc) = cache_control {
            builder = builder.header(axum::http::header::CACHE_CONTROL, cc);
        }
        if let Some(ar) = accept_ranges {
            builder = builder.header(axum::http::header::ACCEPT_RANGES, ar);
        }
        builder = builder.header(axum::http::header::CONTENT_LENGTH, body.len());
        builder.body(Body::from(body)).map_err(|e| Error::Internal(e.to_string()))
    }
}

fn with_cors(mut builder: axum::http::response::Builder) -> axum::http::response::Builder {
    builder = builder.header(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    builder = builder.header(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET, OPTIONS"),
    );
    builder = builder.header(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    builder
}

fn query_param(query: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Rewrites every URI referenced by a manifest so it routes back through
/// `/hls/<base64url>`. `#`-prefixed directive lines keep their text but
/// have any `URI="..."` attribute resolved and re-encoded; plain lines are
/// resolved in full and replaced outright.
pub fn rewrite_manifest(manifest: &str, playlist_url: &Url) -> String {
    let mut out = String::with_capacity(manifest.len() + 256);
    for line in manifest.lines() {
        if line.starts_with('#') {
            out.push_str(&rewrite_directive_line(line, playlist_url));
        } else if line.trim().is_empty() {
            out.push_str(line);
        } else {
            match playlist_url.join(line.trim()) {
                Ok(resolved) => out.push_str(&format!("/hls/{}", encode_hls_url(resolved.as_str()))),
                Err(_) => out.push_str(line),
            }
        }
        out.push('\n');
    }
    out
}

fn rewrite_directive_line(line: &str, playlist_url: &Url) -> String {
    let Some(start) = line.find("URI=\"") else {
        return line.to_string();
    };
    let value_start = start + 5;
    let Some(end_rel) = line[value_start..].find('"') else {
        return line.to_string();
    };
    let uri = &line[value_start..value_start + end_rel];
    let Ok(resolved) = playlist_url.join(uri) else {
        return line.to_string();
    };
    let rewritten = format!("/hls/{}", encode_hls_url(resolved.as_str()));
    format!("{}{}{}", &line[..value_start], rewritten, &line[value_start + end_rel..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_requires_http_scheme() {
        let payload = encode_hls_url("ftp://example.com/x");
        assert!(decode_hls_payload(&payload).is_err());
    }

    #[test]
    fn round_trip_encode_decode() {
        let url = "https://cdn.example/path?a=1";
        let payload = encode_hls_url(url);
        assert_eq!(decode_hls_payload(&payload).unwrap(), url);
    }

    #[test]
    fn manifest_rewriting_covers_absolute_relative_and_key_uri() {
        let playlist_url = Url::parse("https://cdn/x/live.m3u8").unwrap();
        let manifest = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n#EXT-X-STREAM-INF:BANDWIDTH=1\n../v.m3u8\nhttps://cdn/abs.m3u8\n";
        let rewritten = rewrite_manifest(manifest, &playlist_url);
        for line in rewritten.lines() {
            if line.starts_with('#') {
                if let Some(start) = line.find("URI=\"") {
                    let rest = &line[start + 5..];
                    let end = rest.find('"').unwrap();
                    assert!(rest[..end].starts_with("/hls/"));
                }
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            assert!(line.starts_with("/hls/"), "line not rewritten: {line}");
            let payload = line.trim_start_matches("/hls/");
            assert!(decode_hls_payload(payload).is_ok());
        }
    }
}
