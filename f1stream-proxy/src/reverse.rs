//! The reverse proxy: decodes a target origin, forwards a sanitised
//! request, strips anti-frame/encoding headers, rewrites HTML/CSS/JS
//! bodies, and rewrites `Location` on redirects instead of following
//! them.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use f1stream_core::{Error, Result};

use crate::b64::{decode_origin, encode_origin};
use crate::rewrite::{classify_content_type, rewrite_body, Rewritable};

/// Above this size, HTML/CSS/JS bodies are streamed through unrewritten
/// rather than buffered in full.
const MAX_REWRITE_BYTES: usize = 8 * 1024 * 1024;

const FORWARD_REQUEST_HEADERS: &[&str] = &[
    "user-agent",
    "accept",
    "accept-language",
    "cookie",
    "range",
    "if-none-match",
    "if-modified-since",
    "cache-control",
];

const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "x-frame-options",
    "content-security-policy",
    "csp-report-only",
    "x-content-type-options",
    "content-encoding",
    "content-length",
    "connection",
    "transfer-encoding",
    "keep-alive",
];

pub struct ReverseProxy {
    client: reqwest::Client,
}

impl ReverseProxy {
    pub fn new(timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reverse proxy http client");
        Self { client }
    }

    pub async fn handle(
        &self,
        method: Method,
        encoded_origin: &str,
        path: &str,
        query: Option<&str>,
        incoming_headers: &HeaderMap,
    ) -> Response {
        match self.handle_inner(method, encoded_origin, path, query, incoming_headers).await {
            Ok(resp) => resp,
            Err(Error::Input(msg)) => (StatusCode::BAD_REQUEST, msg).into_response(),
            Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
        }
    }

    async fn handle_inner(
        &self,
        method: Method,
        encoded_origin: &str,
        path: &str,
        query: Option<&str>,
        incoming_headers: &HeaderMap,
    ) -> Result<Response> {
        let origin = decode_origin(encoded_origin)?;
        let mut target = format!("{origin}{path}");
        if let Some(q) = query {
            if !q.is_empty() {
                target.push('?');
                target.push_str(q);
            }
        }
        let target_url = Url::parse(&target).map_err(|_| Error::Input(format!("bad target url: {target}")))?;

        let mut req = self.client.request(method, target_url.clone());
        for name in FORWARD_REQUEST_HEADERS {
            if let Some(v) = incoming_headers.get(*name) {
                req = req.header(*name, v.clone());
            }
        }
        if let Some(referer) = incoming_headers.get(axum::http::header::REFERER) {
            if let Ok(referer) = referer.to_str() {
                if let Some(decoded) = decode_rewritten_referer(referer) {
                    req = req.header(axum::http::header::REFERER, decoded);
                }
            }
        }

        let upstream = req.send().await.map_err(|e| Error::Upstream(format!("proxy fetch: {e}")))?;
        let status = upstream.status();

        if status.is_redirection() {
            return self.build_redirect_response(status, &upstream, &origin);
        }

        let response_headers = upstream.headers().clone();
        let content_type = response_headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = upstream.bytes().await.map_err(|e| Error::Upstream(format!("proxy read body: {e}")))?;

        let mut builder = Response::builder().status(status);
        for (name, value) in &response_headers {
            if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str().to_lowercase().as_str()) {
                continue;
            }
            builder = builder.header(name, value);
        }
        builder = with_cors(builder);

        if body.len() <= MAX_REWRITE_BYTES {
            if let Ok(text) = std::str::from_utf8(&body) {
                let kind = classify_content_type(&content_type);
                if !matches!(kind, Rewritable::Other) {
                    let rewritten = rewrite_body(text, &origin, kind);
                    return builder
                        .body(Body::from(rewritten))
                        .map_err(|e| Error::Internal(e.to_string()));
                }
            }
        }
        builder.body(Body::from(body)).map_err(|e| Error::Internal(e.to_string()))
    }

    fn build_redirect_response(&self, status: reqwest::StatusCode, upstream: &reqwest::Response, origin: &str) -> Result<Response> {
        let location = upstream
            .headers()
            .get(axum::http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let rewritten = rewrite_location(location, origin);

        let mut builder = Response::builder().status(StatusCode::from_u16(status.as_u16()).unwrap());
        builder = builder.header(axum::http::header::LOCATION, rewritten);
        builder = with_cors(builder);
        builder.body(Body::empty()).map_err(|e| Error::Internal(e.to_string()))
    }
}

fn with_cors(mut builder: axum::http::response::Builder) -> axum::http::response::Builder {
    builder = builder.header(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    builder = builder.header(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("*"),
    );
    builder = builder.header(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("*"),
    );
    builder
}

/// Same-origin relative/absolute -> `/proxy/<b64>/<path>`; cross-origin
/// absolute -> `/proxy/<b64(new_origin)>/<new_path>`; relative locations
/// are left untouched (the browser resolves them against the already-
/// proxied page URL).
fn rewrite_location(location: &str, origin: &str) -> String {
    if location.is_empty() {
        return location.to_string();
    }
    if let Ok(abs) = Url::parse(location) {
        let new_origin = format!("{}://{}", abs.scheme(), abs.host_str().unwrap_or(""));
        let b64 = encode_origin(&new_origin);
        let rest = format!("{}{}", abs.path(), abs.query().map(|q| format!("?{q}")).unwrap_or_default());
        return format!("/proxy/{b64}{rest}");
    }
    if let Some(stripped) = location.strip_prefix('/') {
        if !stripped.starts_with('/') {
            let b64 = encode_origin(origin);
            return format!("/proxy/{b64}/{stripped}");
        }
    }
    location.to_string()
}

/// Inverts a Referer the page's own shim/static-rewrite produced (a
/// `/proxy/<b64>/<path>` URL, possibly still carrying the gateway's own
/// scheme+host) back into the original upstream URL, since CDNs enforce
/// Referer allow-lists against the real origin.
fn decode_rewritten_referer(referer: &str) -> Option<String> {
    let path_part = if let Ok(u) = Url::parse(referer) {
        u.path().to_string() + &u.query().map(|q| format!("?{q}")).unwrap_or_default()
    } else {
        referer.to_string()
    };
    let rest = path_part.strip_prefix("/proxy/")?;
    let (b64, path) = rest.split_once('/').unwrap_or((rest, ""));
    let origin = decode_origin(b64).ok()?;
    Some(format!("{origin}/{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referer_decoder_inverts_proxy_rewrite() {
        let origin = "https://cdn.example";
        let b64 = encode_origin(origin);
        let referer = format!("https://gateway.local/proxy/{b64}/video/seg1.ts");
        assert_eq!(
            decode_rewritten_referer(&referer).unwrap(),
            "https://cdn.example/video/seg1.ts"
        );
    }

    #[test]
    fn location_rewrite_same_origin() {
        let origin = "https://site";
        let out = rewrite_location("/other/page", origin);
        assert_eq!(out, format!("/proxy/{}/other/page", encode_origin(origin)));
    }

    #[test]
    fn location_rewrite_cross_origin_absolute() {
        let origin = "https://site";
        let out = rewrite_location("https://cdn.example/asset.js", origin);
        assert_eq!(out, format!("/proxy/{}/asset.js", encode_origin("https://cdn.example")));
    }

    #[test]
    fn location_rewrite_leaves_relative_alone() {
        assert_eq!(rewrite_location("asset.js", "https://site"), "asset.js");
    }
}
