//! Session cookie helpers.
//!
//! The cookie carries only an opaque token; the server-side `Session`
//! row (in the store) is the source of truth for expiry, so the cookie's
//! own `Max-Age` and the row's `expires_at` are allowed to drift — the
//! row wins.

use axum::http::{HeaderMap, HeaderValue};
use rand::RngCore;

pub const COOKIE_NAME: &str = "session";

pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|pair| {
        let pair = pair.trim();
        let (name, value) = pair.split_once('=')?;
        (name == COOKIE_NAME).then(|| value.to_string())
    })
}

/// `Secure` is set only when the request arrived over TLS, detected via
/// `X-Forwarded-Proto` (the gateway sits behind a TLS-terminating proxy
/// in production; direct HTTP is assumed otherwise).
pub fn is_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

pub fn set_cookie_header(token: &str, max_age_secs: u64, secure: bool) -> HeaderValue {
    let mut cookie = format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).expect("cookie header is valid ascii")
}

pub fn clear_cookie_header(secure: bool) -> HeaderValue {
    let mut cookie = format!("{COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).expect("cookie header is valid ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_token_finds_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static("foo=bar; session=abc123; baz=qux"));
        assert_eq!(extract_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn extract_token_absent_returns_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);
    }

    #[test]
    fn generated_tokens_are_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn https_detected_via_forwarded_proto_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert!(is_https(&headers));
        assert!(!is_https(&HeaderMap::new()));
    }
}
