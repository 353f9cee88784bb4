//! Base64 origin encode/decode shared by the reverse proxy and its body
//! rewriter. Base64url without padding is canonical; standard-with-
//! padding is accepted on decode for robustness against hand-built URLs.

use base64::Engine;
use url::Url;

use f1stream_core::{Error, Result};

pub fn encode_origin(origin: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(origin)
}

/// Decodes a base64 origin payload into `scheme://host`, rejecting
/// anything that is not `http` or `https`.
pub fn decode_origin(payload: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| base64::engine::general_purpose::STANDARD.decode(payload))
        .map_err(|_| Error::Input("invalid base64 origin".to_string()))?;
    let s = String::from_utf8(bytes).map_err(|_| Error::Input("origin is not utf-8".to_string()))?;
    let url = Url::parse(&s).map_err(|_| Error::Input(format!("invalid origin url: {s}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::Input(format!("unsupported origin scheme: {}", url.scheme())));
    }
    Ok(format!("{}://{}", url.scheme(), url.host_str().unwrap_or("")))
}

pub fn origin_of(origin: &str) -> Option<Url> {
    Url::parse(origin).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_identity() {
        let origin = "https://site.example";
        let encoded = encode_origin(origin);
        assert_eq!(decode_origin(&encoded).unwrap(), origin);
    }

    #[test]
    fn standard_base64_with_padding_is_accepted() {
        let origin = "https://site.example";
        let encoded = base64::engine::general_purpose::STANDARD.encode(origin);
        assert_eq!(decode_origin(&encoded).unwrap(), origin);
    }

    #[test]
    fn rejects_non_http_scheme() {
        let encoded = encode_origin("ftp://site.example");
        assert!(decode_origin(&encoded).is_err());
    }
}
