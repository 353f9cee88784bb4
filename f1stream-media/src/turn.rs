//! Ephemeral TURN REST credentials.
//!
//! Two independent bundles share one secret but never share a URL: the
//! server-side peer connects through the **internal** TURN URL (to avoid
//! hairpin NAT between cluster nodes), while the credentials handed to
//! the browser reference the **public** URL. Reusing one bundle for both
//! would be wrong even though the math is identical — see DESIGN.md.

use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;

const CREDENTIAL_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize)]
pub struct TurnCredentials {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// `username = "<expiry_unix_seconds>"`,
/// `credential = base64(HMAC-SHA1(shared_secret, username))`.
pub fn generate_credentials(turn_url: &str, shared_secret: &str, now_unix: i64) -> TurnCredentials {
    let expiry = now_unix + CREDENTIAL_TTL_SECS;
    let username = expiry.to_string();
    let credential = hmac_sha1_base64(shared_secret, &username);
    TurnCredentials {
        urls: vec![turn_url.to_string()],
        username,
        credential,
    }
}

fn hmac_sha1_base64(secret: &str, message: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(message.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// One bundle for the server-side peer (internal URL), one for the
/// client (public URL). Both share the secret and expiry but are built
/// independently so the URLs never cross.
pub struct DualTurnCredentials {
    pub internal: TurnCredentials,
    pub public: TurnCredentials,
}

pub fn generate_dual_credentials(internal_url: &str, public_url: &str, shared_secret: &str, now_unix: i64) -> DualTurnCredentials {
    DualTurnCredentials {
        internal: generate_credentials(internal_url, shared_secret, now_unix),
        public: generate_credentials(public_url, shared_secret, now_unix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_answer_credential() {
        // HMAC-SHA1("s", "1000") base64-encoded, computed offline.
        let username = "1000".to_string();
        let credential = hmac_sha1_base64("s", &username);
        assert_eq!(credential, "hy7fCrCv/v9NePxjOuMucn8hCLk=");
    }

    #[test]
    fn username_is_expiry_seconds() {
        let creds = generate_credentials("turn:example.com:3478", "secret", 1_000_000);
        assert_eq!(creds.username, (1_000_000 + CREDENTIAL_TTL_SECS).to_string());
    }

    #[test]
    fn dual_credentials_use_distinct_urls_same_secret() {
        let dual = generate_dual_credentials("turn:internal:3478", "turn:public.example:3478", "secret", 1_000_000);
        assert_ne!(dual.internal.urls, dual.public.urls);
        assert_eq!(dual.internal.username, dual.public.username);
        assert_eq!(dual.internal.credential, dual.public.credential);
    }
}
